use as1600::scanner::{scan_line, Skip, Token};
use as1600::symbol::{seed_reserved, SymbolTable};
use cp1600::table::find_opcode;

fn table() -> SymbolTable {
    let mut syms = SymbolTable::new();
    seed_reserved(&mut syms).unwrap();
    syms
}

fn case(line: &str, expects: Vec<Token>) {
    let mut syms = table();
    let scanned = scan_line(line, &mut syms, Skip::None);

    println!(" {line}");
    for (idx, token) in scanned.tokens.iter().enumerate() {
        println!("{:>2}: {:?}", idx, token);
    }

    assert_eq!(scanned.error, None);
    assert_eq!(scanned.tokens, expects);
}

fn op(name: &str) -> Token {
    Token::Opcode(find_opcode(name).unwrap())
}

#[test]
fn numbers() {
    use Token::*;
    let decle = || op("DECLE");
    case(" DECLE 10", vec![decle(), Constant(10), Eol]);
    case(" DECLE $FF", vec![decle(), Constant(0xFF), Eol]);
    case(" DECLE 0FFh", vec![decle(), Constant(0xFF), Eol]);
    case(" DECLE %1010", vec![decle(), Constant(10), Eol]);
    case(" DECLE 101b", vec![decle(), Constant(5), Eol]);
    case(" DECLE 17O", vec![decle(), Constant(15), Eol]);
    case(" DECLE 'A'", vec![decle(), QChar(0x41), Eol]);
    case(
        " DECLE \"AB\"",
        vec![decle(), Str(b"AB".to_vec()), Eol],
    );
}

#[test]
fn instruction_line() {
    let mut syms = table();
    let scanned = scan_line("LOOP MVII #$1234, R0 ; load", &mut syms, Skip::None);
    let label = syms.lookup("LOOP").unwrap();
    println!("{:?}", scanned.tokens);
    assert_eq!(
        scanned.tokens,
        vec![
            Token::Label(label),
            op("MVII"),
            Token::Char(b'#'),
            Token::Constant(0x1234),
            Token::Char(b','),
            Token::Reg(0),
            Token::Eol,
        ]
    );
}

#[test]
fn first_word_decides() {
    use Token::*;
    // An indented word that is not a mnemonic is still a label.
    let mut syms = table();
    let scanned = scan_line("   START", &mut syms, Skip::None);
    let start = syms.lookup("START").unwrap();
    assert_eq!(scanned.tokens, vec![Label(start), Eol]);

    // After the mnemonic, a mnemonic name is an ordinary symbol.
    let scanned = scan_line(" B MVII", &mut syms, Skip::None);
    let mvii = syms.lookup("MVII").unwrap();
    assert_eq!(scanned.tokens, vec![op("B"), Symbol(mvii), Eol]);

    case(" MOVR R1, PC", vec![op("MOVR"), Reg(1), Char(b','), Reg(7), Eol]);
    case(" DECLE $ + 1", vec![op("DECLE"), ProgCtr, Char(b'+'), Constant(1), Eol]);
}

#[test]
fn relations() {
    use Token::*;
    let decle = || op("DECLE");
    case(" DECLE 1 <= 2", vec![decle(), Constant(1), Le, Constant(2), Eol]);
    case(" DECLE 1 <> 2", vec![decle(), Constant(1), Ne, Constant(2), Eol]);
    case(" DECLE 1 >= 2", vec![decle(), Constant(1), Ge, Constant(2), Eol]);
    case(" DECLE 1 > 2", vec![decle(), Constant(1), Gt, Constant(2), Eol]);
    case(" DECLE 1 = 2", vec![decle(), Constant(1), Eq, Constant(2), Eol]);
}

#[test]
fn skipping() {
    let mut syms = table();

    let scanned = scan_line(" DECLE FOO", &mut syms, Skip::If);
    assert_eq!(scanned.tokens, vec![Token::Eol]);
    assert_eq!(syms.lookup("FOO"), None);

    let scanned = scan_line(" ENDI", &mut syms, Skip::If);
    assert_eq!(scanned.tokens, vec![op("ENDI"), Token::Eol]);

    let scanned = scan_line(" ENDR", &mut syms, Skip::Repeat);
    assert_eq!(scanned.tokens, vec![op("ENDR"), Token::Eol]);

    let scanned = scan_line(" DECLE \"open", &mut syms, Skip::None);
    assert_eq!(
        scanned.tokens,
        vec![op("DECLE"), Token::Invalid, Token::Eol]
    );
}
