use crate::symbol::{Keyword, Segment, SymTok, SymbolId, SymbolTable};
use cp1600::op::OpKind;
use cp1600::table::{find_opcode, opsym};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Eol,
    Label(SymbolId),
    Symbol(SymbolId),
    Feature(SymbolId),
    Reg(i32),
    Keyword(Keyword),
    /// Index into the opcode table. 0 is the invalid opcode.
    Opcode(usize),
    Constant(i32),
    /// Single-quoted one-character literal.
    QChar(i32),
    /// String contents with escapes left in place.
    Str(Vec<u8>),
    Char(u8),
    /// `$`
    ProgCtr,
    /// `%`
    Percent,
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Invalid,
}

impl Token {
    pub fn op_kind(&self) -> Option<OpKind> {
        match self {
            Token::Opcode(op) => Some(opsym(*op).kind),
            _ => None,
        }
    }
}

/// Which directives stay visible while input is being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Skip {
    #[default]
    None,
    If,
    Repeat,
}

impl Skip {
    pub fn passes(self, tok: &Token) -> bool {
        match self {
            Skip::None => true,
            Skip::If => *tok == Token::Eol || tok.op_kind().is_some_and(|k| k.passes_if_skip()),
            Skip::Repeat => {
                *tok == Token::Eol || tok.op_kind().is_some_and(|k| k.passes_rpt_skip())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Character classes

const SKIP: u8 = 0;
const SPACE: u8 = 1;
const NL: u8 = 2;
const LETTER: u8 = 3;
const QUOTE: u8 = 4;
const OTHER: u8 = 5;
const DOLLAR: u8 = 6;
const PERCENT: u8 = 7;
const APP: u8 = 8;
const BIN: u8 = 9;
const OCT: u8 = 10;
const DEC: u8 = 11;
const SEMIC: u8 = 12;
const LT: u8 = 13;
const EQ: u8 = 14;
const GT: u8 = 15;
// Column 16 is never selected: `@` scans as a letter.
const HEXU: u8 = 17;
const B: u8 = 18;
const D: u8 = 19;
const H: u8 = 20;
const OQ: u8 = 21;
const HEXL: u8 = 22;
const BL: u8 = 23;
const DL: u8 = 24;
const BSLASH: u8 = 25;
const NUM_CLASSES: usize = 26;

/// Class of each 7-bit character. Bytes with the top bit set are letters.
#[rustfmt::skip]
static CHAR_CLASS: [u8; 128] = [
    SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP,
    SKIP, SPACE, NL, SKIP, SKIP, SKIP, SKIP, SKIP,
    SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP,
    SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP, SKIP,
    SPACE, LETTER, QUOTE, OTHER, DOLLAR, PERCENT, LETTER, APP,
    OTHER, OTHER, OTHER, OTHER, OTHER, OTHER, LETTER, OTHER,
    BIN, BIN, OCT, OCT, OCT, OCT, OCT, OCT,
    DEC, DEC, OTHER, SEMIC, LT, EQ, GT, OTHER,
    LETTER, HEXU, B, HEXU, D, HEXU, HEXU, LETTER,
    H, LETTER, LETTER, LETTER, LETTER, LETTER, LETTER, OQ,
    LETTER, OQ, LETTER, LETTER, LETTER, LETTER, LETTER, LETTER,
    LETTER, LETTER, LETTER, OTHER, BSLASH, OTHER, LETTER, LETTER,
    OTHER, HEXL, BL, HEXL, DL, HEXL, HEXL, LETTER,
    H, LETTER, LETTER, LETTER, LETTER, LETTER, LETTER, OQ,
    LETTER, OQ, LETTER, LETTER, LETTER, LETTER, LETTER, LETTER,
    LETTER, LETTER, LETTER, OTHER, OTHER, OTHER, LETTER, SKIP,
];

fn class_of(c: u8) -> usize {
    if c & 0x80 != 0 {
        LETTER as usize
    } else {
        CHAR_CLASS[c as usize] as usize
    }
}

// ----------------------------------------------------------------------------
// Transitions

#[derive(Debug, Clone, Copy)]
struct Act {
    action: u8,
    next: u8,
    /// Run the next state on the same character.
    contin: bool,
}

const fn a(action: u8, next: u8) -> Act {
    Act {
        action,
        next,
        contin: false,
    }
}

const fn c(action: u8, next: u8) -> Act {
    Act {
        action,
        next,
        contin: true,
    }
}

const NUM_STATES: usize = 24;

#[rustfmt::skip]
static TRANSITIONS: [[Act; NUM_CLASSES]; NUM_STATES] = [
    // 0: start of label
    [
        a(0, 0), a(0, 3), a(1, 0), c(2, 2), a(2, 11), a(5, 3),
        a(33, 5), a(33, 9), a(2, 12), c(2, 15), c(2, 16), c(2, 17),
        a(0, 1), a(0, 14), a(6, 3), a(0, 13), a(33, 7), c(2, 2),
        c(2, 2), c(2, 2), c(2, 2), c(2, 2), c(2, 2), c(2, 2),
        c(2, 2), a(5, 3),
    ],
    // 1: comment
    [
        a(0, 1), a(0, 1), a(1, 0), a(0, 1), a(0, 1), a(0, 1),
        a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1),
        a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1),
        a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1), a(0, 1),
        a(0, 1), a(0, 1),
    ],
    // 2: label
    [
        a(0, 2), a(3, 3), c(3, 3), a(4, 2), c(3, 3), c(3, 3),
        c(3, 3), c(3, 3), c(3, 3), a(4, 2), a(4, 2), a(4, 2),
        a(3, 1), a(3, 14), c(3, 3), a(3, 13), c(3, 3), a(4, 2),
        a(4, 2), a(4, 2), a(4, 2), a(4, 2), a(4, 2), a(4, 2),
        a(4, 2), c(3, 3),
    ],
    // 3: rest of line
    [
        a(0, 3), a(0, 3), a(1, 0), c(2, 4), a(2, 11), a(5, 3),
        a(33, 5), a(33, 9), a(2, 12), c(2, 15), c(2, 16), c(2, 17),
        a(0, 1), a(0, 14), a(6, 3), a(0, 13), a(33, 7), c(2, 4),
        c(2, 4), c(2, 4), c(2, 4), c(2, 4), c(2, 4), c(2, 4),
        c(2, 4), a(5, 3),
    ],
    // 4: symbol
    [
        a(0, 4), a(7, 3), c(7, 3), a(4, 4), c(7, 3), c(7, 3),
        c(7, 3), c(7, 3), c(7, 3), a(4, 4), a(4, 4), a(4, 4),
        a(7, 1), a(7, 14), c(7, 3), a(7, 13), c(7, 3), a(4, 4),
        a(4, 4), a(4, 4), a(4, 4), a(4, 4), a(4, 4), a(4, 4),
        a(4, 4), c(7, 3),
    ],
    // 5: dollar
    [
        a(0, 5), a(8, 3), c(8, 3), c(8, 3), c(8, 3), c(8, 3),
        c(8, 3), c(8, 3), c(8, 3), c(9, 6), c(9, 6), c(9, 6),
        a(8, 1), a(8, 14), c(8, 3), a(8, 13), c(8, 3), c(9, 6),
        c(9, 6), c(9, 6), c(8, 3), c(8, 3), c(9, 6), c(9, 6),
        c(9, 6), c(8, 3),
    ],
    // 6: hex dollar
    [
        a(0, 6), a(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3), c(13, 3), a(10, 6), a(10, 6), a(10, 6),
        a(13, 1), a(13, 14), c(13, 3), a(13, 13), c(13, 3), a(11, 6),
        a(11, 6), a(11, 6), c(13, 3), c(13, 3), a(12, 6), a(12, 6),
        a(12, 6), c(13, 3),
    ],
    // 7: at sign
    [
        a(0, 7), a(14, 3), c(14, 3), c(14, 3), c(14, 3), c(14, 3),
        c(14, 3), c(14, 3), c(14, 3), c(15, 8), c(15, 8), c(14, 3),
        a(14, 1), a(14, 14), c(14, 3), a(14, 13), c(14, 3), c(14, 3),
        c(14, 3), c(14, 3), c(14, 3), c(14, 3), c(14, 3), c(14, 3),
        c(14, 3), c(14, 3),
    ],
    // 8: octal at
    [
        a(0, 8), a(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3), c(13, 3), a(10, 8), a(10, 8), c(13, 3),
        a(13, 1), a(13, 14), c(13, 3), a(13, 13), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3),
    ],
    // 9: percent
    [
        a(0, 9), a(17, 3), c(17, 3), c(17, 3), c(17, 3), c(17, 3),
        c(17, 3), c(17, 3), c(17, 3), c(16, 10), c(17, 3), c(17, 3),
        a(17, 1), a(17, 14), c(17, 3), a(17, 13), c(17, 3), c(17, 3),
        c(17, 3), c(17, 3), c(17, 3), c(17, 3), c(17, 3), c(17, 3),
        c(17, 3), c(17, 3),
    ],
    // 10: bin percent
    [
        a(0, 10), a(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3), c(13, 3), a(10, 10), c(13, 3), c(13, 3),
        a(13, 1), a(13, 14), c(13, 3), a(13, 13), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3), c(13, 3),
        c(13, 3), c(13, 3),
    ],
    // 11: quote string
    [
        a(0, 11), a(4, 11), c(34, 3), a(4, 11), a(18, 3), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 21),
    ],
    // 12: apostrophe string
    [
        a(0, 12), a(4, 12), c(34, 3), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(35, 3), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 22),
    ],
    // 13: greater than
    [
        a(0, 13), a(20, 3), c(20, 3), c(20, 3), c(20, 3), c(20, 3),
        c(20, 3), c(20, 3), c(20, 3), c(20, 3), c(20, 3), c(20, 3),
        a(20, 1), a(20, 14), a(19, 3), a(20, 13), c(20, 3), c(20, 3),
        c(20, 3), c(20, 3), c(20, 3), c(20, 3), c(20, 3), c(20, 3),
        c(20, 3), c(20, 3),
    ],
    // 14: less than
    [
        a(0, 14), a(23, 3), c(23, 3), c(23, 3), c(23, 3), c(23, 3),
        c(23, 3), c(23, 3), c(23, 3), c(23, 3), c(23, 3), c(23, 3),
        a(23, 1), a(23, 14), a(21, 3), a(22, 23), c(23, 3), c(23, 3),
        c(23, 3), c(23, 3), c(23, 3), c(23, 3), c(23, 3), c(23, 3),
        c(23, 3), c(23, 3),
    ],
    // 15: base 2 maybe
    [
        a(0, 15), a(29, 3), c(29, 3), c(29, 3), c(29, 3), c(29, 3),
        c(29, 3), c(29, 3), c(29, 3), a(24, 15), a(24, 16), a(24, 17),
        a(29, 1), a(29, 14), c(29, 3), a(29, 13), c(29, 3), a(25, 18),
        a(0, 19), a(0, 20), a(30, 3), a(28, 3), a(26, 18), a(0, 19),
        a(0, 20), c(29, 3),
    ],
    // 16: base 8 maybe
    [
        a(0, 16), a(29, 3), c(29, 3), c(29, 3), c(29, 3), c(29, 3),
        c(29, 3), c(29, 3), c(29, 3), a(24, 16), a(24, 16), a(24, 17),
        a(29, 1), a(29, 14), c(29, 3), a(29, 13), c(29, 3), a(25, 18),
        a(25, 18), a(0, 20), a(30, 3), a(28, 3), a(26, 18), a(26, 18),
        a(0, 20), c(29, 3),
    ],
    // 17: base 10 maybe
    [
        a(0, 17), a(29, 3), c(29, 3), c(29, 3), c(29, 3), c(29, 3),
        c(29, 3), c(29, 3), c(29, 3), a(24, 17), a(24, 17), a(24, 17),
        a(29, 1), a(29, 14), c(29, 3), a(29, 13), c(29, 3), a(25, 18),
        a(25, 18), a(0, 20), a(30, 3), a(34, 3), a(26, 18), a(26, 18),
        a(0, 20), c(29, 3),
    ],
    // 18: hex
    [
        a(0, 18), a(34, 3), c(34, 3), c(34, 3), c(34, 3), c(34, 3),
        c(34, 3), c(34, 3), c(34, 3), a(24, 18), a(24, 18), a(24, 18),
        a(34, 1), a(34, 14), c(34, 3), a(34, 13), c(34, 3), a(25, 18),
        a(25, 18), a(25, 18), a(30, 3), c(34, 3), a(26, 18), a(26, 18),
        a(26, 18), c(34, 3),
    ],
    // 19: found b
    [
        a(0, 19), a(27, 3), c(27, 3), c(27, 3), c(27, 3), c(27, 3),
        c(27, 3), c(27, 3), c(27, 3), c(31, 18), c(31, 18), c(31, 18),
        a(27, 1), a(27, 14), c(27, 3), a(27, 13), c(27, 3), c(31, 18),
        c(31, 18), c(31, 18), c(31, 18), c(27, 3), c(31, 18), c(31, 18),
        c(31, 18), c(27, 3),
    ],
    // 20: found d
    [
        a(0, 20), a(29, 3), c(29, 3), c(29, 3), c(29, 3), c(29, 3),
        c(29, 3), c(29, 3), c(29, 3), c(32, 18), c(32, 18), c(32, 18),
        a(29, 1), a(29, 14), c(29, 3), a(29, 13), c(29, 3), c(32, 18),
        c(32, 18), c(32, 18), c(32, 18), c(29, 3), c(32, 18), c(32, 18),
        c(32, 18), c(29, 3),
    ],
    // 21: backslash quote
    [
        a(0, 21), a(4, 11), c(34, 3), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11), a(4, 11),
        a(4, 11), a(4, 11),
    ],
    // 22: backslash apostrophe
    [
        a(0, 22), a(4, 12), c(34, 3), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12), a(4, 12),
        a(4, 12), a(4, 12),
    ],
    // 23: after <>
    [
        a(0, 23), a(0, 3), c(0, 3), c(0, 3), c(0, 3), c(0, 3),
        c(0, 3), c(0, 3), c(0, 3), c(0, 3), c(0, 3), c(0, 3),
        a(0, 1), a(0, 14), a(19, 3), a(0, 13), c(0, 3), c(0, 3),
        c(0, 3), c(0, 3), c(0, 3), c(0, 3), c(0, 3), c(0, 3),
        c(0, 3), c(0, 3),
    ],
];

// ----------------------------------------------------------------------------
// Scanner

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Opcode,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelArray {
    No,
    Maybe,
    Yes,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScannedLine {
    pub tokens: Vec<Token>,
    pub error: Option<&'static str>,
}

struct Scanner<'a> {
    syms: &'a mut SymbolTable,
    skip: Skip,
    tokens: Vec<Token>,
    text: Vec<u8>,
    accum: i64,
    base: i64,
    which: Which,
    label_array: LabelArray,
}

/// Tokenize one source line. While `skip` is set, identifiers are not
/// interned and only the directives that end the skip come back.
pub fn scan_line(line: &str, syms: &mut SymbolTable, skip: Skip) -> ScannedLine {
    let mut sc = Scanner {
        syms,
        skip,
        tokens: Vec::new(),
        text: Vec::new(),
        accum: 0,
        base: 0,
        which: Which::Opcode,
        label_array: LabelArray::No,
    };

    let mut state = 0usize;
    let newline = (!line.ends_with('\n')).then_some(b'\n');
    for ch in line.bytes().chain(newline) {
        let class = class_of(ch);
        loop {
            let act = TRANSITIONS[state][class];
            sc.act(act.action, ch);
            state = act.next as usize;
            if !act.contin {
                break;
            }
        }
    }

    let mut tokens: Vec<Token> = sc.tokens.into_iter().filter(|t| skip.passes(t)).collect();
    if tokens.is_empty() {
        tokens.push(Token::Eol);
    }
    let error = (state != 0 && skip == Skip::None).then_some("Overlength/Unterminated Line");
    ScannedLine { tokens, error }
}

impl<'a> Scanner<'a> {
    fn push(&mut self, tok: Token) {
        self.tokens.push(tok);
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }

    fn reserved(&self, id: SymbolId) -> Option<Token> {
        let sym = self.syms.get(id);
        if sym.seg != Segment::Reserved {
            return None;
        }
        Some(match sym.tok {
            SymTok::Reg => Token::Reg(sym.value),
            SymTok::Keyword(kw) => Token::Keyword(kw),
            SymTok::Feature => Token::Feature(id),
            SymTok::Label | SymTok::Symbol => Token::Symbol(id),
        })
    }

    fn label(&mut self) {
        self.label_array = LabelArray::Maybe;
        if self.skip != Skip::None {
            return;
        }
        let id = self.syms.intern(&self.text(), SymTok::Label);
        let tok = self.reserved(id).unwrap_or(Token::Label(id));
        self.push(tok);
    }

    fn symbol(&mut self) {
        if self.which == Which::Opcode {
            let name = self.text().to_ascii_uppercase();
            match find_opcode(&name) {
                Some(op) => {
                    self.which = Which::Symbol;
                    self.push(Token::Opcode(op));
                }
                // An identifier that starts the line and is not an opcode
                // is a label, even when indented.
                None if self.tokens.is_empty() => self.label(),
                None => {
                    self.which = Which::Symbol;
                    self.push(Token::Opcode(0));
                }
            }
            return;
        }

        if self.skip != Skip::None {
            return;
        }
        let id = self.syms.intern(&self.text(), SymTok::Symbol);
        let tok = self.reserved(id).unwrap_or(Token::Symbol(id));
        self.push(tok);
    }

    fn convert(&mut self, base: i64) {
        let v = self
            .text
            .iter()
            .fold(0i64, |acc, &d| acc.wrapping_mul(base).wrapping_add(d as i64));
        self.push(Token::Constant(v as i32));
    }

    fn accumulate(&mut self, digit: u8) {
        self.accum = self
            .accum
            .wrapping_mul(self.base)
            .wrapping_add(digit as i64);
    }

    fn act(&mut self, action: u8, ch: u8) {
        match action {
            0 | 33 => {}
            1 => self.push(Token::Eol),
            2 => self.text.clear(),
            3 => self.label(),
            4 => self.text.push(ch),
            5 => {
                if self.label_array == LabelArray::Maybe && ch == b'[' && self.which == Which::Opcode
                {
                    self.label_array = LabelArray::Yes;
                    self.which = Which::Symbol;
                }
                if self.label_array == LabelArray::Yes && ch == b']' {
                    self.label_array = LabelArray::Maybe;
                    self.which = Which::Opcode;
                }
                self.push(Token::Char(ch));
            }
            6 => self.push(Token::Eq),
            7 => self.symbol(),
            8 => self.push(Token::ProgCtr),
            9 => {
                self.base = 16;
                self.accum = 0;
            }
            10 => self.accumulate(ch - b'0'),
            11 => self.accumulate(ch - b'A' + 10),
            12 => self.accumulate(ch - b'a' + 10),
            13 => self.push(Token::Constant(self.accum as i32)),
            14 => self.push(Token::Char(b'@')),
            15 => {
                self.base = 8;
                self.accum = 0;
            }
            16 => {
                self.base = 2;
                self.accum = 0;
            }
            17 => self.push(Token::Percent),
            18 => self.push(Token::Str(self.text.clone())),
            35 => {
                let tok = match self.text.as_slice() {
                    [c] => Token::QChar(*c as i32 & 0xFF),
                    text => Token::Str(text.to_vec()),
                };
                self.push(tok);
            }
            19 => self.push(Token::Ge),
            20 => self.push(Token::Gt),
            21 => self.push(Token::Le),
            22 => self.push(Token::Ne),
            23 => self.push(Token::Lt),
            24 => self.text.push(ch - b'0'),
            25 => self.text.push(ch - b'A' + 10),
            26 => self.text.push(ch - b'a' + 10),
            27 => self.convert(2),
            28 => self.convert(8),
            29 => self.convert(10),
            30 => self.convert(16),
            31 => self.text.push(0xB),
            32 => self.text.push(0xD),
            _ => self.push(Token::Invalid),
        }
    }
}
