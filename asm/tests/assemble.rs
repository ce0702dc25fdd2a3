use as1600::diag::{Collect, Diagnostics, Severity};
use as1600::image::RomImage;
use as1600::output::{outphase, symbol_file};
use as1600::record::RecordKind;
use as1600::session::Session;
use as1600::source::TextSource;
use as1600::symbol::SymbolTable;

struct Assembled {
    image: RomImage,
    diag: Collect,
    listing: String,
    syms: SymbolTable,
}

/// Run both passes over `code` as if it were `test.asm`.
fn assemble(code: &str) -> Assembled {
    let mut diag = Collect::new();
    let source = TextSource::new("test.asm", code);
    let mut session = Session::new(Box::new(source), Vec::new(), &mut diag).unwrap();
    session.pass1().unwrap();
    let (mut syms, mut records) = session.finish();
    syms.build_index();

    let mut image = RomImage::new();
    let mut listing = String::new();
    outphase(&mut records, &syms, &mut image, &mut diag, Some(&mut listing));

    println!("{}", code);
    println!("----");
    println!("{}", listing);
    for report in &diag.reports {
        println!("{:?}", report);
    }
    Assembled {
        image,
        diag,
        listing,
        syms,
    }
}

fn words(image: &RomImage, lo: u16, len: u16) -> Vec<u16> {
    (lo..lo + len).map(|a| image.word(a).unwrap()).collect()
}

fn case(code: &str, expects: Vec<u16>) -> Assembled {
    let out = assemble(code);
    assert_eq!(out.diag.errors(), 0, "{:?}", out.diag.reports);
    assert_eq!(words(&out.image, 0, expects.len() as u16), expects);
    assert_eq!(out.image.word(expects.len() as u16), None);
    out
}

#[test]
fn folded_constant() {
    case("FOO EQU 5\n MVII #FOO+1, R0", vec![0x02B8, 6]);

    // Known values never reach the second pass as symbol references.
    let mut diag = Collect::new();
    let source = TextSource::new("test.asm", "FOO EQU 5\n MVII #FOO+1, R0");
    let mut session = Session::new(Box::new(source), Vec::new(), &mut diag).unwrap();
    session.pass1().unwrap();
    assert_eq!(session.locctr(), 2);
    let blocks: Vec<&str> = session
        .records()
        .iter()
        .filter_map(|r| match &r.kind {
            RecordKind::DataBlock(polish) => Some(polish.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].contains('S'), "{}", blocks[0]);
}

#[test]
fn forward_branch() {
    let out = case(
        " B TARGET\n DECLE 7\nTARGET DECLE 9",
        vec![0x0200, 0x0001, 7, 9],
    );
    let target = out.syms.lookup("TARGET").unwrap();
    assert_eq!(out.syms.get(target).value, 3);
}

#[test]
fn rom_width() {
    let out = case(
        " ROMW 8\n MVII #$1234, R0",
        vec![0x0001, 0x02B8, 0x34, 0x12],
    );
    assert_eq!(
        out.diag.messages(Severity::Warning),
        vec!["Constant is wider than ROM width.  Inserting SDBD."]
    );

    let out = case(" ROMW 16\n MVII #$1234, R0", vec![0x02B8, 0x1234]);
    assert_eq!(out.diag.warnings(), 0);
}

#[test]
fn aliases() {
    case(" TSTR R3\n MOVR R3,R3", vec![0x009B, 0x009B]);
}

#[test]
fn repeat() {
    let out = case(" REPEAT 3\n DECLE 1\n ENDR", vec![1, 1, 1]);
    for n in 0..3 {
        assert!(out.listing.contains(&format!("  ;== {}", n)));
    }
}

#[test]
fn undefined_once_per_line() {
    let out = assemble(" DECLE FOO, FOO+FOO, FOO, FOO");
    assert_eq!(out.diag.errors(), 1);
    assert_eq!(
        out.diag.messages(Severity::Error),
        vec!["undefined symbol  FOO"]
    );
    assert!(out.listing.contains("test.asm:1: ERROR - undefined symbol  FOO"));
}

#[test]
fn conditionals() {
    case(
        "A EQU 1\n IF A\n DECLE 1\n ELSE\n DECLE 2\n ENDI\n IF 0\n DECLE 3\n ELSE\n DECLE 4\n ENDI",
        vec![1, 4],
    );
}

#[test]
fn proc_locals() {
    let out = case(
        "MAIN PROC\n@@loop DECLE 1\n B @@loop\n ENDP\nSUB PROC\n@@loop DECLE 2\n ENDP",
        vec![1, 0x0220, 2, 2],
    );
    let value = |name: &str| out.syms.get(out.syms.lookup(name).unwrap()).value;
    assert_eq!(value("MAIN.loop"), 0);
    assert_eq!(value("SUB.loop"), 3);
}

#[test]
fn arrays() {
    case(
        "TBL EQU 1, 2, 3\n DECLE TBL[1], TBL[2]\n DECLE TBL[2,0]",
        vec![2, 3, 3, 2, 1],
    );
}

#[test]
fn multiple_definition() {
    let out = assemble("X DECLE 1\nX DECLE 2");
    assert_eq!(
        out.diag.messages(Severity::Error),
        vec!["multiple definition of label"]
    );
}

#[test]
fn config_file() {
    let out = case(
        " ORG $5000\n DECLE 1, 2\n MEMATTR $100, $10F, \"+RW\"\n CFGVAR \"name\" = \"demo\"",
        Vec::new(),
    );
    assert_eq!(words(&out.image, 0x5000, 2), vec![1, 2]);

    let (bin, cfg) = out.image.bincfg();
    println!("{}", cfg);
    assert_eq!(bin, vec![0, 1, 0, 2]);
    assert!(cfg.starts_with("[mapping]\r\n$0000 - $0001 = $5000\r\n"));
    assert!(cfg.contains("[memattr]\r\n$0100 - $010F = RAM 16\r\n"));
    assert!(cfg.contains("[vars]\r\nname = \"demo\"\r\n"));
}

#[test]
fn symbol_dump() {
    let out = case("START DECLE 1\nLATER EQU $20", vec![1]);
    assert_eq!(symbol_file(&out.syms), "00000000 START\n00000020 LATER\n");
}

#[test]
fn sdbd_prefix() {
    let out = case(
        " SDBD\n SDBD\n MVII #1, R0",
        vec![0x0001, 0x0001, 0x02B8, 0x0001, 0x0000],
    );
    assert_eq!(
        out.diag.messages(Severity::Warning),
        vec!["Two SDBDs in a row."]
    );

    let out = case(
        " ROMW 10, 1\n MVII #LATER, R0\nLATER EQU 5",
        vec![0x0001, 0x02B8, 0x0005, 0x0000],
    );
    assert_eq!(
        out.diag.messages(Severity::Warning),
        vec!["Inserting SDBD due to forward reference."]
    );
}

#[test]
fn forward_set() {
    let out = case(" DECLE Y\nY SET 2", vec![2]);
    assert_eq!(
        out.diag.messages(Severity::Warning),
        vec!["forward reference to SET symbol"]
    );
}

#[test]
fn deep_nesting() {
    case(&format!(" DECLE {}7{}", "(".repeat(50), ")".repeat(50)), vec![7]);

    for code in [
        format!(" DECLE {}1{}", "(".repeat(5000), ")".repeat(5000)),
        format!(" DECLE {}1", "-".repeat(20000)),
        format!(" DECLE {}1", "NOT ".repeat(5000)),
    ] {
        let out = assemble(&code);
        assert_eq!(
            out.diag.messages(Severity::Error),
            vec!["expression stack overflow"]
        );
        assert_eq!(out.image.word(0), None);
    }
}

#[test]
fn huge_slices() {
    let out = assemble(" DECLE TBL[1, $80000000]");
    assert_eq!(
        out.diag.messages(Severity::Error),
        vec!["array slice too large"]
    );

    let out = assemble("TBL[0, $7FFFFFFF] EQU 1");
    assert!(out
        .diag
        .messages(Severity::Error)
        .contains(&"array slice too large"));
}

#[test]
fn address_overflow() {
    let out = assemble(" MEMATTR 0, $7FFFFFFF, \"+R\"\n DECLE 1");
    assert_eq!(out.diag.messages(Severity::Error), vec!["Address overflow"]);
    assert_eq!(out.image.word(0), Some(1));

    let out = assemble(" ORG $5000\n RES $7FFFFFFF\n DECLE 1");
    assert_eq!(out.diag.messages(Severity::Error), vec!["Address overflow"]);
    assert_eq!(out.image.word(0x5000), Some(1));

    let out = assemble(" ORG $7FFFFFFF\n DECLE 1");
    assert_eq!(out.diag.messages(Severity::Error), vec!["Address overflow"]);
    assert_eq!(out.image.word(0), Some(1));
}

#[test]
fn include_nesting() {
    let path = std::env::temp_dir().join(format!("as1600-nest-{}.asm", std::process::id()));
    let path = path.to_string_lossy().into_owned();
    std::fs::write(&path, format!(" INCLUDE \"{}\"\n DECLE 1\n", path)).unwrap();

    let out = assemble(&format!(" INCLUDE \"{}\"", path));
    std::fs::remove_file(&path).unwrap();
    assert_eq!(
        out.diag.messages(Severity::Error),
        vec!["include file nesting limit exceeded"]
    );
    assert_eq!(out.image.word(0), Some(1));
}
