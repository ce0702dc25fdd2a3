use as1600::symbol::{flags, seed_reserved, Segment, SymTok, SymbolTable};
use as1600::Error;

fn table() -> SymbolTable {
    let mut syms = SymbolTable::new();
    seed_reserved(&mut syms).unwrap();
    syms
}

#[test]
fn lifecycle() {
    let mut syms = table();
    let foo = syms.intern("FOO", SymTok::Symbol);
    assert_eq!(syms.get(foo).seg, Segment::Undefined);
    assert_eq!(syms.get(foo).symnum, 1);
    assert_eq!(syms.intern("FOO", SymTok::Label), foo);

    // EQU is final.
    assert!(syms.define(foo, true, 5, 0));
    assert!(!syms.define(foo, true, 6, 0));
    assert!(!syms.define(foo, false, 7, 0));
    assert!(!syms.define_label(foo, 8));
    assert_eq!(syms.get(foo).value, 5);
    assert_eq!(syms.get(foo).seg, Segment::Equ);

    // SET can be SET again, but never turned into EQU.
    let bar = syms.intern("BAR", SymTok::Symbol);
    assert!(syms.define(bar, false, 1, flags::QUIET));
    assert!(syms.define(bar, false, 2, 0));
    assert!(!syms.define(bar, true, 3, 0));
    assert_eq!(syms.get(bar).value, 2);
    assert!(syms.get(bar).is_quiet());
    assert_eq!(syms.get(bar).symnum, 2);
}

#[test]
fn reserved() {
    let mut syms = table();
    let r3 = syms.lookup("R3").unwrap();
    assert_eq!(syms.get(r3).seg, Segment::Reserved);
    assert_eq!(syms.get(r3).value, 3);
    assert_eq!(syms.get(r3).symnum, 0);

    assert!(matches!(
        syms.reserve("R3", SymTok::Reg, 3),
        Err(Error::ReservedTwice(name)) if name == "R3"
    ));
    assert!(matches!(seed_reserved(&mut syms), Err(Error::ReservedTwice(_))));
}

#[test]
fn arrays() {
    let mut syms = table();
    let tbl = syms.intern("TBL", SymTok::Label);
    let a = syms.intern_indexed(tbl, 3);
    assert_eq!(syms.intern_indexed(tbl, 3), a);
    let b = syms.intern_indexed(tbl, 1);
    let big = syms.intern_indexed(tbl, 0x1234_567);
    assert_ne!(a, b);
    assert_ne!(a, big);

    let base = syms.get(tbl);
    assert_eq!(base.seg, Segment::Set);
    assert_eq!(base.value, 0x1234_567);
    assert!(base.is_quiet());

    let elem = syms.get(a);
    println!("{}", elem.display_name());
    assert_eq!(elem.display_name(), "TBL[3]");
    assert!(elem.is_array_element());
    assert_eq!(elem.flags, flags::QUIET | flags::ARRAY);
    assert_eq!(syms.get(big).display_name(), format!("TBL[{}]", 0x1234_567));

    // Marker, then five bytes with the top bit set.
    let name = &syms.get(a).name;
    assert_eq!(name.len(), 3 + 6);
    assert_eq!(name[3], 0x01);
    assert!(name[4..].iter().all(|&c| c >= 0x80));
}

#[test]
fn local_labels() {
    let mut syms = table();
    syms.set_scope(Some("MAIN".to_string()));
    let local = syms.intern("@@loop", SymTok::Label);
    let global = syms.intern("loop", SymTok::Label);
    syms.set_scope(None);

    assert_ne!(local, global);
    assert_eq!(syms.lookup("MAIN.loop"), Some(local));
    assert_eq!(syms.intern("@@loop", SymTok::Label), syms.lookup("@@loop").unwrap());
}

#[test]
fn numbering() {
    let mut syms = table();
    let names = ["C", "A", "B"];
    for name in names {
        syms.intern(name, SymTok::Symbol);
    }
    syms.build_index();

    let order: Vec<String> = syms.numbered().map(|s| s.display_name()).collect();
    assert_eq!(order, names);
    assert_eq!(syms.by_number(2).map(|s| s.display_name()), Some("A".into()));
    assert_eq!(syms.by_number(9).map(|s| s.symnum), None);

    let sorted: Vec<String> = syms.user_symbols().iter().map(|s| s.display_name()).collect();
    assert_eq!(sorted, ["A", "B", "C"]);
    assert_eq!(SymbolTable::hash(b"A"), SymbolTable::hash(b"A"));
}
