use as1600::eval::{evaluate, rotl16, rotl32, BinOp, Issue, UnOp};
use as1600::expr::{compile, ExprArena, Node, NodeId};
use as1600::symbol::{class, seed_reserved, Segment, SymTok, SymbolTable};

fn table() -> SymbolTable {
    let mut syms = SymbolTable::new();
    seed_reserved(&mut syms).unwrap();
    syms
}

/// Fold in pass 1 and replay the polish in pass 2; both must agree.
fn case(arena: &ExprArena, syms: &SymbolTable, root: NodeId, expect: i32) {
    let (value, errors) = compile(arena, syms, 0x5000, root);
    println!("{:>8} <- {}", value.value, value.polish);
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(value.is_abs());
    assert_eq!(value.value, expect);

    let replay = evaluate(&value.polish, 0x5000, syms);
    assert!(replay.issues.is_empty(), "{:?}", replay.issues);
    assert_eq!(replay.value, expect);
}

fn bin(arena: &mut ExprArena, op: BinOp, l: Node, r: Node) -> NodeId {
    let l = arena.push(l).unwrap();
    let r = arena.push(r).unwrap();
    arena.push(Node::Binary(op, l, r)).unwrap()
}

#[test]
fn folding() {
    let mut syms = table();
    let foo = syms.intern("FOO", SymTok::Symbol);
    assert!(syms.define(foo, true, 5, 0));
    let mut arena = ExprArena::new();

    let root = bin(&mut arena, BinOp::Add, Node::Symbol(foo), Node::Constant(1));
    case(&arena, &syms, root, 6);

    let cases = [
        (BinOp::Sub, 3, 10, -7),
        (BinOp::Mul, 7, 6, 42),
        (BinOp::Div, -7, 2, -3),
        (BinOp::Mod, 7, 4, 3),
        (BinOp::Shl, 1, 4, 16),
        (BinOp::Shr, -16, 2, -4),
        (BinOp::Shru, -1, 28, 15),
        (BinOp::And, 0x1234, 0xFF, 0x34),
        (BinOp::Or, 0x1200, 0x34, 0x1234),
        (BinOp::Xor, 0xFF, 0x0F, 0xF0),
        (BinOp::Gt, 2, 1, 1),
        (BinOp::Le, 2, 1, 0),
        (BinOp::Eq, 3, 3, 1),
        (BinOp::Ne, 3, 3, 0),
    ];
    for (op, l, r, expect) in cases {
        arena.reset();
        let root = bin(&mut arena, op, Node::Constant(l), Node::Constant(r));
        case(&arena, &syms, root, expect);
    }

    arena.reset();
    let v = arena.push(Node::Constant(0x1234)).unwrap();
    let high = arena.push(Node::Unary(UnOp::High, v)).unwrap();
    case(&arena, &syms, high, 0x12);
    let low = arena.push(Node::Unary(UnOp::Low, v)).unwrap();
    case(&arena, &syms, low, 0x34);
    let neg = arena.push(Node::Unary(UnOp::Neg, v)).unwrap();
    case(&arena, &syms, neg, -0x1234);

    let pc = arena.push(Node::ProgramCounter).unwrap();
    case(&arena, &syms, pc, 0x5000);
}

#[test]
fn forward_reference() {
    let mut syms = table();
    let later = syms.intern("LATER", SymTok::Symbol);
    let mut arena = ExprArena::new();
    let root = bin(&mut arena, BinOp::Add, Node::Symbol(later), Node::Constant(2));

    let (value, errors) = compile(&arena, &syms, 0, root);
    println!("{}", value.polish);
    assert!(errors.is_empty());
    assert!(!value.is_abs());
    assert!(value.polish.contains('S'));

    // Unresolved in pass 2 as well.
    syms.build_index();
    let symnum = syms.get(later).symnum;
    let out = evaluate(&value.polish, 0, &syms);
    assert_eq!(out.issues, vec![Issue::Undefined(symnum)]);
    assert_eq!(out.value, 2);

    // Resolved once the label exists.
    assert!(syms.define_label(later, 0x100));
    let out = evaluate(&value.polish, 0, &syms);
    assert!(out.issues.is_empty());
    assert_eq!(out.value, 0x102);
}

#[test]
fn local_errors() {
    let syms = table();
    let mut arena = ExprArena::new();

    let root = bin(&mut arena, BinOp::Div, Node::Constant(1), Node::Constant(0));
    let (value, errors) = compile(&arena, &syms, 0, root);
    assert_eq!(errors, vec!["division by zero attempted".to_string()]);
    assert_eq!(value.value, 0);

    arena.reset();
    let root = bin(&mut arena, BinOp::Shl, Node::Constant(1), Node::Constant(-1));
    let (value, errors) = compile(&arena, &syms, 0, root);
    assert_eq!(errors, vec!["shift left by negative amount attempted".to_string()]);
    assert_eq!(value.value, 0);

    let out = evaluate("1.0/x", 0, &syms);
    assert_eq!(out.words, vec![0]);
    assert_eq!(
        out.issues,
        vec![Issue::Error("division by zero attempted".into())]
    );
}

#[test]
fn defined_and_classify() {
    let mut syms = table();
    let known = syms.intern("KNOWN", SymTok::Symbol);
    syms.define(known, false, 3, 0);
    let unknown = syms.intern("UNKNOWN", SymTok::Symbol);
    let mut arena = ExprArena::new();

    let d = arena.push(Node::Defined(known)).unwrap();
    case(&arena, &syms, d, 1);
    let d = arena.push(Node::Defined(unknown)).unwrap();
    case(&arena, &syms, d, 0);

    let c = arena.push(Node::ClassifySymbol(known)).unwrap();
    case(&arena, &syms, c, class::SET);
    let c = arena.push(Node::ClassifySymbol(unknown)).unwrap();
    case(&arena, &syms, c, class::UNDEF);

    let feature = syms.lookup("__FEATURE.ROTATE").unwrap();
    let c = arena.push(Node::ClassifySymbol(feature)).unwrap();
    case(&arena, &syms, c, class::FEATURE);

    let k = arena.push(Node::Constant(9)).unwrap();
    let c = arena.push(Node::Unary(UnOp::Classify, k)).unwrap();
    case(&arena, &syms, c, class::ABS);
    assert_eq!(syms.get(unknown).seg, Segment::Undefined);
}

#[test]
fn rotates() {
    assert_eq!(rotl16(0x1234, 4), 0x2341);
    assert_eq!(rotl16(0x1234, -4), 0x4123);
    assert_eq!(rotl16(0x8001, 1), 0x0003);
    for n in -40..40 {
        assert_eq!(rotl16(0xBEEF, n), rotl16(0xBEEF, n.rem_euclid(16)));
        assert_eq!(rotl16(rotl16(0xBEEF, -n), n), 0xBEEF);
    }
    assert_eq!(rotl32(0x8000_0001u32 as i32, 4), 0x18);
    assert_eq!(rotl32(0x1234_5678, -8), 0x7812_3456);
}

#[test]
fn widths() {
    let syms = table();
    let check = |polish: &str, words: Vec<u16>, errors: usize| {
        let out = evaluate(polish, 0, &syms);
        println!("{:<12} -> {:04X?} {:?}", polish, out.words, out.issues);
        assert_eq!(out.words, words);
        assert_eq!(out.issues.len(), errors);
    };

    // 8-bit field, signed range for WIDTH is -128..=255.
    check("FF.8Wx", vec![0xFF], 0);
    check("100.8Wx", vec![0x00], 1);
    check("80_.8Wx", vec![0x80], 0);
    check("81_.8Wx", vec![0x7F], 1);

    // SWIDTH is strictly signed.
    check("7F.8wx", vec![0x7F], 0);
    check("80.8wx", vec![0x80], 1);

    // IWIDTH accepts both 16-bit sign extensions.
    check("1_.10Ix", vec![0xFFFF], 0);
    check("FFFF.10Ix", vec![0xFFFF], 0);
    check("10000.10Ix", vec![0x0000], 1);

    check("1234y", vec![0x3412], 0);
    check("19.0Wx", vec![0x0000], 1);
}

#[test]
fn every_width() {
    let syms = table();
    for w in 1..=24 {
        let min = -(1 << (w - 1));
        let smax = (1 << (w - 1)) - 1;
        let umax = (1 << w) - 1;
        for v in [min - 1, min, -1, 0, smax, smax + 1, umax, umax + 1] {
            let fits = [
                ('w', (min..=smax).contains(&v)),
                ('W', (min..=umax).contains(&v)),
                ('I', (0..=umax).contains(&v) || (w == 16 && (-0x8000..0).contains(&v))),
            ];
            for (op, fits) in fits {
                let polish = format!("{:x}.{:x}{}", v as u32, w, op);
                let out = evaluate(&polish, 0, &syms);
                assert_eq!(out.value, v & umax, "{} w={} v={}", op, w, v);
                assert_eq!(out.issues.is_empty(), fits, "{} w={} v={}", op, w, v);
            }
        }
    }
}

#[test]
fn deep_trees() {
    let syms = table();
    let mut arena = ExprArena::new();

    // 1 + (1 + (1 + ...)) keeps every left operand on the stack.
    let mut root = arena.push(Node::Constant(1)).unwrap();
    for _ in 0..5000 {
        let one = arena.push(Node::Constant(1)).unwrap();
        root = arena.push(Node::Binary(BinOp::Add, one, root)).unwrap();
    }
    let (value, errors) = compile(&arena, &syms, 0, root);
    println!("{:?}", errors);
    assert_eq!(
        errors,
        vec![
            "overflow in polish expression conversion".to_string(),
            "expression stack overflow".to_string(),
        ]
    );
    assert!(!value.is_abs());

    // ((1 + 1) + 1) + ... stays shallow but writes too much polish.
    arena.reset();
    let mut root = arena.push(Node::Constant(0x1234_5678)).unwrap();
    for _ in 0..5000 {
        let k = arena.push(Node::Constant(0x1234_5678)).unwrap();
        root = arena.push(Node::Binary(BinOp::Add, root, k)).unwrap();
    }
    let (value, errors) = compile(&arena, &syms, 0, root);
    assert_eq!(
        errors,
        vec!["overflow in polish expression conversion".to_string()]
    );
    assert!(!value.is_abs());
    assert!(value.polish.is_empty());
}
