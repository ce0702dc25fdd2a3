use as1600::encoder::{empty_slots, expand, Slots};
use as1600::eval::evaluate;
use as1600::expr::Evaluated;
use as1600::symbol::SymbolTable;
use cp1600::op::{criteria, syntax};
use cp1600::reg::Reg;
use cp1600::table::{find_generator, find_opcode, GEN_WDEF};

/// Look up a generator, fill it and run it at `addr`.
fn encode(name: &str, shape: u16, crit: u16, slots: &Slots, addr: i32) -> (Vec<u16>, usize) {
    let op = find_opcode(name).unwrap();
    let template = find_generator(op, shape, crit);
    let out = expand(template, slots);
    println!("{:<6} {:<40} {:?}", name, template, out.polish);
    assert!(out.errors.is_empty(), "{:?}", out.errors);

    let polish = out.polish.unwrap_or_default();
    let result = evaluate(&polish, addr, &SymbolTable::new());
    assert_eq!(result.words.len() as i32, out.words);
    (result.words, result.issues.len())
}

fn regs(r1: i32, r2: i32) -> Slots {
    let mut slots = empty_slots();
    slots[1] = Evaluated::abs(r1);
    slots[2] = Evaluated::abs(r2);
    slots
}

fn crit(r: i32) -> u16 {
    Reg::from(r as u8).criteria()
}

#[test]
fn aliases() {
    let tstr = encode("TSTR", syntax::REG, crit(3), &regs(3, 0), 0);
    let movr = encode("MOVR", syntax::REGREG, crit(3), &regs(3, 3), 0);
    assert_eq!(tstr, (vec![0x009B], 0));
    assert_eq!(tstr, movr);

    let clrr = encode("CLRR", syntax::REG, crit(2), &regs(2, 0), 0);
    let xorr = encode("XORR", syntax::REGREG, crit(2), &regs(2, 2), 0);
    assert_eq!(clrr, xorr);

    let jr = encode("JR", syntax::REG, crit(5), &regs(5, 0), 0);
    let movr = encode("MOVR", syntax::REGREG, crit(5), &regs(5, 7), 0);
    assert_eq!(jr, movr);
}

#[test]
fn immediates() {
    let mut slots = regs(0, 0);
    slots[1] = Evaluated::abs(0x1234);
    slots[3] = Evaluated::abs(16);
    let plain = encode("MVII", syntax::CEXREG, crit(0), &slots, 0);
    assert_eq!(plain, (vec![0x02B8, 0x1234], 0));

    let dbd = encode("MVII", syntax::CEXREG, crit(0) | criteria::SDBD, &slots, 0);
    assert_eq!(dbd, (vec![0x02B8, 0x0034, 0x0012], 0));

    // A 10-bit ROM cannot hold the plain form.
    slots[3] = Evaluated::abs(10);
    let narrow = encode("MVII", syntax::CEXREG, crit(0), &slots, 0);
    assert_eq!(narrow.1, 1);
}

#[test]
fn register_classes() {
    let op = find_opcode("SLL").unwrap();
    for r in 0..8 {
        let template = find_generator(op, syntax::REG, crit(r));
        let ok = !template.starts_with("[X");
        println!("SLL R{} -> {}", r, template);
        assert_eq!(ok, r < 4);
    }

    let op = find_opcode("MVI@").unwrap();
    for r in 0..8 {
        let template = find_generator(op, syntax::REGREG, crit(r));
        assert_eq!(!template.starts_with("[X"), (1..=6).contains(&r));
    }

    let op = find_opcode("MVII").unwrap();
    assert_eq!(
        find_generator(op, syntax::REG, 0),
        "[Xinvalid syntax for instruction"
    );
    let out = expand(find_generator(op, syntax::REG, 0), &empty_slots());
    assert_eq!(out.errors, vec!["invalid syntax for instruction".to_string()]);
    assert_eq!(out.words, 0);
}

#[test]
fn branch_displacement() {
    let branch = |addr: i32, target: i32, romw: i32| {
        let mut slots = empty_slots();
        slots[1] = Evaluated::abs(target);
        slots[3] = Evaluated::abs(romw);
        encode("B", syntax::EXP, 0, &slots, addr)
    };

    for addr in [0x0000, 0x5000, 0xF000] {
        for target in (0..0x10000).step_by(0x123).chain([addr, addr + 1, addr + 2]) {
            let (words, errors) = branch(addr, target, 16);
            assert_eq!(errors, 0);
            let decoded = if words[0] & 0x20 != 0 {
                addr + 1 - words[1] as i32
            } else {
                addr + 2 + words[1] as i32
            };
            assert_eq!(decoded, target, "{:04X} -> {:04X}", addr, target);
        }
    }

    assert_eq!(branch(0x5000, 0x5002 + 0x3FF, 10), (vec![0x0200, 0x3FF], 0));
    assert_eq!(branch(0x5000, 0x5001 - 0x3FF, 10), (vec![0x0220, 0x3FF], 0));
    assert_eq!(branch(0x5000, 0x5002 + 0x400, 10).1, 1);
}

#[test]
fn bidecle() {
    let mut slots = empty_slots();
    slots[1] = Evaluated::abs(0xABCD);
    let out = expand(GEN_WDEF, &slots);
    assert_eq!(out.words, 2);
    let result = evaluate(&out.polish.unwrap(), 0, &SymbolTable::new());
    assert_eq!(result.words, vec![0x00CD, 0x00AB]);
}
