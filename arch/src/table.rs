use crate::op::{criteria::*, syntax::*, OpKind};
use bimap::BiMap;
use once_cell::sync::Lazy;

// ----------------------------------------------------------------------------
// Generator templates
//
// A template is polish text with bracketed escapes:
//   [n#]  value of operand slot n, as hex
//   [n=]  polish string of operand slot n
//   [X..  error message, rest of the template
// Each `x` outside brackets emits one word.

pub const IG_START: char = '[';
pub const IG_END: char = ']';
pub const IG_CPCON: char = '#';
pub const IG_CPEXPR: char = '=';
pub const IG_ERROR: char = 'X';

pub const INVALID_SYNTAX: &str = "[Xinvalid syntax for instruction";
pub const INVALID_OPERANDS: &str = "[Xinvalid operands";

/// Data directives: one ROM-width constant, and one 16-bit value split in
/// two little-endian bytes.
pub const GEN_BDEF: &str = "[1=].[2#]I$[1=]x";
pub const GEN_WDEF: &str = "[1=].10I$[1=].FF&x[1=].8}.FF&x";

/// Arg 2 must be R1 .. R6.
macro_rules! mvo_ok {
    () => {
        "[2#].0=.[2#].7=+T$"
    };
}

/// Shift amount must be 0 or 1.
macro_rules! sh_ok {
    ($n:literal) => {
        concat!($n, ".1>T$", $n, ".<0T$")
    };
}

/// Constant must fit the field width.
macro_rules! cst_ok {
    ($w:literal, $c:literal) => {
        concat!($c, ".", $w, "I$")
    };
}

/// Double byte data.
macro_rules! dbd {
    ($x:literal) => {
        concat!($x, ".FF&x", $x, ".8}.FF&x")
    };
}

/// Register/register. Also used for direct and immediate forms.
macro_rules! rr {
    ($o:literal, $x:literal, $y:literal) => {
        concat!($o, ".", $x, ".3{|.", $y, "|x")
    };
}

macro_rules! brdir {
    ($a:literal) => {
        concat!("P.2+.", $a, ">.")
    };
}

macro_rules! brofs {
    ($a:literal) => {
        concat!($a, ".P.2+-.", brdir!($a), "!_^")
    };
}

/// Relative branch: direction goes in bit 5 of the opcode word.
macro_rules! br {
    ($c:literal, $a:literal, $w:literal) => {
        concat!("0200.", $c, "|.", brdir!($a), "5{|x", brofs!($a), "~x", $w, "I$")
    };
}

/// Branch on external condition.
macro_rules! bx {
    ($c:literal, $a:literal, $w:literal) => {
        concat!(
            $c,
            ".4I$",
            "0210.",
            $c,
            "|.",
            brdir!($a),
            "5{|x",
            brofs!($a),
            "~x",
            $w,
            "I$"
        )
    };
}

/// Constant argument, checked against a width.
macro_rules! cst {
    ($c:literal, $m:literal) => {
        concat!(cst_ok!($m, $c), $c, "x")
    };
}

macro_rules! sh {
    ($o:literal, $n:literal, $r:literal) => {
        concat!(sh_ok!($n), "0040.", $o, ".3{|.", $n, ".1&.2{|.", $r, "|x")
    };
}

/// Single register.
macro_rules! sr {
    ($o:literal, $r:literal) => {
        concat!("0000.", $o, ".3{|.", $r, "|x")
    };
}

/// Jump and JSR: three words.
macro_rules! jsr {
    ($r:literal, $e:literal, $a:literal) => {
        concat!(
            "0004x", $r, ".3&.8{.", $a, ".8}.FC&|.", $e, "|x", $a, ".3FF&x"
        )
    };
}

// ----------------------------------------------------------------------------
// Tables

#[derive(Debug, Clone, Copy)]
pub struct OpSym {
    pub name: &'static str,
    pub kind: OpKind,
    /// Number of syntax groups, starting at `subsyn`.
    pub numsyn: usize,
    pub subsyn: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct OpSynt {
    pub syntax: u16,
    /// Number of generators, starting at `gentabsub`.
    pub elcnt: usize,
    pub gentabsub: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IgEl {
    pub selmask: u16,
    pub criteria: u16,
    pub genstr: &'static str,
}

const fn sym(name: &'static str, kind: OpKind, numsyn: usize, subsyn: usize) -> OpSym {
    OpSym {
        name,
        kind,
        numsyn,
        subsyn,
    }
}

const fn dir(name: &'static str, kind: OpKind) -> OpSym {
    sym(name, kind, 0, 0)
}

const fn os(syntax: u16, elcnt: usize, gentabsub: usize) -> OpSynt {
    OpSynt {
        syntax,
        elcnt,
        gentabsub,
    }
}

const fn ig(selmask: u16, criteria: u16, genstr: &'static str) -> IgEl {
    IgEl {
        selmask,
        criteria,
        genstr,
    }
}

use OpKind::*;

pub static OPTAB: &[OpSym] = &[
    sym("invalid", Opcode, 2, 0),
    sym("MVO", Opcode, 1, 2),
    sym("MVI", Opcode, 1, 3),
    sym("ADD", Opcode, 1, 4),
    sym("SUB", Opcode, 1, 5),
    sym("CMP", Opcode, 1, 6),
    sym("AND", Opcode, 1, 7),
    sym("XOR", Opcode, 1, 8),
    sym("MVO@", Opcode, 1, 9),
    sym("MVI@", OpcodeInd, 1, 10),
    sym("ADD@", OpcodeInd, 1, 11),
    sym("SUB@", OpcodeInd, 1, 12),
    sym("CMP@", OpcodeInd, 1, 13),
    sym("AND@", OpcodeInd, 1, 14),
    sym("XOR@", OpcodeInd, 1, 15),
    sym("MVOI", Opcode, 1, 16),
    sym("MVII", Opcode, 1, 17),
    sym("ADDI", Opcode, 1, 18),
    sym("SUBI", Opcode, 1, 19),
    sym("CMPI", Opcode, 1, 20),
    sym("ANDI", Opcode, 1, 21),
    sym("XORI", Opcode, 1, 22),
    sym("MOVR", Opcode, 1, 24),
    sym("ADDR", Opcode, 1, 25),
    sym("SUBR", Opcode, 1, 26),
    sym("CMPR", Opcode, 1, 27),
    sym("ANDR", Opcode, 1, 28),
    sym("XORR", Opcode, 1, 29),
    sym("B", RelBranch, 1, 30),
    sym("BC", RelBranch, 1, 31),
    sym("BOV", RelBranch, 1, 32),
    sym("BPL", RelBranch, 1, 33),
    sym("BZE", RelBranch, 1, 34),
    sym("BEQ", RelBranch, 1, 34),
    sym("BLT", RelBranch, 1, 35),
    sym("BNGE", RelBranch, 1, 35),
    sym("BLE", RelBranch, 1, 36),
    sym("BNGT", RelBranch, 1, 36),
    sym("BUSC", RelBranch, 1, 37),
    sym("NOPP", Opcode, 2, 92),
    sym("BNC", RelBranch, 1, 39),
    sym("BNOV", RelBranch, 1, 40),
    sym("BMI", RelBranch, 1, 41),
    sym("BNZE", RelBranch, 1, 42),
    sym("BNZ", RelBranch, 1, 42),
    sym("BNEQ", RelBranch, 1, 42),
    sym("BNE", RelBranch, 1, 42),
    sym("BGE", RelBranch, 1, 43),
    sym("BNLT", RelBranch, 1, 43),
    sym("BGT", RelBranch, 1, 44),
    sym("BNLE", RelBranch, 1, 44),
    sym("BESC", RelBranch, 1, 45),
    sym("BEXT", RelBranchExt, 1, 96),
    sym("SWAP", Opcode, 2, 46),
    sym("SLL", Opcode, 2, 48),
    sym("RLC", Opcode, 2, 50),
    sym("SLLC", Opcode, 2, 52),
    sym("SLR", Opcode, 2, 54),
    sym("SAR", Opcode, 2, 56),
    sym("RRC", Opcode, 2, 58),
    sym("SARC", Opcode, 2, 60),
    sym("NOP", Opcode, 1, 62),
    sym("NOP2", Opcode, 1, 94),
    sym("SIN", Opcode, 1, 63),
    sym("SIN2", Opcode, 1, 95),
    sym("J", Opcode, 1, 64),
    sym("JE", Opcode, 1, 65),
    sym("JD", Opcode, 1, 66),
    sym("JSR", Opcode, 1, 67),
    sym("JSRE", Opcode, 1, 68),
    sym("JSRD", Opcode, 1, 69),
    sym("INCR", Opcode, 1, 70),
    sym("DECR", Opcode, 1, 71),
    sym("COMR", Opcode, 1, 72),
    sym("NEGR", Opcode, 1, 73),
    sym("ADCR", Opcode, 1, 74),
    sym("GSWD", Opcode, 1, 75),
    sym("RSWD", Opcode, 1, 76),
    sym("HLT", Opcode, 1, 77),
    sym("SDBD", Sdbd, 1, 78),
    sym("EIS", Opcode, 1, 79),
    sym("DIS", Opcode, 1, 80),
    sym("TCI", Opcode, 1, 81),
    sym("CLRC", Opcode, 1, 82),
    sym("SETC", Opcode, 1, 83),
    // Aliases
    sym("TSTR", Opcode, 1, 84),
    sym("CLRR", Opcode, 1, 85),
    sym("PSHR", Opcode, 1, 86),
    sym("PULR", Opcode, 1, 87),
    sym("JR", Opcode, 1, 88),
    sym("CALL", Opcode, 1, 89),
    sym("BEGIN", Opcode, 1, 90),
    sym("RETURN", Opcode, 1, 91),
    // Directives
    dir("DECLE", Decle),
    dir("DCW", Decle),
    dir("DATA", Decle),
    dir("BIDECLE", Bidecle),
    dir("DW", Bidecle),
    dir("FDB", Bidecle),
    dir("WORD", Bidecle),
    dir("BYTE", Byte),
    dir("DB", Byte),
    dir("FCB", Byte),
    dir("STRING", Str),
    dir("FCC", Str),
    dir("ROMWIDTH", Romw),
    dir("ROMW", Romw),
    dir("PROC", Proc),
    dir("ENDP", Endp),
    dir("ELSE", Else),
    dir("END", End),
    dir("ENDI", Endi),
    dir("EQU", Equ),
    dir("IF", If),
    dir("INCL", Include),
    dir("INCLUDE", Include),
    dir("ORG", Org),
    dir("RES", Res),
    dir("RESERVE", Res),
    dir("RMB", Res),
    dir("SET", Set),
    dir("STRUCT", Struct),
    dir("ENDS", Ends),
    dir("MEMATTR", MemAttr),
    dir("RPT", Rpt),
    dir("REPEAT", Rpt),
    dir("ENDR", Endr),
    dir("ERR", UserErr),
    dir("LISTING", Listing),
    dir("QEQU", Qequ),
    dir("QSET", Qset),
    dir("MACRO", MacroErr),
    dir("ENDM", MacroErr),
    dir("BRKIF", BrkIf),
    dir("CMSG", Cmsg),
    dir("SMSG", Smsg),
    dir("WMSG", Wmsg),
    dir("CFGVAR", CfgVar),
    dir("SRCFILE", SrcFile),
    dir("LISTCOL", ListCol),
    dir("ERR_IF_OVERWRITTEN", ErrIfOverwritten),
    dir("FORCE_OVERWRITE", ForceOverwrite),
];

pub static OSTAB: &[OpSynt] = &[
    os(0, 1, 0), // invalid
    os(0xFFFF, 1, 1),
    // Direct
    os(REGEXP, 1, 2), // MVO
    os(EXPREG, 1, 3), // MVI
    os(EXPREG, 1, 4), // ADD
    os(EXPREG, 1, 5), // SUB
    os(EXPREG, 1, 6), // CMP
    os(EXPREG, 1, 7), // AND
    os(EXPREG, 1, 8), // XOR
    // Indirect
    os(REGREG, 1, 9),  // MVO@
    os(REGREG, 1, 10), // MVI@
    os(REGREG, 1, 11), // ADD@
    os(REGREG, 1, 12), // SUB@
    os(REGREG, 1, 13), // CMP@
    os(REGREG, 1, 14), // AND@
    os(REGREG, 1, 15), // XOR@
    // Immediate
    os(REGCEX, 1, 16), // MVOI
    os(CEXREG, 2, 17), // MVII
    os(CEXREG, 2, 19), // ADDI
    os(CEXREG, 2, 21), // SUBI
    os(CEXREG, 2, 23), // CMPI
    os(CEXREG, 2, 25), // ANDI
    os(CEXREG, 2, 27), // XORI
    os(0, 1, 0),       // unused
    // Register
    os(REGREG, 1, 29), // MOVR
    os(REGREG, 1, 30), // ADDR
    os(REGREG, 1, 31), // SUBR
    os(REGREG, 1, 32), // CMPR
    os(REGREG, 1, 33), // ANDR
    os(REGREG, 1, 34), // XORR
    // Branch
    os(EXP, 1, 35), // B
    os(EXP, 1, 36), // BC
    os(EXP, 1, 37), // BOV
    os(EXP, 1, 38), // BPL
    os(EXP, 1, 39), // BEQ
    os(EXP, 1, 40), // BLT
    os(EXP, 1, 41), // BLE
    os(EXP, 1, 42), // BUSC
    os(0, 1, 0),    // unused
    os(EXP, 1, 44), // BNC
    os(EXP, 1, 45), // BNOV
    os(EXP, 1, 46), // BMI
    os(EXP, 1, 47), // BNEQ
    os(EXP, 1, 48), // BGE
    os(EXP, 1, 49), // BGT
    os(EXP, 1, 50), // BESC
    // Shift, with implied or explicit amount
    os(REG, 1, 51),    // SWAP
    os(REGEXP, 1, 52), // SWAP
    os(REG, 1, 53),    // SLL
    os(REGEXP, 1, 54), // SLL
    os(REG, 1, 55),    // RLC
    os(REGEXP, 1, 56), // RLC
    os(REG, 1, 57),    // SLLC
    os(REGEXP, 1, 58), // SLLC
    os(REG, 1, 59),    // SLR
    os(REGEXP, 1, 60), // SLR
    os(REG, 1, 61),    // SAR
    os(REGEXP, 1, 62), // SAR
    os(REG, 1, 63),    // RRC
    os(REGEXP, 1, 64), // RRC
    os(REG, 1, 65),    // SARC
    os(REGEXP, 1, 66), // SARC
    os(IMP, 1, 67),    // NOP
    os(IMP, 1, 68),    // SIN
    // Jump
    os(EXP, 1, 69),    // J
    os(EXP, 1, 70),    // JE
    os(EXP, 1, 71),    // JD
    os(REGEXP, 1, 72), // JSR
    os(REGEXP, 1, 73), // JSRE
    os(REGEXP, 1, 74), // JSRD
    // Single register
    os(REG, 1, 75), // INCR
    os(REG, 1, 76), // DECR
    os(REG, 1, 77), // COMR
    os(REG, 1, 78), // NEGR
    os(REG, 1, 79), // ADCR
    os(REG, 1, 80), // GSWD
    os(REG, 1, 81), // RSWD
    // Implied
    os(IMP, 1, 82), // HLT
    os(IMP, 1, 83), // SDBD
    os(IMP, 1, 84), // EIS
    os(IMP, 1, 85), // DIS
    os(IMP, 1, 86), // TCI
    os(IMP, 1, 87), // CLRC
    os(IMP, 1, 88), // SETC
    // Aliases
    os(REG, 1, 89), // TSTR
    os(REG, 1, 90), // CLRR
    os(REG, 1, 91), // PSHR
    os(REG, 1, 92), // PULR
    os(REG, 1, 93), // JR
    os(EXP, 1, 94), // CALL
    os(IMP, 1, 95), // BEGIN
    os(IMP, 1, 96), // RETURN
    os(EXP, 1, 43), // NOPP
    os(IMP, 1, 97), // NOPP
    os(IMP, 1, 98), // NOP2
    os(IMP, 1, 99), // SIN2
    os(EXPEXP, 1, 100), // BEXT
];

pub static IGTAB: &[IgEl] = &[
    ig(SDBD, 0, "[Xnullentry"),
    ig(SDBD, 0, "[Xinvalid opcode"),
    // Direct
    ig(SDBD, 0, concat!(rr!("0240", "0", "[1#]"), cst!("[2=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("0280", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("02C0", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("0300", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("0340", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("0380", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("03C0", "0", "[2#]"), cst!("[1=]", "[3#]"))),
    // Indirect
    ig(SDBD, 0, concat!(mvo_ok!(), rr!("0240", "[2#]", "[1#]"))),
    ig(IND_RG, IND_RG, rr!("0280", "[1#]", "[2#]")),
    ig(IND_RG, IND_RG, rr!("02C0", "[1#]", "[2#]")),
    ig(IND_RG, IND_RG, rr!("0300", "[1#]", "[2#]")),
    ig(IND_RG, IND_RG, rr!("0340", "[1#]", "[2#]")),
    ig(IND_RG, IND_RG, rr!("0380", "[1#]", "[2#]")),
    ig(IND_RG, IND_RG, rr!("03C0", "[1#]", "[2#]")),
    // Immediate, plain and double byte
    ig(SDBD, 0, concat!(rr!("0240", "7", "[1#]"), cst!("[2=]", "[3#]"))),
    ig(SDBD, 0, concat!(rr!("0280", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("0280", "7", "[2#]"), dbd!("[1=]"))),
    ig(SDBD, 0, concat!(rr!("02C0", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("02C0", "7", "[2#]"), dbd!("[1=]"))),
    ig(SDBD, 0, concat!(rr!("0300", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("0300", "7", "[2#]"), dbd!("[1=]"))),
    ig(SDBD, 0, concat!(rr!("0340", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("0340", "7", "[2#]"), dbd!("[1=]"))),
    ig(SDBD, 0, concat!(rr!("0380", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("0380", "7", "[2#]"), dbd!("[1=]"))),
    ig(SDBD, 0, concat!(rr!("03C0", "7", "[2#]"), cst!("[1=]", "[3#]"))),
    ig(SDBD, SDBD, concat!(rr!("03C0", "7", "[2#]"), dbd!("[1=]"))),
    // Register
    ig(SDBD, 0, rr!("0080", "[1#]", "[2#]")),
    ig(SDBD, 0, rr!("00C0", "[1#]", "[2#]")),
    ig(SDBD, 0, rr!("0100", "[1#]", "[2#]")),
    ig(SDBD, 0, rr!("0140", "[1#]", "[2#]")),
    ig(SDBD, 0, rr!("0180", "[1#]", "[2#]")),
    ig(SDBD, 0, rr!("01C0", "[1#]", "[2#]")),
    // Branch
    ig(SDBD, 0, br!("0", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("1", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("2", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("3", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("4", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("5", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("6", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("7", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("8", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("9", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("A", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("B", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("C", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("D", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("E", "[1=]", "[3#]")),
    ig(SDBD, 0, br!("F", "[1=]", "[3#]")),
    // Shift
    ig(SDBD | SHF_RG, SHF_RG, sh!("0", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("0", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("1", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("1", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("2", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("2", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("3", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("3", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("4", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("4", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("5", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("5", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("6", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("6", "[2=].1-", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("7", "0", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sh!("7", "[2=].1-", "[1#]")),
    ig(SDBD, 0, "0034x"),
    ig(SDBD, 0, "0036x"),
    // Jump
    ig(SDBD, 0, jsr!("3", "0", "[1=]")),
    ig(SDBD, 0, jsr!("3", "1", "[1=]")),
    ig(SDBD, 0, jsr!("3", "2", "[1=]")),
    ig(SDBD | JSR_RG, JSR_RG, jsr!("[1#]", "0", "[2=]")),
    ig(SDBD | JSR_RG, JSR_RG, jsr!("[1#]", "1", "[2=]")),
    ig(SDBD | JSR_RG, JSR_RG, jsr!("[1#]", "2", "[2=]")),
    // Single register
    ig(SDBD, 0, sr!("1", "[1#]")),
    ig(SDBD, 0, sr!("2", "[1#]")),
    ig(SDBD, 0, sr!("3", "[1#]")),
    ig(SDBD, 0, sr!("4", "[1#]")),
    ig(SDBD, 0, sr!("5", "[1#]")),
    ig(SDBD | SHF_RG, SHF_RG, sr!("6", "[1#]")),
    ig(SDBD, 0, sr!("7", "[1#]")),
    // Implied
    ig(SDBD, 0, "0000x"),
    ig(SDBD, 0, "0001x"),
    ig(SDBD, 0, "0002x"),
    ig(SDBD, 0, "0003x"),
    ig(SDBD, 0, "0005x"),
    ig(SDBD, 0, "0006x"),
    ig(SDBD, 0, "0007x"),
    // Aliases
    ig(SDBD, 0, rr!("0080", "[1#]", "[1#]")),
    ig(SDBD, 0, rr!("01C0", "[1#]", "[1#]")),
    ig(SDBD, 0, rr!("0240", "6", "[1#]")),
    ig(0, 0, rr!("0280", "6", "[1#]")),
    ig(SDBD, 0, rr!("0080", "[1#]", "7")),
    ig(SDBD, 0, jsr!("5", "0", "[1=]")),
    ig(SDBD, 0, rr!("0240", "6", "5")),
    ig(SDBD, 0, rr!("0280", "6", "7")),
    ig(SDBD, 0, "0208x0000x"),
    ig(SDBD, 0, "0035x"),
    ig(SDBD, 0, "0037x"),
    ig(SDBD, 0, bx!("[4#]", "[1=]", "[3#]")),
];

// ----------------------------------------------------------------------------
// Lookup

static OPINDEX: Lazy<BiMap<&'static str, usize>> = Lazy::new(|| {
    OPTAB
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, op)| (op.name, i))
        .collect()
});

/// Index of an upper-cased mnemonic in `OPTAB`.
pub fn find_opcode(name: &str) -> Option<usize> {
    OPINDEX.get_by_left(name).copied()
}

pub fn opcode_name(op: usize) -> &'static str {
    OPINDEX.get_by_right(&op).copied().unwrap_or("invalid")
}

pub fn opsym(op: usize) -> &'static OpSym {
    OPTAB.get(op).unwrap_or(&OPTAB[0])
}

/// Find the generator template for an opcode used with the given operand
/// shape and criteria. The first syntax group sharing a bit with `syntax`
/// is chosen, then the first generator whose masked criteria match.
pub fn find_generator(op: usize, syntax: u16, crit: u16) -> &'static str {
    let sym = opsym(op);
    let Some(group) = OSTAB
        .iter()
        .skip(sym.subsyn)
        .take(sym.numsyn)
        .find(|g| g.syntax & syntax != 0)
    else {
        return INVALID_SYNTAX;
    };
    if group.gentabsub == 0 {
        return INVALID_SYNTAX;
    }

    IGTAB
        .iter()
        .skip(group.gentabsub)
        .take(group.elcnt)
        .find(|g| g.selmask & crit == g.criteria)
        .map(|g| g.genstr)
        .unwrap_or(INVALID_OPERANDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shape() {
        assert_eq!(OSTAB.len(), 97);
        assert_eq!(IGTAB.len(), 101);
        for op in OPTAB.iter().filter(|op| op.numsyn > 0) {
            assert!(op.subsyn + op.numsyn <= OSTAB.len(), "{}", op.name);
        }
        for g in OSTAB {
            assert!(g.gentabsub + g.elcnt <= IGTAB.len());
        }
    }

    #[test]
    fn lookup() {
        let mvii = find_opcode("MVII").unwrap();
        assert_eq!(opcode_name(mvii), "MVII");
        assert_eq!(find_opcode("mvii"), None);
        assert_eq!(find_opcode("LABEL"), None);

        let plain = find_generator(mvii, CEXREG, IND_RG);
        let dbd = find_generator(mvii, CEXREG, IND_RG | SDBD);
        println!("{}\n{}", plain, dbd);
        assert_eq!(plain, "0280.7.3{|.[2#]|x[1=].[3#]I$[1=]x");
        assert_eq!(dbd, "0280.7.3{|.[2#]|x[1=].FF&x[1=].8}.FF&x");

        assert_eq!(find_generator(mvii, REGREG, 0), INVALID_SYNTAX);
        let sll = find_opcode("SLL").unwrap();
        assert_eq!(find_generator(sll, REG, JSR_RG | IND_RG), INVALID_OPERANDS);
    }

    #[test]
    fn branch_template() {
        let b = find_opcode("B").unwrap();
        assert_eq!(
            find_generator(b, EXP, 0),
            "0200.0|.P.2+.[1=]>.5{|x[1=].P.2+-.P.2+.[1=]>.!_^~x[3#]I$"
        );
    }
}
