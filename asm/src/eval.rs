use crate::symbol::{Segment, SymbolTable};
use cp1600::polish::{hex_digit, Pol};

/// Operand stack depth shared by both evaluators.
pub const STACK_DEPTH: usize = 4096;

// ----------------------------------------------------------------------------
// Operators

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    High,
    Low,
    Classify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Shru,
    Rotl16,
    Rotl32,
    And,
    Or,
    Xor,
    Gt,
    Ge,
    Lt,
    Le,
    Ne,
    Eq,
}

impl UnOp {
    pub fn pol(self) -> Option<Pol> {
        match self {
            UnOp::Neg => Some(Pol::Neg),
            UnOp::Not => Some(Pol::Not),
            UnOp::High => Some(Pol::High),
            UnOp::Low => Some(Pol::Low),
            UnOp::Classify => None,
        }
    }

    pub fn apply(self, v: i32) -> i32 {
        match self {
            UnOp::Neg => v.wrapping_neg(),
            UnOp::Not => !v,
            UnOp::High => (v >> 8) & 0xFF,
            UnOp::Low => v & 0xFF,
            UnOp::Classify => v,
        }
    }

    fn from_pol(p: Pol) -> Option<UnOp> {
        match p {
            Pol::Neg => Some(UnOp::Neg),
            Pol::Not => Some(UnOp::Not),
            Pol::High => Some(UnOp::High),
            Pol::Low => Some(UnOp::Low),
            _ => None,
        }
    }
}

impl BinOp {
    pub fn pol(self) -> Pol {
        use BinOp::*;
        match self {
            Add => Pol::Add,
            Sub => Pol::Sub,
            Mul => Pol::Mul,
            Div => Pol::Div,
            Mod => Pol::Mod,
            Shl => Pol::Shl,
            Shr => Pol::Shr,
            Shru => Pol::Shru,
            Rotl16 => Pol::Rotl16,
            Rotl32 => Pol::Rotl32,
            And => Pol::And,
            Or => Pol::Or,
            Xor => Pol::Xor,
            Gt => Pol::Gt,
            Ge => Pol::Ge,
            Lt => Pol::Lt,
            Le => Pol::Le,
            Ne => Pol::Ne,
            Eq => Pol::Eq,
        }
    }

    fn from_pol(p: Pol) -> Option<BinOp> {
        use BinOp::*;
        [
            Add, Sub, Mul, Div, Mod, Shl, Shr, Shru, Rotl16, Rotl32, And, Or, Xor, Gt, Ge, Lt, Le,
            Ne, Eq,
        ]
        .into_iter()
        .find(|op| op.pol() == p)
    }

    /// `left op right`. On error the result is 0.
    pub fn apply(self, left: i32, right: i32) -> Result<i32, &'static str> {
        use BinOp::*;
        let flag = |b: bool| b as i32;
        Ok(match self {
            Add => left.wrapping_add(right),
            Sub => left.wrapping_sub(right),
            Mul => left.wrapping_mul(right),
            Div | Mod if right == 0 => return Err("division by zero attempted"),
            Div => left.wrapping_div(right),
            Mod => left.wrapping_rem(right),
            Shl if right < 0 => return Err("shift left by negative amount attempted"),
            Shr | Shru if right < 0 => return Err("shift right by negative amount attempted"),
            Shl => shl(left, right),
            Shr => shr(left, right),
            Shru => shru(left, right),
            Rotl16 => rotl16(left, right),
            Rotl32 => rotl32(left, right),
            And => left & right,
            Or => left | right,
            Xor => left ^ right,
            Gt => flag(left > right),
            Ge => flag(left >= right),
            Lt => flag(left < right),
            Le => flag(left <= right),
            Ne => flag(left != right),
            Eq => flag(left == right),
        })
    }
}

fn shl(v: i32, amt: i32) -> i32 {
    if amt >= 32 {
        0
    } else {
        ((v as u32) << amt) as i32
    }
}

fn shr(v: i32, amt: i32) -> i32 {
    if amt >= 32 {
        if v < 0 {
            -1
        } else {
            0
        }
    } else {
        v >> amt
    }
}

fn shru(v: i32, amt: i32) -> i32 {
    if amt >= 32 {
        0
    } else {
        ((v as u32) >> amt) as i32
    }
}

/// Rotate the low 16 bits left. Only the low 4 bits of `amt` count, so a
/// negated amount rotates right.
pub fn rotl16(v: i32, amt: i32) -> i32 {
    let v = v as u32 & 0xFFFF;
    let amt = (amt & 15) as u32;
    (((v << amt) | (v >> (16 - amt))) & 0xFFFF) as i32
}

pub fn rotl32(v: i32, amt: i32) -> i32 {
    let v = v as u32 as u64;
    let amt = (amt & 31) as u64;
    (((v << amt) | (v >> (32 - amt))) & 0xFFFF_FFFF) as u32 as i32
}

// ----------------------------------------------------------------------------
// Output pass evaluator

const MAX_WIDTH: i32 = 24;

fn width_mask(w: i32) -> i32 {
    (1 << w) - 1
}

const FIELD_WIDTH: &str = "expression exceeds available field width";

fn error(out: &mut Evaluation, msg: &str) {
    out.issues.push(Issue::Error(msg.to_string()));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Error(String),
    Warning(String),
    /// Reference to a symbol number that never got a value.
    Undefined(usize),
}

#[derive(Debug, Default)]
pub struct Evaluation {
    pub words: Vec<u16>,
    pub value: i32,
    pub issues: Vec<Issue>,
}

/// Run a polish string against the finished symbol table. `genloc` is the
/// address of the first word the string emits.
pub fn evaluate(polish: &str, genloc: i32, syms: &SymbolTable) -> Evaluation {
    let mut out = Evaluation::default();
    let mut stack: Vec<i32> = Vec::with_capacity(64);
    let mut etop: i32 = 0;

    for c in polish.chars() {
        if let Some(d) = hex_digit(c) {
            etop = shl(etop, 4).wrapping_add(d as i32);
            continue;
        }
        let Some(p) = Pol::from_char(c) else {
            continue;
        };

        if let Some(op) = BinOp::from_pol(p) {
            let left = stack.pop().unwrap_or(0);
            etop = op.apply(left, etop).unwrap_or_else(|msg| {
                error(&mut out, msg);
                0
            });
            continue;
        }
        if let Some(op) = UnOp::from_pol(p) {
            etop = op.apply(etop);
            continue;
        }

        match p {
            Pol::Symbol => {
                let symnum = etop as usize;
                match syms.by_number(symnum) {
                    Some(sym) if sym.seg.is_defined() => {
                        if sym.seg == Segment::Set {
                            out.issues
                                .push(Issue::Warning("forward reference to SET symbol".into()));
                        }
                        etop = sym.value;
                    }
                    _ => {
                        out.issues.push(Issue::Undefined(symnum));
                        etop = 0;
                    }
                }
            }
            Pol::CurrLoc => etop = genloc + out.words.len() as i32,
            Pol::ProgCtr => etop = genloc,
            Pol::Dup | Pol::Load => {
                if stack.len() >= STACK_DEPTH - 1 {
                    error(&mut out, "expression stack overflow");
                } else {
                    stack.push(etop);
                }
                if p == Pol::Load {
                    etop = 0;
                }
            }
            Pol::Clr => etop = 0,
            Pol::ClrAll => {
                etop = 0;
                stack.clear();
            }
            Pol::Pop => etop = stack.pop().unwrap_or(0),
            Pol::TestErr => {
                if etop != 0 {
                    error(&mut out, "expression fails validity test");
                }
            }
            Pol::SWidth | Pol::Width | Pol::IWidth => {
                if etop <= 0 || etop > MAX_WIDTH {
                    error(&mut out, "unimplemented width");
                    continue;
                }
                let w = etop;
                let v = stack.pop().unwrap_or(0);
                let fits = match p {
                    Pol::SWidth => v >= -(width_mask(w - 1) + 1) && v <= width_mask(w - 1),
                    Pol::Width => v >= -(width_mask(w - 1) + 1) && v <= width_mask(w),
                    _ => {
                        let sign = v as u32 & 0xFFFF_8000;
                        (w == 16 && (sign == 0xFFFF_8000 || sign == 0))
                            || (v >= 0 && v <= width_mask(w))
                    }
                };
                if !fits {
                    error(&mut out, FIELD_WIDTH);
                }
                etop = v & width_mask(w);
            }
            Pol::Emu8 | Pol::Ems7 | Pol::Em16 | Pol::Embr16 => {
                let word = match p {
                    Pol::Emu8 if (-128..=255).contains(&etop) => Some(etop & 0xFF),
                    Pol::Ems7 if (-128..=127).contains(&etop) => {
                        Some((etop & 0x7F) | (if etop & 0x80 != 0 { -0x80 } else { 0 }))
                    }
                    Pol::Em16 if (-32768..=65535).contains(&etop) => Some(etop),
                    Pol::Embr16 if (-32768..=65535).contains(&etop) => {
                        Some((0x00FF & (etop >> 8)) | (0xFF00 & (etop << 8)))
                    }
                    _ => None,
                };
                match word {
                    Some(w) => out.words.push(w as u16),
                    None => {
                        out.words.push(0);
                        error(&mut out, FIELD_WIDTH);
                    }
                }
                etop = 0;
            }
            _ => {}
        }
    }

    out.value = etop;
    out
}
