use crate::expr::Evaluated;
use cp1600::polish::{hex_digit, push_hex, Pol};
use cp1600::table::{IG_CPCON, IG_CPEXPR, IG_END, IG_ERROR, IG_START};

/// Scratch operand slots a grammar action fills before expanding a template.
pub type Slots = [Evaluated; 5];

pub fn empty_slots() -> Slots {
    Default::default()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Polish text for a data record, if the template produced any.
    pub polish: Option<String>,
    /// Words the instruction occupies.
    pub words: i32,
    pub errors: Vec<String>,
}

/// Merge operand slots into a generator template.
pub fn expand(template: &str, slots: &Slots) -> Expansion {
    let mut out = Expansion::default();
    let mut buf = String::new();
    let mut inside = false;
    let mut innum: usize = 0;

    let mut chars = template.char_indices();
    while let Some((pos, c)) = chars.next() {
        if !inside {
            match c {
                IG_START => {
                    inside = true;
                    innum = 0;
                }
                c if Pol::from_char(c) == Some(Pol::Em16) => {
                    out.words += 1;
                    buf.push(c);
                }
                c => buf.push(c),
            }
            continue;
        }

        match c {
            IG_END => inside = false,
            IG_CPCON => {
                let v = slots.get(innum).map(|e| e.value).unwrap_or(0);
                push_hex(&mut buf, v as u32);
                innum = 0;
            }
            IG_CPEXPR => {
                if let Some(e) = slots.get(innum) {
                    buf.push_str(&e.polish);
                }
                innum = 0;
            }
            IG_ERROR => {
                out.errors.push(template[pos + 1..].to_string());
                out.words = 0;
                return out;
            }
            c => match hex_digit(c) {
                Some(d) => innum = (innum << 4) + d as usize,
                None => out
                    .errors
                    .push("invalid char in instruction generation".to_string()),
            },
        }
    }

    if buf.len() > 2 {
        out.polish = Some(buf);
    }
    out
}
