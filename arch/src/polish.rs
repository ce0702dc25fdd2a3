use bimap::BiMap;
use once_cell::sync::Lazy;
use strum::Display;

// ----------------------------------------------------------------------------
// Polish opcodes
//
// A polish string is a sequence of hex literals and single-char opcodes.
// The opcode alphabet never uses [0-9a-fA-F] so a literal can be accumulated
// digit by digit without separators.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Pol {
    // Stack
    Load,
    Dup,
    Pop,
    Clr,
    ClrAll,

    // Binary
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

    // Unary
    Neg,
    Not,
    High,
    Low,

    // Operands
    Symbol,
    ProgCtr,
    CurrLoc,

    // Checks
    TestErr,
    SWidth,
    Width,
    IWidth,

    // Emitters
    Emu8,
    Ems7,
    Em16,
    Embr16,
}

static POLISH: Lazy<BiMap<char, Pol>> = Lazy::new(|| {
    use Pol::*;
    let mut map = BiMap::new();
    for (c, p) in [
        ('.', Load),
        ('~', Dup),
        ('!', Pop),
        ('$', Clr),
        (';', ClrAll),
        ('+', Add),
        ('-', Sub),
        ('*', Mul),
        ('/', Div),
        ('%', Mod),
        ('{', Shl),
        ('}', Shr),
        ('u', Shru),
        ('r', Rotl16),
        ('R', Rotl32),
        ('&', And),
        ('|', Or),
        ('^', Xor),
        ('>', Gt),
        ('g', Ge),
        ('<', Lt),
        ('l', Le),
        ('?', Ne),
        ('=', Eq),
        ('_', Neg),
        ('N', Not),
        ('H', High),
        ('L', Low),
        ('S', Symbol),
        ('P', ProgCtr),
        ('Q', CurrLoc),
        ('T', TestErr),
        ('w', SWidth),
        ('W', Width),
        ('I', IWidth),
        ('m', Emu8),
        ('s', Ems7),
        ('x', Em16),
        ('y', Embr16),
    ] {
        map.insert(c, p);
    }
    map
});

impl Pol {
    pub fn ch(self) -> char {
        // Every variant is registered above.
        POLISH.get_by_right(&self).copied().unwrap_or(' ')
    }

    pub fn from_char(c: char) -> Option<Pol> {
        POLISH.get_by_left(&c).copied()
    }
}

pub fn hex_digit(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'a'..='f' => Some(c as u32 - 'a' as u32 + 10),
        'A'..='F' => Some(c as u32 - 'A' as u32 + 10),
        _ => None,
    }
}

/// Append `v` as lowercase hex without leading zeros.
pub fn push_hex(out: &mut String, v: u32) {
    if v > 15 {
        push_hex(out, v >> 4);
    }
    out.push(b"0123456789abcdef"[(v & 15) as usize] as char);
}

#[test]
fn test() {
    let mut s = String::new();
    push_hex(&mut s, 0x2b8);
    s.push(Pol::Load.ch());
    push_hex(&mut s, 0);
    s.push(Pol::Em16.ch());
    println!("{}", s);
    assert_eq!(s, "2b8.0x");

    for c in "0123456789abcdefABCDEF".chars() {
        assert_eq!(Pol::from_char(c), None, "{c} collides with a hex digit");
        assert!(hex_digit(c).is_some());
    }
    assert_eq!(Pol::from_char('I'), Some(Pol::IWidth));
    assert_eq!(Pol::Rotl32.ch(), 'R');
}
