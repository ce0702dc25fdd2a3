use crate::error::{Error, Result};

pub type SymbolId = usize;

const HASH_SIZE: usize = 1023;
const HASH_MUL: u32 = 13;

/// Marker between a symbol name and a packed array index.
const INDEX_MARK: u8 = 0x01;

pub mod flags {
    /// Left out of the symbol dump.
    pub const QUIET: u8 = 1;
    /// Element of a symbol array.
    pub const ARRAY: u8 = 2;
}

/// Values `CLASSIFY` reports.
pub mod class {
    pub const ABS: i32 = -1;
    pub const SET: i32 = -2;
    pub const EQU: i32 = -3;
    pub const STRING: i32 = -4;
    pub const FEATURE: i32 = -5;
    pub const RESV: i32 = -6;
    pub const EMPTY: i32 = -7;
    pub const UNUSED: i32 = -8;
    pub const UNKNOWN: i32 = -9;
    pub const UNDEF: i32 = -10000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Segment {
    #[default]
    Unused,
    Undefined,
    Reserved,
    Equ,
    Set,
    Absolute,
}

impl Segment {
    pub fn is_defined(self) -> bool {
        matches!(self, Segment::Equ | Segment::Set | Segment::Absolute)
    }

    pub fn class(self) -> i32 {
        match self {
            Segment::Absolute => class::ABS,
            Segment::Set => class::SET,
            Segment::Equ => class::EQU,
            Segment::Reserved => class::RESV,
            Segment::Undefined => class::UNDEF,
            Segment::Unused => class::UNUSED,
        }
    }
}

/// Reserved words that act as operators or functions in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    And,
    Or,
    Xor,
    Not,
    Mod,
    Shl,
    Shr,
    Shru,
    Rotl16,
    Rotl32,
    Rotr16,
    Rotr32,
    High,
    Low,
    Ne,
    Ge,
    Le,
    Defined,
    Classify,
    Strlen,
    Asc,
}

/// Syntactic role of a symbol, handed to the parser by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymTok {
    #[default]
    Label,
    Symbol,
    Reg,
    Feature,
    Keyword(Keyword),
}

#[derive(Debug, Clone, Default)]
pub struct Symbol {
    pub name: Vec<u8>,
    pub tok: SymTok,
    pub seg: Segment,
    pub flags: u8,
    pub value: i32,
    /// Assigned on first mention, starting at 1. Reserved symbols keep 0.
    pub symnum: usize,
    next: Option<SymbolId>,
}

impl Symbol {
    pub fn is_quiet(&self) -> bool {
        self.flags & flags::QUIET != 0
    }

    pub fn class(&self) -> i32 {
        match (self.seg, self.tok) {
            (Segment::Reserved, SymTok::Feature) => class::FEATURE,
            (seg, _) => seg.class(),
        }
    }

    /// Name with any packed array indices spelled out as `[i]`.
    pub fn display_name(&self) -> String {
        let mut parts = self.name.split(|&b| b == INDEX_MARK);
        let mut out = String::from_utf8_lossy(parts.next().unwrap_or(&[])).into_owned();
        for packed in parts {
            out.push_str(&format!("[{}]", unpack_index(packed)));
        }
        out
    }

    pub fn is_array_element(&self) -> bool {
        self.name.contains(&INDEX_MARK)
    }
}

fn pack_index(name: &mut Vec<u8>, idx: i32) {
    let idx = idx as u32;
    name.push(INDEX_MARK);
    name.push(0x80 | (idx & 0x7F) as u8);
    name.push(0x80 | ((idx >> 7) & 0x7F) as u8);
    name.push(0x80 | ((idx >> 14) & 0x7F) as u8);
    name.push(0x80 | ((idx >> 21) & 0x7F) as u8);
    name.push(0x80 | ((idx >> 28) & 0x0F) as u8);
}

fn unpack_index(packed: &[u8]) -> i32 {
    packed
        .iter()
        .take(5)
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (((b & 0x7F) as u32) << (7 * i)))
        as i32
}

// ----------------------------------------------------------------------------
// Symbol table

pub struct SymbolTable {
    syms: Vec<Symbol>,
    heads: Vec<Option<SymbolId>>,
    next_symnum: usize,
    index: Vec<Option<SymbolId>>,
    /// Name of the innermost PROC, used to expand `@@` local labels.
    scope: Option<String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            syms: Vec::new(),
            heads: vec![None; HASH_SIZE],
            next_symnum: 1,
            index: Vec::new(),
            scope: None,
        }
    }

    pub fn hash(name: &[u8]) -> usize {
        let mut rv: u32 = 0;
        let mut offset: u32 = 1;
        for &c in name {
            rv = rv.wrapping_add((c as u32).wrapping_sub(' ' as u32).wrapping_mul(offset));
            offset = offset.wrapping_mul(HASH_MUL);
        }
        rv as usize % HASH_SIZE
    }

    /// Find a name, or chain a fresh Unused entry onto its bucket.
    fn slot(&mut self, name: &[u8]) -> SymbolId {
        let hv = Self::hash(name);
        let mut cur = self.heads[hv];
        let mut last = None;
        while let Some(id) = cur {
            if self.syms[id].name == name {
                return id;
            }
            last = Some(id);
            cur = self.syms[id].next;
        }

        let id = self.syms.len();
        self.syms.push(Symbol {
            name: name.to_vec(),
            ..Default::default()
        });
        match last {
            Some(prev) => self.syms[prev].next = Some(id),
            None => self.heads[hv] = Some(id),
        }
        id
    }

    fn first_mention(&mut self, id: SymbolId, tok: SymTok) {
        let sym = &mut self.syms[id];
        if sym.seg == Segment::Unused {
            sym.tok = tok;
            sym.symnum = self.next_symnum;
            sym.seg = Segment::Undefined;
            sym.flags = 0;
            self.next_symnum += 1;
        }
    }

    pub fn set_scope(&mut self, scope: Option<String>) {
        self.scope = scope;
    }

    fn scoped(&self, name: &str) -> Vec<u8> {
        match (&self.scope, name.strip_prefix("@@")) {
            (Some(proc), Some(local)) => format!("{}.{}", proc, local).into_bytes(),
            _ => name.as_bytes().to_vec(),
        }
    }

    /// Look up a name, creating an Undefined symbol on first mention.
    pub fn intern(&mut self, name: &str, tok: SymTok) -> SymbolId {
        let name = self.scoped(name);
        let id = self.slot(&name);
        self.first_mention(id, tok);
        id
    }

    /// Array element `base[idx]`, without touching the base.
    pub fn element(&mut self, base: SymbolId, idx: i32) -> SymbolId {
        let mut name = self.syms[base].name.clone();
        pack_index(&mut name, idx);
        let id = self.slot(&name);
        self.first_mention(id, SymTok::Label);
        self.syms[id].flags |= flags::QUIET | flags::ARRAY;
        id
    }

    /// Array element `base[idx]`. The base becomes a quiet SET symbol whose
    /// value tracks the highest index used.
    pub fn intern_indexed(&mut self, base: SymbolId, idx: i32) -> SymbolId {
        let id = self.element(base, idx);
        self.track_high_water(base, idx, idx);
        id
    }

    pub(crate) fn track_high_water(&mut self, base: SymbolId, first: i32, last: i32) {
        let sym = &mut self.syms[base];
        sym.value = sym.value.max(first).max(last);
        sym.seg = Segment::Set;
        sym.flags |= flags::QUIET;
    }

    /// Seed a reserved word. Fails if the name was already seeded.
    pub fn reserve(&mut self, name: &str, tok: SymTok, value: i32) -> Result<SymbolId> {
        let id = self.slot(name.as_bytes());
        let sym = &mut self.syms[id];
        if sym.seg != Segment::Unused {
            return Err(Error::ReservedTwice(name.to_string()));
        }
        sym.symnum = 0;
        sym.tok = tok;
        sym.seg = Segment::Reserved;
        sym.value = value;
        Ok(id)
    }

    /// Give a symbol an EQU or SET value. An EQU symbol can never change,
    /// a SET symbol can only be SET again.
    pub fn define(&mut self, id: SymbolId, isequ: bool, value: i32, flags: u8) -> bool {
        let sym = &mut self.syms[id];
        let ok = sym.seg == Segment::Undefined || (sym.seg == Segment::Set && !isequ);
        if ok {
            sym.seg = if isequ { Segment::Equ } else { Segment::Set };
            sym.value = value;
            sym.flags |= flags;
        }
        ok
    }

    /// Bind a label to an address.
    pub fn define_label(&mut self, id: SymbolId, value: i32) -> bool {
        let sym = &mut self.syms[id];
        if sym.seg != Segment::Undefined {
            return false;
        }
        sym.seg = Segment::Absolute;
        sym.value = value;
        true
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.syms[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.syms[id]
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let name = name.as_bytes();
        let mut cur = self.heads[Self::hash(name)];
        while let Some(id) = cur {
            if self.syms[id].name == name {
                return Some(id);
            }
            cur = self.syms[id].next;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    /// Table from symbol number to symbol, for the output pass.
    pub fn build_index(&mut self) {
        self.index = vec![None; self.next_symnum];
        for (id, sym) in self.syms.iter().enumerate() {
            if sym.symnum > 0 {
                self.index[sym.symnum] = Some(id);
            }
        }
    }

    pub fn by_number(&self, symnum: usize) -> Option<&Symbol> {
        self.index.get(symnum).copied().flatten().map(|id| &self.syms[id])
    }

    /// Numbered symbols in order of first mention.
    pub fn numbered(&self) -> impl Iterator<Item = &Symbol> {
        self.index.iter().flatten().map(|&id| &self.syms[id])
    }

    /// User symbols sorted by name, reserved words left out.
    pub fn user_symbols(&self) -> Vec<&Symbol> {
        let mut syms: Vec<&Symbol> = self
            .syms
            .iter()
            .filter(|s| s.symnum > 0 && s.seg != Segment::Reserved)
            .collect();
        syms.sort_by(|a, b| a.name.cmp(&b.name));
        syms
    }
}

// ----------------------------------------------------------------------------
// Reserved words

const KEYWORDS: &[(&str, Keyword)] = &[
    ("and", Keyword::And),
    ("defined", Keyword::Defined),
    ("ge", Keyword::Ge),
    ("high", Keyword::High),
    ("le", Keyword::Le),
    ("low", Keyword::Low),
    ("mod", Keyword::Mod),
    ("ne", Keyword::Ne),
    ("not", Keyword::Not),
    ("or", Keyword::Or),
    ("shl", Keyword::Shl),
    ("shr", Keyword::Shr),
    ("shru", Keyword::Shru),
    ("xor", Keyword::Xor),
];

const FEATURES: &[&str] = &[
    "__FEATURE.MACRO",
    "__FEATURE.CFGVAR",
    "__FEATURE.SRCFILE",
    "__FEATURE.CLASSIFY",
    "__FEATURE.ROTATE",
    "__FEATURE.LISTCOL",
    "__FEATURE.OVERWRITE",
];

/// Seed operator keywords, registers and feature flags.
pub fn seed_reserved(table: &mut SymbolTable) -> Result<()> {
    for &(name, kw) in KEYWORDS {
        table.reserve(name, SymTok::Keyword(kw), 0)?;
        table.reserve(&name.to_ascii_uppercase(), SymTok::Keyword(kw), 0)?;
    }

    table.reserve("_ROTL16", SymTok::Keyword(Keyword::Rotl16), 16)?;
    table.reserve("_ROTL32", SymTok::Keyword(Keyword::Rotl32), 32)?;
    table.reserve("_ROTR16", SymTok::Keyword(Keyword::Rotr16), 16)?;
    table.reserve("_ROTR32", SymTok::Keyword(Keyword::Rotr32), 32)?;
    table.reserve("STRLEN", SymTok::Keyword(Keyword::Strlen), 0)?;
    table.reserve("ASC", SymTok::Keyword(Keyword::Asc), 0)?;
    table.reserve("CLASSIFY", SymTok::Keyword(Keyword::Classify), 0)?;

    for r in 0..8 {
        table.reserve(&format!("r{r}"), SymTok::Reg, r)?;
        table.reserve(&format!("R{r}"), SymTok::Reg, r)?;
    }
    for (name, r) in [("sp", 6), ("SP", 6), ("pc", 7), ("PC", 7)] {
        table.reserve(name, SymTok::Reg, r)?;
    }

    for name in FEATURES {
        table.reserve(name, SymTok::Feature, 99)?;
    }
    Ok(())
}
