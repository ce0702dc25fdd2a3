use indexmap::IndexMap;

/// Attribute bits kept per ROM word.
pub mod flag {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const NARROW: u8 = 0x04;
    pub const BANKSW: u8 = 0x08;
    pub const HASDATA: u8 = 0x10;
    pub const PAGESW: u8 = 0x20;
    pub const ERROVER: u8 = 0x40;
}

use flag::*;

const PAGES: usize = 16;
const SPACE: usize = 0x10000;
const SLOT_SIZE: usize = 0x1000;

// ----------------------------------------------------------------------------
// Memory attribute strings

/// Set and clear masks of a memory attribute string.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub set: u8,
    pub clr: u8,
}

/// Parse `+R,-W`, `=RWN` and the like. Errors are returned alongside
/// whatever masks could be built.
pub fn parse_mode(mode: &str) -> (Mode, Vec<&'static str>) {
    let s = mode.as_bytes();
    let mut errors = Vec::new();
    let (mut set, mut clr) = (0u8, 0u8);
    let mut i = 0;

    while i < s.len() {
        while i < s.len() && s[i] == b',' {
            i += 1;
        }
        let mut action = None;
        let mut bit = 0u8;
        loop {
            while i < s.len() && b" \t\n\r".contains(&s[i]) {
                i += 1;
            }
            if i >= s.len() {
                break;
            }
            let c = s[i];
            i += 1;
            if action.is_none() {
                action = Some(c);
            } else {
                match c.to_ascii_uppercase() {
                    b'R' => bit |= READ,
                    b'W' => bit |= WRITE,
                    b'N' => bit |= NARROW,
                    b'B' => bit |= BANKSW,
                    b'-' | b'+' | b'=' => {
                        errors.push("Mode syntax: Action char where mode char expected")
                    }
                    _ => errors.push("Mode syntax: Unknown mode character"),
                }
            }
            if i >= s.len() || s[i] == b',' {
                break;
            }
        }

        let Some(action) = action else {
            break;
        };
        match action {
            b'+' => {
                set |= bit;
                clr &= !bit;
            }
            b'-' => {
                set &= !bit;
                clr |= bit;
            }
            b'=' => {
                set = bit;
                clr = !bit;
            }
            b'R' | b'W' | b'N' | b'B' | b'r' | b'w' | b'n' | b'b' => {
                errors.push("Mode syntax: Missing action character")
            }
            _ => errors.push("Mode syntax: Unknown action character"),
        }
    }

    let mode = Mode {
        set: set & 0xF,
        clr: clr & 0xF,
    };
    (mode, errors)
}

// ----------------------------------------------------------------------------
// ROM image

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgVar {
    Int(i32),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    word: u16,
    flag: u8,
}

const EMPTY: Cell = Cell {
    word: 0xFFFF,
    flag: 0,
};

/// Sixteen pages of 64K words each, plus the paging state of every 4K slot.
pub struct RomImage {
    cells: Vec<Cell>,
    overwritten: Vec<bool>,
    any_overwritten: bool,
    /// Per 4K slot: 0 untouched, -1 unpaged, otherwise a mask of pages.
    slots: [i32; 16],
    slot_err: [bool; 16],
    pagesw: bool,
    banksw: bool,
    confused: bool,
    overflowed: bool,
    err_if_overwritten: bool,
    force_overwrite: bool,
    vars: IndexMap<String, CfgVar>,
}

impl Default for RomImage {
    fn default() -> Self {
        Self::new()
    }
}

fn at(page: usize, addr: usize) -> usize {
    page * SPACE + addr
}

impl RomImage {
    pub fn new() -> Self {
        RomImage {
            cells: vec![EMPTY; PAGES * SPACE],
            overwritten: vec![false; PAGES * SPACE],
            any_overwritten: false,
            slots: [0; 16],
            slot_err: [false; 16],
            pagesw: false,
            banksw: false,
            confused: false,
            overflowed: false,
            err_if_overwritten: false,
            force_overwrite: false,
            vars: IndexMap::new(),
        }
    }

    /// `None` leaves a flag as it is.
    pub fn set_overwrite(&mut self, err: Option<bool>, force: Option<bool>) {
        if let Some(err) = err {
            self.err_if_overwritten = err;
        }
        if let Some(force) = force {
            self.force_overwrite = force;
        }
    }

    pub fn cfg_var(&mut self, name: &str, value: CfgVar) {
        self.vars.insert(name.to_string(), value);
    }

    /// Add `len` words at `addr`, or only update attributes when `data` is
    /// `None`. Each kind of layout error is reported once.
    pub fn add_segment(
        &mut self,
        data: Option<&[u16]>,
        addr: i32,
        len: i32,
        page: i32,
        mode: Mode,
    ) -> Result<(), &'static str> {
        if addr < 0 || addr as i64 + len as i64 > SPACE as i64 {
            if self.overflowed {
                return Ok(());
            }
            self.overflowed = true;
            return Err("Address overflow (collect)");
        }
        if !(-1..=15).contains(&page) {
            return Err("Page number out of range");
        }

        if mode.set & BANKSW != 0 {
            self.banksw = true;
        }
        if page >= 0 {
            self.pagesw = true;
        }
        if self.banksw && self.pagesw {
            if self.confused {
                return Ok(());
            }
            self.confused = true;
            return Err("Cannot mix page-switching and bank-switching");
        }
        if len <= 0 {
            return Ok(());
        }

        let lo = addr as usize;
        let hi = lo + len as usize - 1;
        let slots = lo / SLOT_SIZE..=hi / SLOT_SIZE;
        for s in slots.clone() {
            if (self.slots[s] == -1 && page >= 0) || (self.slots[s] > 0 && page < 0) {
                if self.slot_err[s] {
                    return Ok(());
                }
                self.slot_err[s] = true;
                return Err("Mixture of paged and unpaged ROM in same 4K range");
            }
        }
        for s in slots {
            if page >= 0 {
                self.slots[s] |= 1 << page;
            } else {
                self.slots[s] = -1;
            }
        }

        let mut set = mode.set;
        if page >= 0 {
            set |= PAGESW;
        }
        let p = page.max(0) as usize;

        if let Some(words) = data {
            for (a, &w) in (lo..=hi).zip(words) {
                self.cells[at(p, a)].word = w;
            }
            set |= HASDATA;
            if !self.force_overwrite {
                for a in lo..=hi {
                    if self.cells[at(p, a)].flag & ERROVER != 0 {
                        self.overwritten[at(p, a)] = true;
                        self.any_overwritten = true;
                    }
                }
            }
            if self.err_if_overwritten {
                set |= ERROVER;
            }
        }

        for a in lo..=hi {
            let cell = &mut self.cells[at(p, a)];
            cell.flag = (cell.flag & !mode.clr) | set;
        }
        Ok(())
    }

    /// Word at an unpaged address, if any data was placed there.
    pub fn word(&self, addr: u16) -> Option<u16> {
        self.paged_word(0, addr)
    }

    pub fn paged_word(&self, page: usize, addr: u16) -> Option<u16> {
        let cell = self.cells.get(at(page, addr as usize))?;
        (cell.flag & HASDATA != 0).then_some(cell.word)
    }

    pub fn is_confused(&self) -> bool {
        self.confused
    }

    fn unpaged(&self, addr: usize) -> bool {
        self.slots[addr / SLOT_SIZE] == -1
    }

    fn has_page(&self, addr: usize, page: usize) -> bool {
        let mask = self.slots[addr / SLOT_SIZE];
        mask != -1 && (mask >> page) & 1 != 0
    }

    /// Ranges of words written over cells marked error-if-overwritten.
    pub fn overwrite_errors(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.any_overwritten {
            return out;
        }

        let hits = (0..SPACE).map(|a| self.unpaged(a) && self.overwritten[at(0, a)]);
        for (lo, hi) in runs(hits) {
            out.push(format!("ROM overwrite error on ${:04X} - ${:04X}", lo, hi));
        }
        for page in 0..PAGES {
            let hits = (0..SPACE).map(|a| self.has_page(a, page) && self.overwritten[at(page, a)]);
            for (lo, hi) in runs(hits) {
                out.push(format!(
                    "ROM overwrite error on ${:04X} - ${:04X} PAGE {}",
                    lo, hi, page
                ));
            }
        }
        out
    }

    /// Spans of equal attributes within one unpaged 4K slot.
    fn spans(&self, slot: usize, mask: u8) -> Vec<(usize, usize, u8)> {
        let mut spans: Vec<(usize, usize, u8)> = Vec::new();
        let lo = slot * SLOT_SIZE;
        for a in lo..lo + SLOT_SIZE {
            let f = self.cells[at(0, a)].flag & mask;
            match spans.last_mut() {
                Some(span) if span.2 == f => span.1 = a,
                _ => spans.push((a, a, f)),
            }
        }
        spans
    }

    fn slot_flags(&self, page: usize, slot: usize) -> u8 {
        let lo = at(page, slot * SLOT_SIZE);
        self.cells[lo..lo + SLOT_SIZE]
            .iter()
            .fold(0, |f, c| f | c.flag)
    }

    /// The `.bin` contents and the matching `.cfg` text.
    pub fn bincfg(&self) -> (Vec<u8>, String) {
        let mut bin = Vec::new();
        let mut cfg = String::from("[mapping]\r\n");
        let mut fileofs = 0usize;
        let span_mask = READ | WRITE | NARROW | HASDATA;

        for page in 0..PAGES {
            for slot in 0..16 {
                if self.slots[slot] == 0 || self.slots[slot] == -1 {
                    continue;
                }
                if (self.slots[slot] >> page) & 1 == 0 {
                    continue;
                }
                let flags = self.slot_flags(page, slot);
                if flags & HASDATA == 0 {
                    continue;
                }
                let lo = slot * SLOT_SIZE;
                cfg.push_str(&format!(
                    "${:04X} - ${:04X} = ${:04X} PAGE {:X}{}\r\n",
                    fileofs,
                    fileofs + 0xFFF,
                    lo,
                    page,
                    data_kind(flags)
                ));
                for a in lo..lo + SLOT_SIZE {
                    bin.extend(self.cells[at(page, a)].word.to_be_bytes());
                }
                fileofs += SLOT_SIZE;
            }
        }

        for slot in (0..16).filter(|&s| self.slots[s] == -1) {
            for (lo, hi, flags) in self.spans(slot, span_mask) {
                if flags & HASDATA == 0 || flags & (READ | WRITE) == 0 {
                    continue;
                }
                let len = hi - lo + 1;
                cfg.push_str(&format!(
                    "${:04X} - ${:04X} = ${:04X}{}\r\n",
                    fileofs,
                    fileofs + len - 1,
                    lo,
                    data_kind(flags)
                ));
                for a in lo..=hi {
                    bin.extend(self.cells[at(0, a)].word.to_be_bytes());
                }
                fileofs += len;
            }
        }

        let mut memattr = String::new();
        for page in 0..PAGES {
            for slot in 0..16 {
                if self.slots[slot] == 0 || self.slots[slot] == -1 {
                    continue;
                }
                if (self.slots[slot] >> page) & 1 == 0 {
                    continue;
                }
                let flags = self.slot_flags(page, slot);
                if flags & HASDATA != 0 {
                    continue;
                }
                let lo = slot * SLOT_SIZE;
                memattr.push_str(&format!(
                    "${:04X} - ${:04X} = PAGE {:X}{}\r\n",
                    lo,
                    lo + 0xFFF,
                    page,
                    attr_kind(flags)
                ));
            }
        }
        for slot in (0..16).filter(|&s| self.slots[s] == -1) {
            for (lo, hi, flags) in self.spans(slot, span_mask) {
                if flags & HASDATA != 0 || flags & (READ | WRITE) == 0 {
                    continue;
                }
                memattr.push_str(&format!("${:04X} - ${:04X} ={}\r\n", lo, hi, attr_kind(flags)));
            }
        }
        if !memattr.is_empty() {
            cfg.push_str("\r\n[memattr]\r\n");
            cfg.push_str(&memattr);
        }

        if !self.vars.is_empty() {
            cfg.push_str("\r\n[vars]\r\n");
            for (name, value) in &self.vars {
                let value = match value {
                    CfgVar::Int(v) if *v <= 4095 => v.to_string(),
                    CfgVar::Int(v) => format!("${:04X}", v),
                    CfgVar::Str(s) => quote(s),
                };
                cfg.push_str(&format!("{} = {}\r\n", name, value));
            }
        }
        (bin, cfg)
    }

    /// Table of every span with attributes, unpaged first.
    pub fn memory_map(&self) -> String {
        let sig = READ | WRITE | NARROW | BANKSW | HASDATA;
        let mut out = String::new();
        let mut total = 0usize;

        out.push_str("\n MEMORY MAP SUMMARY\n");
        out.push_str("===========================================================\n");
        out.push_str(&format!("      {:<24} {:<16} {}\n", "Address Range", "Size", "Flags"));
        out.push_str("-----------------------------------------------------------\n");

        let mut spans: Vec<(Option<usize>, usize, usize, u8)> = Vec::new();
        let mut cur: Option<(usize, usize, u8, usize)> = None;
        for a in 0..SPACE {
            let f = self.cells[at(0, a)].flag & sig;
            if !self.unpaged(a) || cur.is_some_and(|c| c.2 != f) {
                if let Some((lo, hi, f, _)) = cur.take() {
                    spans.push((None, lo, hi, f));
                }
            }
            if !self.unpaged(a) {
                continue;
            }
            match &mut cur {
                Some(c) => c.1 = a,
                None => cur = Some((a, a, f, 0)),
            }
        }
        if let Some((lo, hi, f, _)) = cur.take() {
            spans.push((None, lo, hi, f));
        }

        for page in 0..PAGES {
            for a in 0..SPACE {
                let f = self.cells[at(page, a)].flag & sig;
                let slot = a / SLOT_SIZE;
                let here = self.has_page(a, page);
                if !here || cur.is_some_and(|c| c.2 != f || c.3 != slot) {
                    if let Some((lo, hi, f, _)) = cur.take() {
                        spans.push((Some(page), lo, hi, f));
                    }
                }
                if !here {
                    continue;
                }
                match &mut cur {
                    Some(c) => c.1 = a,
                    None => cur = Some((a, a, f, slot)),
                }
            }
            if let Some((lo, hi, f, _)) = cur.take() {
                spans.push((Some(page), lo, hi, f));
            }
        }

        for (page, lo, hi, f) in spans.into_iter().filter(|s| s.3 != 0) {
            let range = match page {
                Some(p) => format!("${:04X} - ${:04X} PAGE ${:X}", lo, hi, p),
                None => format!("${:04X} - ${:04X}", lo, hi),
            };
            let flags: String = [
                (READ, 'R'),
                (WRITE, 'W'),
                (NARROW, 'N'),
                (BANKSW, 'B'),
                (HASDATA, 'P'),
            ]
            .iter()
            .map(|&(bit, c)| if f & bit != 0 { c } else { '-' })
            .collect();
            out.push_str(&format!(
                "      {:<24} ${:04X}            {}\n",
                range,
                hi - lo + 1,
                flags
            ));
            if f & HASDATA != 0 {
                total += hi - lo + 1;
            }
        }

        out.push_str("===========================================================\n");
        out.push_str(&format!(" TOTAL INITIALIZED SIZE:  ${:04X} words\n", total));
        out
    }
}

/// Start and end of each run of `true`.
fn runs(hits: impl Iterator<Item = bool>) -> Vec<(usize, usize)> {
    let mut out: Vec<(usize, usize)> = Vec::new();
    let mut open = false;
    for (a, hit) in hits.enumerate() {
        match (hit, open) {
            (true, true) => {
                if let Some(run) = out.last_mut() {
                    run.1 = a;
                }
            }
            (true, false) => out.push((a, a)),
            _ => {}
        }
        open = hit;
    }
    out
}

fn width(flags: u8) -> u8 {
    if flags & NARROW != 0 {
        8
    } else {
        16
    }
}

/// Suffix of a `[mapping]` line.
fn data_kind(flags: u8) -> String {
    match flags & (READ | WRITE) {
        f if f == READ | WRITE => format!(" RAM {}", width(flags)),
        WRITE => format!(" WOM {}", width(flags)),
        READ if flags & NARROW != 0 => " ROM 8".to_string(),
        _ => String::new(),
    }
}

/// Suffix of a `[memattr]` line.
fn attr_kind(flags: u8) -> String {
    match flags & (READ | WRITE) {
        f if f == READ | WRITE => format!(" RAM {}", width(flags)),
        WRITE => format!(" WOM {}", width(flags)),
        READ => format!(" ROM {}", width(flags)),
        _ => " ; unknown!".to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom() -> Mode {
        parse_mode("+R").0
    }

    #[test]
    fn modes() {
        let (m, errs) = parse_mode("+RW, -N");
        assert!(errs.is_empty());
        assert_eq!(m.set, READ | WRITE);
        assert_eq!(m.clr, NARROW);

        let (m, _) = parse_mode("=R");
        assert_eq!(m.set, READ);
        assert_eq!(m.clr, 0xF & !READ);

        assert_eq!(parse_mode("R").1, vec!["Mode syntax: Missing action character"]);
        assert_eq!(parse_mode("+Q").1, vec!["Mode syntax: Unknown mode character"]);
        assert_eq!(
            parse_mode("++").1,
            vec!["Mode syntax: Action char where mode char expected"]
        );
    }

    #[test]
    fn bin_and_cfg() {
        let mut img = RomImage::new();
        img.add_segment(Some(&[0x0001, 0x1234]), 0x5000, 2, -1, rom())
            .unwrap();
        img.add_segment(None, 0x0100, 0x10, -1, parse_mode("+RW").0)
            .unwrap();
        img.cfg_var("name", CfgVar::Str("demo".into()));
        img.cfg_var("year", CfgVar::Int(2024));
        img.cfg_var("big", CfgVar::Int(0x5000));

        let (bin, cfg) = img.bincfg();
        assert_eq!(bin, vec![0x00, 0x01, 0x12, 0x34]);
        println!("{}", cfg);
        assert_eq!(
            cfg,
            "[mapping]\r\n$0000 - $0001 = $5000\r\n\
             \r\n[memattr]\r\n$0100 - $010F = RAM 16\r\n\
             \r\n[vars]\r\nname = \"demo\"\r\nyear = 2024\r\nbig = $5000\r\n"
        );
        assert_eq!(img.word(0x5001), Some(0x1234));
        assert_eq!(img.word(0x5002), None);
    }

    #[test]
    fn paging_rules() {
        let mut img = RomImage::new();
        img.add_segment(Some(&[1]), 0x6000, 1, 2, rom()).unwrap();
        assert_eq!(
            img.add_segment(Some(&[1]), 0x6800, 1, -1, rom()),
            Err("Mixture of paged and unpaged ROM in same 4K range")
        );
        assert_eq!(img.add_segment(Some(&[1]), 0x6800, 1, -1, rom()), Ok(()));
        assert_eq!(
            img.add_segment(Some(&[1]), 0x0, 1, 16, rom()),
            Err("Page number out of range")
        );
        assert_eq!(
            img.add_segment(Some(&[1]), 0xFFFF, 2, -1, rom()),
            Err("Address overflow (collect)")
        );
        assert_eq!(img.paged_word(2, 0x6000), Some(1));

        let (_, cfg) = img.bincfg();
        assert!(cfg.starts_with("[mapping]\r\n$0000 - $0FFF = $6000 PAGE 2\r\n"));
        assert!(img.memory_map().contains("$6000 - $6000 PAGE $2"));
    }

    #[test]
    fn overwrite() {
        let mut img = RomImage::new();
        img.set_overwrite(Some(true), None);
        img.add_segment(Some(&[1, 2, 3]), 0x5000, 3, -1, rom()).unwrap();
        img.add_segment(Some(&[4, 5]), 0x5001, 2, -1, rom()).unwrap();
        assert_eq!(
            img.overwrite_errors(),
            vec!["ROM overwrite error on $5001 - $5002".to_string()]
        );

        img.set_overwrite(None, Some(true));
        img.add_segment(Some(&[6]), 0x5000, 1, -1, rom()).unwrap();
        assert_eq!(img.overwrite_errors().len(), 1);
        assert_eq!(img.word(0x5000), Some(6));
    }
}
