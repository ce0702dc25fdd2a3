use crate::diag::{Diagnostics, RecentUndefined, Severity};
use crate::error::{Error, Result};
use crate::eval::{evaluate, Issue};
use crate::image::{parse_mode, CfgVar, Mode, RomImage};
use crate::record::{ListMode, RecordKind, RecordQueue};
use crate::symbol::SymbolTable;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const LIST_MODE_DEPTH: usize = 256;

/// Column layout of the listing.
#[derive(Debug, Clone, Copy)]
struct Columns {
    /// Column the source text starts in.
    source: usize,
    /// Words shown on a line that also carries source.
    hex_source: usize,
    /// Words shown on a continuation line.
    hex_no_src: usize,
}

impl Default for Columns {
    fn default() -> Self {
        Columns {
            source: 32,
            hex_source: 4,
            hex_no_src: 8,
        }
    }
}

struct Outphase<'a> {
    syms: &'a SymbolTable,
    image: &'a mut RomImage,
    diag: &'a mut dyn Diagnostics,
    listing: Option<&'a mut String>,
    recent: RecentUndefined,

    file: String,
    line: usize,
    over: Option<(String, usize)>,

    seg: i32,
    page: i32,
    genloc: i32,
    mode: Mode,

    cols: Columns,
    modes: VecDeque<ListMode>,
    show_coded: bool,
    show_noncode: bool,
    line_buf: String,
    line_flag: bool,
    hex: Vec<u16>,
    hex_addr: i32,
    hex_next: i32,
    hex_new: bool,
}

/// Second pass: evaluate every queued data block into `image` and, when
/// `listing` is given, append the listing text to it.
pub fn outphase(
    records: &mut RecordQueue,
    syms: &SymbolTable,
    image: &mut RomImage,
    diag: &mut dyn Diagnostics,
    listing: Option<&mut String>,
) {
    let mut out = Outphase {
        syms,
        image,
        diag,
        listing,
        recent: RecentUndefined::new(),
        file: String::new(),
        line: 0,
        over: None,
        seg: 0,
        page: -1,
        genloc: 0,
        mode: Mode::default(),
        cols: Columns::default(),
        modes: VecDeque::new(),
        show_coded: true,
        show_noncode: true,
        line_buf: String::new(),
        line_flag: false,
        hex: Vec::new(),
        hex_addr: 0,
        hex_next: 0,
        hex_new: true,
    };

    while let Some(record) = records.next_record() {
        out.line = record.line;
        out.record(record.kind);
    }

    for msg in out.image.overwrite_errors() {
        out.error(&msg);
    }
    if out.image.is_confused() {
        out.error("Unable to generate output file");
    }
    out.flush_list_hex();
}

impl<'a> Outphase<'a> {
    fn listing(&self) -> bool {
        self.listing.is_some()
    }

    fn put(&mut self, text: &str) {
        if let Some(listing) = self.listing.as_deref_mut() {
            listing.push_str(text);
        }
    }

    fn record(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::ListLine(text) => {
                if self.listing() {
                    self.flush_list_hex();
                    self.line_buf = text;
                    self.line_flag = self.show_coded;
                }
            }
            RecordKind::ListMode(mode) => self.list_mode(mode),
            RecordKind::Error(text) => {
                self.flush_source_line();
                self.put(&format!("{}\n", text));
            }
            RecordKind::SetEqu(value) => {
                self.aside(&format!("0x{:X}", value));
            }
            RecordKind::Comment(text) => self.aside(&text),
            RecordKind::UserComment(text) => {
                self.put(&format!("{}\n", text));
                self.line_flag = false;
            }
            RecordKind::LocSet {
                seg,
                page,
                loc,
                mode,
                ..
            } => {
                self.seg = seg;
                self.page = page;
                self.genloc = loc;
                self.mode = self.parse_mode(&mode);
            }
            RecordKind::ReserveRange { end } => {
                let len = span(self.genloc, end);
                let result = self
                    .image
                    .add_segment(None, self.genloc, len, self.page, self.mode);
                if let Err(msg) = result {
                    self.error(msg);
                }
            }
            RecordKind::MarkRange { lo, hi, mode } => {
                let mode = self.parse_mode(&mode);
                let result = self.image.add_segment(None, lo, span(lo, hi), -1, mode);
                if let Err(msg) = result {
                    self.error(msg);
                }
            }
            RecordKind::DataBlock(polish) => self.data_block(&polish),
            RecordKind::FileStart(file) | RecordKind::FileExit(file) => {
                self.file = file;
                self.over = None;
            }
            RecordKind::SrcFileOver { file, line } => {
                self.over = file.map(|f| (f, line.max(0) as usize));
            }
            RecordKind::CfgVarInt { name, value } => self.image.cfg_var(&name, CfgVar::Int(value)),
            RecordKind::CfgVarStr { name, value } => self.image.cfg_var(&name, CfgVar::Str(value)),
            RecordKind::ListingColumn {
                hex_source,
                hex_no_src,
                source_col,
            } => {
                self.cols = Columns {
                    source: source_col.max(0) as usize,
                    hex_source: hex_source.max(1) as usize,
                    hex_no_src: hex_no_src.max(1) as usize,
                };
            }
            RecordKind::Overwrite { err, force } => self.image.set_overwrite(err, force),
        }
    }

    fn parse_mode(&mut self, mode: &str) -> Mode {
        let (mode, errors) = parse_mode(mode);
        for msg in errors {
            self.error(msg);
        }
        mode
    }

    fn list_mode(&mut self, mode: ListMode) {
        let mode = match mode {
            ListMode::Prev => {
                self.modes.pop_back();
                self.modes.back().copied().unwrap_or(ListMode::On)
            }
            mode => {
                if self.modes.len() >= LIST_MODE_DEPTH {
                    self.modes.pop_front();
                }
                self.modes.push_back(mode);
                mode
            }
        };
        match mode {
            ListMode::On | ListMode::Prev => {
                self.line_flag = self.show_noncode;
                self.show_coded = true;
                self.show_noncode = true;
            }
            ListMode::Code => {
                self.line_flag = false;
                self.show_coded = true;
                self.show_noncode = false;
            }
            ListMode::Off => {
                self.line_flag = false;
                self.show_coded = false;
                self.show_noncode = false;
            }
        }
    }

    /// A value or note printed where the hex would go.
    fn aside(&mut self, text: &str) {
        if !(self.listing() && self.show_noncode) {
            self.line_flag = false;
            return;
        }
        let width = self.cols.source;
        let mut out = format!("{:<1$.1$}", text, width);
        if self.line_flag {
            out.push_str(&self.line_buf);
            self.line_flag = false;
        }
        out.push('\n');
        self.put(&out);
    }

    fn data_block(&mut self, polish: &str) {
        let result = evaluate(polish, self.genloc, self.syms);
        for issue in result.issues {
            match issue {
                Issue::Error(msg) => self.error(&msg),
                Issue::Warning(msg) => self.warn(&msg),
                Issue::Undefined(symnum) => self.undefined(symnum),
            }
        }

        if self.listing() && (self.show_coded || self.show_noncode) {
            self.list_hex(&result.words);
        }

        let addr = self.genloc as i64 + self.seg as i64;
        if addr > 0xFFFF {
            self.error("Address overflow (pass 2)");
        } else if !result.words.is_empty() {
            let len = result.words.len() as i32;
            let stored = self
                .image
                .add_segment(Some(&result.words), addr as i32, len, self.page, self.mode);
            if let Err(msg) = stored {
                self.error(msg);
            }
        }
        self.genloc = self.genloc.saturating_add(result.words.len() as i32);
    }

    // ------------------------------------------------------------------------
    // Listing

    fn list_hex(&mut self, words: &[u16]) {
        if self.hex_new {
            self.hex_addr = self.genloc;
            self.hex_next = self.genloc;
            self.hex_new = false;
        }
        for (addr, &word) in (self.genloc..).zip(words) {
            let limit = if self.line_flag {
                self.cols.hex_source
            } else {
                self.cols.hex_no_src
            };
            if self.hex_next != addr || self.hex.len() >= limit {
                self.list_out_hex();
                self.hex_addr = addr;
                self.hex_next = addr;
            }
            self.hex.push(word);
            self.hex_next += 1;
        }
    }

    fn list_out_hex(&mut self) {
        let mut cols = 0;
        if !self.hex.is_empty() {
            let mut out = if self.page >= 0 {
                format!("{:04X}:{:X} ", self.hex_addr, self.page)
            } else {
                format!("{:04X}   ", self.hex_addr)
            };
            for word in &self.hex {
                out.push_str(&format!("{:04X} ", word));
            }
            cols = 7 + 5 * self.hex.len();
            if !self.line_flag {
                out.push('\n');
            }
            self.put(&out);
        } else if !self.show_noncode {
            self.line_flag = false;
        }

        if self.line_flag {
            let out = if self.line_buf.is_empty() {
                "\n".to_string()
            } else {
                let pad = self.cols.source.saturating_sub(cols).max(1);
                format!("{}{}\n", " ".repeat(pad), self.line_buf)
            };
            self.put(&out);
            self.line_flag = false;
        }
        self.hex.clear();
    }

    fn flush_list_hex(&mut self) {
        if self.listing() {
            self.list_out_hex();
        }
        self.hex_new = true;
    }

    fn flush_source_line(&mut self) {
        if self.listing() && self.line_flag && self.show_noncode {
            let out = format!("\t\t\t{}\n", self.line_buf);
            self.put(&out);
        }
        self.line_flag = false;
    }

    // ------------------------------------------------------------------------
    // Diagnostics

    fn location(&self) -> (String, usize) {
        match &self.over {
            Some((file, line)) => (file.clone(), *line),
            None => (self.file.clone(), self.line),
        }
    }

    fn report(&mut self, severity: Severity, msg: &str) {
        self.flush_source_line();
        let (file, line) = self.location();
        self.put(&format!("{}:{}: {} - {}\n", file, line, severity, msg));
        self.diag.report(&file, line, severity, msg);
    }

    fn error(&mut self, msg: &str) {
        self.report(Severity::Error, msg);
    }

    fn warn(&mut self, msg: &str) {
        self.report(Severity::Warning, msg);
    }

    fn undefined(&mut self, symnum: usize) {
        let (file, line) = self.location();
        if !self.recent.first_time(&file, line, symnum) {
            return;
        }
        let msg = match self.syms.by_number(symnum) {
            Some(sym) if sym.is_array_element() => {
                format!("undefined array index {}", sym.display_name())
            }
            Some(sym) => format!("undefined symbol  {}", sym.display_name()),
            None => format!("undefined symbol  #{}", symnum),
        };
        self.error(&msg);
    }
}

/// Word count of the inclusive range `lo..=hi`, zero when it is empty.
fn span(lo: i32, hi: i32) -> i32 {
    (hi as i64 - lo as i64 + 1).clamp(0, i32::MAX as i64) as i32
}

// ----------------------------------------------------------------------------
// Symbol dumps

/// Two-column symbol table that heads the listing.
pub fn symbol_listing(syms: &SymbolTable) -> String {
    let mut out = String::new();
    let shown: Vec<_> = syms.numbered().filter(|s| !s.is_quiet()).collect();
    for row in shown.chunks(2) {
        for sym in row {
            let name = sym.display_name();
            if sym.seg.is_defined() {
                out.push_str(&format!("{:08X} {:<25.25}  ", sym.value as u32, name));
            } else {
                out.push_str(&format!("???????? {:<25.25}  ", name));
            }
        }
        out.push('\n');
    }
    out.push('\x0C');
    out
}

/// One symbol per line, for debuggers and emulators.
pub fn symbol_file(syms: &SymbolTable) -> String {
    let mut out = String::new();
    for sym in syms.numbered().filter(|s| !s.is_quiet()) {
        if sym.seg.is_defined() {
            out.push_str(&format!("{:08X} {}\n", sym.value as u32, sym.display_name()));
        } else {
            out.push_str(&format!("???????? {}\n", sym.display_name()));
        }
    }
    out
}

/// Totals appended to the listing.
pub fn summary(errors: usize, warnings: usize) -> String {
    format!(
        " ERROR SUMMARY - ERRORS DETECTED {}\n               -  WARNINGS       {}\n",
        errors, warnings
    )
}

// ----------------------------------------------------------------------------
// Output file names

/// The `.bin` and `.cfg` paths for an output name. A bare name gets both
/// extensions and a `.bin` name gets a sibling `.cfg`.
pub fn output_names(path: &Path) -> Result<(PathBuf, PathBuf)> {
    match path.extension().and_then(|e| e.to_str()) {
        None => {
            let bin = path.with_extension("bin");
            let cfg = path.with_extension("cfg");
            Ok((bin, cfg))
        }
        Some(ext) if ext.eq_ignore_ascii_case("bin") => {
            Ok((path.to_path_buf(), path.with_extension("cfg")))
        }
        Some(ext) => Err(Error::UnknownExtension(ext.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Collect;
    use crate::record::LocKind;

    fn loc(queue: &mut RecordQueue, loc: i32) {
        queue.emit(
            1,
            RecordKind::LocSet {
                seg: 0,
                page: -1,
                loc,
                kind: LocKind::Code,
                mode: "+R".into(),
            },
        );
    }

    #[test]
    fn data_into_image() {
        let syms = SymbolTable::new();
        let mut queue = RecordQueue::new();
        queue.emit(1, RecordKind::FileStart("t.asm".into()));
        loc(&mut queue, 0x5000);
        queue.emit(2, RecordKind::ListLine("        DECLE 1, 2".into()));
        queue.emit(2, RecordKind::DataBlock("1x2x".into()));

        let mut image = RomImage::new();
        let mut diag = Collect::new();
        let mut listing = String::new();
        outphase(&mut queue, &syms, &mut image, &mut diag, Some(&mut listing));

        println!("{}", listing);
        assert_eq!(diag.errors(), 0);
        assert_eq!(image.word(0x5000), Some(1));
        assert_eq!(image.word(0x5001), Some(2));
        assert!(listing.starts_with("5000   0001 0002 "));
        assert!(listing.ends_with("        DECLE 1, 2\n"));
    }

    #[test]
    fn aside_values() {
        let syms = SymbolTable::new();
        let mut queue = RecordQueue::new();
        queue.emit(1, RecordKind::ListLine("FOO EQU 5".into()));
        queue.emit(1, RecordKind::SetEqu(5));
        queue.emit(2, RecordKind::ListMode(ListMode::Off));
        queue.emit(3, RecordKind::ListLine("BAR EQU 6".into()));
        queue.emit(3, RecordKind::SetEqu(6));
        queue.emit(4, RecordKind::ListMode(ListMode::Prev));

        let mut listing = String::new();
        outphase(
            &mut queue,
            &syms,
            &mut RomImage::new(),
            &mut Collect::new(),
            Some(&mut listing),
        );
        assert_eq!(listing, format!("{:<32}FOO EQU 5\n", "0x5"));
    }

    #[test]
    fn address_overflow() {
        let syms = SymbolTable::new();
        let mut queue = RecordQueue::new();
        queue.emit(1, RecordKind::FileStart("t.asm".into()));
        loc(&mut queue, 0x10000);
        queue.emit(2, RecordKind::DataBlock("1x".into()));

        let mut diag = Collect::new();
        outphase(&mut queue, &syms, &mut RomImage::new(), &mut diag, None);
        assert_eq!(diag.messages(Severity::Error), vec!["Address overflow (pass 2)"]);
        assert_eq!(diag.reports[0].0, "t.asm");
    }

    #[test]
    fn wide_ranges() {
        let syms = SymbolTable::new();
        let mut queue = RecordQueue::new();
        queue.emit(1, RecordKind::FileStart("t.asm".into()));
        queue.emit(
            1,
            RecordKind::MarkRange {
                lo: i32::MIN,
                hi: i32::MAX,
                mode: "+R".into(),
            },
        );
        loc(&mut queue, 0);
        queue.emit(2, RecordKind::ReserveRange { end: i32::MAX });

        let mut diag = Collect::new();
        outphase(&mut queue, &syms, &mut RomImage::new(), &mut diag, None);
        assert_eq!(diag.messages(Severity::Error), vec!["Address overflow (collect)"]);
    }

    #[test]
    fn names() {
        let (bin, cfg) = output_names(Path::new("out/game")).unwrap();
        assert_eq!(bin, PathBuf::from("out/game.bin"));
        assert_eq!(cfg, PathBuf::from("out/game.cfg"));

        let (bin, cfg) = output_names(Path::new("game.bin")).unwrap();
        assert_eq!(bin, PathBuf::from("game.bin"));
        assert_eq!(cfg, PathBuf::from("game.cfg"));

        assert!(matches!(
            output_names(Path::new("game.rom")),
            Err(Error::UnknownExtension(_))
        ));
    }
}
