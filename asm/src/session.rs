use crate::diag::{Diagnostics, Severity};
use crate::encoder::{empty_slots, expand, Slots};
use crate::error::Result;
use crate::expr::{compile, Evaluated, ExprArena, NodeId};
use crate::parser::{parse_line, CfgValue, LabelRef, Line, Operands, Slice, Stmt};
use crate::record::{ListMode, LocKind, RecordKind, RecordQueue};
use crate::scanner::{scan_line, Skip};
use crate::source::{Fetch, LineSource, Reader};
use crate::symbol::{flags, seed_reserved, Segment, SymbolTable};
use cp1600::op::{criteria, syntax, OpKind};
use cp1600::reg::Reg;
use cp1600::table::{find_generator, opsym, GEN_BDEF, GEN_WDEF};
use std::path::PathBuf;

pub const IF_DEPTH: usize = 256;
pub const PROC_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfAction {
    Active,
    Skip,
}

/// What ELSE and ENDI do for one open IF.
#[derive(Debug, Clone, Copy)]
struct IfFrame {
    on_else: IfAction,
    on_endi: IfAction,
}

/// One assembly run. Pass 1 fills the symbol table and the record queue,
/// [`crate::output::outphase`] consumes them.
pub struct Session<'d> {
    syms: SymbolTable,
    records: RecordQueue,
    arena: ExprArena,
    reader: Reader,
    diag: &'d mut dyn Diagnostics,
    file: String,
    line: usize,

    locctr: i32,
    labelloc: i32,
    seg: i32,
    page: i32,
    mode: String,

    romw: i32,
    romm: i32,
    fwd_sdbd: bool,
    /// An SDBD prefix applies to the instruction on this line.
    sdbd: bool,
    /// The last code line was an SDBD.
    is_sdbd: bool,
    /// No code or data seen yet.
    first: bool,

    ifskip: bool,
    ifstack: Vec<IfFrame>,
    /// Scope in effect outside each open PROC or STRUCT.
    procs: Vec<Option<String>>,
    scope: Option<String>,
    /// Location counter saved by STRUCT.
    struct_locctr: Option<i32>,
    ended: bool,
}

impl<'d> Session<'d> {
    pub fn new(
        root: Box<dyn LineSource>,
        search: Vec<PathBuf>,
        diag: &'d mut dyn Diagnostics,
    ) -> Result<Self> {
        let mut syms = SymbolTable::new();
        seed_reserved(&mut syms)?;
        let (file, _) = root.position();
        Ok(Session {
            syms,
            records: RecordQueue::new(),
            arena: ExprArena::new(),
            reader: Reader::new(root, search),
            diag,
            file,
            line: 0,
            locctr: 0,
            labelloc: 0,
            seg: 0,
            page: -1,
            mode: String::new(),
            romw: 16,
            romm: 0xFFFF,
            fwd_sdbd: false,
            sdbd: false,
            is_sdbd: false,
            first: true,
            ifskip: false,
            ifstack: Vec::new(),
            procs: Vec::new(),
            scope: None,
            struct_locctr: None,
            ended: false,
        })
    }

    /// Read and assemble every line. Only resource exhaustion fails.
    pub fn pass1(&mut self) -> Result<()> {
        self.emit(RecordKind::FileStart(self.file.clone()));

        while !self.ended {
            match self.reader.next_line() {
                Fetch::Line(src) => {
                    self.file = src.file;
                    self.line = src.line;
                    self.assemble_line(&src.text)?;
                }
                Fetch::Exit(file) => {
                    self.line = self.reader.position().1;
                    self.file = file.clone();
                    self.emit(RecordKind::FileExit(file));
                }
                Fetch::Eof => break,
            }
        }

        if self.reader.repeat_active() {
            self.error("REPEAT block active at EOF.  Resetting repeat stack.");
            self.reader.repeat_reset();
        }
        if !self.ifstack.is_empty() {
            self.error("active IF at end of file");
        }
        Ok(())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.syms
    }

    pub fn records(&self) -> &RecordQueue {
        &self.records
    }

    /// Location counter, in words.
    pub fn locctr(&self) -> i32 {
        self.locctr
    }

    pub fn finish(self) -> (SymbolTable, RecordQueue) {
        (self.syms, self.records)
    }

    // ------------------------------------------------------------------------
    // Plumbing

    fn emit(&mut self, kind: RecordKind) {
        self.records.emit(self.line, kind);
    }

    fn report(&mut self, severity: Severity, msg: &str) {
        self.diag.report(&self.file, self.line, severity, msg);
        let text = format!("{}:{}: {} - {}", self.file, self.line, severity, msg);
        self.emit(RecordKind::Error(text));
    }

    fn error(&mut self, msg: &str) {
        self.report(Severity::Error, msg);
    }

    fn warn(&mut self, msg: &str) {
        self.report(Severity::Warning, msg);
    }

    /// Report an address outside the 16-bit space. `bias` allows the
    /// location counter to sit one past the top.
    fn chkover(&mut self, value: i32, bias: i32) -> i32 {
        if value > 0xFFFF + bias || value < 0 {
            self.error("Address overflow");
        }
        value
    }

    /// `value` as an address, or `None` once the overflow is reported.
    fn address(&mut self, value: i64, bias: i32) -> Option<i32> {
        if value > 0xFFFF + bias as i64 || value < 0 {
            self.error("Address overflow");
            return None;
        }
        Some(value as i32)
    }

    fn eval(&mut self, node: NodeId) -> Evaluated {
        let (value, errors) = compile(&self.arena, &self.syms, self.labelloc, node);
        for msg in &errors {
            self.error(msg);
        }
        value
    }

    /// Evaluate an operand that must be known in pass 1.
    fn eval_abs(&mut self, node: NodeId, what: &str) -> Option<i32> {
        let value = self.eval(node);
        if value.is_abs() {
            Some(value.value)
        } else {
            self.error(&format!("noncomputable expression for {}", what));
            None
        }
    }

    fn loc_set(&mut self, kind: LocKind) {
        self.emit(RecordKind::LocSet {
            seg: self.seg,
            page: self.page,
            loc: self.labelloc,
            kind,
            mode: self.mode.clone(),
        });
    }

    /// Expand a generator template into a data record.
    fn generate(&mut self, template: &str, slots: &Slots) {
        let out = expand(template, slots);
        for msg in &out.errors {
            self.error(msg);
        }
        if let Some(polish) = out.polish {
            self.emit(RecordKind::DataBlock(polish));
        }
        self.locctr = self.locctr.saturating_add(out.words);
    }

    // ------------------------------------------------------------------------
    // Lines

    fn assemble_line(&mut self, text: &str) -> Result<()> {
        self.arena.reset();
        self.labelloc = self.locctr;
        self.emit(RecordKind::ListLine(text.to_string()));

        let skip = if self.reader.repeat_skip() {
            Skip::Repeat
        } else if self.ifskip {
            Skip::If
        } else {
            Skip::None
        };
        let scanned = scan_line(text, &mut self.syms, skip);
        if let Some(msg) = scanned.error {
            self.error(msg);
        }

        let parsed = parse_line(scanned.tokens, &mut self.syms, &mut self.arena, self.labelloc)?;
        for msg in &parsed.errors {
            self.error(msg);
        }
        if let Some(line) = parsed.line {
            self.execute(line);
        }
        Ok(())
    }

    fn execute(&mut self, line: Line) {
        let Line { label, stmt } = line;
        match stmt {
            Stmt::Empty => {
                if label.is_some() {
                    self.define_here(label);
                    self.emit(RecordKind::SetEqu(self.labelloc));
                }
            }
            Stmt::Instr { op, operands } => {
                self.code_line(label);
                self.instruction(op, operands);
            }
            Stmt::Data { kind, items } => {
                self.code_line(label);
                self.data(kind, &items);
            }
            Stmt::Res(count) => {
                self.code_line(label);
                self.reserve(count);
            }
            Stmt::Assign { kind, items } => self.assign(label, kind, &items),
            Stmt::Org {
                addr,
                load,
                page,
                mode,
            } => self.org(label, addr, load, page, mode),
            Stmt::Proc => self.proc_start(label),
            Stmt::Struct(addr) => self.struct_start(label, addr),
            stmt => {
                self.define_here(label);
                self.directive(stmt);
            }
        }
    }

    /// Bookkeeping shared by every line that generates code or data.
    fn code_line(&mut self, label: Option<LabelRef>) {
        self.sdbd = self.is_sdbd;
        self.is_sdbd = false;
        self.first = false;
        if label.is_some() {
            if self.sdbd {
                self.warn("label between SDBD and instruction");
            }
            self.define_here(label);
        }
    }

    /// Bind a label to the address of this line.
    fn define_here(&mut self, label: Option<LabelRef>) {
        let Some(LabelRef::Plain(id)) = label else {
            return;
        };
        let loc = self.chkover(self.labelloc, 0);
        if !self.syms.define_label(id, loc) {
            self.error("multiple definition of label");
        }
    }

    // ------------------------------------------------------------------------
    // Code and data

    fn instruction(&mut self, op: usize, operands: Operands) {
        let kind = opsym(op).kind;
        let romw = Evaluated::abs(self.romw);
        let mut slots = empty_slots();

        if kind == OpKind::Sdbd {
            if self.sdbd {
                self.warn("Two SDBDs in a row.");
            }
            self.loc_set(LocKind::Code);
            let template = find_generator(op, shape(&operands), 0);
            self.generate(template, &slots);
            self.is_sdbd = operands == Operands::Imp;
            self.chkover(self.locctr, 1);
            return;
        }

        let may_sdbd = match operands {
            Operands::CexReg(..) => true,
            Operands::RegReg(..) => kind == OpKind::OpcodeInd,
            _ => false,
        };
        if self.sdbd && !may_sdbd {
            self.sdbd = false;
            self.warn("SDBD not allowed with this instruction.");
        }

        self.loc_set(LocKind::Code);
        let reg = match operands {
            Operands::Imp => None,
            Operands::Exp(e) => {
                slots[1] = self.eval(e);
                slots[3] = romw;
                None
            }
            Operands::ExpExp(e, cond) => {
                slots[1] = self.eval(e);
                slots[4] = self.eval(cond);
                if !slots[4].is_abs() {
                    self.error("Must have constant expr for BEXT condition");
                }
                slots[3] = romw;
                None
            }
            Operands::Reg(r) => {
                slots[1] = Evaluated::abs(r);
                Some(r)
            }
            Operands::RegReg(r1, r2) => {
                slots[1] = Evaluated::abs(r1);
                slots[2] = Evaluated::abs(r2);
                Some(r1)
            }
            Operands::RegExp(r, e) | Operands::RegCex(r, e) => {
                slots[1] = Evaluated::abs(r);
                slots[2] = self.eval(e);
                slots[3] = romw;
                Some(r)
            }
            Operands::ExpReg(e, r) => {
                slots[1] = self.eval(e);
                slots[2] = Evaluated::abs(r);
                slots[3] = romw;
                Some(r)
            }
            Operands::CexReg(e, r) => {
                slots[1] = self.eval(e);
                slots[2] = Evaluated::abs(r);
                slots[3] = romw;
                self.auto_sdbd(&slots[1]);
                Some(r)
            }
        };

        let mut crit = reg.map_or(0, |r| Reg::from(r as u8).criteria());
        if self.sdbd {
            crit |= criteria::SDBD;
        }
        let template = find_generator(op, shape(&operands), crit);
        self.generate(template, &slots);
        self.chkover(self.locctr, 1);
    }

    /// On a narrow ROM, put an SDBD in front of an immediate that does not
    /// fit, or that is not known yet when forward references ask for it.
    fn auto_sdbd(&mut self, imm: &Evaluated) {
        if self.sdbd || self.romw == 16 {
            return;
        }
        let wide = imm.is_abs() && (0xFFFF & imm.value & !self.romm) != 0;
        let forward = !imm.is_abs() && self.fwd_sdbd;
        if wide {
            self.warn("Constant is wider than ROM width.  Inserting SDBD.");
        } else if forward {
            self.warn("Inserting SDBD due to forward reference.");
        } else {
            return;
        }
        self.generate("0001x", &empty_slots());
        self.sdbd = true;
    }

    fn data(&mut self, kind: OpKind, items: &[NodeId]) {
        self.loc_set(LocKind::Data);
        let (template, width) = match kind {
            OpKind::Byte => (GEN_BDEF, Some(8)),
            OpKind::Bidecle => (GEN_WDEF, None),
            _ => (GEN_BDEF, Some(self.romw)),
        };
        for &item in items {
            let mut slots = empty_slots();
            slots[1] = self.eval(item);
            if let Some(width) = width {
                slots[2] = Evaluated::abs(width);
            }
            self.generate(template, &slots);
        }
        self.chkover(self.locctr, 1);
    }

    fn reserve(&mut self, count: NodeId) {
        let Some(count) = self.eval_abs(count, "RMB") else {
            return;
        };
        let Some(end) = self.address(self.labelloc as i64 + count as i64, 1) else {
            return;
        };
        self.locctr = end;
        self.emit(RecordKind::SetEqu(self.labelloc));
        self.loc_set(LocKind::Hole);
        if count > 0 {
            self.emit(RecordKind::ReserveRange { end: end - 1 });
        }
    }

    // ------------------------------------------------------------------------
    // Symbols

    fn assign(&mut self, label: Option<LabelRef>, kind: OpKind, items: &[NodeId]) {
        let (name, isequ, flags) = match kind {
            OpKind::Equ => ("EQU", true, 0),
            OpKind::Qequ => ("QEQU", true, flags::QUIET),
            OpKind::Set => ("SET", false, 0),
            _ => ("QSET", false, flags::QUIET),
        };

        let mut values = Vec::with_capacity(items.len());
        for &item in items {
            let value = self.eval(item);
            if !value.is_abs() {
                self.error(&format!("noncomputable expression for {}", name));
            }
            values.push(value.value);
        }
        let equerr = format!("cannot change symbol value with {}", name);

        let slice = match label {
            None => return,
            Some(LabelRef::Plain(id)) if values.len() == 1 => {
                if self.syms.define(id, isequ, values[0], flags) {
                    self.emit(RecordKind::SetEqu(values[0]));
                } else {
                    self.error(&equerr);
                }
                return;
            }
            Some(LabelRef::Plain(id)) => Slice {
                base: id,
                first: 0,
                last: values.len() as i32 - 1,
            },
            Some(LabelRef::Slice(slice)) => slice,
        };

        if slice.len() != values.len() {
            self.error("Array slice length doesn't match expression list length");
            return;
        }
        if !matches!(
            self.syms.get(slice.base).seg,
            Segment::Undefined | Segment::Set
        ) {
            self.error("Cannot convert symbol to array");
            return;
        }

        self.syms.track_high_water(slice.base, slice.first, slice.last);
        for (idx, value) in slice.indices().zip(values) {
            let elem = self.syms.element(slice.base, idx);
            if self.syms.define(elem, isequ, value, flags) {
                self.emit(RecordKind::SetEqu(value));
            } else {
                self.error(&equerr);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Layout

    fn org(
        &mut self,
        label: Option<LabelRef>,
        addr: NodeId,
        load: Option<NodeId>,
        page: Option<NodeId>,
        mode: Option<String>,
    ) {
        let Some(addr) = self.eval_abs(addr, "ORG") else {
            return;
        };
        let load = match load {
            Some(node) => match self.eval_abs(node, "ORG") {
                Some(v) => Some(v),
                None => return,
            },
            None => None,
        };
        let page = match page {
            Some(node) => match self.eval_abs(node, "ORG") {
                Some(v) => Some(v),
                None => return,
            },
            None => None,
        };

        let Some(addr) = self.address(addr as i64, 0) else {
            return;
        };
        let load = match load.map(|v| self.address(v as i64, 0)) {
            Some(None) => return,
            load => load.flatten(),
        };

        self.labelloc = addr;
        self.locctr = self.labelloc;
        match (load, page) {
            (Some(load), _) => {
                self.seg = load - self.labelloc;
                self.page = -1;
                let default = if self.seg != 0 { "" } else { "+R" };
                self.mode = mode.unwrap_or_else(|| default.to_string());
            }
            (None, Some(page)) => {
                self.seg = 0;
                self.page = page;
                self.mode = mode.unwrap_or_else(|| "=R".to_string());
            }
            (None, None) => {
                self.seg = 0;
                self.page = -1;
                self.mode = "+R".to_string();
            }
        }

        self.define_here(label);
        self.emit(RecordKind::SetEqu(self.labelloc));
    }

    fn romw(&mut self, width: NodeId, fwd: Option<NodeId>) {
        self.loc_set(LocKind::Hole);
        let Some(width) = self.eval_abs(width, "ROMWIDTH") else {
            return;
        };
        if !(8..=16).contains(&width) {
            self.error("ROMWIDTH out of range");
            return;
        }
        self.romw = width;
        self.romm = 0xFFFF >> (16 - width);
        if !self.first {
            self.warn("Code appears before ROMW directive.");
        }

        let Some(fwd) = fwd else {
            self.fwd_sdbd = false;
            return;
        };
        match self.eval_abs(fwd, "ROMWIDTH") {
            Some(f @ (0 | 1)) => self.fwd_sdbd = f == 1,
            Some(_) => self.error("SDBD mode flag must be 0 or 1."),
            None => {}
        }
    }

    fn mem_attr(&mut self, lo: NodeId, hi: NodeId, mode: String) {
        let lo = self.eval_abs(lo, "MEMATTR");
        let hi = self.eval_abs(hi, "MEMATTR");
        let (Some(lo), Some(hi)) = (lo, hi) else {
            return;
        };
        let lo = self.address(lo as i64, 0);
        let hi = self.address(hi as i64, 0);
        let (Some(lo), Some(hi)) = (lo, hi) else {
            return;
        };

        self.emit(RecordKind::LocSet {
            seg: 0,
            page: -1,
            loc: self.labelloc,
            kind: LocKind::Hole,
            mode: mode.clone(),
        });
        self.emit(RecordKind::MarkRange { lo, hi, mode });
        self.loc_set(LocKind::Hole);
    }

    fn set_scope(&mut self, scope: Option<String>) {
        self.syms.set_scope(scope.clone());
        self.scope = scope;
    }

    fn proc_start(&mut self, label: Option<LabelRef>) {
        let Some(LabelRef::Plain(id)) = label else {
            return;
        };
        if self.struct_locctr.is_some() {
            self.error("PROC cannot nest inside STRUCT.");
            return;
        }
        if self.procs.len() >= PROC_DEPTH {
            self.error("PROC nesting limit reached.");
            return;
        }
        let sym = self.syms.get(id);
        if sym.flags & flags::ARRAY != 0 {
            self.error("array element can not be defined by PROC");
            return;
        }
        if sym.seg != Segment::Undefined {
            self.error("multiple definition of label");
            return;
        }

        let name = sym.display_name();
        let scope = match &self.scope {
            Some(outer) => format!("{}.{}", outer, name),
            None => name,
        };
        let loc = self.chkover(self.labelloc, 0);
        self.syms.define_label(id, loc);
        self.emit(RecordKind::SetEqu(loc));
        self.procs.push(self.scope.clone());
        self.set_scope(Some(scope));
    }

    fn proc_end(&mut self) {
        if self.procs.is_empty() || self.struct_locctr.is_some() {
            self.error("ENDP w/out PROC.");
            return;
        }
        let outer = self.procs.pop().flatten();
        self.set_scope(outer);
    }

    fn struct_start(&mut self, label: Option<LabelRef>, addr: NodeId) {
        let Some(LabelRef::Plain(id)) = label else {
            return;
        };
        if !self.procs.is_empty() {
            self.error("STRUCT can not nest inside other STRUCTs or PROCs.");
            return;
        }
        if self.syms.get(id).flags & flags::ARRAY != 0 {
            self.error("array element can not be defined by STRUCT");
            return;
        }
        let Some(addr) = self.eval_abs(addr, "ORG") else {
            return;
        };
        let Some(addr) = self.address(addr as i64, 0) else {
            return;
        };
        if self.syms.get(id).seg != Segment::Undefined {
            self.error("multiple definition of label");
            return;
        }

        let name = self.syms.get(id).display_name();
        self.struct_locctr = Some(self.locctr);
        self.locctr = addr;
        self.labelloc = addr;
        self.syms.define_label(id, addr);
        self.emit(RecordKind::SetEqu(addr));
        self.procs.push(self.scope.clone());
        self.set_scope(Some(name));
    }

    fn struct_end(&mut self) {
        let Some(saved) = self.struct_locctr.take() else {
            self.error("ENDS w/out STRUCT.");
            return;
        };
        self.procs.pop();
        self.locctr = saved;
        self.set_scope(None);
    }

    // ------------------------------------------------------------------------
    // Other directives

    fn directive(&mut self, stmt: Stmt) {
        match stmt {
            Stmt::Romw { width, fwd } => self.romw(width, fwd),
            Stmt::Endp => self.proc_end(),
            Stmt::Ends => self.struct_end(),
            Stmt::MemAttr { lo, hi, mode } => self.mem_attr(lo, hi, mode),

            Stmt::If(cond) => self.if_start(cond),
            Stmt::Else => match self.ifstack.last() {
                Some(frame) => self.ifskip = frame.on_else == IfAction::Skip,
                None => self.error("ELSE with no matching if"),
            },
            Stmt::Endi => match self.ifstack.pop() {
                Some(frame) => self.ifskip = frame.on_endi == IfAction::Skip,
                None => self.error("ENDI with no matching if"),
            },
            Stmt::Rpt(count) => self.repeat_start(count),
            Stmt::Endr => match self.reader.repeat_end() {
                Some(num) => self.emit(RecordKind::Comment(format!("  ;== {}", num))),
                None => {
                    self.error("ENDR without REPEAT");
                    self.reader.repeat_reset();
                }
            },
            Stmt::BrkIf(cond) => self.break_if(cond),

            Stmt::Include(name) => {
                if self.reader.repeat_active() {
                    self.error("INCLUDE not permitted inside REPEAT");
                    return;
                }
                match self.reader.include(&name) {
                    Ok(path) => self.emit(RecordKind::FileStart(path)),
                    Err(msg) => self.error(&msg),
                }
            }
            Stmt::End => self.ended = true,
            Stmt::MacroErr => self.error("Unexpected MACRO or ENDM directive"),

            Stmt::Message { kind, text } => self.message(kind, &text),
            Stmt::Listing(mode) => {
                let mode = match mode.to_ascii_uppercase().as_str() {
                    "ON" => ListMode::On,
                    "OFF" => ListMode::Off,
                    "CODE" => ListMode::Code,
                    "PREV" => ListMode::Prev,
                    _ => {
                        self.error("LISTING must be followed by \"ON\", \"OFF\" or \"CODE\"");
                        return;
                    }
                };
                self.emit(RecordKind::ListMode(mode));
            }
            Stmt::ListCol(a, b, c) => self.list_col(a, b, c),
            Stmt::SrcFile { file, line } => {
                let Some(line) = self.eval_abs(line, "SRCFILE") else {
                    return;
                };
                let kind = if file.is_empty() || line < 1 {
                    RecordKind::SrcFileOver { file: None, line: 0 }
                } else {
                    RecordKind::SrcFileOver {
                        file: Some(file),
                        line,
                    }
                };
                self.emit(kind);
            }
            Stmt::CfgVar { name, value } => match value {
                CfgValue::Str(value) => self.emit(RecordKind::CfgVarStr { name, value }),
                CfgValue::Int(node) => {
                    if let Some(value) = self.eval_abs(node, "CFGVAR") {
                        self.emit(RecordKind::CfgVarInt { name, value });
                    }
                }
            },
            Stmt::Overwrite { kind, value } => {
                let force = kind == OpKind::ForceOverwrite;
                let what = if force {
                    "FORCE_OVERWRITE"
                } else {
                    "ERR_IF_OVERWITTEN"
                };
                let Some(value) = self.eval_abs(value, what) else {
                    return;
                };
                let on = Some(value != 0);
                let kind = if force {
                    RecordKind::Overwrite {
                        err: None,
                        force: on,
                    }
                } else {
                    RecordKind::Overwrite {
                        err: on,
                        force: None,
                    }
                };
                self.emit(kind);
            }

            Stmt::Empty
            | Stmt::Instr { .. }
            | Stmt::Data { .. }
            | Stmt::Res(_)
            | Stmt::Assign { .. }
            | Stmt::Org { .. }
            | Stmt::Proc
            | Stmt::Struct(_) => {}
        }
    }

    fn if_start(&mut self, cond: Option<NodeId>) {
        if self.ifstack.len() >= IF_DEPTH {
            self.error("IF stack overflow");
            return;
        }
        if self.ifskip {
            self.ifstack.push(IfFrame {
                on_else: IfAction::Skip,
                on_endi: IfAction::Skip,
            });
            return;
        }
        let Some(cond) = cond else {
            self.error("syntax error at/before End of Line");
            return;
        };

        let value = self.eval(cond);
        let frame = if value.is_abs() && value.value != 0 {
            IfFrame {
                on_else: IfAction::Skip,
                on_endi: IfAction::Active,
            }
        } else {
            self.ifskip = true;
            IfFrame {
                on_else: IfAction::Active,
                on_endi: IfAction::Active,
            }
        };
        self.ifstack.push(frame);
    }

    fn repeat_start(&mut self, count: Option<NodeId>) {
        let count = if self.reader.repeat_skip() {
            0
        } else {
            let Some(count) = count else {
                self.error("syntax error at/before End of Line");
                return;
            };
            let value = self.eval(count);
            if !value.is_abs() {
                self.error("Computable expression required for REPEAT block");
                0
            } else if value.value < 0 {
                self.error("REPEAT count must be >= 0");
                0
            } else {
                value.value
            }
        };
        if !self.reader.repeat_push(count) {
            self.error("Maximum REPEAT nesting exceeded");
        }
    }

    fn break_if(&mut self, cond: NodeId) {
        if !self.reader.repeat_running() {
            self.error("BRKIF without REPEAT");
        }
        let value = self.eval(cond);
        if !value.is_abs() {
            self.error("Computable expression required for BRKIF");
        } else if value.value != 0 {
            self.reader.repeat_break();
            self.emit(RecordKind::Comment("  Break Taken".to_string()));
        }
    }

    fn list_col(&mut self, a: NodeId, b: NodeId, c: NodeId) {
        let a = self.eval_abs(a, "LISTCOL");
        let b = self.eval_abs(b, "LISTCOL");
        let c = self.eval_abs(c, "LISTCOL");
        let (Some(a), Some(b), Some(c)) = (a, b, c) else {
            return;
        };
        if !(1..=256).contains(&a) || !(1..=256).contains(&b) || !(1..=2048).contains(&c) {
            self.error("value out of range value for LISTCOL");
        } else if c < 7 + 5 * a {
            self.error("source column too small compared to hex-per-source-line for LISTCOL");
        } else {
            self.emit(RecordKind::ListingColumn {
                hex_source: a,
                hex_no_src: b,
                source_col: c,
            });
        }
    }

    fn message(&mut self, kind: OpKind, text: &str) {
        let text: String = text
            .chars()
            .map(|c| {
                if c.is_ascii_graphic() || c.is_ascii_whitespace() {
                    c
                } else {
                    '?'
                }
            })
            .collect();
        let text = if text.is_empty() { " ".to_string() } else { text };

        for part in text.split(['\n', '\r']).filter(|p| !p.is_empty()) {
            match kind {
                OpKind::UserErr => self.error(part),
                OpKind::Wmsg => self.warn(part),
                OpKind::Smsg => {
                    println!("{}", part);
                    self.emit(RecordKind::UserComment(part.to_string()));
                }
                _ => self.emit(RecordKind::UserComment(part.to_string())),
            }
        }
    }
}

fn shape(operands: &Operands) -> u16 {
    match operands {
        Operands::Imp => syntax::IMP,
        Operands::Exp(_) => syntax::EXP,
        Operands::ExpExp(..) => syntax::EXPEXP,
        Operands::Reg(_) => syntax::REG,
        Operands::RegReg(..) => syntax::REGREG,
        Operands::RegExp(..) => syntax::REGEXP,
        Operands::RegCex(..) => syntax::REGCEX,
        Operands::ExpReg(..) => syntax::EXPREG,
        Operands::CexReg(..) => syntax::CEXREG,
    }
}
