use std::collections::VecDeque;

/// What a `LocSet` record's range holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocKind {
    Code,
    Data,
    Hole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    On,
    Off,
    Code,
    Prev,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    ListMode(ListMode),
    /// Value shown in the listing for EQU/SET/ORG lines.
    SetEqu(i32),
    /// Listing-only comment, aligned like a code line.
    Comment(String),
    /// Listing-only comment, printed as is.
    UserComment(String),
    LocSet {
        seg: i32,
        page: i32,
        loc: i32,
        kind: LocKind,
        mode: String,
    },
    MarkRange {
        lo: i32,
        hi: i32,
        mode: String,
    },
    ReserveRange {
        end: i32,
    },
    FileStart(String),
    FileExit(String),
    /// Diagnostic raised in the first pass, already formatted.
    Error(String),
    ListLine(String),
    DataBlock(String),
    CfgVarInt {
        name: String,
        value: i32,
    },
    CfgVarStr {
        name: String,
        value: String,
    },
    SrcFileOver {
        file: Option<String>,
        line: i32,
    },
    ListingColumn {
        hex_source: i32,
        hex_no_src: i32,
        source_col: i32,
    },
    /// `None` leaves the flag alone.
    Overwrite {
        err: Option<bool>,
        force: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub kind: RecordKind,
}

// ----------------------------------------------------------------------------
// Queue

/// First-in first-out record store between the passes. Pass 1 only appends,
/// pass 2 only takes from the front.
#[derive(Debug, Default)]
pub struct RecordQueue {
    records: VecDeque<Record>,
}

impl RecordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, line: usize, kind: RecordKind) {
        self.records.push_back(Record { line, kind });
    }

    /// Take the oldest record. It is released when dropped.
    pub fn next_record(&mut self) -> Option<Record> {
        self.records.pop_front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

#[test]
fn fifo_order() {
    let mut q = RecordQueue::new();
    q.emit(1, RecordKind::SetEqu(5));
    q.emit(2, RecordKind::DataBlock("5x".into()));
    assert_eq!(q.len(), 2);
    assert_eq!(q.next_record().map(|r| r.line), Some(1));
    assert_eq!(
        q.next_record().map(|r| r.kind),
        Some(RecordKind::DataBlock("5x".into()))
    );
    assert!(q.next_record().is_none());
}
