use color_print::cprintln;
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Where assembly errors and warnings go. Every report bumps a counter.
pub trait Diagnostics {
    fn report(&mut self, file: &str, line: usize, severity: Severity, msg: &str);
    fn errors(&self) -> usize;
    fn warnings(&self) -> usize;
}

// ----------------------------------------------------------------------------
// Console

/// Prints rustc-style diagnostics with the offending source line.
#[derive(Default)]
pub struct Console {
    files: IndexMap<String, Vec<String>>,
    errors: usize,
    warnings: usize,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    fn source_line(&mut self, file: &str, line: usize) -> &str {
        let lines = self.files.entry(file.to_string()).or_insert_with(|| {
            std::fs::read_to_string(file)
                .map(|text| text.lines().map(str::to_string).collect())
                .unwrap_or_default()
        });
        line.checked_sub(1)
            .and_then(|idx| lines.get(idx))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

impl Diagnostics for Console {
    fn report(&mut self, file: &str, line: usize, severity: Severity, msg: &str) {
        match severity {
            Severity::Error => {
                self.errors += 1;
                cprintln!("<red,bold>error</>: {}", msg);
            }
            Severity::Warning => {
                self.warnings += 1;
                cprintln!("<yellow,bold>warning</>: {}", msg);
            }
        }
        if file.is_empty() {
            return;
        }
        cprintln!("     <blue>--></> <underline>{}:{}</>", file, line);
        let content = self.source_line(file, line).to_string();
        if !content.is_empty() {
            cprintln!("      <blue>|</>");
            cprintln!(" <blue>{:>4} |</> {}", line, content);
            cprintln!("      <blue>|</>");
        }
    }

    fn errors(&self) -> usize {
        self.errors
    }

    fn warnings(&self) -> usize {
        self.warnings
    }
}

// ----------------------------------------------------------------------------
// Collect

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct Collect {
    pub reports: Vec<(String, usize, Severity, String)>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, severity: Severity) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.2 == severity)
            .map(|r| r.3.as_str())
            .collect()
    }
}

impl Diagnostics for Collect {
    fn report(&mut self, file: &str, line: usize, severity: Severity, msg: &str) {
        self.reports
            .push((file.to_string(), line, severity, msg.to_string()));
    }

    fn errors(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.2 == Severity::Error)
            .count()
    }

    fn warnings(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.2 == Severity::Warning)
            .count()
    }
}

// ----------------------------------------------------------------------------
// Undefined symbol filter

const RECENT_UNDEF: usize = 32;

/// Remembers the last few (file, line, symbol) triples reported as
/// undefined so one bad line does not flood the output.
#[derive(Debug, Default)]
pub struct RecentUndefined {
    ring: Vec<(String, usize, usize)>,
    next: usize,
}

impl RecentUndefined {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the triple has not been seen recently. Records it either way.
    pub fn first_time(&mut self, file: &str, line: usize, symnum: usize) -> bool {
        if self
            .ring
            .iter()
            .any(|(f, l, s)| *l == line && *s == symnum && f == file)
        {
            return false;
        }
        let entry = (file.to_string(), line, symnum);
        if self.ring.len() < RECENT_UNDEF {
            self.ring.push(entry);
        } else {
            self.ring[self.next] = entry;
        }
        self.next = (self.next + 1) % RECENT_UNDEF;
        true
    }
}

#[test]
fn recent_undefined() {
    let mut recent = RecentUndefined::new();
    assert!(recent.first_time("a.asm", 3, 7));
    assert!(!recent.first_time("a.asm", 3, 7));
    assert!(recent.first_time("a.asm", 4, 7));
    assert!(recent.first_time("b.asm", 3, 7));
    for sym in 100..100 + RECENT_UNDEF {
        recent.first_time("a.asm", 3, sym);
    }
    // Pushed out of the window by now.
    assert!(recent.first_time("a.asm", 3, 7));
}
