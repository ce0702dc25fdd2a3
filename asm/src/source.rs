use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const INCLUDE_DEPTH: usize = 32;
pub const REPEAT_DEPTH: usize = 16;

/// Where source lines come from.
pub trait LineSource {
    /// Next line without its terminator, or `None` at end of input.
    fn next_line(&mut self) -> Option<String>;
    /// File name and number of the line last returned.
    fn position(&self) -> (String, usize);
    fn at_eof(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Sources

/// Lines held in memory.
pub struct TextSource {
    name: String,
    lines: Vec<String>,
    next: usize,
}

impl TextSource {
    pub fn new(name: &str, text: &str) -> Self {
        TextSource {
            name: name.to_string(),
            lines: text.lines().map(str::to_string).collect(),
            next: 0,
        }
    }
}

impl LineSource for TextSource {
    fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.next).cloned()?;
        self.next += 1;
        Some(line)
    }

    fn position(&self) -> (String, usize) {
        (self.name.clone(), self.next)
    }

    fn at_eof(&self) -> bool {
        self.next >= self.lines.len()
    }
}

/// A file on disk. The whole file is read when it is opened.
pub struct FileSource(TextSource);

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Error::FileOpen(path.to_string(), e)
            }
            _ => Error::FileRead(path.to_string(), e),
        })?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(FileSource(TextSource::new(path, &text)))
    }
}

impl LineSource for FileSource {
    fn next_line(&mut self) -> Option<String> {
        self.0.next_line()
    }

    fn position(&self) -> (String, usize) {
        self.0.position()
    }

    fn at_eof(&self) -> bool {
        self.0.at_eof()
    }
}

// ----------------------------------------------------------------------------
// Reader

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Fetch {
    Line(SourceLine),
    /// An include file ended. Carries the file reading resumes in.
    Exit(String),
    Eof,
}

#[derive(Debug, Clone, Copy)]
struct Repeat {
    /// Buffer index of the first line of the block.
    head: usize,
    num: i32,
    cnt: i32,
    skip: bool,
}

/// Stacks include files and replays REPEAT blocks.
pub struct Reader {
    files: Vec<Box<dyn LineSource>>,
    search: Vec<PathBuf>,
    buffer: Vec<SourceLine>,
    pos: usize,
    repeats: Vec<Repeat>,
}

impl Reader {
    pub fn new(root: Box<dyn LineSource>, search: Vec<PathBuf>) -> Self {
        Reader {
            files: vec![root],
            search,
            buffer: Vec::new(),
            pos: 0,
            repeats: Vec::new(),
        }
    }

    pub fn next_line(&mut self) -> Fetch {
        if !self.repeats.is_empty() && self.pos < self.buffer.len() {
            let line = self.buffer[self.pos].clone();
            self.pos += 1;
            return Fetch::Line(line);
        }

        let Some(top) = self.files.last_mut() else {
            return Fetch::Eof;
        };
        match top.next_line() {
            Some(text) => {
                let (file, line) = top.position();
                let line = SourceLine { text, file, line };
                if !self.repeats.is_empty() {
                    self.buffer.push(line.clone());
                    self.pos = self.buffer.len();
                }
                Fetch::Line(line)
            }
            None if self.files.len() > 1 => {
                self.files.pop();
                let file = self.files.last().map(|f| f.position().0).unwrap_or_default();
                Fetch::Exit(file)
            }
            None => Fetch::Eof,
        }
    }

    pub fn at_eof(&self) -> bool {
        self.files.len() == 1 && self.files.iter().all(|f| f.at_eof())
    }

    pub fn position(&self) -> (String, usize) {
        self.files
            .last()
            .map(|f| f.position())
            .unwrap_or_default()
    }

    /// Open an include file, trying the name as given and then each search
    /// directory. Returns the path that was opened.
    pub fn include(&mut self, name: &str) -> std::result::Result<String, String> {
        if self.files.len() >= INCLUDE_DEPTH {
            return Err("include file nesting limit exceeded".to_string());
        }
        let candidates = std::iter::once(PathBuf::from(name))
            .chain(self.search.iter().map(|dir| Path::new(dir).join(name)));
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            let path = path.to_string_lossy().into_owned();
            if let Ok(source) = FileSource::open(&path) {
                self.files.push(Box::new(source));
                return Ok(path);
            }
        }
        Err(format!("cannot open include file \"{}\"", name))
    }

    // ------------------------------------------------------------------------
    // REPEAT blocks

    pub fn repeat_active(&self) -> bool {
        !self.repeats.is_empty()
    }

    /// True while the innermost block is being skipped.
    pub fn repeat_skip(&self) -> bool {
        self.repeats.last().is_some_and(|r| r.skip)
    }

    /// True if an iteration of a REPEAT block is running.
    pub fn repeat_running(&self) -> bool {
        self.repeats.last().is_some_and(|r| r.cnt >= 0)
    }

    /// Open a block that runs `count` times. Fails when nested too deep.
    pub fn repeat_push(&mut self, count: i32) -> bool {
        if self.repeats.len() >= REPEAT_DEPTH {
            return false;
        }
        self.repeats.push(Repeat {
            head: self.pos,
            num: 0,
            cnt: count - 1,
            skip: count == 0,
        });
        true
    }

    /// Close one iteration. Returns its number, or `None` without a block.
    pub fn repeat_end(&mut self) -> Option<i32> {
        let top = self.repeats.last_mut()?;
        let num = top.num;
        top.cnt -= 1;
        top.num += 1;
        if top.cnt < 0 {
            self.repeat_pop();
        } else {
            self.pos = top.head;
        }
        Some(num)
    }

    /// Skip to the ENDR of the current block and stop looping.
    pub fn repeat_break(&mut self) {
        if let Some(top) = self.repeats.last_mut() {
            top.skip = true;
            top.cnt = 0;
        }
    }

    fn repeat_pop(&mut self) {
        self.repeats.pop();
        if self.repeats.is_empty() {
            self.buffer.clear();
            self.pos = 0;
        }
    }

    pub fn repeat_reset(&mut self) {
        while !self.repeats.is_empty() {
            self.repeat_pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(fetch: Fetch) -> String {
        match fetch {
            Fetch::Line(line) => line.text,
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn replay() {
        let src = TextSource::new("t.asm", "a\nb\nc\nd");
        let mut reader = Reader::new(Box::new(src), vec![]);
        assert_eq!(text(reader.next_line()), "a");
        assert!(reader.repeat_push(2));
        assert_eq!(text(reader.next_line()), "b");
        assert_eq!(text(reader.next_line()), "c");
        assert_eq!(reader.repeat_end(), Some(0));
        assert_eq!(text(reader.next_line()), "b");
        assert_eq!(text(reader.next_line()), "c");
        assert_eq!(reader.repeat_end(), Some(1));
        assert!(!reader.repeat_active());
        assert_eq!(text(reader.next_line()), "d");
        assert_eq!(reader.next_line(), Fetch::Eof);
        assert!(reader.at_eof());
    }

    #[test]
    fn nesting_limit() {
        let mut reader = Reader::new(Box::new(TextSource::new("t", "")), vec![]);
        for _ in 0..REPEAT_DEPTH {
            assert!(reader.repeat_push(1));
        }
        assert!(!reader.repeat_push(1));
        reader.repeat_reset();
        assert!(!reader.repeat_active());
        assert!(reader.include("no/such/file.asm").is_err());
    }
}
