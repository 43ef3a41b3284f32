//! Row index builder
//!
//! A single forward scan over the file records, for each logical row, where
//! its content starts, how long it is, and how many bytes it occupies
//! including its terminator and any blank lines that follow. Row contents are
//! never materialized; memory beyond the span vector is one read buffer.
//!
//! ```text
//! preamble | row 0 content | \r\n | (blank lines) | row 1 content | \n | ...
//!          |<--- len ----->|
//!          |<------------- extent ------------->|
//! ```
//!
//! Invariant: `preamble + Σ extent == file size`.

use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader};
use std::ops::Range;
use std::path::Path;
use std::time::SystemTime;

use crate::codec::{Codec, FieldScanner};
use crate::error::{Result, ViewerError};
use crate::util::cancel::CancelToken;

const READ_BUFFER: usize = 64 * 1024;

/// Byte location of one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    /// Absolute offset of the first content byte
    pub offset: u64,
    /// Content length, terminator excluded
    pub len: u32,
    /// Bytes owned by this row: content, terminator, trailing blank lines
    pub extent: u32,
}

impl RowSpan {
    pub fn content(&self) -> Range<u64> {
        self.offset..self.offset + u64::from(self.len)
    }

    /// Terminator plus trailing blank lines
    pub fn tail(&self) -> Range<u64> {
        self.offset + u64::from(self.len)..self.end()
    }

    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.extent)
    }

    pub fn has_terminator(&self) -> bool {
        self.extent > self.len
    }
}

/// Line terminator style of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// Size and modification time of a file when it was indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }

    pub fn of(path: &Path) -> io::Result<Self> {
        std::fs::metadata(path).map(|m| Self::from_metadata(&m))
    }
}

/// Row boundary rules for a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRules {
    /// Line breaks inside quotes do not end a row (CSV)
    pub quote: Option<u8>,
    /// Field separator; a quote only opens a quoted field right after it
    pub delimiter: u8,
    /// Trailing whitespace is not row content (JSON-Lines)
    pub trim_trailing_whitespace: bool,
}

impl ScanRules {
    pub fn csv(quote: u8) -> Self {
        Self {
            quote: Some(quote),
            delimiter: b',',
            trim_trailing_whitespace: false,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn json_lines() -> Self {
        Self {
            quote: None,
            delimiter: b',',
            trim_trailing_whitespace: true,
        }
    }

    pub fn for_codec(codec: &Codec) -> Self {
        match codec {
            Codec::Csv(csv) => Self::csv(csv.quote).with_delimiter(csv.delimiter.byte()),
            Codec::JsonLines(_) => Self::json_lines(),
        }
    }
}

/// Byte offsets of every logical row in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIndex {
    spans: Vec<RowSpan>,
    preamble: u64,
    file_len: u64,
    line_ending: LineEnding,
    ends_with_newline: bool,
    stamp: Option<FileStamp>,
}

impl RowIndex {
    /// Scan `path` once and index its rows
    pub fn build(path: &Path, rules: ScanRules, cancel: &CancelToken) -> Result<Self> {
        let file = File::open(path).map_err(|e| ViewerError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| ViewerError::io(path, e))?;
        let stamp = FileStamp::from_metadata(&metadata);

        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        let mut scanner = Scanner::new(rules);

        loop {
            let chunk = match reader.fill_buf() {
                Ok(chunk) => chunk,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ViewerError::io(path, e)),
            };
            if chunk.is_empty() {
                break;
            }
            let consumed = chunk.len();
            scanner.feed(chunk, cancel)?;
            reader.consume(consumed);
        }

        let mut index = scanner.finish()?;
        index.stamp = Some(stamp);

        tracing::debug!(
            "Indexed {} rows ({} bytes) in {}",
            index.len(),
            index.file_len,
            path.display()
        );

        Ok(index)
    }

    /// Index an in-memory buffer (no file stamp)
    pub fn from_bytes(bytes: &[u8], rules: ScanRules) -> Result<Self> {
        let mut scanner = Scanner::new(rules);
        scanner.feed(bytes, &CancelToken::new())?;
        scanner.finish()
    }

    /// Number of rows
    pub fn len(&self) -> u64 {
        self.spans.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span(&self, row: u64) -> Option<RowSpan> {
        usize::try_from(row)
            .ok()
            .and_then(|i| self.spans.get(i))
            .copied()
    }

    pub fn spans(&self) -> &[RowSpan] {
        &self.spans
    }

    /// Leading blank bytes before the first row
    pub fn preamble(&self) -> u64 {
        self.preamble
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Whether the last byte of the file is a newline (true for empty files)
    pub fn ends_with_newline(&self) -> bool {
        self.ends_with_newline
    }

    pub fn stamp(&self) -> Option<FileStamp> {
        self.stamp
    }

    /// Contiguous byte range covering rows `rows.start..rows.end`, extents included
    pub fn byte_range(&self, rows: Range<u64>) -> Option<Range<u64>> {
        if rows.is_empty() {
            return None;
        }
        let first = self.span(rows.start)?;
        let last = self.span(rows.end - 1)?;
        Some(first.offset..last.end())
    }

    /// Whether the file at `path` no longer matches the stamp taken at scan time
    pub fn is_stale(&self, path: &Path) -> io::Result<bool> {
        let Some(stamp) = self.stamp else {
            return Ok(false);
        };
        Ok(FileStamp::of(path)? != stamp)
    }
}

/// Incremental row-boundary state machine
struct Scanner {
    rules: ScanRules,
    pos: u64,
    row_start: u64,
    content_end: u64,
    fields: Option<FieldScanner>,
    prev_cr: bool,
    last_byte: Option<u8>,
    spans: Vec<RowSpan>,
    preamble: u64,
    line_ending: Option<LineEnding>,
}

impl Scanner {
    fn new(rules: ScanRules) -> Self {
        Self {
            rules,
            pos: 0,
            row_start: 0,
            content_end: 0,
            fields: rules.quote.map(|q| FieldScanner::new(rules.delimiter, q)),
            prev_cr: false,
            last_byte: None,
            spans: Vec::new(),
            preamble: 0,
            line_ending: None,
        }
    }

    fn feed(&mut self, chunk: &[u8], cancel: &CancelToken) -> Result<()> {
        for &b in chunk {
            let row_end = match self.fields.as_mut() {
                Some(fields) => fields.step(b),
                None => b == b'\n',
            };
            let in_quotes = self.in_quotes();
            if row_end {
                let content_end = self.line_content_end();
                self.end_line(self.pos + 1, content_end, true)?;
                if cancel.is_cancelled() {
                    return Err(ViewerError::Cancelled);
                }
            }

            if !self.rules.trim_trailing_whitespace || !b.is_ascii_whitespace() {
                if b != b'\n' || in_quotes {
                    self.content_end = self.pos + 1;
                }
            }

            self.prev_cr = b == b'\r';
            self.last_byte = Some(b);
            self.pos += 1;
        }
        Ok(())
    }

    fn in_quotes(&self) -> bool {
        self.fields.as_ref().map_or(false, FieldScanner::in_quotes)
    }

    /// End of row content for the line ending at `self.pos`
    fn line_content_end(&self) -> u64 {
        if self.rules.trim_trailing_whitespace {
            self.content_end.max(self.row_start)
        } else if self.prev_cr && self.pos > self.row_start {
            self.pos - 1
        } else {
            self.pos
        }
    }

    fn end_line(&mut self, line_end: u64, content_end: u64, terminated: bool) -> Result<()> {
        let len = content_end - self.row_start;

        if len == 0 {
            match self.spans.last_mut() {
                Some(last) => last.extent = to_u32(line_end - last.offset, last.offset)?,
                None => self.preamble = line_end,
            }
        } else {
            self.spans.push(RowSpan {
                offset: self.row_start,
                len: to_u32(len, self.row_start)?,
                extent: to_u32(line_end - self.row_start, self.row_start)?,
            });
            if terminated && self.line_ending.is_none() {
                self.line_ending = Some(if self.prev_cr {
                    LineEnding::CrLf
                } else {
                    LineEnding::Lf
                });
            }
        }

        self.row_start = line_end;
        self.content_end = line_end;
        Ok(())
    }

    fn finish(mut self) -> Result<RowIndex> {
        if self.in_quotes() {
            return Err(ViewerError::MalformedInput {
                offset: self.row_start,
                message: "unterminated quoted field at end of file".to_string(),
            });
        }

        if self.row_start < self.pos {
            let content_end = self.line_content_end();
            self.end_line(self.pos, content_end, false)?;
        }

        Ok(RowIndex {
            spans: self.spans,
            preamble: self.preamble,
            file_len: self.pos,
            line_ending: self.line_ending.unwrap_or_default(),
            ends_with_newline: self.last_byte.map_or(true, |b| b == b'\n'),
            stamp: None,
        })
    }
}

fn to_u32(value: u64, offset: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| ViewerError::MalformedInput {
        offset,
        message: format!("row of {} bytes exceeds the 4 GiB row limit", value),
    })
}
