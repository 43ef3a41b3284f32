//! Delimited (CSV/TSV/PSV) row codec using the csv crate
//!
//! Decoding is RFC 4180 compliant with a configurable delimiter and quote
//! character. Encoding quotes only what must be quoted so unedited cells do
//! not pick up spurious diffs.

use super::value::{CellValue, RowValue};
use super::CodecError;

/// Supported CSV delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
    Pipe,
    Semicolon,
    /// Any other single ASCII byte
    Other(u8),
}

impl Delimiter {
    /// Get the byte for this delimiter
    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
            Delimiter::Semicolon => b';',
            Delimiter::Other(b) => b,
        }
    }

    /// Map a user supplied character to a delimiter
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            ',' => Some(Delimiter::Comma),
            '\t' => Some(Delimiter::Tab),
            '|' => Some(Delimiter::Pipe),
            ';' => Some(Delimiter::Semicolon),
            c if c.is_ascii() && c != '\n' && c != '\r' => Some(Delimiter::Other(c as u8)),
            _ => None,
        }
    }

    /// Detect delimiter from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "tsv" => Delimiter::Tab,
            "psv" => Delimiter::Pipe,
            _ => Delimiter::Comma,
        }
    }
}

/// Detect delimiter by analyzing first few lines
pub fn detect_delimiter(content: &str) -> Delimiter {
    let first_lines: String = content.lines().take(5).collect::<Vec<_>>().join("\n");

    let comma_count = first_lines.matches(',').count();
    let tab_count = first_lines.matches('\t').count();
    let pipe_count = first_lines.matches('|').count();
    let semi_count = first_lines.matches(';').count();

    let max = comma_count.max(tab_count).max(pipe_count).max(semi_count);

    if max == 0 {
        return Delimiter::Comma;
    }

    if tab_count == max {
        Delimiter::Tab
    } else if pipe_count == max {
        Delimiter::Pipe
    } else if semi_count == max {
        Delimiter::Semicolon
    } else {
        Delimiter::Comma
    }
}

/// Codec for one delimited row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvCodec {
    pub delimiter: Delimiter,
    pub quote: u8,
}

impl Default for CsvCodec {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            quote: b'"',
        }
    }
}

impl CsvCodec {
    pub fn new(delimiter: Delimiter, quote: u8) -> Self {
        Self { delimiter, quote }
    }

    /// Decode the raw bytes of one row (without its terminator)
    pub fn decode(&self, raw: &[u8]) -> Result<RowValue, CodecError> {
        check_quoting(raw, self.delimiter.byte(), self.quote)?;
        if raw.is_empty() {
            return Ok(RowValue::text([""]));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter.byte())
            .quote(self.quote)
            .has_headers(false)
            .flexible(true)
            .from_reader(raw);

        let mut records = reader.records();
        let record = match records.next() {
            Some(Ok(record)) => record,
            Some(Err(e)) => return Err(CodecError::new(e.to_string())),
            None => return Ok(RowValue::text([""])),
        };
        if records.next().is_some() {
            return Err(CodecError::new("row spans more than one record"));
        }

        Ok(RowValue::text(record.iter()))
    }

    /// Encode a row without a trailing terminator
    pub fn encode(&self, row: &RowValue) -> Vec<u8> {
        let cells: Vec<String> = match row {
            RowValue::Fields(cells) => cells.iter().map(CellValue::display_text).collect(),
            other => other.texts(),
        };

        // A lone empty field must stay distinguishable from a blank line
        if cells.len() == 1 && cells[0].is_empty() {
            return vec![self.quote, self.quote];
        }

        let mut out = Vec::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter.byte());
            }
            out.extend_from_slice(&escape_csv_value(cell, self.delimiter, self.quote));
        }
        out
    }

    /// CSV stores text only
    pub fn normalize_cell(&self, value: CellValue) -> CellValue {
        match value {
            CellValue::Text(_) => value,
            other => CellValue::Text(other.display_text()),
        }
    }

    pub fn normalize_row(&self, row: RowValue) -> RowValue {
        match row {
            RowValue::Fields(cells) => {
                RowValue::Fields(cells.into_iter().map(|c| self.normalize_cell(c)).collect())
            }
            other => RowValue::text(other.texts()),
        }
    }
}

/// Quote a field only when it contains the delimiter, the quote, or a line break
pub fn escape_csv_value(value: &str, delimiter: Delimiter, quote: u8) -> Vec<u8> {
    let bytes = value.as_bytes();
    let needs_quotes = bytes
        .iter()
        .any(|&b| b == delimiter.byte() || b == quote || b == b'\n' || b == b'\r');

    if !needs_quotes {
        return bytes.to_vec();
    }

    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(quote);
    for &b in bytes {
        if b == quote {
            out.push(quote);
        }
        out.push(b);
    }
    out.push(quote);
    out
}

/// Whether every opened quote is closed again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    /// A quote inside a quoted field: the closing quote or half of `""`
    QuoteInQuoted,
}

/// Byte-at-a-time tracker of CSV quoting
///
/// A quote only opens a quoted field at the start of a field. Anywhere else
/// it is recorded as stray, which makes the row malformed without hiding the
/// line breaks of the rows after it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldScanner {
    delimiter: u8,
    quote: u8,
    state: FieldState,
    stray_quote: bool,
}

impl FieldScanner {
    pub(crate) fn new(delimiter: u8, quote: u8) -> Self {
        Self {
            delimiter,
            quote,
            state: FieldState::Start,
            stray_quote: false,
        }
    }

    /// Advance over `b`; true when `b` is a line feed that ends the row
    pub(crate) fn step(&mut self, b: u8) -> bool {
        match self.state {
            FieldState::Quoted => {
                if b == self.quote {
                    self.state = FieldState::QuoteInQuoted;
                }
                false
            }
            FieldState::QuoteInQuoted if b == self.quote => {
                self.state = FieldState::Quoted;
                false
            }
            state => {
                if b == b'\n' {
                    self.state = FieldState::Start;
                    self.stray_quote = false;
                    return true;
                }
                if b == self.delimiter {
                    self.state = FieldState::Start;
                    return false;
                }
                if b == self.quote && state == FieldState::Start {
                    self.state = FieldState::Quoted;
                    return false;
                }
                if b == self.quote || (state == FieldState::QuoteInQuoted && b != b'\r') {
                    self.stray_quote = true;
                }
                self.state = FieldState::Unquoted;
                false
            }
        }
    }

    /// Inside a quoted field, where line breaks are content
    pub(crate) fn in_quotes(&self) -> bool {
        self.state == FieldState::Quoted
    }
}

fn check_quoting(raw: &[u8], delimiter: u8, quote: u8) -> Result<(), CodecError> {
    let mut fields = FieldScanner::new(delimiter, quote);
    for &b in raw {
        fields.step(b);
        if fields.stray_quote {
            return Err(CodecError::new("stray quote inside an unquoted field"));
        }
    }
    if fields.in_quotes() {
        return Err(CodecError::new("unterminated quoted field"));
    }
    Ok(())
}
