//! Row codecs
//!
//! Encode/decode a single row between raw bytes and a [`RowValue`]. The raw
//! bytes never include the line terminator; the index owns row boundaries.
//!
//! Law: for every row a codec produces (or normalizes), `decode(encode(v)) == v`.

mod delimited;
mod json_lines;
mod value;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) use delimited::FieldScanner;
pub use delimited::{detect_delimiter, escape_csv_value, CsvCodec, Delimiter};
pub use json_lines::JsonLinesCodec;
pub use value::{CellValue, RowValue};

/// A single row failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CodecError {
    pub message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// On-disk file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    #[serde(alias = "ndjson", alias = "jsonl")]
    JsonLines,
}

impl FileFormat {
    /// Infer the format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "psv" => Some(FileFormat::Csv),
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            _ => None,
        }
    }

    /// Guess the format from the first bytes of a file
    pub fn sniff(head: &[u8]) -> Self {
        match head.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => FileFormat::JsonLines,
            _ => FileFormat::Csv,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::JsonLines => "jsonl",
        }
    }
}

impl std::str::FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" | "tsv" | "psv" => Ok(FileFormat::Csv),
            "jsonl" | "ndjson" | "jsonlines" => Ok(FileFormat::JsonLines),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

/// Format-specific codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Csv(CsvCodec),
    JsonLines(JsonLinesCodec),
}

impl Codec {
    pub fn format(&self) -> FileFormat {
        match self {
            Codec::Csv(_) => FileFormat::Csv,
            Codec::JsonLines(_) => FileFormat::JsonLines,
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<RowValue, CodecError> {
        match self {
            Codec::Csv(c) => c.decode(raw),
            Codec::JsonLines(c) => c.decode(raw),
        }
    }

    pub fn encode(&self, row: &RowValue) -> Vec<u8> {
        match self {
            Codec::Csv(c) => c.encode(row),
            Codec::JsonLines(c) => c.encode(row),
        }
    }

    /// Coerce a caller supplied cell into the shape this codec round-trips
    pub fn normalize_cell(&self, value: CellValue) -> CellValue {
        match self {
            Codec::Csv(c) => c.normalize_cell(value),
            Codec::JsonLines(c) => c.normalize_cell(value),
        }
    }

    /// Coerce a caller supplied row into the shape this codec round-trips
    pub fn normalize_row(&self, row: RowValue) -> RowValue {
        match self {
            Codec::Csv(c) => c.normalize_row(row),
            Codec::JsonLines(c) => c.normalize_row(row),
        }
    }
}
