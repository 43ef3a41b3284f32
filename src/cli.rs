//! Command-line argument parsing for the `tabula` binary
//!
//! Supports:
//! - Inspecting a file (format, rows, size)
//! - Printing a window of rows
//! - One-shot cell edits, row inserts and deletes, saved in place or elsewhere

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::codec::{CellValue, Codec, FileFormat, RowValue};
use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};

/// View and edit large CSV and JSON-Lines files
#[derive(Parser, Debug)]
#[command(
    name = "tabula",
    version,
    about = "View and edit large CSV and JSON-Lines files"
)]
pub struct CliArgs {
    #[command(flatten)]
    pub format: FormatArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for format inference, shared by every subcommand
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct FormatArgs {
    /// File format: csv or jsonl (default: inferred)
    #[arg(long, global = true, value_name = "FORMAT")]
    pub format: Option<FileFormat>,

    /// CSV delimiter, e.g. ',' ';' or 'tab' (default: inferred)
    #[arg(long, global = true, value_name = "CHAR", value_parser = parse_char)]
    pub delimiter: Option<char>,

    /// CSV quote character (default: '"')
    #[arg(long, global = true, value_name = "CHAR", value_parser = parse_char)]
    pub quote: Option<char>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct OutputArgs {
    /// Write the result here instead of overwriting the input
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Show format, row count and size
    Info { path: PathBuf },

    /// Print rows
    Show {
        path: PathBuf,

        /// First row to print (0-based)
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Number of rows to print
        #[arg(long, default_value_t = 20)]
        count: u64,

        /// Print each row as indented JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Set one cell
    Set {
        path: PathBuf,
        #[arg(long)]
        row: u64,
        #[arg(long)]
        col: usize,
        /// New value; parsed as JSON for JSON-Lines files when possible
        #[arg(long)]
        value: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Insert a row so it becomes row AT
    Insert {
        path: PathBuf,
        #[arg(long)]
        at: u64,
        /// The row, written the way it appears in the file
        #[arg(long)]
        value: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete a row
    Delete {
        path: PathBuf,
        #[arg(long)]
        row: u64,
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn parse_char(s: &str) -> std::result::Result<char, String> {
    match s {
        "tab" | "\\t" => Ok('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("expected a single character, got '{}'", s)),
            }
        }
    }
}

impl FormatArgs {
    /// Layer these flags over a loaded configuration
    pub fn apply(&self, config: &mut ViewerConfig) {
        if let Some(format) = self.format {
            config.format = Some(format);
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = Some(delimiter);
        }
        if let Some(quote) = self.quote {
            config.quote_char = quote;
        }
    }
}

/// Interpret a `--value` for `set`
///
/// CSV cells are text. For JSON-Lines, valid JSON is taken as-is so numbers
/// and booleans keep their type; anything else becomes a string.
pub fn parse_cell(text: &str, format: FileFormat) -> CellValue {
    match format {
        FileFormat::Csv => CellValue::from(text),
        FileFormat::JsonLines => serde_json::from_str::<serde_json::Value>(text)
            .map(CellValue::from)
            .unwrap_or_else(|_| CellValue::from(text)),
    }
}

/// Interpret a `--value` for `insert` as one row in the file's own syntax
pub fn parse_row(text: &str, codec: &Codec) -> Result<RowValue> {
    codec
        .decode(text.as_bytes())
        .map_err(|e| ViewerError::invalid_edit(format!("cannot parse row '{}': {}", text, e)))
}
