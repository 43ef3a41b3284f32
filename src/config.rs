//! Viewer configuration persistence
//!
//! Stores user preferences in `~/.config/tabula/config.yaml`. Every field has
//! a default, so a partial file (or none at all) is fine.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{detect_delimiter, Codec, CsvCodec, Delimiter, FileFormat, JsonLinesCodec};
use crate::error::{Result, ViewerError};

/// Bytes read from the head of a file to guess its format and delimiter
const SNIFF_BYTES: u64 = 8 * 1024;

/// Viewer configuration that persists across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// CSV delimiter; inferred from extension or content when unset
    #[serde(default)]
    pub delimiter: Option<char>,

    #[serde(default = "default_quote_char")]
    pub quote_char: char,

    /// Maximum decoded rows kept in memory per session
    #[serde(default = "default_cache_capacity_rows")]
    pub cache_capacity_rows: usize,

    /// Maximum raw bytes of decoded rows kept in memory per session
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: usize,

    /// Force a format instead of inferring it from the extension
    #[serde(default)]
    pub format: Option<FileFormat>,

    /// Watch open files for external changes
    #[serde(default = "default_true")]
    pub watch_files: bool,

    /// Reject CSV inserts whose column count differs from row 0
    #[serde(default = "default_true")]
    pub strict_columns: bool,
}

fn default_quote_char() -> char {
    '"'
}

fn default_cache_capacity_rows() -> usize {
    10_000
}

fn default_cache_capacity_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote_char: default_quote_char(),
            cache_capacity_rows: default_cache_capacity_rows(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            format: None,
            watch_files: true,
            strict_columns: true,
        }
    }
}

impl ViewerConfig {
    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from a specific file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Validated per-open options derived from this config
    pub fn open_options(&self) -> Result<OpenOptions> {
        let delimiter = self
            .delimiter
            .map(|c| {
                Delimiter::from_char(c)
                    .ok_or_else(|| ViewerError::InvalidConfig(format!("unsupported delimiter {:?}", c)))
            })
            .transpose()?;

        let options = OpenOptions {
            format: self.format,
            delimiter,
            quote: ascii_byte(self.quote_char, "quote_char")?,
            cache_capacity_rows: self.cache_capacity_rows,
            cache_capacity_bytes: self.cache_capacity_bytes,
            strict_columns: self.strict_columns,
            watch: self.watch_files,
        };
        options.validate()?;
        Ok(options)
    }
}

fn ascii_byte(c: char, field: &str) -> Result<u8> {
    if c.is_ascii() && c != '\n' && c != '\r' {
        Ok(c as u8)
    } else {
        Err(ViewerError::InvalidConfig(format!(
            "{} must be a single ASCII character, got {:?}",
            field, c
        )))
    }
}

/// Options for opening one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub format: Option<FileFormat>,
    pub delimiter: Option<Delimiter>,
    pub quote: u8,
    pub cache_capacity_rows: usize,
    pub cache_capacity_bytes: usize,
    pub strict_columns: bool,
    pub watch: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            quote: b'"',
            cache_capacity_rows: default_cache_capacity_rows(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            strict_columns: true,
            watch: false,
        }
    }
}

impl OpenOptions {
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_cache_capacity(mut self, rows: usize, bytes: usize) -> Self {
        self.cache_capacity_rows = rows;
        self.cache_capacity_bytes = bytes;
        self
    }

    pub fn with_strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity_rows == 0 || self.cache_capacity_bytes == 0 {
            return Err(ViewerError::InvalidConfig(
                "cache capacities must be greater than zero".to_string(),
            ));
        }
        if self.delimiter.map(Delimiter::byte) == Some(self.quote) {
            return Err(ViewerError::InvalidConfig(
                "delimiter and quote character must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the codec for `path`
    ///
    /// Explicit options win, then the file extension, then a look at the
    /// first bytes of the file.
    pub fn codec_for(&self, path: &Path) -> Result<Codec> {
        self.validate()?;

        let ext_format = FileFormat::from_path(path);
        let ext_delimiter = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| matches!(e.to_lowercase().as_str(), "tsv" | "psv"))
            .map(Delimiter::from_extension);

        let needs_head = (self.format.is_none() && ext_format.is_none())
            || (self.delimiter.is_none() && ext_delimiter.is_none());
        let head = if needs_head { read_head(path)? } else { Vec::new() };

        let format = self
            .format
            .or(ext_format)
            .unwrap_or_else(|| FileFormat::sniff(&head));

        Ok(match format {
            FileFormat::JsonLines => Codec::JsonLines(JsonLinesCodec),
            FileFormat::Csv => {
                let delimiter = self
                    .delimiter
                    .or(ext_delimiter)
                    .unwrap_or_else(|| detect_delimiter(&String::from_utf8_lossy(&head)));
                if delimiter.byte() == self.quote {
                    return Err(ViewerError::InvalidConfig(
                        "delimiter and quote character must differ".to_string(),
                    ));
                }
                Codec::Csv(CsvCodec::new(delimiter, self.quote))
            }
        })
    }
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| ViewerError::io(path, e))?;
    let mut head = Vec::new();
    file.take(SNIFF_BYTES)
        .read_to_end(&mut head)
        .map_err(|e| ViewerError::io(path, e))?;
    Ok(head)
}
