//! Checks run on a path before the row index scan starts
//!
//! The scan is a single long pass, so anything that would make it pointless
//! (missing file, directory, unreadable, binary content) is rejected up front
//! with a message the UI can show as-is.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

/// Bytes inspected when looking for binary content
const BINARY_PROBE_BYTES: usize = 8192;

/// Why a path cannot be opened as a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOpenError {
    NotFound,
    PermissionDenied,
    IsDirectory,
    /// Contains NUL bytes near the start
    BinaryFile,
    IoError(String),
}

impl FileOpenError {
    fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileOpenError::NotFound,
            io::ErrorKind::PermissionDenied => FileOpenError::PermissionDenied,
            _ => FileOpenError::IoError(e.to_string()),
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self, filename: &str) -> String {
        match self {
            Self::NotFound => format!("File not found: {}", filename),
            Self::PermissionDenied => format!("Permission denied: {}", filename),
            Self::IsDirectory => format!("Cannot open directory: {}", filename),
            Self::BinaryFile => format!("Not a text table: {}", filename),
            Self::IoError(msg) => format!("Error opening {}: {}", filename, msg),
        }
    }
}

impl std::fmt::Display for FileOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::IsDirectory => write!(f, "is a directory"),
            Self::BinaryFile => write!(f, "binary file"),
            Self::IoError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FileOpenError {}

/// Validate a file before indexing it
///
/// Checks that it exists, is not a directory, can be opened for reading, and
/// does not look binary. There is no size limit: the viewer never loads the
/// whole file.
pub fn validate_file_for_opening(path: &Path) -> Result<(), FileOpenError> {
    let metadata = fs::metadata(path).map_err(|e| FileOpenError::from_io(&e))?;

    if metadata.is_dir() {
        return Err(FileOpenError::IsDirectory);
    }

    let mut file = File::open(path).map_err(|e| FileOpenError::from_io(&e))?;
    let mut buffer = [0u8; BINARY_PROBE_BYTES];
    let bytes_read = file.read(&mut buffer).map_err(|e| FileOpenError::from_io(&e))?;

    if is_likely_binary(&buffer[..bytes_read]) {
        return Err(FileOpenError::BinaryFile);
    }

    Ok(())
}

/// NUL bytes are common in binary files and never valid in CSV or JSON text
pub fn is_likely_binary(head: &[u8]) -> bool {
    head.contains(&0)
}

/// Get the filename from a path for display in error messages
pub fn filename_for_display(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
