//! Error taxonomy for the viewer engine
//!
//! Every fallible operation in the crate returns [`Result`]. Per-row decode
//! failures are not errors at the facade level: they surface inside
//! [`crate::session::ViewRow`] so the rest of the file stays viewable.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::util::file_validation::FileOpenError;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Read or write failure; the operation was aborted without touching state
    #[error("I/O failure on {}: {source}", .path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file failed validation before the scan started
    #[error("cannot open {}: {reason}", .path.display())]
    CannotOpen { path: PathBuf, reason: FileOpenError },

    /// A row boundary could not be determined while indexing
    #[error("malformed input at byte {offset}: {message}")]
    MalformedInput { offset: u64, message: String },

    /// A single row could not be decoded
    #[error("malformed row {row}: {message}")]
    MalformedRow { row: u64, message: String },

    /// The file changed on disk since the index was built
    #[error("{} changed on disk; reload required", .path.display())]
    StaleIndex { path: PathBuf },

    /// Caller supplied a structurally invalid edit; nothing was recorded
    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    /// An option could not be applied (non-ASCII delimiter, zero capacity, ...)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another session already owns this path
    #[error("{} is already open", .0.display())]
    AlreadyOpen(PathBuf),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    /// Save was interrupted; the original file is intact and the save can be retried
    #[error("save to {} interrupted, original left intact: {source}", .path.display())]
    PartialWriteRecoverable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A long-running scan or save observed its cancel token
    #[error("operation cancelled")]
    Cancelled,

    /// The session was closed while a background request was still queued
    #[error("session closed")]
    SessionClosed,
}

impl ViewerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_edit(message: impl Into<String>) -> Self {
        Self::InvalidEdit(message.into())
    }

    /// Benign no-ops the UI can ignore (e.g. pressing undo with an empty log)
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NothingToUndo | Self::NothingToRedo)
    }

    /// Whether retrying the same operation later can succeed without user action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IoFailure { .. } | Self::PartialWriteRecoverable { .. } | Self::Cancelled
        )
    }
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
