//! Utility modules

pub mod cancel;
pub mod file_validation;

pub use cancel::CancelToken;
pub use file_validation::{filename_for_display, validate_file_for_opening, FileOpenError};
