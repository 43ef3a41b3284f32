//! tabula - streaming viewer/editor engine for large CSV and JSON-Lines files
//!
//! A file is indexed once (byte offsets per row, contents stay on disk) and
//! presented as a randomly addressable grid. Edits live in an undoable log
//! layered over the file until a save merges them back atomically.

pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod config_paths;
pub mod error;
pub mod events;
pub mod history;
pub mod index;
pub mod persist;
pub mod session;
pub mod tracing;
pub mod util;
pub mod viewer;
pub mod watcher;
pub mod worker;

// Re-export commonly used types
pub use codec::{CellValue, Codec, FileFormat, RowValue};
pub use config::{OpenOptions, ViewerConfig};
pub use error::{Result, ViewerError};
pub use events::ViewerEvent;
pub use history::EditRecord;
pub use session::{RowData, ViewRow, ViewerSession};
pub use util::CancelToken;
pub use viewer::Viewer;
pub use worker::{FetchResponse, FetchResult, RowFetcher};
