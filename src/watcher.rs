//! External change watching for an open table file
//!
//! Uses the `notify` crate with debouncing. The parent directory is watched
//! (editors and our own saves replace files by rename, which a watch on the
//! file itself would lose) and events are filtered down to the one file.
//! An event is only a hint: the session decides staleness by comparing the
//! file stamp.

use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind, Debouncer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(300);

pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    rx: Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    file: PathBuf,
    file_name: OsString,
}

impl FileWatcher {
    /// Start watching `file` for modifications, replacement and removal
    pub fn new(file: &Path) -> Result<Self, notify::Error> {
        let file_name = file
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| notify::Error::path_not_found().add_path(file.to_path_buf()))?;
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, tx)?;
        debouncer
            .watcher()
            .watch(&dir, notify::RecursiveMode::NonRecursive)?;

        tracing::debug!("Watching {} for external changes", file.display());

        Ok(Self {
            _debouncer: debouncer,
            rx,
            file: file.to_path_buf(),
            file_name,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Drain pending events (non-blocking); true if any touched the file
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;

        while let Ok(result) = self.rx.try_recv() {
            match result {
                Ok(events) => {
                    changed |= events.iter().any(|event| {
                        !matches!(event.kind, DebouncedEventKind::AnyContinuous)
                            && self.is_target(&event.path)
                    });
                }
                Err(e) => {
                    tracing::warn!("File watcher error for {}: {:?}", self.file.display(), e);
                }
            }
        }

        if changed {
            tracing::debug!("Watcher saw a change to {}", self.file.display());
        }
        changed
    }

    fn is_target(&self, path: &Path) -> bool {
        path.file_name() == Some(self.file_name.as_os_str())
    }
}
