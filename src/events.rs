//! Change notifications for UI repaint triggers

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::Mutex;

/// Something a subscriber may need to repaint for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Logical rows `start..end` show different values
    RowsChanged { start: u64, end: u64 },
    /// Inserts or deletes changed the row count
    RowCountChanged { rows: u64 },
    /// The session saved and adopted the file as its new baseline
    Saved { path: PathBuf, bytes: u64 },
    /// The index was rebuilt from disk; all rows may differ
    Reloaded { rows: u64 },
    /// The file changed on disk; reads fail with `StaleIndex` until reload
    ExternalChange { path: PathBuf },
    Closed { path: PathBuf },
}

/// Fan-out of events to every live subscriber
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<ViewerEvent>>>,
}

impl EventHub {
    pub fn subscribe(&self) -> Receiver<ViewerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send to all subscribers, dropping those whose receiver is gone
    pub fn emit(&self, event: ViewerEvent) {
        tracing::trace!("Event: {:?}", event);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
