//! One open table file
//!
//! A [`ViewerSession`] owns the row index, the row cache and the edit log of
//! exactly one file. Reads resolve the edit log first and fall back to the
//! cache, which decodes from disk on a miss.
//!
//! Locking: session state sits behind a `RwLock`. Mutations take the write
//! lock and are serialized; reads share the read lock. The file handle and
//! the cache are behind a `Mutex` that is only taken while holding the state
//! lock, always in that order.

use std::collections::HashSet;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::{BackingRows, CacheStats, RowCache};
use crate::codec::{CellValue, Codec, FileFormat, RowValue};
use crate::config::OpenOptions;
use crate::error::{Result, ViewerError};
use crate::events::{EventHub, ViewerEvent};
use crate::history::{EditLog, EditRecord, RowKey};
use crate::index::{LineEnding, RowIndex, ScanRules};
use crate::persist::{self, SaveSource};
use crate::util::cancel::CancelToken;
use crate::watcher::FileWatcher;
use crate::worker::RowFetcher;

/// Canonical paths with a live session
pub(crate) type Registry = Arc<Mutex<HashSet<PathBuf>>>;

/// A row as presented to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    /// Logical row number
    pub number: u64,
    pub data: RowData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowData {
    Value(RowValue),
    /// The row could not be decoded; shown raw instead of failing the view
    Malformed { raw: String, reason: String },
}

impl ViewRow {
    pub fn value(&self) -> Option<&RowValue> {
        match &self.data {
            RowData::Value(v) => Some(v),
            RowData::Malformed { .. } => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.data, RowData::Malformed { .. })
    }

    /// Cell texts, or the raw line for a malformed row
    pub fn texts(&self) -> Vec<String> {
        match &self.data {
            RowData::Value(v) => v.texts(),
            RowData::Malformed { raw, .. } => vec![raw.clone()],
        }
    }
}

struct SessionState {
    path: PathBuf,
    codec: Codec,
    index: RowIndex,
    log: EditLog,
    options: OpenOptions,
}

struct RowStore {
    file: File,
    cache: RowCache,
}

/// Shared between the session handle and its background fetchers
pub(crate) struct SessionInner {
    state: RwLock<SessionState>,
    store: Mutex<RowStore>,
    events: EventHub,
    registry: Registry,
    closed: AtomicBool,
    stale: AtomicBool,
    watcher: Mutex<Option<FileWatcher>>,
}

impl SessionInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ViewerError::SessionClosed);
        }
        Ok(())
    }

    /// Fail with `StaleIndex` if the file no longer matches the index
    ///
    /// Always compares the file stamp; used before mutations and saves.
    fn ensure_fresh(&self, state: &SessionState) -> Result<()> {
        self.ensure_open()?;
        if self.detect_stale(state) {
            return Err(ViewerError::StaleIndex {
                path: state.path.clone(),
            });
        }
        Ok(())
    }

    /// Read-path variant of [`Self::ensure_fresh`]
    ///
    /// With a watcher running, the stamp is only compared after it reports
    /// an event for the file.
    fn ensure_readable(&self, state: &SessionState) -> Result<()> {
        self.ensure_open()?;
        if self.stale_hinted(state) {
            return Err(ViewerError::StaleIndex {
                path: state.path.clone(),
            });
        }
        Ok(())
    }

    fn stale_hinted(&self, state: &SessionState) -> bool {
        let hinted = self.watcher.lock().as_ref().map(FileWatcher::poll_changed);
        match hinted {
            Some(false) => self.stale.load(Ordering::Acquire),
            _ => self.detect_stale(state),
        }
    }

    fn detect_stale(&self, state: &SessionState) -> bool {
        if self.stale.load(Ordering::Acquire) {
            return true;
        }

        let changed = match state.index.is_stale(&state.path) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", state.path.display(), e);
                true
            }
        };

        if changed && !self.stale.swap(true, Ordering::AcqRel) {
            tracing::warn!("{} changed on disk, reload required", state.path.display());
            self.events.emit(ViewerEvent::ExternalChange {
                path: state.path.clone(),
            });
        }
        changed
    }

    pub(crate) fn rows(&self, range: Range<u64>) -> Result<Vec<ViewRow>> {
        let state = self.state.read();
        self.ensure_readable(&state)?;

        let end = range.end.min(state.log.row_count());
        let start = range.start.min(end);
        let mut store = self.store.lock();

        (start..end)
            .map(|number| {
                Ok(ViewRow {
                    number,
                    data: load_row(&state, &mut store, number)?,
                })
            })
            .collect()
    }

    /// Warm the cache for logical rows `range`; returns rows decoded
    pub(crate) fn prefetch(&self, range: Range<u64>) -> Result<usize> {
        let state = self.state.read();
        self.ensure_readable(&state)?;

        let end = range.end.min(state.log.row_count());
        let start = range.start.min(end);
        let end = end.min(start.saturating_add(state.options.cache_capacity_rows as u64));

        let mut store = self.store.lock();
        let RowStore { file, cache } = &mut *store;
        let mut source = BackingRows {
            file,
            path: &state.path,
            index: &state.index,
            codec: state.codec,
        };

        // Warm contiguous runs of base rows; inserted rows live in the log
        let mut warmed = 0;
        let mut run: Option<Range<u64>> = None;
        for row in start..end {
            match state.log.resolve(row) {
                Some(RowKey::Base(n)) => {
                    if matches!(&run, Some(r) if r.end == n) {
                        if let Some(r) = run.as_mut() {
                            r.end += 1;
                        }
                    } else if let Some(done) = run.replace(n..n + 1) {
                        warmed += cache.prefetch(done, &mut source)?;
                    }
                }
                _ => {
                    if let Some(done) = run.take() {
                        warmed += cache.prefetch(done, &mut source)?;
                    }
                }
            }
        }
        if let Some(done) = run {
            warmed += cache.prefetch(done, &mut source)?;
        }

        tracing::debug!("Prefetched {} rows for {}..{}", warmed, start, end);
        Ok(warmed)
    }

    fn notify_change(&self, record: &EditRecord, rows: u64) {
        let row = record.row();
        if record.is_structural() {
            self.events.emit(ViewerEvent::RowCountChanged { rows });
            self.events.emit(ViewerEvent::RowsChanged {
                start: row,
                end: rows.max(row + 1),
            });
        } else {
            self.events.emit(ViewerEvent::RowsChanged {
                start: row,
                end: row + 1,
            });
        }
    }

    fn save_locked(&self, state: &mut SessionState, target: &Path, cancel: &CancelToken) -> Result<u64> {
        let source = SaveSource {
            path: &state.path,
            index: &state.index,
            codec: state.codec,
        };
        let bytes = persist::save(source, &state.log, target, cancel)?;

        self.rebaseline(state, target)?;
        self.events.emit(ViewerEvent::Saved {
            path: target.to_path_buf(),
            bytes,
        });
        Ok(bytes)
    }

    /// Adopt the file just written as the new baseline
    fn rebaseline(&self, state: &mut SessionState, path: &Path) -> Result<()> {
        state.path = path.to_path_buf();

        let rebuilt = RowIndex::build(path, ScanRules::for_codec(&state.codec), &CancelToken::new())
            .and_then(|index| {
                let file = File::open(path).map_err(|e| ViewerError::io(path, e))?;
                Ok((index, file))
            });
        let (index, file) = match rebuilt {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                // The file on disk is ahead of the log now; force a reload
                self.stale.store(true, Ordering::Release);
                return Err(e);
            }
        };

        {
            let mut store = self.store.lock();
            store.file = file;
            store.cache.clear();
        }
        state.log.clear(index.len());
        state.index = index;
        self.stale.store(false, Ordering::Release);
        Ok(())
    }

    fn watch(&self, path: &Path, enabled: bool) {
        let watcher = if enabled {
            match FileWatcher::new(path) {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!("Cannot watch {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };
        *self.watcher.lock() = watcher;
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let path = self.state.read().path.clone();
        self.registry.lock().remove(&path);
        self.watcher.lock().take();
        self.store.lock().cache.clear();

        tracing::info!("Closed {}", path.display());
        self.events.emit(ViewerEvent::Closed { path });
    }
}

/// Decode logical row `row`, applying the edit overlay
fn load_row(state: &SessionState, store: &mut RowStore, row: u64) -> Result<RowData> {
    let key = state.log.resolve(row).ok_or_else(|| {
        ViewerError::invalid_edit(format!(
            "row {} out of range ({} rows)",
            row,
            state.log.row_count()
        ))
    })?;

    match key {
        RowKey::Inserted(_) => {
            let value = state
                .log
                .inserted_value(key)
                .ok_or_else(|| ViewerError::invalid_edit(format!("inserted row {} has no value", row)))?;
            Ok(RowData::Value(state.log.overlay_row(key, value)))
        }
        RowKey::Base(n) => {
            let RowStore { file, cache } = store;
            let mut source = BackingRows {
                file,
                path: &state.path,
                index: &state.index,
                codec: state.codec,
            };
            match cache.get(n, &mut source) {
                Ok(value) => Ok(RowData::Value(state.log.overlay_row(key, value))),
                Err(ViewerError::MalformedRow { message, .. }) => {
                    tracing::debug!("Row {} of {} is malformed: {}", n, state.path.display(), message);
                    let raw = source.raw(n)?;
                    Ok(RowData::Malformed {
                        raw: String::from_utf8_lossy(&raw).into_owned(),
                        reason: message,
                    })
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Column count of row 0, if it decodes
fn expected_columns(state: &SessionState, store: &mut RowStore) -> Result<Option<usize>> {
    if state.log.row_count() == 0 {
        return Ok(None);
    }
    Ok(match load_row(state, store, 0)? {
        RowData::Value(v) => Some(v.cell_count()),
        RowData::Malformed { .. } => None,
    })
}

/// Canonical form of a path that may not exist yet
fn canonical_target(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return std::fs::canonicalize(path).map_err(|e| ViewerError::io(path, e));
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| ViewerError::InvalidConfig(format!("{} is not a file path", path.display())))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = std::fs::canonicalize(&parent).map_err(|e| ViewerError::io(&parent, e))?;
    Ok(parent.join(file_name))
}

/// Handle to one open file; dropping it closes the session
pub struct ViewerSession {
    inner: Arc<SessionInner>,
}

impl ViewerSession {
    /// Index `path` and set up the session; `path` must already be canonical
    /// and reserved in `registry`
    pub(crate) fn open(
        path: PathBuf,
        options: OpenOptions,
        cancel: &CancelToken,
        registry: Registry,
    ) -> Result<Self> {
        let codec = options.codec_for(&path)?;
        let index = RowIndex::build(&path, ScanRules::for_codec(&codec), cancel)?;
        let file = File::open(&path).map_err(|e| ViewerError::io(&path, e))?;

        tracing::info!(
            "Opened {} as {} ({} rows, {} bytes)",
            path.display(),
            codec.format().name(),
            index.len(),
            index.file_len()
        );

        let inner = Arc::new(SessionInner {
            store: Mutex::new(RowStore {
                file,
                cache: RowCache::new(options.cache_capacity_rows, options.cache_capacity_bytes),
            }),
            state: RwLock::new(SessionState {
                log: EditLog::new(index.len()),
                path: path.clone(),
                codec,
                index,
                options,
            }),
            events: EventHub::default(),
            registry,
            closed: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            watcher: Mutex::new(None),
        });
        inner.watch(&path, options.watch);

        Ok(Self { inner })
    }

    pub fn path(&self) -> PathBuf {
        self.inner.state.read().path.clone()
    }

    pub fn format(&self) -> FileFormat {
        self.inner.state.read().codec.format()
    }

    pub fn codec(&self) -> Codec {
        self.inner.state.read().codec
    }

    /// Size of the file as indexed
    pub fn file_len(&self) -> u64 {
        self.inner.state.read().index.file_len()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.inner.state.read().index.line_ending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.store.lock().cache.stats()
    }

    /// Backing row count adjusted by live inserts and deletes
    pub fn row_count(&self) -> u64 {
        self.inner.state.read().log.row_count()
    }

    /// Rows in `range`, clamped to the row count
    pub fn rows(&self, range: Range<u64>) -> Result<Vec<ViewRow>> {
        self.inner.rows(range)
    }

    pub fn row(&self, row: u64) -> Result<ViewRow> {
        let state = self.inner.state.read();
        self.inner.ensure_readable(&state)?;
        let mut store = self.inner.store.lock();
        Ok(ViewRow {
            number: row,
            data: load_row(&state, &mut store, row)?,
        })
    }

    /// Current value of one cell; `None` when the row has no such column
    pub fn cell(&self, row: u64, column: usize) -> Result<Option<CellValue>> {
        let state = self.inner.state.read();
        self.inner.ensure_readable(&state)?;

        if let Some(value) = state.log.effective_value(row, column) {
            return Ok(Some(value));
        }
        let mut store = self.inner.store.lock();
        match load_row(&state, &mut store, row)? {
            RowData::Value(v) => Ok(v.cell(column)),
            RowData::Malformed { reason, .. } => Err(ViewerError::MalformedRow {
                row,
                message: reason,
            }),
        }
    }

    pub fn prefetch(&self, range: Range<u64>) -> Result<usize> {
        self.inner.prefetch(range)
    }

    /// Indented JSON preview of a row (the raw line if it is malformed)
    pub fn pretty_row(&self, row: u64) -> Result<String> {
        Ok(match self.row(row)?.data {
            RowData::Value(v) => v.to_pretty_json(),
            RowData::Malformed { raw, .. } => raw,
        })
    }

    pub fn edit_cell(&self, row: u64, column: usize, value: impl Into<CellValue>) -> Result<()> {
        let mut state = self.inner.state.write();
        self.inner.ensure_fresh(&state)?;

        let current = {
            let mut store = self.inner.store.lock();
            load_row(&state, &mut store, row)?
        };
        let current = match current {
            RowData::Value(v) => v,
            RowData::Malformed { reason, .. } => {
                return Err(ViewerError::invalid_edit(format!(
                    "row {} is malformed and cannot be edited: {}",
                    row, reason
                )))
            }
        };
        let old_value = current.cell(column).ok_or_else(|| {
            ViewerError::invalid_edit(format!(
                "column {} out of range (row {} has {} columns)",
                column,
                row,
                current.cell_count()
            ))
        })?;
        let new_value = state.codec.normalize_cell(value.into());

        let record = EditRecord::CellEdit {
            row,
            column,
            old_value,
            new_value,
        };
        state.log.apply(record.clone())?;
        self.inner.notify_change(&record, state.log.row_count());
        Ok(())
    }

    /// Insert `value` so that it becomes logical row `at`
    pub fn insert_row(&self, at: u64, value: RowValue) -> Result<()> {
        let mut state = self.inner.state.write();
        self.inner.ensure_fresh(&state)?;

        let value = state.codec.normalize_row(value);
        if let Codec::Csv(_) = state.codec {
            if value.cell_count() == 0 {
                return Err(ViewerError::invalid_edit("cannot insert a row with no cells"));
            }
            if state.options.strict_columns {
                let mut store = self.inner.store.lock();
                if let Some(expected) = expected_columns(&state, &mut store)? {
                    if value.cell_count() != expected {
                        return Err(ViewerError::invalid_edit(format!(
                            "row has {} columns, expected {}",
                            value.cell_count(),
                            expected
                        )));
                    }
                }
            }
        }

        let record = EditRecord::RowInsert {
            at,
            value: Some(value),
        };
        state.log.apply(record.clone())?;
        self.inner.notify_change(&record, state.log.row_count());
        Ok(())
    }

    pub fn delete_row(&self, row: u64) -> Result<()> {
        let mut state = self.inner.state.write();
        self.inner.ensure_fresh(&state)?;

        let saved_value = {
            let mut store = self.inner.store.lock();
            match load_row(&state, &mut store, row)? {
                RowData::Value(v) => Some(v),
                RowData::Malformed { .. } => None,
            }
        };

        let record = EditRecord::RowDelete { row, saved_value };
        state.log.apply(record.clone())?;
        self.inner.notify_change(&record, state.log.row_count());
        Ok(())
    }

    /// Undo the latest live edit; returns the inverse that was applied
    pub fn undo(&self) -> Result<EditRecord> {
        let mut state = self.inner.state.write();
        self.inner.ensure_open()?;
        let record = state.log.undo().ok_or(ViewerError::NothingToUndo)?;
        self.inner.notify_change(&record, state.log.row_count());
        Ok(record)
    }

    /// Redo the most recently undone edit; returns it
    pub fn redo(&self) -> Result<EditRecord> {
        let mut state = self.inner.state.write();
        self.inner.ensure_open()?;
        let record = state.log.redo().ok_or(ViewerError::NothingToRedo)?;
        self.inner.notify_change(&record, state.log.row_count());
        Ok(record)
    }

    pub fn can_undo(&self) -> bool {
        self.inner.state.read().log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.state.read().log.can_redo()
    }

    /// Unsaved changes indicator
    pub fn is_modified(&self) -> bool {
        self.inner.state.read().log.is_dirty()
    }

    /// Live edits relative to the baseline, oldest first
    pub fn pending_edits(&self) -> Vec<EditRecord> {
        self.inner.state.read().log.pending()
    }

    pub fn save(&self) -> Result<u64> {
        self.save_with(&CancelToken::new())
    }

    /// Save in place; the saved file becomes the new baseline
    pub fn save_with(&self, cancel: &CancelToken) -> Result<u64> {
        let mut state = self.inner.state.write();
        self.inner.ensure_fresh(&state)?;
        let target = state.path.clone();
        self.inner.save_locked(&mut state, &target, cancel)
    }

    /// Save to `path` and continue editing that file instead
    pub fn save_as(&self, path: &Path, cancel: &CancelToken) -> Result<u64> {
        let target = canonical_target(path)?;
        let mut state = self.inner.state.write();
        self.inner.ensure_fresh(&state)?;

        let previous = state.path.clone();
        if target == previous {
            return self.inner.save_locked(&mut state, &target, cancel);
        }

        if !self.inner.registry.lock().insert(target.clone()) {
            return Err(ViewerError::AlreadyOpen(target));
        }

        match self.inner.save_locked(&mut state, &target, cancel) {
            Ok(bytes) => {
                self.inner.registry.lock().remove(&previous);
                self.inner.watch(&target, state.options.watch);
                Ok(bytes)
            }
            Err(e) => {
                // Whichever path the session ended up bound to keeps its claim
                let released = if state.path == target {
                    &previous
                } else {
                    &target
                };
                self.inner.registry.lock().remove(released);
                Err(e)
            }
        }
    }

    pub fn reload(&self) -> Result<Vec<EditRecord>> {
        self.reload_with(&CancelToken::new())
    }

    /// Rebuild the index from disk, returning the edits that were discarded
    ///
    /// A cancelled or failed scan leaves the session as it was.
    pub fn reload_with(&self, cancel: &CancelToken) -> Result<Vec<EditRecord>> {
        let mut state = self.inner.state.write();
        self.inner.ensure_open()?;

        let index = RowIndex::build(&state.path, ScanRules::for_codec(&state.codec), cancel)?;
        let file = File::open(&state.path).map_err(|e| ViewerError::io(&state.path, e))?;

        let discarded = state.log.pending();
        {
            let mut store = self.inner.store.lock();
            store.file = file;
            store.cache.clear();
        }
        state.log.clear(index.len());
        state.index = index;
        self.inner.stale.store(false, Ordering::Release);

        if !discarded.is_empty() {
            tracing::warn!(
                "Reload of {} discarded {} pending edits",
                state.path.display(),
                discarded.len()
            );
        }
        tracing::info!("Reloaded {} ({} rows)", state.path.display(), state.log.row_count());
        self.inner.events.emit(ViewerEvent::Reloaded {
            rows: state.log.row_count(),
        });
        Ok(discarded)
    }

    /// Compare the file on disk with the index; true once it has changed
    pub fn check_stale(&self) -> Result<bool> {
        let state = self.inner.state.read();
        self.inner.ensure_open()?;
        Ok(self.inner.detect_stale(&state))
    }

    /// Consult the file watcher (if any) and report whether the index is stale
    pub fn poll_external_changes(&self) -> Result<bool> {
        let state = self.inner.state.read();
        self.inner.ensure_open()?;
        Ok(self.inner.stale_hinted(&state))
    }

    pub fn subscribe(&self) -> Receiver<ViewerEvent> {
        self.inner.events.subscribe()
    }

    /// Background worker answering row requests for this session
    pub fn fetcher(&self) -> RowFetcher {
        RowFetcher::spawn(Arc::clone(&self.inner))
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ViewerSession")
            .field("path", &state.path)
            .field("format", &state.codec.format())
            .field("rows", &state.log.row_count())
            .finish()
    }
}
