//! Windowed row cache
//!
//! LRU cache of decoded rows keyed by backing row number. Misses are decoded
//! through a [`RowSource`]; the cache never writes to the backing file. The
//! cache bounds memory by row count and by raw byte size, whichever binds
//! first.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use crate::codec::{Codec, RowValue};
use crate::error::{Result, ViewerError};
use crate::index::RowIndex;

/// Where the cache pulls rows from on a miss
pub trait RowSource {
    /// Decode backing row `row`
    fn load(&mut self, row: u64) -> Result<RowValue>;

    /// Approximate memory charged for `row` (its raw byte length)
    fn size_hint(&self, row: u64) -> usize;
}

/// Rows read straight from the indexed file
pub struct BackingRows<'a> {
    pub file: &'a mut File,
    pub path: &'a Path,
    pub index: &'a RowIndex,
    pub codec: Codec,
}

impl BackingRows<'_> {
    /// Raw content bytes of `row`, terminator excluded
    pub fn raw(&mut self, row: u64) -> Result<Vec<u8>> {
        let span = self.index.span(row).ok_or_else(|| {
            ViewerError::invalid_edit(format!(
                "row {} out of range ({} rows)",
                row,
                self.index.len()
            ))
        })?;

        let mut buf = vec![0u8; span.len as usize];
        self.file
            .seek(SeekFrom::Start(span.offset))
            .and_then(|_| self.file.read_exact(&mut buf))
            .map_err(|e| ViewerError::io(self.path, e))?;
        Ok(buf)
    }
}

impl RowSource for BackingRows<'_> {
    fn load(&mut self, row: u64) -> Result<RowValue> {
        let raw = self.raw(row)?;
        self.codec
            .decode(&raw)
            .map_err(|e| ViewerError::MalformedRow {
                row,
                message: e.message,
            })
    }

    fn size_hint(&self, row: u64) -> usize {
        self.index.span(row).map_or(0, |s| s.len as usize)
    }
}

/// One cached row
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub row: u64,
    pub value: RowValue,
    pub size: usize,
    pub last_access: u64,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub rows: usize,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct RowCache {
    entries: HashMap<u64, CacheEntry>,
    /// access tick -> row, oldest first
    recency: BTreeMap<u64, u64>,
    tick: u64,
    capacity_rows: usize,
    capacity_bytes: usize,
    used_bytes: usize,
    hits: u64,
    misses: u64,
}

impl RowCache {
    /// Create a cache; both capacities must be non-zero
    pub fn new(capacity_rows: usize, capacity_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            capacity_rows: capacity_rows.max(1),
            capacity_bytes: capacity_bytes.max(1),
            used_bytes: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity_rows(&self) -> usize {
        self.capacity_rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, row: u64) -> bool {
        self.entries.contains_key(&row)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            rows: self.entries.len(),
            bytes: self.used_bytes,
        }
    }

    /// Return row `row`, decoding it through `source` on a miss
    pub fn get(&mut self, row: u64, source: &mut dyn RowSource) -> Result<RowValue> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self.entries.get_mut(&row) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            self.recency.insert(tick, row);
            self.hits += 1;
            return Ok(entry.value.clone());
        }

        self.misses += 1;
        let value = source.load(row)?;
        let size = source.size_hint(row);
        self.insert(CacheEntry {
            row,
            value: value.clone(),
            size,
            last_access: tick,
        });
        Ok(value)
    }

    /// Drop a single row
    pub fn invalidate(&mut self, row: u64) {
        if let Some(entry) = self.entries.remove(&row) {
            self.recency.remove(&entry.last_access);
            self.used_bytes -= entry.size;
        }
    }

    /// Drop everything (after a save or reload the row numbers mean something else)
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.used_bytes = 0;
    }

    /// Warm a contiguous window so a following paint hits the cache
    ///
    /// The window is clamped to the row capacity. Rows that fail to decode
    /// are skipped; I/O failures abort. Returns the number of rows now cached
    /// from the window.
    pub fn prefetch(&mut self, range: Range<u64>, source: &mut dyn RowSource) -> Result<usize> {
        let end = range
            .end
            .min(range.start.saturating_add(self.capacity_rows as u64));
        let mut warmed = 0;

        for row in range.start..end {
            match self.get(row, source) {
                Ok(_) => warmed += 1,
                Err(ViewerError::MalformedRow { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(warmed)
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.used_bytes += entry.size;
        self.recency.insert(entry.last_access, entry.row);
        self.entries.insert(entry.row, entry);
        self.evict_over_capacity();
    }

    fn evict_over_capacity(&mut self) {
        while self.entries.len() > 1
            && (self.entries.len() > self.capacity_rows || self.used_bytes > self.capacity_bytes)
        {
            let Some((_, row)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&row) {
                self.used_bytes -= entry.size;
                tracing::trace!("Evicted row {} from cache", row);
            }
        }
    }
}
