//! Edit log (undo/redo) for the tabular overlay.
//!
//! Edits are recorded against stable [`RowKey`]s rather than logical row
//! numbers, so inserts and deletes that happen later never change what an
//! earlier edit refers to. The log also keeps the logical row layout: a piece
//! table of base-row runs and inserted rows, equal to the replay of every
//! entry before the cursor.

use std::collections::HashSet;

use crate::codec::{CellValue, RowValue};
use crate::error::{Result, ViewerError};

/// Stable identity of a logical row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// Row `n` of the file as indexed
    Base(u64),
    /// Row created by an insert; ids are never reused within a session
    Inserted(u64),
}

/// A single mutation that can be undone/redone.
#[derive(Debug, Clone, PartialEq)]
pub enum EditRecord {
    CellEdit {
        row: u64,
        column: usize,
        old_value: CellValue,
        new_value: CellValue,
    },
    /// The new row becomes logical row `at`; rows at or after it shift down.
    /// `value` is `None` only when undoing the delete of a malformed row.
    RowInsert { at: u64, value: Option<RowValue> },
    /// `saved_value` is `None` when the deleted row was malformed on disk
    RowDelete {
        row: u64,
        saved_value: Option<RowValue>,
    },
}

impl EditRecord {
    /// Get the inverse record for undo
    pub fn inverse(&self) -> Self {
        match self {
            EditRecord::CellEdit {
                row,
                column,
                old_value,
                new_value,
            } => EditRecord::CellEdit {
                row: *row,
                column: *column,
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            EditRecord::RowInsert { at, value } => EditRecord::RowDelete {
                row: *at,
                saved_value: value.clone(),
            },
            EditRecord::RowDelete { row, saved_value } => EditRecord::RowInsert {
                at: *row,
                value: saved_value.clone(),
            },
        }
    }

    /// Logical row the record addresses
    pub fn row(&self) -> u64 {
        match self {
            EditRecord::CellEdit { row, .. } => *row,
            EditRecord::RowInsert { at, .. } => *at,
            EditRecord::RowDelete { row, .. } => *row,
        }
    }

    /// Whether the record changes the number of rows
    pub fn is_structural(&self) -> bool {
        !matches!(self, EditRecord::CellEdit { .. })
    }
}

/// A record plus the row identity it resolved to when applied
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub record: EditRecord,
    pub key: RowKey,
}

/// One piece of the logical row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Base rows `start..start + len`, in order
    Base { start: u64, len: u64 },
    Inserted(u64),
}

impl Segment {
    pub fn len(&self) -> u64 {
        match self {
            Segment::Base { len, .. } => *len,
            Segment::Inserted(_) => 1,
        }
    }

    fn for_key(key: RowKey) -> Self {
        match key {
            RowKey::Base(n) => Segment::Base { start: n, len: 1 },
            RowKey::Inserted(id) => Segment::Inserted(id),
        }
    }
}

/// Piece table mapping logical row numbers to row keys
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    segments: Vec<Segment>,
    rows: u64,
}

impl Layout {
    fn new(base_rows: u64) -> Self {
        let segments = if base_rows == 0 {
            Vec::new()
        } else {
            vec![Segment::Base {
                start: 0,
                len: base_rows,
            }]
        };
        Self {
            segments,
            rows: base_rows,
        }
    }

    fn resolve(&self, row: u64) -> Option<RowKey> {
        let mut pos = 0;
        for segment in &self.segments {
            let len = segment.len();
            if row < pos + len {
                return Some(match *segment {
                    Segment::Base { start, .. } => RowKey::Base(start + (row - pos)),
                    Segment::Inserted(id) => RowKey::Inserted(id),
                });
            }
            pos += len;
        }
        None
    }

    /// Ensure a segment boundary at `row`; returns the index of the segment
    /// starting there (or the segment count when `row` is the end)
    fn split_at(&mut self, row: u64) -> usize {
        let mut pos = 0;
        for i in 0..self.segments.len() {
            if row == pos {
                return i;
            }
            let len = self.segments[i].len();
            if row < pos + len {
                if let Segment::Base { start, len } = self.segments[i] {
                    let head = row - pos;
                    self.segments[i] = Segment::Base { start, len: head };
                    self.segments.insert(
                        i + 1,
                        Segment::Base {
                            start: start + head,
                            len: len - head,
                        },
                    );
                }
                return i + 1;
            }
            pos += len;
        }
        self.segments.len()
    }

    fn insert(&mut self, at: u64, key: RowKey) {
        let idx = self.split_at(at);
        self.segments.insert(idx, Segment::for_key(key));
        self.rows += 1;
        self.coalesce();
    }

    fn remove(&mut self, row: u64) -> Option<RowKey> {
        if row >= self.rows {
            return None;
        }
        let idx = self.split_at(row);
        let key = match self.segments[idx] {
            Segment::Base { start, len } => {
                if len == 1 {
                    self.segments.remove(idx);
                } else {
                    self.segments[idx] = Segment::Base {
                        start: start + 1,
                        len: len - 1,
                    };
                }
                RowKey::Base(start)
            }
            Segment::Inserted(id) => {
                self.segments.remove(idx);
                RowKey::Inserted(id)
            }
        };
        self.rows -= 1;
        self.coalesce();
        Some(key)
    }

    /// Merge touching base runs and drop empty ones
    fn coalesce(&mut self) {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            if segment.len() == 0 {
                continue;
            }
            if let (
                Some(Segment::Base { start, len }),
                Segment::Base {
                    start: next,
                    len: next_len,
                },
            ) = (merged.last_mut(), segment)
            {
                if *start + *len == next {
                    *len += next_len;
                    continue;
                }
            }
            merged.push(segment);
        }
        self.segments = merged;
    }
}

/// Cursor-based edit log with undo/redo
#[derive(Debug, Clone)]
pub struct EditLog {
    entries: Vec<LogEntry>,
    /// Entries before the cursor are live; the rest are the redo stack
    cursor: usize,
    layout: Layout,
    next_insert_id: u64,
}

impl EditLog {
    /// Create an empty log over `base_rows` indexed rows
    pub fn new(base_rows: u64) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            layout: Layout::new(base_rows),
            next_insert_id: 0,
        }
    }

    /// Record a mutation, discarding anything that could have been redone
    pub fn apply(&mut self, record: EditRecord) -> Result<RowKey> {
        let key = match &record {
            EditRecord::CellEdit { row, .. } => self.layout.resolve(*row).ok_or_else(|| {
                self.out_of_range(*row)
            })?,
            EditRecord::RowInsert { at, value } => {
                if *at > self.layout.rows {
                    return Err(ViewerError::invalid_edit(format!(
                        "cannot insert at row {} ({} rows)",
                        at, self.layout.rows
                    )));
                }
                if value.is_none() {
                    return Err(ViewerError::invalid_edit("inserted row has no value"));
                }
                let key = RowKey::Inserted(self.next_insert_id);
                self.next_insert_id += 1;
                self.layout.insert(*at, key);
                key
            }
            EditRecord::RowDelete { row, .. } => self
                .layout
                .remove(*row)
                .ok_or_else(|| self.out_of_range(*row))?,
        };

        self.entries.truncate(self.cursor);
        self.entries.push(LogEntry { record, key });
        self.cursor += 1;
        Ok(key)
    }

    /// Step back one entry; returns the inverse of the undone record
    pub fn undo(&mut self) -> Option<EditRecord> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        let entry = &self.entries[self.cursor];
        match &entry.record {
            EditRecord::CellEdit { .. } => {}
            EditRecord::RowInsert { at, .. } => {
                self.layout.remove(*at);
            }
            EditRecord::RowDelete { row, .. } => {
                self.layout.insert(*row, entry.key);
            }
        }
        Some(entry.record.inverse())
    }

    /// Re-apply the entry at the cursor; returns it
    pub fn redo(&mut self) -> Option<EditRecord> {
        let entry = self.entries.get(self.cursor)?;
        match &entry.record {
            EditRecord::CellEdit { .. } => {}
            EditRecord::RowInsert { at, .. } => self.layout.insert(*at, entry.key),
            EditRecord::RowDelete { row, .. } => {
                self.layout.remove(*row);
            }
        }
        let record = entry.record.clone();
        self.cursor += 1;
        Some(record)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn undo_count(&self) -> usize {
        self.cursor
    }

    pub fn redo_count(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Whether the logical state differs from the baseline's history
    pub fn is_dirty(&self) -> bool {
        self.cursor > 0
    }

    /// Live records, oldest first
    pub fn pending(&self) -> Vec<EditRecord> {
        self.live().iter().map(|e| e.record.clone()).collect()
    }

    /// Logical row count after all live edits
    pub fn row_count(&self) -> u64 {
        self.layout.rows
    }

    /// Row identity at logical position `row`
    pub fn resolve(&self, row: u64) -> Option<RowKey> {
        self.layout.resolve(row)
    }

    /// Current layout pieces in logical order
    pub fn segments(&self) -> &[Segment] {
        &self.layout.segments
    }

    /// Overlay value for a cell, or `None` meaning "use backing data"
    pub fn effective_value(&self, row: u64, column: usize) -> Option<CellValue> {
        let key = self.layout.resolve(row)?;
        self.cell_override(key, column)
    }

    fn cell_override(&self, key: RowKey, column: usize) -> Option<CellValue> {
        for entry in self.live().iter().rev() {
            if entry.key != key {
                continue;
            }
            match &entry.record {
                EditRecord::CellEdit {
                    column: c,
                    new_value,
                    ..
                } if *c == column => return Some(new_value.clone()),
                EditRecord::RowInsert { value, .. } => {
                    return value.as_ref().and_then(|v| v.cell(column));
                }
                _ => {}
            }
        }
        None
    }

    /// Value an inserted row was created with
    pub fn inserted_value(&self, key: RowKey) -> Option<RowValue> {
        self.live().iter().find_map(|entry| match &entry.record {
            EditRecord::RowInsert { value, .. } if entry.key == key => value.clone(),
            _ => None,
        })
    }

    /// Apply every live cell edit on `key` to `base`, in order
    pub fn overlay_row(&self, key: RowKey, mut base: RowValue) -> RowValue {
        for entry in self.live().iter().filter(|e| e.key == key) {
            if let EditRecord::CellEdit {
                column, new_value, ..
            } = &entry.record
            {
                base.set_cell(*column, new_value.clone());
            }
        }
        base
    }

    /// Keys carrying at least one live cell edit
    pub fn edited_keys(&self) -> HashSet<RowKey> {
        self.live()
            .iter()
            .filter(|e| matches!(e.record, EditRecord::CellEdit { .. }))
            .map(|e| e.key)
            .collect()
    }

    /// Start over from a new baseline
    pub fn clear(&mut self, base_rows: u64) {
        self.entries.clear();
        self.cursor = 0;
        self.layout = Layout::new(base_rows);
    }

    fn live(&self) -> &[LogEntry] {
        &self.entries[..self.cursor]
    }

    fn out_of_range(&self, row: u64) -> ViewerError {
        ViewerError::invalid_edit(format!(
            "row {} out of range ({} rows)",
            row, self.layout.rows
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(row: u64, column: usize, old: &str, new: &str) -> EditRecord {
        EditRecord::CellEdit {
            row,
            column,
            old_value: old.into(),
            new_value: new.into(),
        }
    }

    fn insert(at: u64, cells: &[&str]) -> EditRecord {
        EditRecord::RowInsert {
            at,
            value: Some(RowValue::text(cells.iter().copied())),
        }
    }

    fn delete(row: u64) -> EditRecord {
        EditRecord::RowDelete {
            row,
            saved_value: None,
        }
    }

    fn keys(log: &EditLog) -> Vec<RowKey> {
        (0..log.row_count()).filter_map(|r| log.resolve(r)).collect()
    }

    #[test]
    fn test_record_inverse() {
        let op = edit(1, 0, "1", "99");
        let inv = op.inverse();
        assert_eq!(inv, edit(1, 0, "99", "1"));
        assert_eq!(inv.inverse(), op);

        let ins = insert(0, &["x"]);
        assert_eq!(
            ins.inverse(),
            EditRecord::RowDelete {
                row: 0,
                saved_value: Some(RowValue::text(["x"]))
            }
        );
        assert!(ins.is_structural());
        assert!(!op.is_structural());
    }

    #[test]
    fn test_effective_value_most_recent_wins() {
        let mut log = EditLog::new(3);
        log.apply(edit(1, 0, "1", "a")).unwrap();
        log.apply(edit(1, 0, "a", "b")).unwrap();
        log.apply(edit(1, 1, "2", "c")).unwrap();

        assert_eq!(log.effective_value(1, 0), Some("b".into()));
        assert_eq!(log.effective_value(1, 1), Some("c".into()));
        assert_eq!(log.effective_value(0, 0), None);
        assert_eq!(log.effective_value(7, 0), None);
    }

    #[test]
    fn test_undo_inverse_law() {
        let mut log = EditLog::new(4);
        log.apply(edit(0, 0, "a", "1")).unwrap();
        log.apply(insert(2, &["new"])).unwrap();
        log.apply(edit(3, 1, "b", "2")).unwrap();
        log.apply(delete(0)).unwrap();
        log.apply(edit(0, 0, "c", "3")).unwrap();

        for _ in 0..5 {
            assert!(log.undo().is_some());
        }

        assert_eq!(log.undo(), None);
        assert!(!log.is_dirty());
        assert_eq!(log.row_count(), 4);
        assert_eq!(
            log.segments(),
            &[Segment::Base { start: 0, len: 4 }]
        );
        for row in 0..4 {
            for col in 0..2 {
                assert_eq!(log.effective_value(row, col), None);
            }
        }
    }

    #[test]
    fn test_redo_after_undo_restores_state() {
        let mut log = EditLog::new(3);
        log.apply(insert(1, &["x"])).unwrap();
        log.apply(edit(2, 0, "1", "99")).unwrap();
        let before = keys(&log);

        let inverse = log.undo().unwrap();
        assert_eq!(inverse, edit(2, 0, "99", "1"));
        assert_eq!(log.effective_value(2, 0), None);

        assert_eq!(log.redo().unwrap(), edit(2, 0, "1", "99"));
        assert_eq!(keys(&log), before);
        assert_eq!(log.effective_value(2, 0), Some("99".into()));
        assert_eq!(log.redo(), None);
    }

    #[test]
    fn test_apply_truncates_redo_tail() {
        let mut log = EditLog::new(2);
        log.apply(edit(0, 0, "a", "b")).unwrap();
        log.apply(edit(1, 0, "c", "d")).unwrap();
        log.undo();
        assert!(log.can_redo());

        log.apply(edit(0, 1, "e", "f")).unwrap();
        assert!(!log.can_redo());
        assert_eq!(log.undo_count(), 2);
        assert_eq!(log.redo_count(), 0);
        assert_eq!(log.effective_value(1, 0), None);
    }

    #[test]
    fn test_insert_then_delete_renumbering() {
        // rows: [a,b] [1,2] [3,4]
        let mut log = EditLog::new(3);
        log.apply(insert(0, &["x", "y"])).unwrap();
        log.apply(delete(2)).unwrap();

        assert_eq!(log.row_count(), 3);
        assert_eq!(
            keys(&log),
            vec![RowKey::Inserted(0), RowKey::Base(0), RowKey::Base(2)]
        );
        assert_eq!(log.effective_value(0, 1), Some("y".into()));
    }

    #[test]
    fn test_cell_edit_follows_row_through_renumbering() {
        let mut log = EditLog::new(5);
        log.apply(edit(3, 0, "d", "D")).unwrap();
        log.apply(insert(0, &["new"])).unwrap();
        log.apply(insert(0, &["newer"])).unwrap();
        assert_eq!(log.effective_value(5, 0), Some("D".into()));

        log.apply(delete(3)).unwrap(); // base row 1
        assert_eq!(log.effective_value(4, 0), Some("D".into()));
        assert_eq!(log.resolve(4), Some(RowKey::Base(3)));

        log.apply(edit(0, 0, "newer", "N")).unwrap();
        assert_eq!(log.effective_value(0, 0), Some("N".into()));
        assert_eq!(log.effective_value(1, 0), Some("new".into()));
    }

    #[test]
    fn test_undo_delete_restores_same_key() {
        let mut log = EditLog::new(3);
        log.apply(edit(1, 0, "1", "one")).unwrap();
        log.apply(delete(1)).unwrap();
        assert_eq!(keys(&log), vec![RowKey::Base(0), RowKey::Base(2)]);

        let inverse = log.undo().unwrap();
        assert_eq!(inverse, EditRecord::RowInsert { at: 1, value: None });
        assert_eq!(log.resolve(1), Some(RowKey::Base(1)));
        assert_eq!(log.effective_value(1, 0), Some("one".into()));
        assert_eq!(log.segments(), &[Segment::Base { start: 0, len: 3 }]);
    }

    #[test]
    fn test_insert_ids_are_not_reused() {
        let mut log = EditLog::new(0);
        let first = log.apply(insert(0, &["a"])).unwrap();
        log.undo();
        let second = log.apply(insert(0, &["b"])).unwrap();
        assert_ne!(first, second);
        assert_eq!(log.inserted_value(second), Some(RowValue::text(["b"])));
        assert_eq!(log.inserted_value(first), None);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut log = EditLog::new(2);
        assert!(matches!(
            log.apply(edit(2, 0, "", "x")),
            Err(ViewerError::InvalidEdit(_))
        ));
        assert!(log.apply(delete(5)).is_err());
        assert!(log.apply(insert(3, &["z"])).is_err());
        assert!(log
            .apply(EditRecord::RowInsert { at: 0, value: None })
            .is_err());
        assert!(log.apply(insert(2, &["end"])).is_ok());
        assert_eq!(log.undo_count(), 1);
    }

    #[test]
    fn test_overlay_row_and_edited_keys() {
        let mut log = EditLog::new(2);
        log.apply(edit(1, 1, "2", "x")).unwrap();
        log.apply(edit(1, 0, "1", "y")).unwrap();

        let key = log.resolve(1).unwrap();
        let row = log.overlay_row(key, RowValue::text(["1", "2"]));
        assert_eq!(row.texts(), vec!["y", "x"]);
        assert_eq!(log.edited_keys(), HashSet::from([RowKey::Base(1)]));
        assert_eq!(log.pending().len(), 2);
    }

    #[test]
    fn test_clear_resets_baseline() {
        let mut log = EditLog::new(2);
        log.apply(insert(0, &["a"])).unwrap();
        log.clear(3);
        assert!(!log.is_dirty());
        assert!(!log.can_redo());
        assert_eq!(log.row_count(), 3);
        assert!(log.pending().is_empty());
    }
}
