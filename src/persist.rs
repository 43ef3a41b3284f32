//! Atomic save: original file + edit log -> temp file -> rename
//!
//! Unedited rows are copied byte-for-byte in contiguous runs. Only edited and
//! inserted rows go through the codec. The target is replaced by a rename, so
//! on any failure the original stays untouched and the temp file is removed.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::cache::{BackingRows, RowSource};
use crate::codec::Codec;
use crate::error::{Result, ViewerError};
use crate::history::{EditLog, RowKey, Segment};
use crate::index::RowIndex;
use crate::util::cancel::CancelToken;

/// The indexed file a save reads unedited bytes from
#[derive(Debug, Clone, Copy)]
pub struct SaveSource<'a> {
    pub path: &'a Path,
    pub index: &'a RowIndex,
    pub codec: Codec,
}

/// Write the logical rows of `log` over `source` to `target`
///
/// Returns the number of bytes written.
pub fn save(
    source: SaveSource<'_>,
    log: &EditLog,
    target: &Path,
    cancel: &CancelToken,
) -> Result<u64> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp = NamedTempFile::new_in(&dir).map_err(|e| ViewerError::io(&dir, e))?;

    let mut original = File::open(source.path).map_err(|e| ViewerError::io(source.path, e))?;

    let written = {
        let mut writer = RowWriter {
            out: BufWriter::new(temp.as_file_mut()),
            target,
            written: 0,
        };
        write_rows(&mut writer, &mut original, source, log, cancel)?;
        writer
            .out
            .flush()
            .map_err(|e| partial_write(target, e))?;
        writer.written
    };

    temp.as_file()
        .sync_all()
        .map_err(|e| partial_write(target, e))?;

    if let Ok(metadata) = std::fs::metadata(target) {
        if let Err(e) = std::fs::set_permissions(temp.path(), metadata.permissions()) {
            tracing::warn!("Could not copy permissions to {}: {}", target.display(), e);
        }
    }

    temp.persist(target)
        .map_err(|e| partial_write(target, e.error))?;

    tracing::info!("Saved {} bytes to {}", written, target.display());
    Ok(written)
}

fn partial_write(target: &Path, source: io::Error) -> ViewerError {
    ViewerError::PartialWriteRecoverable {
        path: target.to_path_buf(),
        source,
    }
}

/// Output side of a save, counting bytes as they go out
struct RowWriter<'a, W: Write> {
    out: W,
    target: &'a Path,
    written: u64,
}

impl<W: Write> RowWriter<'_, W> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out
            .write_all(bytes)
            .map_err(|e| partial_write(self.target, e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Copy `start..end` of the original verbatim
    fn copy_range(&mut self, original: &mut File, start: u64, end: u64) -> Result<()> {
        if end <= start {
            return Ok(());
        }
        original
            .seek(SeekFrom::Start(start))
            .map_err(|e| partial_write(self.target, e))?;
        let copied = io::copy(&mut Read::by_ref(original).take(end - start), &mut self.out)
            .map_err(|e| partial_write(self.target, e))?;
        if copied != end - start {
            return Err(partial_write(
                self.target,
                io::Error::new(io::ErrorKind::UnexpectedEof, "original file shrank during save"),
            ));
        }
        self.written += copied;
        Ok(())
    }
}

fn write_rows<W: Write>(
    writer: &mut RowWriter<'_, W>,
    original: &mut File,
    source: SaveSource<'_>,
    log: &EditLog,
    cancel: &CancelToken,
) -> Result<()> {
    let index = source.index;
    let line_ending = index.line_ending().as_bytes();
    let edited = log.edited_keys();
    let last_logical = log.row_count().saturating_sub(1);
    let mut logical = 0u64;

    writer.copy_range(original, 0, index.preamble())?;

    for segment in log.segments() {
        match *segment {
            Segment::Base { start, len } => {
                let mut run_start = start;
                for n in start..start + len {
                    if cancel.is_cancelled() {
                        return Err(ViewerError::Cancelled);
                    }
                    if edited.contains(&RowKey::Base(n)) {
                        let run_logical = logical - (n - run_start);
                        copy_base_run(writer, original, index, run_start..n, run_logical, last_logical)?;

                        let mut rows = BackingRows {
                            file: &mut *original,
                            path: source.path,
                            index,
                            codec: source.codec,
                        };
                        let value = log.overlay_row(RowKey::Base(n), rows.load(n)?);
                        writer.write(&source.codec.encode(&value))?;

                        let span = index.span(n).ok_or_else(|| missing_row(n))?;
                        if span.has_terminator() {
                            writer.copy_range(original, span.tail().start, span.tail().end)?;
                        } else if logical < last_logical {
                            writer.write(line_ending)?;
                        }
                        run_start = n + 1;
                    }
                    logical += 1;
                }
                let run_logical = logical - (start + len - run_start);
                copy_base_run(writer, original, index, run_start..start + len, run_logical, last_logical)?;
            }
            Segment::Inserted(id) => {
                if cancel.is_cancelled() {
                    return Err(ViewerError::Cancelled);
                }
                let key = RowKey::Inserted(id);
                let value = log
                    .inserted_value(key)
                    .ok_or_else(|| ViewerError::invalid_edit(format!("inserted row {} has no value", id)))?;
                let value = log.overlay_row(key, value);
                writer.write(&source.codec.encode(&value))?;

                if logical < last_logical || index.ends_with_newline() {
                    writer.write(line_ending)?;
                }
                logical += 1;
            }
        }
    }

    Ok(())
}

/// Copy base rows `rows` verbatim; `first_logical` is the logical position of
/// `rows.start` in the output
fn copy_base_run<W: Write>(
    writer: &mut RowWriter<'_, W>,
    original: &mut File,
    index: &RowIndex,
    rows: std::ops::Range<u64>,
    first_logical: u64,
    last_logical: u64,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let last_row = rows.end - 1;
    let range = index
        .byte_range(rows.clone())
        .ok_or_else(|| missing_row(last_row))?;
    writer.copy_range(original, range.start, range.end)?;

    let last_span = index.span(last_row).ok_or_else(|| missing_row(last_row))?;
    let last_row_logical = first_logical + (rows.end - rows.start) - 1;
    if !last_span.has_terminator() && last_row_logical < last_logical {
        writer.write(index.line_ending().as_bytes())?;
    }
    Ok(())
}

fn missing_row(row: u64) -> ViewerError {
    ViewerError::invalid_edit(format!("row {} is not in the index", row))
}
