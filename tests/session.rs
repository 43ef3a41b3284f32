//! Viewer facade tests
//!
//! Opening, reading, editing, undo/redo and the single-writer registry.

mod common;

use common::{all_texts, csv_row, texts, Fixture};
use tabula::codec::{CellValue, RowValue};
use tabula::index::LineEnding;
use tabula::util::{filename_for_display, FileOpenError};
use tabula::{CancelToken, EditRecord, FileFormat, OpenOptions, RowData, ViewerError};

const ABC: &[u8] = b"a,b\n1,2\n3,4\n";

// ========================================================================
// Reading
// ========================================================================

#[test]
fn test_open_reports_rows_and_format() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    assert_eq!(session.row_count(), 3);
    assert_eq!(session.format(), FileFormat::Csv);
    assert_eq!(session.file_len(), ABC.len() as u64);
    assert_eq!(session.line_ending(), LineEnding::Lf);
    assert!(!session.is_modified());
}

#[test]
fn test_rows_range_is_clamped() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    let rows = session.rows(1..100).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].number, 1);
    assert_eq!(rows[1].number, 2);

    assert!(session.rows(10..20).unwrap().is_empty());
}

#[test]
fn test_header_is_plain_row_zero() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);
    assert_eq!(session.cell(0, 1).unwrap(), Some(CellValue::from("b")));
    assert_eq!(session.cell(0, 5).unwrap(), None);
}

#[test]
fn test_quoted_newline_stays_in_one_row() {
    let fx = Fixture::new();
    let session = fx.open("quoted.csv", b"id,note\n1,\"two\nlines\"\n2,plain\n");

    assert_eq!(session.row_count(), 3);
    assert_eq!(
        session.cell(1, 1).unwrap(),
        Some(CellValue::from("two\nlines"))
    );
}

#[test]
fn test_blank_lines_are_not_rows() {
    let fx = Fixture::new();
    let session = fx.open("blank.csv", b"a,b\n\n1,2\n\n");
    assert_eq!(all_texts(&session), texts(&[&["a", "b"], &["1", "2"]]));
}

#[test]
fn test_crlf_file_reads_without_carriage_returns() {
    let fx = Fixture::new();
    let session = fx.open("crlf.csv", b"a,b\r\n1,2\r\n");
    assert_eq!(session.line_ending(), LineEnding::CrLf);
    assert_eq!(all_texts(&session), texts(&[&["a", "b"], &["1", "2"]]));
}

#[test]
fn test_malformed_json_row_stays_viewable() {
    let fx = Fixture::new();
    let session = fx.open(
        "events.jsonl",
        b"{\"id\":1}\n{\"id\":2,\n{\"id\":3}\n",
    );

    let rows = session.rows(0..3).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(!rows[0].is_malformed());
    assert!(rows[2].value().is_some());
    match &rows[1].data {
        RowData::Malformed { raw, reason } => {
            assert_eq!(raw, "{\"id\":2,");
            assert!(!reason.is_empty());
        }
        other => panic!("Expected malformed row, got {:?}", other),
    }

    assert!(matches!(
        session.cell(1, 0),
        Err(ViewerError::MalformedRow { row: 1, .. })
    ));
    assert!(matches!(
        session.edit_cell(1, 0, 5i64),
        Err(ViewerError::InvalidEdit(_))
    ));
}

#[test]
fn test_stray_quote_only_breaks_its_own_row() {
    let fx = Fixture::new();
    let original: &[u8] = b"name,height\nbob,5'11\"\nalice,6\n";
    let session = fx.open("people.csv", original);

    assert_eq!(session.row_count(), 3);
    let rows = session.rows(0..3).unwrap();
    match &rows[1].data {
        RowData::Malformed { raw, reason } => {
            assert_eq!(raw, "bob,5'11\"");
            assert!(reason.contains("stray quote"));
        }
        other => panic!("Expected malformed row, got {:?}", other),
    }
    assert_eq!(rows[2].texts(), vec!["alice", "6"]);

    // Neighbouring rows stay editable and the bad row is copied as-is
    session.edit_cell(2, 1, "7").unwrap();
    session.save().unwrap();
    assert_eq!(
        fx.read(&session.path()),
        b"name,height\nbob,5'11\"\nalice,7\n"
    );
}

#[test]
fn test_pretty_row_renders_json() {
    let fx = Fixture::new();
    let session = fx.open("people.jsonl", b"{\"name\":\"ada\",\"age\":36}\n");

    let pretty = session.pretty_row(0).unwrap();
    assert!(pretty.contains("\n"));
    assert!(pretty.contains("\"name\": \"ada\""));
}

#[test]
fn test_delimiter_inferred_from_content() {
    let fx = Fixture::new();
    let session = fx.open("data.txt", b"a;b;c\n1;2;3\n");
    assert_eq!(session.format(), FileFormat::Csv);
    assert_eq!(all_texts(&session), texts(&[&["a", "b", "c"], &["1", "2", "3"]]));
}

#[test]
fn test_ndjson_extension_is_json_lines() {
    let fx = Fixture::new();
    let session = fx.open("log.ndjson", b"{\"a\":1}\n");
    assert_eq!(session.format(), FileFormat::JsonLines);
}

// ========================================================================
// Editing
// ========================================================================

#[test]
fn test_edit_then_undo_restores_value() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    session.edit_cell(1, 0, "99").unwrap();
    assert_eq!(
        all_texts(&session),
        texts(&[&["a", "b"], &["99", "2"], &["3", "4"]])
    );
    assert!(session.is_modified());

    let inverse = session.undo().unwrap();
    assert_eq!(
        inverse,
        EditRecord::CellEdit {
            row: 1,
            column: 0,
            old_value: CellValue::from("99"),
            new_value: CellValue::from("1"),
        }
    );
    assert_eq!(session.cell(1, 0).unwrap(), Some(CellValue::from("1")));
    assert!(!session.is_modified());
    assert!(session.can_redo());
}

#[test]
fn test_redo_reapplies_edit() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    session.edit_cell(2, 1, "x").unwrap();
    session.undo().unwrap();
    session.redo().unwrap();
    assert_eq!(session.cell(2, 1).unwrap(), Some(CellValue::from("x")));
    assert!(!session.can_redo());
}

#[test]
fn test_undo_on_empty_log_is_benign() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    let err = session.undo().unwrap_err();
    assert!(matches!(err, ViewerError::NothingToUndo));
    assert!(err.is_benign());
    assert!(matches!(session.redo(), Err(ViewerError::NothingToRedo)));
}

#[test]
fn test_insert_then_delete_renumbers() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    session.insert_row(0, csv_row(&["x", "y"])).unwrap();
    session.delete_row(2).unwrap();

    assert_eq!(session.row_count(), 3);
    assert_eq!(
        all_texts(&session),
        texts(&[&["x", "y"], &["a", "b"], &["3", "4"]])
    );
}

#[test]
fn test_undo_delete_restores_row() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    session.delete_row(1).unwrap();
    assert_eq!(session.row_count(), 2);
    session.undo().unwrap();
    assert_eq!(
        all_texts(&session),
        texts(&[&["a", "b"], &["1", "2"], &["3", "4"]])
    );
}

#[test]
fn test_invalid_edits_are_rejected_without_logging() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    assert!(matches!(
        session.edit_cell(3, 0, "x"),
        Err(ViewerError::InvalidEdit(_))
    ));
    assert!(matches!(
        session.edit_cell(0, 2, "x"),
        Err(ViewerError::InvalidEdit(_))
    ));
    assert!(matches!(
        session.delete_row(3),
        Err(ViewerError::InvalidEdit(_))
    ));
    assert!(matches!(
        session.insert_row(4, csv_row(&["x", "y"])),
        Err(ViewerError::InvalidEdit(_))
    ));
    assert!(matches!(
        session.insert_row(0, RowValue::Fields(Vec::new())),
        Err(ViewerError::InvalidEdit(_))
    ));

    assert!(!session.can_undo());
    assert!(session.pending_edits().is_empty());
}

#[test]
fn test_strict_columns_checks_insert_width() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);
    assert!(matches!(
        session.insert_row(1, csv_row(&["only-one"])),
        Err(ViewerError::InvalidEdit(_))
    ));

    let loose = fx.open_with(
        "loose.csv",
        ABC,
        OpenOptions::default().with_strict_columns(false),
    );
    loose.insert_row(1, csv_row(&["only-one"])).unwrap();
    assert_eq!(loose.row(1).unwrap().texts(), vec!["only-one".to_string()]);
}

#[test]
fn test_insert_at_end_appends() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);
    session.insert_row(3, csv_row(&["5", "6"])).unwrap();
    assert_eq!(session.row(3).unwrap().texts(), vec!["5", "6"]);
}

#[test]
fn test_json_lines_edit_keeps_types() {
    let fx = Fixture::new();
    let session = fx.open("people.jsonl", b"{\"name\":\"ada\",\"age\":36}\n");

    session.edit_cell(0, 1, 37i64).unwrap();
    assert_eq!(session.cell(0, 1).unwrap(), Some(CellValue::from(37i64)));
    assert_eq!(session.cell(0, 0).unwrap(), Some(CellValue::from("ada")));
}

#[test]
fn test_pending_edits_in_order() {
    let fx = Fixture::new();
    let session = fx.open("data.csv", ABC);

    session.edit_cell(1, 1, "b1").unwrap();
    session.delete_row(2).unwrap();

    let pending = session.pending_edits();
    assert_eq!(pending.len(), 2);
    assert!(matches!(pending[0], EditRecord::CellEdit { row: 1, .. }));
    assert!(matches!(pending[1], EditRecord::RowDelete { row: 2, .. }));
}

// ========================================================================
// Registry
// ========================================================================

#[test]
fn test_second_open_is_rejected() {
    let fx = Fixture::new();
    let path = fx.write("data.csv", ABC);

    let first = fx.viewer.open(&path).unwrap();
    assert!(matches!(
        fx.viewer.open(&path),
        Err(ViewerError::AlreadyOpen(_))
    ));
    assert!(fx.viewer.is_open(&path));

    first.close();
    assert!(!fx.viewer.is_open(&path));
    assert!(fx.viewer.open(&path).is_ok());
}

#[test]
fn test_drop_releases_path() {
    let fx = Fixture::new();
    let path = fx.write("data.csv", ABC);
    {
        let _session = fx.viewer.open(&path).unwrap();
        assert_eq!(fx.viewer.open_paths().len(), 1);
    }
    assert!(fx.viewer.open_paths().is_empty());
}

#[test]
fn test_open_rejects_missing_directory_and_binary() {
    let fx = Fixture::new();

    let missing = fx.path("missing.csv");
    assert!(matches!(
        fx.viewer.open(&missing),
        Err(ViewerError::CannotOpen {
            reason: FileOpenError::NotFound,
            ..
        })
    ));

    assert!(matches!(
        fx.viewer.open(fx.dir.path()),
        Err(ViewerError::CannotOpen {
            reason: FileOpenError::IsDirectory,
            ..
        })
    ));

    let binary = fx.write("blob.csv", b"a,b\n\x00\x01\x02\n");
    assert!(matches!(
        fx.viewer.open(&binary),
        Err(ViewerError::CannotOpen {
            reason: FileOpenError::BinaryFile,
            ..
        })
    ));
    assert!(fx.viewer.open_paths().is_empty());
}

#[test]
fn test_open_failure_has_user_message() {
    let fx = Fixture::new();

    match fx.viewer.open(fx.path("missing.csv")) {
        Err(ViewerError::CannotOpen { path, reason }) => {
            assert_eq!(
                reason.user_message(&filename_for_display(&path)),
                "File not found: missing.csv"
            );
        }
        other => panic!("Expected CannotOpen, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_cancelled_open_releases_reservation() {
    let fx = Fixture::new();
    let path = fx.write("data.csv", ABC);

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(
        fx.viewer.open_with(&path, OpenOptions::default(), &cancel),
        Err(ViewerError::Cancelled)
    ));
    assert!(!fx.viewer.is_open(&path));
}

#[test]
fn test_invalid_options_rejected() {
    let fx = Fixture::new();
    let path = fx.write("data.csv", ABC);

    let options = OpenOptions::default().with_cache_capacity(0, 1024);
    assert!(matches!(
        fx.viewer.open_with(&path, options, &CancelToken::new()),
        Err(ViewerError::InvalidConfig(_))
    ));
}
