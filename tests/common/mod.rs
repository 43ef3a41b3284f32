//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tabula::codec::RowValue;
use tabula::{CancelToken, OpenOptions, Viewer, ViewerConfig, ViewerSession};
use tempfile::TempDir;

/// A temporary directory holding table files for one test
pub struct Fixture {
    pub dir: TempDir,
    pub viewer: Viewer,
}

impl Fixture {
    pub fn new() -> Self {
        let config = ViewerConfig {
            watch_files: false,
            ..ViewerConfig::default()
        };
        Self {
            dir: TempDir::new().unwrap(),
            viewer: Viewer::new(config),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name` and return its path
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn read(&self, path: &Path) -> Vec<u8> {
        std::fs::read(path).unwrap()
    }

    /// Write `contents` to `name` and open it with default options
    pub fn open(&self, name: &str, contents: &[u8]) -> ViewerSession {
        let path = self.write(name, contents);
        self.viewer.open(&path).unwrap()
    }

    pub fn open_with(&self, name: &str, contents: &[u8], options: OpenOptions) -> ViewerSession {
        let path = self.write(name, contents);
        self.viewer
            .open_with(&path, options, &CancelToken::new())
            .unwrap()
    }
}

/// Text cells of every row in the session, malformed rows as their raw line
pub fn all_texts(session: &ViewerSession) -> Vec<Vec<String>> {
    session
        .rows(0..session.row_count())
        .unwrap()
        .iter()
        .map(|row| row.texts())
        .collect()
}

pub fn texts(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

pub fn csv_row(cells: &[&str]) -> RowValue {
    RowValue::text(cells.iter().copied())
}

/// A CSV file of `rows` rows with three columns, header included
pub fn generate_csv(rows: usize) -> String {
    let mut out = String::from("id,name,score\n");
    for i in 1..rows {
        out.push_str(&format!("{},name-{},{}\n", i, i, i * 7 % 100));
    }
    out
}
