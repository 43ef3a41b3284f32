//! Benchmarks for the row index scan and codecs
//!
//! Run with: cargo bench --bench row_index

mod support;

use std::io::Write;

use support::{make_csv, make_json_lines};
use tabula::codec::{CsvCodec, JsonLinesCodec};
use tabula::index::{RowIndex, ScanRules};
use tabula::CancelToken;

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

// ============================================================================
// Index build
// ============================================================================

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn scan_csv_in_memory(bencher: divan::Bencher, rows: usize) {
    let text = make_csv(rows);
    bencher.bench(|| RowIndex::from_bytes(divan::black_box(text.as_bytes()), ScanRules::csv(b'"')));
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn scan_json_lines_in_memory(bencher: divan::Bencher, rows: usize) {
    let text = make_json_lines(rows);
    bencher.bench(|| {
        RowIndex::from_bytes(divan::black_box(text.as_bytes()), ScanRules::json_lines())
    });
}

#[divan::bench(args = [10_000, 100_000])]
fn scan_csv_file(bencher: divan::Bencher, rows: usize) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(make_csv(rows).as_bytes()).unwrap();
    file.flush().unwrap();
    let cancel = CancelToken::new();

    bencher.bench(|| RowIndex::build(file.path(), ScanRules::csv(b'"'), &cancel).unwrap());
}

// ============================================================================
// Codecs
// ============================================================================

#[divan::bench]
fn decode_csv_row() {
    let codec = CsvCodec::default();
    divan::black_box(codec.decode(divan::black_box(b"42,user42,\"Oslo, NO\",42,plain text")))
        .unwrap();
}

#[divan::bench]
fn encode_csv_row(bencher: divan::Bencher) {
    let codec = CsvCodec::default();
    let row = codec.decode(b"42,user42,\"Oslo, NO\",42,plain text").unwrap();
    bencher.bench(|| codec.encode(divan::black_box(&row)));
}

#[divan::bench]
fn decode_json_row() {
    let codec = JsonLinesCodec;
    divan::black_box(codec.decode(divan::black_box(
        b"{\"id\":42,\"name\":\"user42\",\"tags\":[\"a\",\"b\"],\"ok\":true}",
    )))
    .unwrap();
}
