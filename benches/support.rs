//! Shared helpers for benchmarks

/// CSV text with `rows` rows of five columns, one quoted field per row
#[allow(dead_code)]
pub fn make_csv(rows: usize) -> String {
    let mut out = String::with_capacity(rows * 48);
    out.push_str("id,name,city,score,note\n");
    for i in 1..rows {
        out.push_str(&format!(
            "{},user{},\"Oslo, NO\",{},plain text\n",
            i,
            i,
            i % 1000
        ));
    }
    out
}

/// JSON-Lines text with `rows` objects
#[allow(dead_code)]
pub fn make_json_lines(rows: usize) -> String {
    let mut out = String::with_capacity(rows * 56);
    for i in 0..rows {
        out.push_str(&format!(
            "{{\"id\":{},\"name\":\"user{}\",\"tags\":[\"a\",\"b\"],\"ok\":true}}\n",
            i, i
        ));
    }
    out
}
