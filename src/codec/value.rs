//! Decoded row and cell values

use std::fmt;

use serde_json::{Map, Number, Value};

/// A single cell
///
/// CSV cells are always `Text`. JSON-Lines cells mirror the JSON scalar they
/// came from; nested objects and arrays stay as `Json`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Json(Value),
}

impl CellValue {
    /// Text as shown in a grid cell (nested JSON is rendered compact)
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Json(v) => v.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Convert into a JSON value
    pub fn into_json(self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Number(n) => Value::Number(n),
            CellValue::Text(s) => Value::String(s),
            CellValue::Json(v) => v,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => CellValue::Number(n),
            Value::String(s) => CellValue::Text(s),
            nested => CellValue::Json(nested),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n.into())
    }
}

/// A decoded row
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// Ordered cells of a delimited row
    Fields(Vec<CellValue>),
    /// One JSON value per JSON-Lines row
    Json(Value),
}

impl RowValue {
    /// Build a text-only row, the shape the CSV codec produces
    pub fn text<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RowValue::Fields(
            cells
                .into_iter()
                .map(|s| CellValue::Text(s.into()))
                .collect(),
        )
    }

    /// Number of addressable cells
    pub fn cell_count(&self) -> usize {
        match self {
            RowValue::Fields(cells) => cells.len(),
            RowValue::Json(Value::Array(items)) => items.len(),
            RowValue::Json(Value::Object(map)) => map.len(),
            RowValue::Json(_) => 1,
        }
    }

    /// Cell at `col`
    ///
    /// Object rows are addressed by member position in file order.
    pub fn cell(&self, col: usize) -> Option<CellValue> {
        match self {
            RowValue::Fields(cells) => cells.get(col).cloned(),
            RowValue::Json(Value::Array(items)) => items.get(col).cloned().map(CellValue::from),
            RowValue::Json(Value::Object(map)) => {
                map.values().nth(col).cloned().map(CellValue::from)
            }
            RowValue::Json(scalar) => (col == 0).then(|| CellValue::from(scalar.clone())),
        }
    }

    /// Replace the cell at `col`, returning the previous value
    ///
    /// Returns `None` (and leaves the row untouched) when `col` is out of range.
    pub fn set_cell(&mut self, col: usize, value: CellValue) -> Option<CellValue> {
        match self {
            RowValue::Fields(cells) => {
                let slot = cells.get_mut(col)?;
                Some(std::mem::replace(slot, value))
            }
            RowValue::Json(Value::Array(items)) => {
                let slot = items.get_mut(col)?;
                Some(CellValue::from(std::mem::replace(slot, value.into_json())))
            }
            RowValue::Json(Value::Object(map)) => {
                let slot = map.values_mut().nth(col)?;
                Some(CellValue::from(std::mem::replace(slot, value.into_json())))
            }
            RowValue::Json(scalar) => {
                if col != 0 {
                    return None;
                }
                Some(CellValue::from(std::mem::replace(
                    scalar,
                    value.into_json(),
                )))
            }
        }
    }

    /// Iterate over the cells in column order
    pub fn cells(&self) -> Vec<CellValue> {
        (0..self.cell_count()).filter_map(|c| self.cell(c)).collect()
    }

    /// Cell texts, handy for display and assertions
    pub fn texts(&self) -> Vec<String> {
        self.cells().iter().map(CellValue::display_text).collect()
    }

    /// Member names for object rows
    pub fn keys(&self) -> Option<Vec<String>> {
        match self {
            RowValue::Json(Value::Object(map)) => Some(map.keys().cloned().collect()),
            _ => None,
        }
    }

    /// JSON view of the row: an array for delimited rows, the value itself otherwise
    pub fn to_json(&self) -> Value {
        match self {
            RowValue::Fields(cells) => {
                Value::Array(cells.iter().cloned().map(CellValue::into_json).collect())
            }
            RowValue::Json(v) => v.clone(),
        }
    }

    /// Indented JSON rendering used for the row preview popup
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| self.to_json().to_string())
    }
}

impl From<Value> for RowValue {
    fn from(value: Value) -> Self {
        RowValue::Json(value)
    }
}

impl From<Map<String, Value>> for RowValue {
    fn from(map: Map<String, Value>) -> Self {
        RowValue::Json(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_cell_access() {
        let mut row = RowValue::text(["a", "b"]);
        assert_eq!(row.cell_count(), 2);
        assert_eq!(row.cell(1), Some(CellValue::from("b")));
        assert_eq!(row.cell(2), None);

        let old = row.set_cell(0, "z".into());
        assert_eq!(old, Some(CellValue::from("a")));
        assert_eq!(row.texts(), vec!["z", "b"]);

        assert_eq!(row.set_cell(5, "q".into()), None);
        assert_eq!(row.texts(), vec!["z", "b"]);
    }

    #[test]
    fn test_object_cells_follow_member_order() {
        let mut row = RowValue::Json(json!({"name": "ada", "age": 36, "tags": ["x"]}));
        assert_eq!(row.keys().unwrap(), vec!["name", "age", "tags"]);
        assert_eq!(row.cell(0), Some(CellValue::from("ada")));
        assert_eq!(row.cell(1), Some(CellValue::from(36i64)));
        assert_eq!(row.cell(2), Some(CellValue::Json(json!(["x"]))));

        row.set_cell(1, CellValue::from(37i64));
        assert_eq!(row.to_json(), json!({"name": "ada", "age": 37, "tags": ["x"]}));
    }

    #[test]
    fn test_scalar_row_has_single_cell() {
        let mut row = RowValue::Json(json!(42));
        assert_eq!(row.cell_count(), 1);
        assert_eq!(row.cell(0), Some(CellValue::from(42i64)));
        assert_eq!(row.cell(1), None);
        assert_eq!(row.set_cell(1, CellValue::Null), None);
        assert_eq!(row.set_cell(0, CellValue::Null), Some(CellValue::from(42i64)));
        assert_eq!(row, RowValue::Json(Value::Null));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(CellValue::Null.display_text(), "");
        assert_eq!(CellValue::Bool(true).display_text(), "true");
        assert_eq!(CellValue::Json(json!({"a": 1})).display_text(), r#"{"a":1}"#);
    }

    #[test]
    fn test_pretty_json_of_fields() {
        let row = RowValue::text(["a", "b"]);
        assert_eq!(row.to_pretty_json(), "[\n  \"a\",\n  \"b\"\n]");
    }
}
