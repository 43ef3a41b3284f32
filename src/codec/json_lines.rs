//! JSON-Lines row codec: one JSON value per line

use serde_json::Value;

use super::value::{CellValue, RowValue};
use super::CodecError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonLinesCodec;

impl JsonLinesCodec {
    pub fn decode(&self, raw: &[u8]) -> Result<RowValue, CodecError> {
        serde_json::from_slice::<Value>(raw)
            .map(RowValue::Json)
            .map_err(|e| CodecError::new(e.to_string()))
    }

    /// Compact encoding; key order is preserved
    pub fn encode(&self, row: &RowValue) -> Vec<u8> {
        match row {
            RowValue::Json(value) => value.to_string().into_bytes(),
            fields => fields.to_json().to_string().into_bytes(),
        }
    }

    pub fn normalize_cell(&self, value: CellValue) -> CellValue {
        CellValue::from(value.into_json())
    }

    pub fn normalize_row(&self, row: RowValue) -> RowValue {
        match row {
            RowValue::Json(_) => row,
            fields => RowValue::Json(fields.to_json()),
        }
    }
}
