//! JSON bridge for TRON documents.
//!
//! # Mapping
//!
//! | TRON  | JSON                                     |
//! |-------|------------------------------------------|
//! | `nil` | null                                     |
//! | `bit` | true/false                               |
//! | `i64` | integer (fits i64)                       |
//! | `f64` | other number                             |
//! | `bin` | string with `b64:` prefix (valid base64) |
//! | `txt` | other string                             |
//! | `arr` | array                                    |
//! | `map` | object                                   |
//!
//! A JSON string carrying the `b64:` prefix whose remainder parses as
//! base64 round-trips to `bin`; anything else stays `txt`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value as JsonValue;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::TronValue;

/// Parse a JSON string into a canonical history-free document.
///
/// # Errors
///
/// Returns [`Error::JsonParse`] for invalid JSON.
pub fn from_json(json: &str) -> Result<Document<'static>> {
    let parsed: JsonValue =
        serde_json::from_str(json).map_err(|e| Error::JsonParse(e.to_string()))?;
    Document::encode(&value_from_json(&parsed))
}

/// Serialize a document's current root as a JSON string.
///
/// # Errors
///
/// Returns [`Error::NonFinite`] for NaN/infinite floats in the document
/// and [`Error::JsonSerialize`] for serializer failures.
pub fn to_json(doc: &Document<'_>) -> Result<String> {
    let json = value_to_json(&doc.decode()?)?;
    serde_json::to_string(&json).map_err(|e| Error::JsonSerialize(e.to_string()))
}

fn value_from_json(json: &JsonValue) -> TronValue {
    match json {
        JsonValue::Null => TronValue::Nil,
        JsonValue::Bool(b) => TronValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                TronValue::I64(i)
            } else {
                TronValue::F64(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => {
            if let Some(payload) = s.strip_prefix("b64:")
                && let Ok(bytes) = BASE64.decode(payload)
            {
                return TronValue::Bin(bytes);
            }
            TronValue::Txt(s.clone())
        }
        JsonValue::Array(items) => TronValue::Arr(items.iter().map(value_from_json).collect()),
        JsonValue::Object(obj) => TronValue::Map(
            obj.iter()
                .map(|(k, v)| (k.clone(), value_from_json(v)))
                .collect(),
        ),
    }
}

fn value_to_json(value: &TronValue) -> Result<JsonValue> {
    Ok(match value {
        TronValue::Nil => JsonValue::Null,
        TronValue::Bool(b) => JsonValue::Bool(*b),
        TronValue::I64(n) => JsonValue::Number((*n).into()),
        TronValue::F64(f) => {
            let n = serde_json::Number::from_f64(*f).ok_or(Error::NonFinite(*f))?;
            JsonValue::Number(n)
        }
        TronValue::Txt(s) => JsonValue::String(s.clone()),
        TronValue::Bin(bytes) => JsonValue::String(format!("b64:{}", BASE64.encode(bytes))),
        TronValue::Arr(items) => {
            JsonValue::Array(items.iter().map(value_to_json).collect::<Result<_>>()?)
        }
        TronValue::Map(entries) => {
            let mut obj = serde_json::Map::new();
            for (key, val) in entries {
                obj.insert(key.clone(), value_to_json(val)?);
            }
            JsonValue::Object(obj)
        }
    })
}
