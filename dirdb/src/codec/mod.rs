// Table codec - a table file's bytes <-> its ordered record sequence

use crate::record::Record;
use serde_json::Value;
use thiserror::Error;

/// Why a table file's contents could not be decoded.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("table is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of records, found {found}")]
    NotAnArray { found: &'static str },

    #[error("element {index} is {found}, expected an object")]
    NotAnObject { index: usize, found: &'static str },
}

/// Decode a table file.
///
/// Empty or whitespace-only content is an empty table. Anything else must be
/// one JSON array whose elements are all objects.
pub fn decode(bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
    let text = std::str::from_utf8(bytes)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let elements = match serde_json::from_str::<Value>(text)? {
        Value::Array(elements) => elements,
        other => {
            return Err(CodecError::NotAnArray {
                found: type_name(&other),
            })
        }
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| match element {
            Value::Object(record) => Ok(record),
            other => Err(CodecError::NotAnObject {
                index,
                found: type_name(&other),
            }),
        })
        .collect()
}

/// Encode a record sequence as a pretty-printed JSON array with a trailing
/// newline. An empty sequence encodes as `[]`.
pub fn encode(records: &[Record]) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
