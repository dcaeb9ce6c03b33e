//! Value encoding.
//!
//! Strings are stored as-is so other clients can read them without decoding;
//! every other value is stored as JSON. A string whose text would itself parse
//! as JSON (`42`, `null`, `"x"`) is stored in its quoted JSON form instead, so
//! decoding can try JSON first and fall back to the raw payload losslessly.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    match serde_json::to_value(value)? {
        Value::String(raw) if serde_json::from_str::<Value>(&raw).is_err() => Ok(raw),
        other => serde_json::to_string(&other),
    }
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> serde_json::Result<T> {
    serde_json::from_str(raw).or_else(|err| {
        serde_json::from_value(Value::String(raw.to_string())).map_err(|_| err)
    })
}
