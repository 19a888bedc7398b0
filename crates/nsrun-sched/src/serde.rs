//! Byte-level encodings shared by plans, reports and rank exchanges.
//!
//! Batch reports and the payloads cooperating ranks hand each other are
//! canonical JSON, so two ranks holding equal values produce equal bytes.
//! Plans are YAML.

use std::collections::BTreeMap;
use std::iter::FromIterator;

use nsrun_core::errors::{ErrorInfo, NsError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

fn serde_error(code: &str, err: impl ToString) -> NsError {
    NsError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Pretty JSON with object keys sorted at every depth.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, NsError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer_pretty(&mut bytes, &canonical)
        .map_err(|err| serde_error("json_write", err))?;
    Ok(bytes)
}

/// Reads a report, stats file or rank payload.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, NsError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Renders a batch plan as YAML.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, NsError> {
    serde_yaml::to_string(value).map_err(|err| serde_error("yaml_serialize", err))
}

/// Parses a batch plan document.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, NsError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}
