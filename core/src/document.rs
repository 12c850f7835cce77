//! Parsed OpenAPI document tree.
//!
//! The tree is kept untyped (`serde_yaml::Value`) so that documents which would not
//! deserialize into a strict OpenAPI model still yield whatever operations they do
//! describe. All accessors are total: a missing or wrongly-typed node is `None`.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use serde_yaml::{Mapping, Value};

use crate::error::SpecError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    /// Parse YAML (or JSON, which YAML accepts) into a document tree.
    pub fn parse(text: &str) -> Result<Self, SpecError> {
        serde_yaml::from_str::<Value>(text)
            .map(|root| Self { root })
            .map_err(|e| {
                let message = e.to_string();
                SpecError::Parse {
                    duplicate_key: is_duplicate_key_message(&message),
                    message,
                }
            })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// `openapi` as text. YAML reads an unquoted `3.0` as a float, so numbers are
    /// rendered back to their textual form.
    pub fn openapi_version(&self) -> Option<String> {
        self.get("openapi").and_then(scalar_string)
    }

    pub fn title(&self) -> Option<String> {
        self.get("info")
            .and_then(|info| info.get("title"))
            .and_then(scalar_string)
    }

    pub fn version(&self) -> Option<String> {
        self.get("info")
            .and_then(|info| info.get("version"))
            .and_then(scalar_string)
    }

    pub fn paths(&self) -> Option<&Mapping> {
        self.get("paths").and_then(Value::as_mapping)
    }

    /// First declared server URL, or `http://localhost:8080`.
    pub fn base_url(&self) -> String {
        self.get("servers")
            .and_then(Value::as_sequence)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

pub(crate) fn is_duplicate_key_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("duplicate entry") || lower.contains("duplicated mapping key")
}

/// Scalars (string, number, bool) as text; everything else is absent.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Convert a YAML subtree to JSON. Non-string mapping keys (e.g. `200:` response
/// codes) are rendered as text; non-finite floats become `null`.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                JsonValue::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(JsonNumber::from_f64)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Sequence(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Mapping(mapping) => {
            let mut object = JsonMap::new();
            for (key, item) in mapping {
                object.insert(key_string(key), to_json(item));
            }
            JsonValue::Object(object)
        }
        Value::Tagged(tagged) => to_json(&tagged.value),
    }
}

pub fn key_string(key: &Value) -> String {
    match scalar_string(key) {
        Some(s) => s,
        None if key.is_null() => "null".to_string(),
        None => serde_yaml::to_string(key)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
