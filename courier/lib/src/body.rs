//! Request bodies and their wire form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutionError;
use crate::model::Environment;
use crate::template::expand_variables;

/// Deepest JSON nesting a body may carry.
pub const MAX_JSON_DEPTH: usize = 128;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Request payload of an API definition.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::Body;
///
/// #[derive(serde::Serialize)]
/// struct NewTodo { title: &'static str, done: bool }
///
/// let body = Body::json(&NewTodo { title: "write docs", done: false }).unwrap();
/// assert!(!body.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// A JSON document.
    Json(Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, sent unchanged.
    Bytes(Bytes),
}

impl Body {
    /// Converts any serializable value into a JSON body.
    ///
    /// ## Errors
    ///
    /// Returns [`ExecutionError::UnserializableBody`] when the value cannot be
    /// represented as JSON (for example a map with non-string keys).
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ExecutionError> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ExecutionError::unserializable(e.to_string()))
    }

    /// Creates a text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Returns `true` for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// JSON view of the body, as exposed to scripts.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
            Self::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }
}

/// A serialized body ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePayload {
    /// Default content type for the payload.
    pub content_type: &'static str,
    /// Encoded bytes.
    pub bytes: Bytes,
}

/// Serializes a body for the wire, expanding `{{var}}` references in text and
/// in JSON string leaves.
///
/// Returns `None` for [`Body::Empty`].
///
/// ## Errors
///
/// Returns [`ExecutionError::UnserializableBody`] when a JSON body nests
/// deeper than [`MAX_JSON_DEPTH`].
pub fn serialize_body(
    body: &Body,
    environment: &Environment,
) -> Result<Option<WirePayload>, ExecutionError> {
    match body {
        Body::Empty => Ok(None),
        Body::Json(value) => {
            let depth = json_depth(value);
            if depth > MAX_JSON_DEPTH {
                return Err(ExecutionError::unserializable(format!(
                    "JSON nesting depth {depth} exceeds the limit of {MAX_JSON_DEPTH}"
                )));
            }
            let expanded = expand_json(value, environment);
            let bytes = serde_json::to_vec(&expanded)
                .map_err(|e| ExecutionError::unserializable(e.to_string()))?;
            Ok(Some(WirePayload {
                content_type: JSON_CONTENT_TYPE,
                bytes: Bytes::from(bytes),
            }))
        }
        Body::Text(text) => Ok(Some(WirePayload {
            content_type: TEXT_CONTENT_TYPE,
            bytes: Bytes::from(expand_variables(text, environment)),
        })),
        Body::Bytes(bytes) => Ok(Some(WirePayload {
            content_type: BINARY_CONTENT_TYPE,
            bytes: bytes.clone(),
        })),
    }
}

/// Nesting depth of a JSON value, measured without recursion.
fn json_depth(value: &Value) -> usize {
    let mut max = 0;
    let mut stack = vec![(value, 1usize)];
    while let Some((value, depth)) = stack.pop() {
        match value {
            Value::Array(items) => {
                max = max.max(depth);
                stack.extend(items.iter().map(|v| (v, depth + 1)));
            }
            Value::Object(map) => {
                max = max.max(depth);
                stack.extend(map.values().map(|v| (v, depth + 1)));
            }
            _ => max = max.max(depth.saturating_sub(1)),
        }
    }
    max
}

fn expand_json(value: &Value, environment: &Environment) -> Value {
    match value {
        Value::String(s) => Value::String(expand_variables(s, environment)),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_json(v, environment)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_json(v, environment)))
                .collect(),
        ),
        other => other.clone(),
    }
}
