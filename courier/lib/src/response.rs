//! HTTP responses as seen by callers and post-request scripts.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::NetworkError;
use crate::model::Headers;

/// Parsed response body.
///
/// Serializes untagged: JSON as itself, text as a string, binary as an array
/// of bytes and an empty body as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Zero-length body.
    #[default]
    Empty,
    /// A JSON document.
    Json(Value),
    /// A textual body.
    Text(String),
    /// Anything else.
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Classifies raw body bytes by content type.
    ///
    /// JSON content types that parse become [`ResponseBody::Json`]; textual
    /// types (and JSON that fails to parse) become [`ResponseBody::Text`].
    /// Without a content type, UTF-8 bodies are treated as text.
    pub fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }

        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some(mime) if is_json(mime) => match serde_json::from_slice(bytes) {
                Ok(value) => Self::Json(value),
                Err(_) => Self::text_or_binary(bytes),
            },
            Some(mime) if is_textual(mime) => Self::text_or_binary(bytes),
            Some(_) => Self::Binary(bytes.to_vec()),
            None => Self::text_or_binary(bytes),
        }
    }

    fn text_or_binary(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Binary(bytes.to_vec()),
        }
    }

    /// Returns `true` for [`ResponseBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Attempt to get the JSON value, returning `None` for other bodies.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Attempt to get text content, returning `None` for other bodies.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Attempt to get binary content, returning `None` for other bodies.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// JSON view of the body, as exposed to scripts.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(v) => v.clone(),
            Self::Text(s) => Value::String(s.clone()),
            Self::Binary(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
        }
    }
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("+xml")
        || matches!(
            mime,
            "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
                | "application/x-ndjson"
        )
}

/// A successful HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers; repeated headers are joined with `", "`.
    pub headers: Headers,
    /// Parsed body.
    pub body: ResponseBody,
    /// Time from sending the request to reading the full body.
    pub elapsed_ms: u64,
}

impl ApiResponse {
    /// Deserializes a JSON body into `T`.
    ///
    /// ## Errors
    ///
    /// Returns [`NetworkError::Decode`] when the body is not JSON or does not
    /// match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        let value = match &self.body {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(text) => {
                serde_json::from_str(text).map_err(|e| NetworkError::Decode {
                    message: e.to_string(),
                })?
            }
            ResponseBody::Binary(_) => {
                return Err(NetworkError::Decode {
                    message: "binary response body is not JSON".to_string(),
                })
            }
        };
        serde_json::from_value(value).map_err(|e| NetworkError::Decode {
            message: e.to_string(),
        })
    }

    /// Returns a header value, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The `response` object bound in post-request scripts.
    pub fn to_script_value(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|h| (h.key.to_ascii_lowercase(), Value::String(h.value.clone())))
            .collect();

        let mut response = Map::new();
        response.insert("status".to_string(), Value::from(self.status));
        response.insert("headers".to_string(), Value::Object(headers));
        response.insert("body".to_string(), self.body.to_value());
        response.insert("elapsed_ms".to_string(), Value::from(self.elapsed_ms));
        Value::Object(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_by_content_type() {
        assert_eq!(
            ResponseBody::from_bytes(Some("application/json; charset=utf-8"), br#"{"a":1}"#),
            ResponseBody::Json(json!({"a": 1}))
        );
        assert_eq!(
            ResponseBody::from_bytes(Some("application/problem+json"), br#"[1]"#),
            ResponseBody::Json(json!([1]))
        );
        assert_eq!(
            ResponseBody::from_bytes(Some("text/html"), b"<p>hi</p>"),
            ResponseBody::Text("<p>hi</p>".to_string())
        );
        assert_eq!(
            ResponseBody::from_bytes(Some("image/png"), &[137, 80]),
            ResponseBody::Binary(vec![137, 80])
        );
        assert_eq!(ResponseBody::from_bytes(Some("text/plain"), b""), ResponseBody::Empty);
    }

    #[test]
    fn unparsable_json_falls_back_to_text() {
        assert_eq!(
            ResponseBody::from_bytes(Some("application/json"), b"not json"),
            ResponseBody::Text("not json".to_string())
        );
    }

    #[test]
    fn missing_content_type_sniffs_utf8() {
        assert_eq!(
            ResponseBody::from_bytes(None, b"hello"),
            ResponseBody::Text("hello".to_string())
        );
        assert_eq!(
            ResponseBody::from_bytes(None, &[0xff, 0xfe]),
            ResponseBody::Binary(vec![0xff, 0xfe])
        );
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Todo {
        id: u64,
        title: String,
    }

    fn response(body: ResponseBody) -> ApiResponse {
        ApiResponse {
            status: 200,
            headers: Headers::new().with("Content-Type", "application/json"),
            body,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn json_deserializes_typed() {
        let todo: Todo = response(ResponseBody::Json(json!({"id": 1, "title": "x"})))
            .json()
            .unwrap();
        assert_eq!(
            todo,
            Todo {
                id: 1,
                title: "x".to_string()
            }
        );
    }

    #[test]
    fn json_mismatch_is_decode_error() {
        let err = response(ResponseBody::Json(json!({"id": "one"})))
            .json::<Todo>()
            .unwrap_err();
        assert!(matches!(err, NetworkError::Decode { .. }));
    }

    #[test]
    fn script_value_lowercases_headers() {
        let value = response(ResponseBody::Json(json!({"token": "t"}))).to_script_value();
        assert_eq!(value["status"], json!(200));
        assert_eq!(value["headers"]["content-type"], json!("application/json"));
        assert_eq!(value["body"]["token"], json!("t"));
    }

    #[test]
    fn body_serializes_untagged() {
        assert_eq!(serde_json::to_value(ResponseBody::Empty).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(ResponseBody::Text("ok".into())).unwrap(),
            json!("ok")
        );
    }
}
