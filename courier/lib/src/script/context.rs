//! State visible to and changed by request scripts.

use serde_json::{Map, Value};

use crate::body::Body;
use crate::error::ScriptError;
use crate::method::RestMethod;
use crate::model::{
    ApiDefinition, Environment, Headers, PathParams, QueryParams, RequestParameters,
    VariableChange,
};

/// The request as a pre-request script may edit it.
///
/// The URL is still a template here; resolution happens after the
/// pre-request script has run.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// HTTP method.
    pub method: RestMethod,
    /// URL template.
    pub url: String,
    /// Path parameter values.
    pub path_params: PathParams,
    /// Query parameters.
    pub query_params: QueryParams,
    /// Headers.
    pub headers: Headers,
    /// Body.
    pub body: Body,
}

impl RequestContext {
    /// Merges call-time parameters over a definition's defaults.
    ///
    /// Path and query parameters merge key by key with the call-time value
    /// winning; a non-empty call-time body replaces the definition body.
    pub fn from_definition(api: &ApiDefinition, params: &RequestParameters) -> Self {
        let mut path_params = api.path_params.clone();
        path_params.merge(&params.path_params);
        let mut query_params = api.query_params.clone();
        query_params.merge(&params.query_params);
        let body = if params.body.is_empty() {
            api.body.clone()
        } else {
            params.body.clone()
        };

        Self {
            method: api.method,
            url: api.url.clone(),
            path_params,
            query_params,
            headers: api.headers.clone(),
            body,
        }
    }

    /// The `request` object bound in scripts.
    pub fn to_value(&self) -> Value {
        let path: Map<String, Value> = self
            .path_params
            .iter()
            .map(|p| (p.key.clone(), Value::String(p.value.clone())))
            .collect();
        let query: Map<String, Value> = self
            .query_params
            .iter()
            .map(|p| {
                let value = p.value.clone().map(Value::String).unwrap_or(Value::Null);
                (p.key.clone(), value)
            })
            .collect();
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|h| (h.key.clone(), Value::String(h.value.clone())))
            .collect();

        let mut request = Map::new();
        request.insert("method".to_string(), Value::String(self.method.to_string()));
        request.insert("url".to_string(), Value::String(self.url.clone()));
        request.insert("path".to_string(), Value::Object(path));
        request.insert("query".to_string(), Value::Object(query));
        request.insert("headers".to_string(), Value::Object(headers));
        request.insert("body".to_string(), self.body.to_value());
        Value::Object(request)
    }

    /// Reads back a `request` object a script may have changed.
    ///
    /// An unchanged body keeps its original representation; a changed one
    /// becomes text for strings, empty for `null`, and JSON otherwise.
    ///
    /// ## Errors
    ///
    /// Returns [`ScriptError::InvalidRequest`] when a field has the wrong
    /// shape, for example a non-string header value.
    pub fn apply_value(&self, value: &Value) -> Result<Self, ScriptError> {
        let request = value
            .as_object()
            .ok_or_else(|| ScriptError::invalid_request("request must be an object"))?;

        let method = match request.get("method") {
            Some(Value::String(m)) => m
                .parse::<RestMethod>()
                .map_err(|_| ScriptError::invalid_request(format!("unknown method {m:?}")))?,
            _ => return Err(ScriptError::invalid_request("request.method must be a string")),
        };
        let url = match request.get("url") {
            Some(Value::String(url)) => url.clone(),
            _ => return Err(ScriptError::invalid_request("request.url must be a string")),
        };

        let mut path_params = PathParams::new();
        for (key, value) in object_field(request, "path")? {
            let value = string_value(value, || format!("request.path.{key}"))?;
            path_params.insert(key.clone(), value);
        }

        let mut query_params = QueryParams::new();
        for (key, value) in object_field(request, "query")? {
            let value = match value {
                Value::Null => None,
                other => Some(string_value(other, || format!("request.query.{key}"))?),
            };
            query_params.insert(key.clone(), value);
        }

        let mut headers = Headers::new();
        for (name, value) in object_field(request, "headers")? {
            headers.insert(name.clone(), string_value(value, || format!("header {name:?}"))?);
        }

        let body = match request.get("body") {
            Some(value) if *value == self.body.to_value() => self.body.clone(),
            None | Some(Value::Null) => Body::Empty,
            Some(Value::String(text)) => Body::Text(text.clone()),
            Some(other) => Body::Json(other.clone()),
        };

        Ok(Self {
            method,
            url,
            path_params,
            query_params,
            headers,
            body,
        })
    }
}

fn object_field<'a>(
    request: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Map<String, Value>, ScriptError> {
    request
        .get(field)
        .and_then(Value::as_object)
        .ok_or_else(|| ScriptError::invalid_request(format!("request.{field} must be an object")))
}

fn string_value(value: &Value, what: impl FnOnce() -> String) -> Result<String, ScriptError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(ScriptError::invalid_request(format!(
            "{} must be a string, got {other}",
            what()
        ))),
    }
}

/// Everything a script run reads and produces.
///
/// The environment is an owned snapshot: `env.set` updates it so later reads
/// in the same script see the new value, and records the change in
/// [`changes`](Self::changes) for the caller to commit.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    /// The request being prepared.
    pub request: RequestContext,
    /// Environment snapshot.
    pub environment: Environment,
    /// Environment changes made so far, in order.
    pub changes: Vec<VariableChange>,
    /// Captured `console.log` lines.
    pub logs: Vec<String>,
}

impl ScriptContext {
    /// Creates a context with no recorded changes or logs.
    pub fn new(request: RequestContext, environment: Environment) -> Self {
        Self {
            request,
            environment,
            changes: Vec::new(),
            logs: Vec::new(),
        }
    }
}
