//! API definitions with a type-state builder.
//!
//! An [`ApiDefinition`] is the logical description of one request: its
//! method, URL template, default parameters, headers, body and scripts. The
//! [`ApiDefinitionBuilder`] tracks the required name and URL in its type so a
//! definition cannot be built without them.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::params::{Headers, PathParams, QueryParams};
use crate::body::Body;
use crate::method::RestMethod;

/// Marker types for builder state tracking.
pub mod builder_state {
    /// Marker for a field that has not been set.
    pub struct Missing;
    /// Marker for a field that has been set.
    pub struct Present;
}

use builder_state::{Missing, Present};

/// Per-request overrides of the executor configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Script step budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_script_steps: Option<u64>,
}

/// A logical request owned by a collection.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::{ApiDefinition, RestMethod};
///
/// let api = ApiDefinition::builder()
///     .name("get_todo")
///     .url("{{base_url}}/users/{id}/todos/{todoId}")
///     .method(RestMethod::Get)
///     .header("Accept", "application/json")
///     .post_request("env.set(\"last_todo\", str(response.body.id))")
///     .build();
///
/// assert_eq!(api.name, "get_todo");
/// assert_eq!(api.headers.get("accept"), Some("application/json"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// Name, unique within its collection.
    #[serde(alias = "api")]
    pub name: String,
    /// HTTP method.
    #[serde(default)]
    pub method: RestMethod,
    /// URL template with `{param}` placeholders and `{{var}}` references.
    pub url: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Script run before the request is resolved.
    #[serde(default, alias = "pre_req", skip_serializing_if = "Option::is_none")]
    pub pre_request: Option<String>,
    /// Script run after the response arrives.
    #[serde(default, alias = "post_req", skip_serializing_if = "Option::is_none")]
    pub post_request: Option<String>,
    /// Default query parameters.
    #[serde(default)]
    pub query_params: QueryParams,
    /// Default path parameter values.
    #[serde(default)]
    pub path_params: PathParams,
    /// Request headers.
    #[serde(default)]
    pub headers: Headers,
    /// Default body.
    #[serde(default)]
    pub body: Body,
    /// Per-request overrides.
    #[serde(default)]
    pub settings: RequestSettings,
}

impl ApiDefinition {
    /// Creates a new definition builder.
    pub fn builder() -> ApiDefinitionBuilder<Missing, Missing> {
        ApiDefinitionBuilder::new()
    }
}

/// Type-state builder for [`ApiDefinition`].
///
/// ## Type Parameters
///
/// - `N`: State of the name field (`Missing` or `Present`).
/// - `U`: State of the URL field (`Missing` or `Present`).
pub struct ApiDefinitionBuilder<N, U> {
    api: ApiDefinition,
    _phantom: PhantomData<(N, U)>,
}

impl ApiDefinitionBuilder<Missing, Missing> {
    /// Creates a builder with no fields set.
    pub fn new() -> Self {
        Self {
            api: ApiDefinition::default(),
            _phantom: PhantomData,
        }
    }
}

impl Default for ApiDefinitionBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> ApiDefinitionBuilder<Missing, U> {
    /// Sets the definition name.
    pub fn name(mut self, name: impl Into<String>) -> ApiDefinitionBuilder<Present, U> {
        self.api.name = name.into();
        ApiDefinitionBuilder {
            api: self.api,
            _phantom: PhantomData,
        }
    }
}

impl<N> ApiDefinitionBuilder<N, Missing> {
    /// Sets the URL template.
    ///
    /// The template may contain `{param}` placeholders and `{{var}}`
    /// environment references, but no query string.
    pub fn url(mut self, url: impl Into<String>) -> ApiDefinitionBuilder<N, Present> {
        self.api.url = url.into();
        ApiDefinitionBuilder {
            api: self.api,
            _phantom: PhantomData,
        }
    }
}

// Optional fields, available in any state
impl<N, U> ApiDefinitionBuilder<N, U> {
    /// Sets the HTTP method (defaults to GET).
    pub fn method(mut self, method: RestMethod) -> Self {
        self.api.method = method;
        self
    }

    /// Sets a description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.api.description = Some(description.into());
        self
    }

    /// Sets the pre-request script.
    pub fn pre_request(mut self, script: impl Into<String>) -> Self {
        self.api.pre_request = Some(script.into());
        self
    }

    /// Sets the post-request script.
    pub fn post_request(mut self, script: impl Into<String>) -> Self {
        self.api.post_request = Some(script.into());
        self
    }

    /// Adds a default path parameter value.
    pub fn path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.api.path_params.insert(key, value.into());
        self
    }

    /// Adds a default query parameter; `None` makes it a flag.
    pub fn query_param(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.api.query_params.insert(key, value);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.api.headers.insert(name, value);
        self
    }

    /// Sets the default body.
    pub fn body(mut self, body: Body) -> Self {
        self.api.body = body;
        self
    }

    /// Sets per-request overrides.
    pub fn settings(mut self, settings: RequestSettings) -> Self {
        self.api.settings = settings;
        self
    }
}

impl ApiDefinitionBuilder<Present, Present> {
    /// Builds the definition.
    ///
    /// Only available once both the name and the URL template are set.
    pub fn build(self) -> ApiDefinition {
        self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let api = ApiDefinition::builder()
            .name("list_users")
            .url("/users")
            .build();

        assert_eq!(api.method, RestMethod::Get);
        assert!(api.body.is_empty());
        assert!(api.pre_request.is_none());
        assert_eq!(api.settings, RequestSettings::default());
    }

    #[test]
    fn test_builder_order_independence() {
        let api = ApiDefinition::builder()
            .url("/todos")
            .method(RestMethod::Post)
            .body(Body::Json(json!({"title": "x"})))
            .name("create_todo")
            .build();

        assert_eq!(api.name, "create_todo");
        assert_eq!(api.method, RestMethod::Post);
    }

    #[test]
    fn test_builder_params() {
        let api = ApiDefinition::builder()
            .name("search")
            .url("/search/{scope}")
            .path_param("scope", "all")
            .query_param("q", Some("rust".to_string()))
            .query_param("exact", None)
            .build();

        assert_eq!(api.path_params.get("scope").map(String::as_str), Some("all"));
        assert_eq!(api.query_params.len(), 2);
    }

    #[test]
    fn test_deserialize_stored_names() {
        let json = r#"{
            "api": "login",
            "method": "post",
            "url": "{{host}}/login",
            "pre_req": "console.log(\"hi\")",
            "post_req": "env.set(\"token\", response.body.token)",
            "settings": {"timeout_ms": 500}
        }"#;
        let api: ApiDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(api.name, "login");
        assert_eq!(api.method, RestMethod::Post);
        assert!(api.pre_request.is_some());
        assert!(api.post_request.is_some());
        assert_eq!(api.settings.timeout_ms, Some(500));
        assert!(api.headers.is_empty());
    }
}
