//! The Resolving stage: turning a request context into a concrete request.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Serialize, Serializer};
use tracing::warn;
use url::Url;

use crate::body::serialize_body;
use crate::config::ExecutorConfig;
use crate::encoding::encode_query;
use crate::error::{EncodingError, ExecutionError};
use crate::method::RestMethod;
use crate::model::{Environment, Headers, RequestSettings};
use crate::script::RequestContext;
use crate::template::{expand_variables, resolve_url};

/// A fully resolved request, ready to send.
///
/// Only [`prepare`] creates one, so its headers are always valid HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedRequest {
    method: RestMethod,
    url: Url,
    headers: Headers,
    #[serde(serialize_with = "serialize_payload")]
    body: Option<Bytes>,
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    timeout: Duration,
    #[serde(skip)]
    header_map: HeaderMap,
    #[serde(skip)]
    log_url: String,
}

impl PreparedRequest {
    /// HTTP method.
    pub fn method(&self) -> RestMethod {
        self.method
    }

    /// Absolute URL including the encoded query string.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers after variable expansion, including the default `Content-Type`.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Serialized body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The URL with secret values masked, for logging.
    pub fn log_url(&self) -> &str {
        &self.log_url
    }

    pub(crate) fn header_map(&self) -> &HeaderMap {
        &self.header_map
    }
}

/// Resolves a request context against an environment.
///
/// Steps, in order: URL template, query parameters (values expanded, then
/// encoded), header values (expanded, then validated), body.
///
/// ## Errors
///
/// - [`ExecutionError::MissingPathParam`] / [`ExecutionError::UnresolvedVariable`]
///   from the URL template
/// - [`ExecutionError::Encoding`] for malformed templates, URLs and headers
/// - [`ExecutionError::UnserializableBody`] from the body
pub fn prepare(
    request: &RequestContext,
    environment: &Environment,
    settings: &RequestSettings,
    config: &ExecutorConfig,
) -> Result<PreparedRequest, ExecutionError> {
    let mut url = resolve_url(
        &request.url,
        &request.path_params,
        environment,
        config.base_url.as_ref(),
    )?;

    let pairs: Vec<(String, Option<String>)> = request
        .query_params
        .iter()
        .map(|p| {
            let value = p.value.as_deref().map(|v| expand_variables(v, environment));
            (p.key.clone(), value)
        })
        .collect();
    let query = encode_query(&pairs);
    if !query.is_empty() {
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query,
        };
        url.set_query(Some(&query));
    }

    let mut headers = Headers::new();
    let mut header_map = HeaderMap::new();
    for header in request.headers.iter() {
        let value = expand_variables(&header.value, environment);
        let (name, parsed) = validate_header(&header.key, &value)?;
        header_map.insert(name, parsed);
        headers.insert(header.key.clone(), value);
    }

    let body = match serialize_body(&request.body, environment)? {
        Some(payload) => {
            if !request.method.has_body() {
                warn!(
                    method = %request.method,
                    url = %environment.mask(url.as_str()),
                    "Sending a body with a {} request",
                    request.method
                );
            }
            if !headers.contains(CONTENT_TYPE.as_str()) {
                header_map.insert(CONTENT_TYPE, HeaderValue::from_static(payload.content_type));
                headers.insert("Content-Type", payload.content_type);
            }
            Some(payload.bytes)
        }
        None => None,
    };

    let timeout = settings
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.timeout);

    Ok(PreparedRequest {
        method: request.method,
        log_url: environment.mask(url.as_str()),
        url,
        headers,
        body,
        timeout,
        header_map,
    })
}

fn validate_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), EncodingError> {
    let invalid = |message: String| EncodingError::InvalidHeader {
        name: name.to_string(),
        message,
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}

fn serialize_payload<S: Serializer>(body: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match body {
        None => serializer.serialize_none(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_some(text),
            Err(_) => serializer.serialize_some(bytes.as_ref()),
        },
    }
}

fn serialize_millis<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::model::{ApiDefinition, RequestParameters};
    use serde_json::json;
    use tracing_test::traced_test;

    fn env() -> Environment {
        Environment::new("ws", "dev")
            .with_variable("host", "https://api.test")
            .with_variable("lang", "en us")
            .with_secret("token", "t0k")
    }

    fn context(api: &ApiDefinition) -> RequestContext {
        RequestContext::from_definition(api, &RequestParameters::default())
    }

    fn prepare_default(api: &ApiDefinition) -> Result<PreparedRequest, ExecutionError> {
        prepare(
            &context(api),
            &env(),
            &RequestSettings::default(),
            &ExecutorConfig::default(),
        )
    }

    #[test]
    fn resolves_url_query_and_headers() {
        let api = ApiDefinition::builder()
            .name("search")
            .url("{{host}}/users/{id}")
            .path_param("id", "a/b")
            .query_param("q", Some("{{lang}}".to_string()))
            .query_param("flag", None)
            .header("Authorization", "Bearer {{token}}")
            .build();

        let prepared = prepare_default(&api).unwrap();
        assert_eq!(
            prepared.url().as_str(),
            "https://api.test/users/a%2Fb?q=en%20us&flag"
        );
        assert_eq!(prepared.headers().get("authorization"), Some("Bearer t0k"));
        assert_eq!(prepared.header_map()["authorization"], "Bearer t0k");
        assert!(prepared.body().is_none());
        assert_eq!(prepared.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn relative_url_uses_base() {
        let api = ApiDefinition::builder().name("list").url("/users").build();
        let config = ExecutorConfig {
            base_url: Some(Url::parse("http://localhost:8080/v2").unwrap()),
            ..ExecutorConfig::default()
        };
        let prepared =
            prepare(&context(&api), &env(), &RequestSettings::default(), &config).unwrap();
        assert_eq!(prepared.url().as_str(), "http://localhost:8080/v2/users");

        let err = prepare_default(&api).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Encoding(EncodingError::InvalidUrl(_))
        ));
    }

    #[test]
    fn body_sets_default_content_type() {
        let api = ApiDefinition::builder()
            .name("create")
            .url("{{host}}/users")
            .body(Body::Json(json!({"lang": "{{lang}}"})))
            .build();
        let prepared = prepare_default(&api).unwrap();
        assert_eq!(prepared.headers().get("content-type"), Some("application/json"));
        assert_eq!(
            prepared.body().unwrap().as_ref(),
            br#"{"lang":"en us"}"#.as_slice()
        );
    }

    #[test]
    #[traced_test]
    fn body_on_get_is_sent_with_a_warning() {
        let api = ApiDefinition::builder()
            .name("search")
            .url("{{host}}/search")
            .body(Body::Json(json!({"q": "rust"})))
            .build();
        let prepared = prepare_default(&api).unwrap();
        assert!(prepared.body().is_some());
        assert!(logs_contain("Sending a body with a GET request"));
    }

    #[test]
    #[traced_test]
    fn body_on_post_does_not_warn() {
        let api = ApiDefinition::builder()
            .name("create")
            .method(RestMethod::Post)
            .url("{{host}}/users")
            .body(Body::Json(json!({"name": "ada"})))
            .build();
        prepare_default(&api).unwrap();
        assert!(!logs_contain("Sending a body"));
    }

    #[test]
    fn explicit_content_type_wins() {
        let api = ApiDefinition::builder()
            .name("create")
            .url("{{host}}/users")
            .header("content-type", "application/vnd.api+json")
            .body(Body::Json(json!({})))
            .build();
        let prepared = prepare_default(&api).unwrap();
        assert_eq!(prepared.headers().len(), 1);
        assert_eq!(
            prepared.header_map()[CONTENT_TYPE],
            "application/vnd.api+json"
        );
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let api = ApiDefinition::builder()
            .name("bad")
            .url("{{host}}")
            .header("X Bad", "v")
            .build();
        let err = prepare_default(&api).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Encoding(EncodingError::InvalidHeader { ref name, .. }) if name == "X Bad"
        ));

        let api = ApiDefinition::builder()
            .name("bad")
            .url("{{host}}")
            .header("X-Ok", "line\nbreak")
            .build();
        assert!(prepare_default(&api).is_err());
    }

    #[test]
    fn settings_override_timeout() {
        let api = ApiDefinition::builder().name("slow").url("{{host}}").build();
        let settings = RequestSettings {
            timeout_ms: Some(250),
            ..RequestSettings::default()
        };
        let prepared =
            prepare(&context(&api), &env(), &settings, &ExecutorConfig::default()).unwrap();
        assert_eq!(prepared.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn log_url_masks_secrets() {
        let api = ApiDefinition::builder()
            .name("keyed")
            .url("{{host}}/data")
            .query_param("key", Some("{{token}}".to_string()))
            .build();
        let prepared = prepare_default(&api).unwrap();
        assert_eq!(prepared.log_url(), "https://api.test/data?key=***");
        assert!(prepared.url().as_str().contains("t0k"));
    }

    #[test]
    fn serializes_body_as_text() {
        let api = ApiDefinition::builder()
            .name("echo")
            .url("{{host}}")
            .body(Body::text("hi"))
            .build();
        let value = serde_json::to_value(prepare_default(&api).unwrap()).unwrap();
        assert_eq!(value["body"], json!("hi"));
        assert_eq!(value["timeout_ms"], json!(30_000));
        assert_eq!(value["method"], json!("GET"));
        assert!(value.get("log_url").is_none());
    }
}
