//! Request execution with tracing instrumentation.
//!
//! This module provides the [`RequestExecutor`] which drives an API definition
//! through scripts, resolution and the HTTP exchange.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, instrument, warn, Instrument, Span};
use url::Url;

use super::prepared::{prepare, PreparedRequest};
use super::report::ExecutionReport;
use super::state::Stage;
use crate::config::ExecutorConfig;
use crate::error::{EncodingError, ExecutionError, NetworkError, ScriptError, StoreError};
use crate::model::{
    ApiDefinition, Collection, Environment, Headers, RequestParameters, RequestSettings,
    SharedEnvironment,
};
use crate::response::{ApiResponse, ResponseBody};
use crate::script::{run_post_script, run_pre_script, RequestContext, ScriptContext};
use crate::store::{Record, RecordKey, Repository};

/// Builder for configuring a [`RequestExecutor`].
#[derive(Debug)]
pub struct RequestExecutorBuilder {
    config: ExecutorConfig,
    default_headers: HeaderMap,
}

impl RequestExecutorBuilder {
    fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
            default_headers: HeaderMap::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the base URL joined onto relative templates.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.config.base_url = Some(base_url);
        self
    }

    /// Sets the default request timeout.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use courier_lib::RequestExecutor;
    ///
    /// let executor = RequestExecutor::builder()
    ///     .timeout(Duration::from_secs(60))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(executor.config().timeout, Duration::from_secs(60));
    /// ```
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the default script step budget.
    pub fn max_script_steps(mut self, steps: u64) -> Self {
        self.config.max_script_steps = steps;
        self
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets the number of idle pooled connections kept per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Adds a header sent with every request unless the request sets it.
    ///
    /// ## Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, EncodingError> {
        let invalid = |message: String| EncodingError::InvalidHeader {
            name: name.as_ref().to_string(),
            message,
        };
        let header_name =
            HeaderName::try_from(name.as_ref()).map_err(|e| invalid(e.to_string()))?;
        let header_value =
            HeaderValue::try_from(value.as_ref()).map_err(|e| invalid(e.to_string()))?;
        self.default_headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Builds the [`RequestExecutor`].
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<RequestExecutor, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .default_headers(self.default_headers)
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .build()?;

        Ok(RequestExecutor {
            client,
            config: self.config,
        })
    }
}

/// Resolves and executes API definitions.
///
/// One executor holds one pooled HTTP client and may run any number of
/// executions concurrently.
///
/// ## Examples
///
/// ```rust,no_run
/// use courier_lib::{ApiDefinition, Environment, RequestExecutor, RequestParameters, SharedEnvironment};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = RequestExecutor::new()?;
/// let env = SharedEnvironment::new(
///     Environment::new("acme", "dev").with_variable("host", "https://api.acme.test"),
/// );
///
/// let api = ApiDefinition::builder()
///     .name("get_user")
///     .url("{{host}}/users/{id}")
///     .post_request(r#"env.set("last_id", response.body.id)"#)
///     .build();
///
/// let report = executor
///     .run(&api, &RequestParameters::new().path("id", "1"), &env)
///     .await;
/// let response = report.into_result()?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl RequestExecutor {
    /// Creates a new builder.
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::new()
    }

    /// Creates an executor with default settings.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, NetworkError> {
        Self::builder().build()
    }

    /// Creates an executor from a configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: ExecutorConfig) -> Result<Self, NetworkError> {
        Self::builder().config(config).build()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the Resolving stage for a request context.
    ///
    /// ## Errors
    ///
    /// See [`prepare`](super::prepare).
    pub fn prepare(
        &self,
        request: &RequestContext,
        environment: &Environment,
        settings: &RequestSettings,
    ) -> Result<PreparedRequest, ExecutionError> {
        prepare(request, environment, settings, &self.config)
    }

    /// Sends a prepared request.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The request times out or cannot connect
    /// - The server returns a non-success status code
    /// - The response body cannot be read
    #[instrument(
        name = "api_request",
        skip(self, request),
        fields(
            http.method = tracing::field::Empty,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
        )
    )]
    pub async fn execute(&self, request: &PreparedRequest) -> Result<ApiResponse, NetworkError> {
        Span::current().record("http.method", request.method().to_string().as_str());
        Span::current().record("http.url", request.log_url());

        let timeout_ms = u64::try_from(request.timeout().as_millis()).unwrap_or(u64::MAX);
        let mut builder = self
            .client
            .request(request.method().to_reqwest(), request.url().clone())
            .headers(request.header_map().clone())
            .timeout(request.timeout());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        let status_code = status.as_u16();
        Span::current().record("http.status_code", status_code);

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());

            let otel_status = if status.is_server_error() {
                "ERROR"
            } else {
                "UNSET"
            };
            Span::current().record("otel.status_code", otel_status);

            return Err(NetworkError::HttpStatus {
                status: status_code,
                message,
            });
        }

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(e, timeout_ms))?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Span::current().record("otel.status_code", "OK");

        Ok(ApiResponse {
            status: status_code,
            body: ResponseBody::from_bytes(headers.get("content-type"), &bytes),
            headers,
            elapsed_ms,
        })
    }

    /// Sends a prepared request and deserializes the JSON body.
    ///
    /// ## Errors
    ///
    /// Everything [`execute`](Self::execute) reports, plus
    /// [`NetworkError::Decode`] when the body does not match `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        request: &PreparedRequest,
    ) -> Result<T, NetworkError> {
        self.execute(request).await?.json()
    }

    /// Runs an API definition to completion.
    pub async fn run(
        &self,
        api: &ApiDefinition,
        params: &RequestParameters,
        environment: &SharedEnvironment,
    ) -> ExecutionReport {
        self.run_with_cancel(api, params, environment, &CancellationToken::new())
            .await
    }

    /// Runs an API definition, stopping at the next awaited boundary once
    /// `cancel` fires.
    ///
    /// Environment changes of a script that already finished stay committed.
    pub async fn run_with_cancel(
        &self,
        api: &ApiDefinition,
        params: &RequestParameters,
        environment: &SharedEnvironment,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new(&api.name);
        let span = info_span!("execution", id = %report.id, api = %api.name);

        async {
            if let Err(error) = self.drive(api, params, environment, cancel, &mut report).await {
                let message = environment.read(|env| env.mask(&error.to_string()));
                warn!(
                    stage = %report.state().stage(),
                    kind = %error.kind(),
                    "execution failed: {message}"
                );
                report.fail(error);
            }
        }
        .instrument(span)
        .await;

        report
    }

    async fn drive(
        &self,
        api: &ApiDefinition,
        params: &RequestParameters,
        environment: &SharedEnvironment,
        cancel: &CancellationToken,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutionError> {
        let max_steps = api
            .settings
            .max_script_steps
            .unwrap_or(self.config.max_script_steps);
        let mut request = RequestContext::from_definition(api, params);

        report.advance(Stage::PreScript);
        ensure_active(cancel, Stage::PreScript)?;
        if let Some(source) = script_source(&api.pre_request) {
            let context = ScriptContext::new(request, environment.snapshot());
            let context = run_script(cancel, Stage::PreScript, move || {
                run_pre_script(&source, context, max_steps)
            })
            .await?;
            environment.apply(&context.changes);
            request = context.request;
            report.record_script(context.logs, context.changes);
        }

        report.advance(Stage::Resolving);
        ensure_active(cancel, Stage::Resolving)?;
        let prepared = environment.read(|env| self.prepare(&request, env, &api.settings))?;
        report.request = Some(prepared.clone());

        report.advance(Stage::InFlight);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ExecutionError::Cancelled { stage: Stage::InFlight });
            }
            result = self.execute(&prepared) => result?,
        };
        report.response = Some(response.clone());

        report.advance(Stage::PostScript);
        ensure_active(cancel, Stage::PostScript)?;
        if let Some(source) = script_source(&api.post_request) {
            let context = ScriptContext::new(request, environment.snapshot());
            let context = run_script(cancel, Stage::PostScript, move || {
                run_post_script(&source, &response, context, max_steps)
            })
            .await?;
            environment.apply(&context.changes);
            report.record_script(context.logs, context.changes);
        }

        report.advance(Stage::Done);
        Ok(())
    }

    /// Loads a definition and its environment from repositories, runs it,
    /// and applies the committed variable changes to the stored environment.
    ///
    /// Only the changed variables are written, on top of the record as it is
    /// stored at that moment, so concurrent runs of the same environment keep
    /// each other's writes.
    ///
    /// Without an environment key the run uses an empty environment and
    /// nothing is saved.
    ///
    /// ## Errors
    ///
    /// Returns a [`StoreError`] when loading or saving fails, including
    /// [`StoreError::NotFound`] for an unknown collection, API or
    /// environment. Execution failures are reported in the returned report.
    pub async fn run_stored(
        &self,
        collections: &dyn Repository<Collection>,
        environments: &dyn Repository<Environment>,
        collection: &RecordKey,
        api_name: &str,
        environment: Option<&RecordKey>,
        params: &RequestParameters,
    ) -> Result<ExecutionReport, StoreError> {
        let collection = collections.require(collection)?;
        let api = collection.get(api_name).ok_or_else(|| {
            StoreError::not_found("api", format!("{}/{api_name}", collection.key()))
        })?;

        let shared = match environment {
            Some(key) => SharedEnvironment::new(environments.require(key)?),
            None => SharedEnvironment::new(Environment::new(&collection.workspace, "")),
        };

        let report = self.run(api, params, &shared).await;

        if let Some(key) = environment.filter(|_| !report.changes.is_empty()) {
            environments.update(key, &mut |stored| stored.apply(&report.changes))?;
        }
        Ok(report)
    }
}

fn script_source(source: &Option<String>) -> Option<String> {
    source
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn ensure_active(cancel: &CancellationToken, stage: Stage) -> Result<(), ExecutionError> {
    if cancel.is_cancelled() {
        Err(ExecutionError::Cancelled { stage })
    } else {
        Ok(())
    }
}

/// Runs a script on the blocking pool, giving up on it when `cancel` fires.
///
/// An abandoned script finishes in the background within its step budget and
/// its result is dropped, so its changes are never committed.
async fn run_script<F>(
    cancel: &CancellationToken,
    stage: Stage,
    script: F,
) -> Result<ScriptContext, ExecutionError>
where
    F: FnOnce() -> Result<ScriptContext, ScriptError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(script);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecutionError::Cancelled { stage }),
        joined = handle => match joined {
            Ok(result) => Ok(result?),
            Err(err) => Err(ScriptError::runtime(0, format!("script task failed: {err}")).into()),
        },
    }
}
