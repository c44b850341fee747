//! Request resolution, scripting, and execution for API workspaces.
//!
//! An [`ApiDefinition`] describes a request as a template: a URL such as
//! `{{base_url}}/users/{id}`, query parameters, headers, a body, and optional
//! pre- and post-request scripts. The [`RequestExecutor`] resolves it against
//! an [`Environment`], sends it, and returns an [`ExecutionReport`].
//!
//! ## Core Types
//!
//! - [`ApiDefinition`] / [`Collection`] - Stored request templates
//! - [`Environment`] / [`SharedEnvironment`] - Variable bindings with
//!   `initial_value` and run-time `current_value`
//! - [`RequestParameters`] - Call-time path params, query params and body
//! - [`Body`] - Request payloads
//! - [`ApiResponse`] - A received response
//!
//! ## Execution
//!
//! - [`RequestExecutor`] - Runs definitions through the execution stages
//! - [`ExecutionState`] / [`Stage`] - The execution state machine
//! - [`ExecutionReport`] - Visited states, request, response, logs, error
//!
//! ## Building Blocks
//!
//! - [`template`] - URL template resolution
//! - [`encoding`] - Percent-encoding of path segments and query strings
//! - [`body`] - Body serialization
//! - [`script`] - The sandboxed script language
//!
//! ## Storage
//!
//! - [`Repository`] - Trait for collection and environment storage
//! - [`MemoryRepository`] / [`JsonFileRepository`] - In-process and JSONL
//!   file-backed implementations
//!
//! ## Examples
//!
//! ```rust,no_run
//! use courier_lib::{
//!     ApiDefinition, Environment, RequestExecutor, RequestParameters, SharedEnvironment,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let env = SharedEnvironment::new(
//!     Environment::new("acme", "dev")
//!         .with_variable("base_url", "https://api.acme.test")
//!         .with_secret("password", "hunter2"),
//! );
//!
//! let login = ApiDefinition::builder()
//!     .name("login")
//!     .method("POST".parse()?)
//!     .url("{{base_url}}/login")
//!     .body(courier_lib::Body::text("{{password}}"))
//!     .post_request(r#"env.set("token", response.body.token)"#)
//!     .build();
//!
//! let report = RequestExecutor::new()?
//!     .run(&login, &RequestParameters::default(), &env)
//!     .await;
//! assert!(report.is_success());
//! assert!(env.value("token").is_some());
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod config;
pub mod encoding;
pub mod error;
pub mod executor;
mod method;
pub mod model;
pub mod response;
pub mod script;
pub mod store;
pub mod template;

pub use body::Body;
pub use config::ExecutorConfig;
pub use error::{
    ConfigError, EncodingError, ErrorKind, ErrorReport, ExecutionError, NetworkError, ScriptError,
    StoreError,
};
pub use executor::{
    ExecutionReport, ExecutionState, PreparedRequest, RequestExecutor, RequestExecutorBuilder,
    Stage,
};
pub use method::RestMethod;
pub use model::{
    ApiDefinition, Collection, Environment, EnvironmentVariable, Headers, PathParams,
    QueryParams, RequestParameters, RequestSettings, SharedEnvironment, VariableChange,
    VariableKind,
};
pub use response::{ApiResponse, ResponseBody};
pub use store::{JsonFileRepository, MemoryRepository, Record, RecordKey, Repository};
