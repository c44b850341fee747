//! Layered error types for the courier library.
//!
//! The error hierarchy is structured for actionable diagnostics:
//! - [`ExecutionError`] - Top-level error for a single request execution
//! - [`NetworkError`] - Transport failures, timeouts, and non-2xx responses
//! - [`EncodingError`] - Malformed templates, URLs, query strings, and headers
//! - [`ScriptError`] - Failures raised by pre/post-request scripts
//! - [`StoreError`] - Collection and environment repository failures
//! - [`ConfigError`] - Executor configuration failures

mod config_error;
mod encoding_error;
mod execution_error;
mod network_error;
mod script_error;
mod store_error;

pub use config_error::ConfigError;
pub use encoding_error::EncodingError;
pub use execution_error::{ErrorKind, ErrorReport, ExecutionError};
pub use network_error::NetworkError;
pub use script_error::ScriptError;
pub use store_error::StoreError;
