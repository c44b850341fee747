//! Top-level execution error type.

use serde::Serialize;
use strum::Display;
use thiserror::Error;

use super::{EncodingError, NetworkError, ScriptError};
use crate::executor::Stage;

/// Top-level error type for a single request execution.
///
/// Every failure of the pipeline ends up here so the caller receives one
/// tagged error per execution, whatever stage produced it.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::{ErrorKind, ExecutionError};
///
/// let err = ExecutionError::MissingPathParam { name: "id".to_string() };
/// assert_eq!(err.kind(), ErrorKind::MissingPathParam);
/// assert_eq!(err.to_string(), "Missing path parameter: id");
/// ```
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The URL template references a path placeholder with no value.
    #[error("Missing path parameter: {name}")]
    MissingPathParam {
        /// The placeholder name.
        name: String,
    },

    /// The URL template references an environment variable that is not defined.
    #[error("Unresolved environment variable: {name}")]
    UnresolvedVariable {
        /// The variable name.
        name: String,
    },

    /// The request body cannot be represented on the wire.
    #[error("Unserializable body: {reason}")]
    UnserializableBody {
        /// Why serialization failed.
        reason: String,
    },

    /// A pre- or post-request script failed.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The HTTP exchange failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A template, URL, query, or header could not be encoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The caller aborted the execution.
    #[error("Execution cancelled during {stage}")]
    Cancelled {
        /// The stage that was active when the abort was observed.
        stage: Stage,
    },
}

impl ExecutionError {
    /// Returns the tag used when surfacing this error to a caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPathParam { .. } => ErrorKind::MissingPathParam,
            Self::UnresolvedVariable { .. } => ErrorKind::UnresolvedVariable,
            Self::UnserializableBody { .. } => ErrorKind::UnserializableBody,
            Self::Script(_) => ErrorKind::ScriptError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Encoding(_) => ErrorKind::EncodingError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Creates an unserializable body error.
    pub fn unserializable(reason: impl Into<String>) -> Self {
        Self::UnserializableBody {
            reason: reason.into(),
        }
    }

    /// Converts this error into its display form.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Tag identifying which class of failure ended an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ExecutionError::MissingPathParam`].
    MissingPathParam,
    /// See [`ExecutionError::UnresolvedVariable`].
    UnresolvedVariable,
    /// See [`ExecutionError::UnserializableBody`].
    UnserializableBody,
    /// See [`ExecutionError::Script`].
    ScriptError,
    /// See [`ExecutionError::Network`].
    NetworkError,
    /// See [`ExecutionError::Encoding`].
    EncodingError,
    /// See [`ExecutionError::Cancelled`].
    Cancelled,
}

/// Serializable summary of an [`ExecutionError`] for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// The error tag.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_network_error() {
        let err: ExecutionError = NetworkError::Timeout { duration_ms: 5000 }.into();
        assert!(matches!(err, ExecutionError::Network(_)));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_from_script_error() {
        let err: ExecutionError = ScriptError::Thrown {
            line: 1,
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ScriptError);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_cancelled_display() {
        let err = ExecutionError::Cancelled {
            stage: Stage::InFlight,
        };
        assert_eq!(err.to_string(), "Execution cancelled during in_flight");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MissingPathParam).unwrap();
        assert_eq!(json, r#""missing_path_param""#);
        assert_eq!(ErrorKind::UnserializableBody.to_string(), "unserializable_body");
    }

    #[test]
    fn test_report() {
        let report = ExecutionError::unserializable("key must be a string").to_report();
        assert_eq!(report.kind, ErrorKind::UnserializableBody);
        assert_eq!(report.message, "Unserializable body: key must be a string");
    }
}
