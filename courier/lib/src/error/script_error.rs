//! Errors raised by pre/post-request scripts.

use thiserror::Error;

/// Failures of a user-supplied script.
///
/// Script errors abort only the execution that ran the script; they never
/// leave partial environment writes behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script source does not parse.
    #[error("Script syntax error at {line}:{column}: {message}")]
    Parse {
        /// 1-based line of the error.
        line: usize,
        /// 1-based column of the error.
        column: usize,
        /// Parser message.
        message: String,
    },

    /// The script performed an invalid operation.
    #[error("Script error at line {line}: {message}")]
    Runtime {
        /// 1-based line of the failing statement.
        line: usize,
        /// Description of the failure.
        message: String,
    },

    /// The script raised an error itself (`throw` or a failed `assert`).
    #[error("Script threw at line {line}: {message}")]
    Thrown {
        /// 1-based line of the `throw`.
        line: usize,
        /// The thrown message.
        message: String,
    },

    /// The script ran longer than its step budget allows.
    #[error("Script exceeded its budget of {limit} steps")]
    BudgetExceeded {
        /// The configured step limit.
        limit: u64,
    },

    /// A pre-request script left the request in an unusable shape.
    #[error("Script produced an invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },
}

impl ScriptError {
    /// Creates a runtime error.
    pub fn runtime(line: usize, message: impl Into<String>) -> Self {
        Self::Runtime {
            line,
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns the source line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. } | Self::Runtime { line, .. } | Self::Thrown { line, .. } => {
                Some(*line)
            }
            Self::BudgetExceeded { .. } | Self::InvalidRequest { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        let err = ScriptError::Parse {
            line: 3,
            column: 7,
            message: "expected expression".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Script syntax error at 3:7: expected expression"
        );
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_budget_has_no_line() {
        let err = ScriptError::BudgetExceeded { limit: 100 };
        assert_eq!(err.line(), None);
        assert!(err.to_string().contains("100 steps"));
    }
}
