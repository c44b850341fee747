//! Repository errors.

use thiserror::Error;

/// Errors that can occur when reading or writing stored records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read or write the backing file.
    #[error("failed to access store: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or encode a stored record.
    #[error("failed to parse stored record: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to acquire a file lock.
    #[error("failed to acquire lock")]
    Lock,

    /// The requested record does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// The kind of record looked up.
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}
