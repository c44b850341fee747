//! Executor configuration errors.

use thiserror::Error;

/// Errors in executor configuration.
///
/// These errors occur while loading configuration from the environment or a
/// TOML file, and indicate operator mistakes rather than request failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value could not be interpreted.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// The setting or environment variable name.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// The base URL does not parse.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid_value("COURIER_TIMEOUT_SECS", "soon");
        assert_eq!(
            err.to_string(),
            "Invalid value for COURIER_TIMEOUT_SECS: \"soon\""
        );
    }
}
