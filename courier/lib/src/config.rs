//! Executor configuration.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and `COURIER_*` environment variables.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::script::DEFAULT_MAX_STEPS;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of idle pooled connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Base URL joined onto relative URL templates.
pub const BASE_URL_ENV: &str = "COURIER_BASE_URL";
/// Request timeout in whole seconds.
pub const TIMEOUT_SECS_ENV: &str = "COURIER_TIMEOUT_SECS";
/// Script step budget.
pub const MAX_SCRIPT_STEPS_ENV: &str = "COURIER_MAX_SCRIPT_STEPS";
/// `User-Agent` header value.
pub const USER_AGENT_ENV: &str = "COURIER_USER_AGENT";

/// Settings shared by every execution of a [`RequestExecutor`](crate::RequestExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Base URL for relative templates such as `/users/{id}`.
    pub base_url: Option<Url>,
    /// Request timeout, unless a definition overrides it.
    pub timeout: Duration,
    /// Script step budget, unless a definition overrides it.
    pub max_script_steps: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Idle connections kept per host by the HTTP pool.
    pub pool_max_idle_per_host: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_script_steps: DEFAULT_MAX_STEPS,
            user_agent: concat!("courier/", env!("CARGO_PKG_VERSION")).to_string(),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_script_steps: Option<u64>,
    user_agent: Option<String>,
    pool_max_idle_per_host: Option<usize>,
}

impl ExecutorConfig {
    /// Defaults overridden by `COURIER_*` environment variables.
    ///
    /// ## Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| env::var(var).ok())
    }

    /// Parses a TOML document over the defaults.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::InvalidUrl`] for a bad `base_url`.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use courier_lib::ExecutorConfig;
    ///
    /// let config = ExecutorConfig::from_toml_str(r#"
    ///     base_url = "https://api.acme.test/v1"
    ///     timeout_secs = 5
    /// "#).unwrap();
    ///
    /// assert_eq!(config.timeout, Duration::from_secs(5));
    /// assert_eq!(config.base_url.unwrap().path(), "/v1");
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(source)?;
        let mut config = Self::default();

        if let Some(base_url) = file.base_url {
            config.base_url = Some(Url::parse(&base_url)?);
        }
        if let Some(secs) = file.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(steps) = file.max_script_steps {
            config.max_script_steps = steps;
        }
        if let Some(user_agent) = file.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(pool) = file.pool_max_idle_per_host {
            config.pool_max_idle_per_host = pool;
        }
        Ok(config)
    }

    /// Reads a TOML configuration file.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// whatever [`from_toml_str`](Self::from_toml_str) reports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Applies `COURIER_*` overrides looked up through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the variable whose value
    /// could not be parsed.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(value) = lookup(BASE_URL_ENV) {
            let url =
                Url::parse(&value).map_err(|_| ConfigError::invalid_value(BASE_URL_ENV, &value))?;
            self.base_url = Some(url);
        }
        if let Some(value) = lookup(TIMEOUT_SECS_ENV) {
            self.timeout = Duration::from_secs(parse_number(TIMEOUT_SECS_ENV, &value)?);
        }
        if let Some(value) = lookup(MAX_SCRIPT_STEPS_ENV) {
            self.max_script_steps = parse_number(MAX_SCRIPT_STEPS_ENV, &value)?;
        }
        if let Some(value) = lookup(USER_AGENT_ENV) {
            self.user_agent = value;
        }
        Ok(self)
    }
}

fn parse_number<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(var, value))
}
