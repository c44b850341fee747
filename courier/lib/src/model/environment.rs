//! Environments and their variables.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::encoding::encode_component;

/// Replacement text for secret values in logs and debug output.
pub const MASK: &str = "***";

/// Whether a variable's value may be shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VariableKind {
    /// A plain variable.
    #[default]
    Default,
    /// A secret; its values are masked in logs and debug output.
    Secret,
}

/// A single environment binding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VariableRecord")]
pub struct EnvironmentVariable {
    /// Variable name.
    pub name: String,
    /// Default or secret.
    #[serde(rename = "type")]
    pub kind: VariableKind,
    /// Value the variable was defined with. Execution never changes it.
    pub initial_value: String,
    /// Value in use; scripts may change it.
    pub current_value: String,
}

/// Stored form; a missing current value starts out equal to the initial one.
#[derive(Deserialize)]
struct VariableRecord {
    #[serde(alias = "variable")]
    name: String,
    #[serde(rename = "type", default)]
    kind: VariableKind,
    #[serde(default)]
    initial_value: String,
    #[serde(default)]
    current_value: Option<String>,
}

impl From<VariableRecord> for EnvironmentVariable {
    fn from(record: VariableRecord) -> Self {
        let current_value = record
            .current_value
            .unwrap_or_else(|| record.initial_value.clone());
        Self {
            name: record.name,
            kind: record.kind,
            initial_value: record.initial_value,
            current_value,
        }
    }
}

impl EnvironmentVariable {
    /// Creates a variable whose current value equals its initial value.
    pub fn new(name: impl Into<String>, kind: VariableKind, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            kind,
            initial_value: value.clone(),
            current_value: value,
        }
    }

    /// Returns `true` for secret variables.
    pub fn is_secret(&self) -> bool {
        self.kind == VariableKind::Secret
    }
}

impl fmt::Debug for EnvironmentVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = |value: &str| -> String {
            if self.is_secret() {
                MASK.to_string()
            } else {
                value.to_string()
            }
        };
        f.debug_struct("EnvironmentVariable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("initial_value", &shown(&self.initial_value))
            .field("current_value", &shown(&self.current_value))
            .finish()
    }
}

/// A change a script made to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum VariableChange {
    /// Set the current value, creating the variable if needed.
    Set {
        /// Variable name.
        name: String,
        /// New current value.
        value: String,
    },
    /// Restore the current value to the initial value.
    Reset {
        /// Variable name.
        name: String,
    },
}

impl VariableChange {
    /// The variable this change touches.
    pub fn name(&self) -> &str {
        match self {
            Self::Set { name, .. } | Self::Reset { name } => name,
        }
    }
}

/// Named set of variables scoped to a workspace.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::Environment;
///
/// let mut env = Environment::new("acme", "staging")
///     .with_variable("host", "staging.acme.test")
///     .with_secret("token", "s3cr3t");
///
/// env.set_current("token", "rotated");
/// assert_eq!(env.value("token"), Some("rotated"));
/// assert_eq!(env.get("token").unwrap().initial_value, "s3cr3t");
/// assert_eq!(env.mask("Bearer rotated"), "Bearer ***");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Owning workspace.
    pub workspace: String,
    /// Environment name.
    #[serde(alias = "environment")]
    pub name: String,
    /// Bindings, in definition order.
    #[serde(default, alias = "environment_variables")]
    pub variables: Vec<EnvironmentVariable>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
            variables: Vec::new(),
        }
    }

    /// Adds a default variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.define(EnvironmentVariable::new(name, VariableKind::Default, value));
        self
    }

    /// Adds a secret variable.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.define(EnvironmentVariable::new(name, VariableKind::Secret, value));
        self
    }

    /// Adds a variable, replacing any existing one with the same name.
    pub fn define(&mut self, variable: EnvironmentVariable) {
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&EnvironmentVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Current value of a variable.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|v| v.current_value.as_str())
    }

    /// Returns `true` if the variable exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a current value. Unknown names become new default variables with
    /// an empty initial value.
    pub fn set_current(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(variable) => variable.current_value = value,
            None => self.variables.push(EnvironmentVariable {
                name: name.to_string(),
                kind: VariableKind::Default,
                initial_value: String::new(),
                current_value: value,
            }),
        }
    }

    /// Restores a current value to its initial value. Returns `false` when the
    /// variable does not exist.
    pub fn reset(&mut self, name: &str) -> bool {
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(variable) => {
                variable.current_value = variable.initial_value.clone();
                true
            }
            None => false,
        }
    }

    /// Applies a change set in order.
    pub fn apply(&mut self, changes: &[VariableChange]) {
        for change in changes {
            match change {
                VariableChange::Set { name, value } => self.set_current(name, value.clone()),
                VariableChange::Reset { name } => {
                    self.reset(name);
                }
            }
        }
    }

    /// Replaces every secret value occurring in `text` with `***`.
    pub fn mask(&self, text: &str) -> String {
        let mut secrets: Vec<String> = self
            .variables
            .iter()
            .filter(|v| v.is_secret())
            .flat_map(|v| [v.current_value.as_str(), v.initial_value.as_str()])
            .filter(|s| !s.is_empty())
            .flat_map(|s| [s.to_string(), encode_component(s)])
            .collect();
        // longest first, so a secret containing another is masked whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut masked = text.to_string();
        for secret in &secrets {
            masked = masked.replace(secret.as_str(), MASK);
        }
        masked
    }
}

/// An environment shared between concurrent executions.
///
/// Writes are applied per variable under a write lock, so concurrent
/// executions updating the same variable resolve as last writer wins.
#[derive(Debug, Clone, Default)]
pub struct SharedEnvironment {
    inner: Arc<RwLock<Environment>>,
}

impl SharedEnvironment {
    /// Wraps an environment for sharing.
    pub fn new(environment: Environment) -> Self {
        Self {
            inner: Arc::new(RwLock::new(environment)),
        }
    }

    /// Returns an owned copy of the current state.
    pub fn snapshot(&self) -> Environment {
        self.inner.read().clone()
    }

    /// Commits a change set.
    pub fn apply(&self, changes: &[VariableChange]) {
        if changes.is_empty() {
            return;
        }
        self.inner.write().apply(changes);
    }

    /// Current value of a variable.
    pub fn value(&self, name: &str) -> Option<String> {
        self.inner.read().value(name).map(str::to_string)
    }

    /// Runs `f` against the environment under a read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Environment) -> R) -> R {
        f(&self.inner.read())
    }
}

impl From<Environment> for SharedEnvironment {
    fn from(environment: Environment) -> Self {
        Self::new(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_variable_starts_at_initial_value() {
        let var = EnvironmentVariable::new("host", VariableKind::Default, "localhost");
        assert_eq!(var.current_value, var.initial_value);
    }

    #[test]
    fn missing_current_value_defaults_to_initial() {
        let json = r#"{"variable":"token","type":"secret","initial_value":"abc"}"#;
        let var: EnvironmentVariable = serde_json::from_str(json).unwrap();
        assert_eq!(var.name, "token");
        assert!(var.is_secret());
        assert_eq!(var.current_value, "abc");
    }

    #[test]
    fn debug_masks_secrets() {
        let env = Environment::new("ws", "dev")
            .with_variable("host", "example.com")
            .with_secret("token", "hunter2");
        let debug = format!("{env:?}");
        assert!(debug.contains("example.com"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn set_current_keeps_initial_value() {
        let mut env = Environment::new("ws", "dev").with_variable("token", "old");
        env.set_current("token", "new");
        let var = env.get("token").unwrap();
        assert_eq!(var.current_value, "new");
        assert_eq!(var.initial_value, "old");
    }

    #[test]
    fn set_current_creates_unknown_variable() {
        let mut env = Environment::new("ws", "dev");
        env.set_current("session", "xyz");
        let var = env.get("session").unwrap();
        assert_eq!(var.kind, VariableKind::Default);
        assert_eq!(var.initial_value, "");
        assert_eq!(var.current_value, "xyz");
    }

    #[test]
    fn reset_restores_initial_value() {
        let mut env = Environment::new("ws", "dev").with_variable("page", "1");
        env.set_current("page", "5");
        assert!(env.reset("page"));
        assert_eq!(env.value("page"), Some("1"));
        assert!(!env.reset("nope"));
    }

    #[test]
    fn apply_runs_changes_in_order() {
        let mut env = Environment::new("ws", "dev").with_variable("a", "0");
        env.apply(&[
            VariableChange::Set {
                name: "a".into(),
                value: "1".into(),
            },
            VariableChange::Reset { name: "a".into() },
            VariableChange::Set {
                name: "b".into(),
                value: "2".into(),
            },
        ]);
        assert_eq!(env.value("a"), Some("0"));
        assert_eq!(env.value("b"), Some("2"));
    }

    #[test]
    fn mask_replaces_longest_secret_first() {
        let env = Environment::new("ws", "dev")
            .with_secret("short", "abc")
            .with_secret("long", "abcdef")
            .with_variable("plain", "visible");
        assert_eq!(env.mask("x=abcdef y=abc z=visible"), "x=*** y=*** z=visible");
    }

    #[test]
    fn mask_covers_percent_encoded_form() {
        let env = Environment::new("ws", "dev").with_secret("key", "a b/c");
        assert_eq!(env.mask("/search?key=a%20b%2Fc"), "/search?key=***");
    }

    #[test]
    fn shared_environment_last_writer_wins() {
        let shared = SharedEnvironment::new(Environment::new("ws", "dev"));
        let other = shared.clone();
        shared.apply(&[VariableChange::Set {
            name: "token".into(),
            value: "first".into(),
        }]);
        other.apply(&[VariableChange::Set {
            name: "token".into(),
            value: "second".into(),
        }]);
        assert_eq!(shared.value("token").as_deref(), Some("second"));
    }

    #[test]
    fn serde_accepts_stored_field_names() {
        let json = r#"{
            "workspace": "acme",
            "environment": "prod",
            "environment_variables": [
                {"variable": "host", "type": "default", "initial_value": "a", "current_value": "b"}
            ]
        }"#;
        let env: Environment = serde_json::from_str(json).unwrap();
        assert_eq!(env.name, "prod");
        assert_eq!(env.value("host"), Some("b"));
        assert_eq!(env.get("host").unwrap().initial_value, "a");
    }
}
