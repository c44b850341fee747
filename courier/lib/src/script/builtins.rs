//! Functions callable from scripts.
//!
//! This is the whole surface a script can reach: environment access,
//! logging, assertions and a few value helpers. Nothing here touches the
//! filesystem, the network, the clock or the process.

use serde_json::Value;

use super::interpreter::{display, number_value, truthy, type_name, Interpreter};
use crate::error::ScriptError;
use crate::model::VariableChange;

/// Target of `console.log` events.
pub const SCRIPT_LOG_TARGET: &str = "courier_lib::script";

impl Interpreter<'_> {
    pub(super) fn call_builtin(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match name {
            "env.get" => {
                let var = self.string_arg(name, &args, 0)?;
                Ok(self
                    .context
                    .environment
                    .value(&var)
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null))
            }
            "env.has" => {
                let var = self.string_arg(name, &args, 0)?;
                Ok(Value::Bool(self.context.environment.contains(&var)))
            }
            "env.set" => {
                let var = self.string_arg(name, &args, 0)?;
                let value = display(args.get(1).unwrap_or(&Value::Null));
                self.context.environment.set_current(&var, value.clone());
                self.context
                    .changes
                    .push(VariableChange::Set { name: var, value });
                Ok(Value::Null)
            }
            "env.reset" => {
                let var = self.string_arg(name, &args, 0)?;
                let existed = self.context.environment.reset(&var);
                if existed {
                    self.context.changes.push(VariableChange::Reset { name: var });
                }
                Ok(Value::Bool(existed))
            }
            "console.log" => {
                let line = args.iter().map(display).collect::<Vec<_>>().join(" ");
                tracing::debug!(
                    target: SCRIPT_LOG_TARGET,
                    line = self.line,
                    "{}",
                    self.context.environment.mask(&line)
                );
                self.context.logs.push(line);
                Ok(Value::Null)
            }
            "assert" => {
                if truthy(args.first().unwrap_or(&Value::Null)) {
                    return Ok(Value::Null);
                }
                let message = args
                    .get(1)
                    .map(display)
                    .unwrap_or_else(|| "assertion failed".to_string());
                Err(ScriptError::Thrown {
                    line: self.line,
                    message,
                })
            }
            "len" => match self.arg(name, &args, 0)? {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(self.runtime(format!("len() of {}", type_name(other)))),
            },
            "str" => {
                let text = display(self.arg(name, &args, 0)?);
                self.checked(Value::String(text))
            }
            "num" => match self.arg(name, &args, 0)? {
                Value::Number(n) => Ok(Value::Number(n.clone())),
                Value::Bool(b) => Ok(Value::from(u8::from(*b))),
                Value::Null => Ok(Value::from(0)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("cannot convert {s:?} to a number"))
                    .and_then(number_value)
                    .map_err(|m| self.runtime(m)),
                other => Err(self.runtime(format!("cannot convert {} to a number", type_name(other)))),
            },
            "keys" => match self.arg(name, &args, 0)? {
                Value::Object(map) => Ok(Value::Array(
                    map.keys().cloned().map(Value::String).collect(),
                )),
                other => Err(self.runtime(format!("keys() of {}", type_name(other)))),
            },
            "contains" => {
                let haystack = self.arg(name, &args, 0)?;
                let needle = self.arg(name, &args, 1)?;
                let found = match haystack {
                    Value::String(s) => s.contains(&display(needle)),
                    Value::Array(items) => items.contains(needle),
                    Value::Object(map) => map.contains_key(&display(needle)),
                    other => {
                        return Err(self.runtime(format!("contains() on {}", type_name(other))))
                    }
                };
                Ok(Value::Bool(found))
            }
            "json.parse" => {
                let text = self.string_arg(name, &args, 0)?;
                serde_json::from_str(&text).map_err(|e| self.runtime(format!("invalid JSON: {e}")))
            }
            "json.stringify" => {
                let text = self.arg(name, &args, 0)?.to_string();
                self.checked(Value::String(text))
            }
            _ => Err(self.runtime(format!("unknown function '{name}'"))),
        }
    }

    fn arg<'v>(&self, function: &str, args: &'v [Value], index: usize) -> Result<&'v Value, ScriptError> {
        args.get(index).ok_or_else(|| {
            self.runtime(format!(
                "{function}() expects at least {} argument(s)",
                index + 1
            ))
        })
    }

    fn string_arg(&self, function: &str, args: &[Value], index: usize) -> Result<String, ScriptError> {
        match self.arg(function, args, index)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.runtime(format!(
                "{function}() expects a string, got {}",
                type_name(other)
            ))),
        }
    }
}
