//! Sandboxed pre- and post-request scripts.
//!
//! Scripts use a small JavaScript-flavoured language:
//!
//! ```text
//! let token = env.get("token")
//! if (token) {
//!     request.headers["Authorization"] = "Bearer " + token
//! } else {
//!     throw "no token"
//! }
//! ```
//!
//! A script sees exactly these bindings:
//!
//! - `request`: method, url, path, query, headers and body of the request.
//!   Writable in pre-request scripts, read-only in post-request scripts.
//! - `response`: status, headers, body and elapsed_ms. Post-request only.
//! - `env.get`, `env.set`, `env.has`, `env.reset`
//! - `console.log`, `assert`, `len`, `str`, `num`, `keys`, `contains`,
//!   `json.parse`, `json.stringify`
//!
//! Every statement and expression costs one step of a fixed budget. Nesting
//! depth and the size of built values are capped as well, so a script cannot
//! exhaust the stack or memory of the host. Scripts
//! work on an owned [`ScriptContext`]; environment writes are recorded as a
//! change set which the caller commits only when the script succeeds.

mod ast;
mod builtins;
mod context;
mod interpreter;
mod parser;

pub use ast::Program;
pub use builtins::SCRIPT_LOG_TARGET;
pub use context::{RequestContext, ScriptContext};
pub use interpreter::{MAX_VALUE_BYTES, MAX_VALUE_DEPTH};
pub use parser::{parse, MAX_EXPRESSION_DEPTH, MAX_NESTING};

use interpreter::Interpreter;

use crate::error::ScriptError;
use crate::response::ApiResponse;

/// Default step budget per script.
pub const DEFAULT_MAX_STEPS: u64 = 10_000;

/// Runs a pre-request script and returns the updated context.
///
/// ## Errors
///
/// Any [`ScriptError`]; the input context is consumed, so a failed run
/// leaves nothing to commit.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::{ApiDefinition, Environment, RequestParameters};
/// use courier_lib::script::{run_pre_script, RequestContext, ScriptContext};
///
/// let api = ApiDefinition::builder().name("me").url("/me").build();
/// let request = RequestContext::from_definition(&api, &RequestParameters::default());
/// let env = Environment::new("acme", "dev").with_secret("token", "abc");
///
/// let context = run_pre_script(
///     r#"request.headers["Authorization"] = "Bearer " + env.get("token")"#,
///     ScriptContext::new(request, env),
///     1_000,
/// )
/// .unwrap();
///
/// assert_eq!(context.request.headers.get("authorization"), Some("Bearer abc"));
/// ```
pub fn run_pre_script(
    source: &str,
    mut context: ScriptContext,
    max_steps: u64,
) -> Result<ScriptContext, ScriptError> {
    let program = parse(source)?;
    let mut interpreter = Interpreter::pre_request(&mut context, max_steps);
    interpreter.run(&program)?;
    let request = interpreter.into_request();
    context.request = context.request.apply_value(&request)?;
    Ok(context)
}

/// Runs a post-request script against a response and returns the updated
/// context.
///
/// ## Errors
///
/// Any [`ScriptError`].
pub fn run_post_script(
    source: &str,
    response: &ApiResponse,
    mut context: ScriptContext,
    max_steps: u64,
) -> Result<ScriptContext, ScriptError> {
    let program = parse(source)?;
    let mut interpreter =
        Interpreter::post_request(&mut context, response.to_script_value(), max_steps);
    interpreter.run(&program)?;
    Ok(context)
}
