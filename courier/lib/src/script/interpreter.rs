//! Tree-walking evaluator over JSON values.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use super::ast::{Accessor, AssignOp, BinaryOp, Expr, Place, Program, Stmt, StmtKind, UnaryOp};
use super::context::ScriptContext;
use crate::error::ScriptError;

/// Largest value a script may build, counting text bytes and eight bytes
/// per scalar.
pub const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// Deepest array and object nesting a script may build.
pub const MAX_VALUE_DEPTH: usize = 128;

/// Names bound by the runtime; scripts cannot declare them.
const RESERVED: &[&str] = &["request", "response", "env", "console", "json"];

struct Local {
    value: Value,
    mutable: bool,
}

/// One script run. Every evaluated statement and expression costs a step.
pub(crate) struct Interpreter<'a> {
    pub(super) context: &'a mut ScriptContext,
    request: Value,
    request_writable: bool,
    response: Option<Value>,
    scopes: Vec<HashMap<String, Local>>,
    steps: u64,
    limit: u64,
    pub(super) line: usize,
}

impl<'a> Interpreter<'a> {
    /// An interpreter whose `request` binding is writable.
    pub(crate) fn pre_request(context: &'a mut ScriptContext, limit: u64) -> Self {
        let request = context.request.to_value();
        Self::new(context, request, true, None, limit)
    }

    /// An interpreter with a read-only `request` and a `response` binding.
    pub(crate) fn post_request(context: &'a mut ScriptContext, response: Value, limit: u64) -> Self {
        let request = context.request.to_value();
        Self::new(context, request, false, Some(response), limit)
    }

    fn new(
        context: &'a mut ScriptContext,
        request: Value,
        request_writable: bool,
        response: Option<Value>,
        limit: u64,
    ) -> Self {
        Self {
            context,
            request,
            request_writable,
            response,
            scopes: vec![HashMap::new()],
            steps: 0,
            limit,
            line: 1,
        }
    }

    /// Runs a program to completion.
    pub(crate) fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        for stmt in &program.statements {
            self.exec(stmt)?;
        }
        Ok(())
    }

    /// The `request` binding as the script left it.
    pub(crate) fn into_request(self) -> Value {
        self.request
    }

    pub(super) fn runtime(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::runtime(self.line, message)
    }

    /// Passes `value` through if it is within the size limits.
    pub(super) fn checked(&self, value: Value) -> Result<Value, ScriptError> {
        check_value(&value).map_err(|m| self.runtime(m))?;
        Ok(value)
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(ScriptError::BudgetExceeded { limit: self.limit });
        }
        Ok(())
    }

    /* ===================== Statements ===================== */

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        self.scopes.push(HashMap::new());
        let result = stmts.iter().try_for_each(|stmt| self.exec(stmt));
        self.scopes.pop();
        result
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        self.line = stmt.line;
        self.tick()?;

        match &stmt.kind {
            StmtKind::Declare {
                name,
                mutable,
                value,
            } => {
                if RESERVED.contains(&name.as_str()) {
                    return Err(self.runtime(format!("'{name}' is a reserved name")));
                }
                let value = self.eval(value)?;
                let scope = self
                    .scopes
                    .last_mut()
                    .ok_or_else(|| ScriptError::runtime(stmt.line, "no active scope"))?;
                if scope.contains_key(name) {
                    return Err(ScriptError::runtime(
                        stmt.line,
                        format!("'{name}' is already declared"),
                    ));
                }
                scope.insert(
                    name.clone(),
                    Local {
                        value,
                        mutable: *mutable,
                    },
                );
                Ok(())
            }
            StmtKind::Assign { target, op, value } => self.assign(target, *op, value),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (test, body) in branches {
                    if truthy(&self.eval(test)?) {
                        return self.exec_block(body);
                    }
                }
                match otherwise {
                    Some(body) => self.exec_block(body),
                    None => Ok(()),
                }
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable)? {
                    Value::Array(items) => items,
                    Value::Object(map) => map.keys().cloned().map(Value::String).collect(),
                    other => {
                        return Err(self.runtime(format!("cannot iterate over {}", type_name(&other))))
                    }
                };
                for item in items {
                    self.tick()?;
                    let mut scope = HashMap::new();
                    scope.insert(
                        binding.clone(),
                        Local {
                            value: item,
                            mutable: true,
                        },
                    );
                    self.scopes.push(scope);
                    let result = self.exec_block(body);
                    self.scopes.pop();
                    result?;
                }
                Ok(())
            }
            StmtKind::Block(body) => self.exec_block(body),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(ScriptError::Thrown {
                    line: stmt.line,
                    message: display(&value),
                })
            }
            StmtKind::Expr(expr) => self.eval(expr).map(drop),
        }
    }

    fn assign(&mut self, place: &Place, op: AssignOp, value: &Expr) -> Result<(), ScriptError> {
        let value = self.eval(value)?;
        let mut keys = Vec::with_capacity(place.path.len());
        for accessor in &place.path {
            keys.push(match accessor {
                Accessor::Field(field) => Value::String(field.clone()),
                Accessor::Index(expr) => self.eval(expr)?,
            });
        }

        let mut root = self.read_root(&place.root)?;
        let value = match op {
            AssignOp::Set => value,
            AssignOp::Add | AssignOp::Sub => {
                let mut current = root.clone();
                for key in &keys {
                    current = get_index(&current, key).map_err(|m| self.runtime(m))?;
                }
                let op = if op == AssignOp::Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                binary(op, &current, &value).map_err(|m| self.runtime(m))?
            }
        };
        write_path(&mut root, &keys, value).map_err(|m| self.runtime(m))?;
        let root = self.checked(root)?;
        self.write_root(&place.root, root)
    }

    fn read_root(&self, name: &str) -> Result<Value, ScriptError> {
        match name {
            "request" if self.request_writable => Ok(self.request.clone()),
            "request" => Err(self.runtime("request is read-only in post-request scripts")),
            "response" => Err(self.runtime("response is read-only")),
            "env" | "console" | "json" => Err(self.runtime(format!("'{name}' cannot be assigned"))),
            _ => match self.scopes.iter().rev().find_map(|s| s.get(name)) {
                Some(local) if local.mutable => Ok(local.value.clone()),
                Some(_) => Err(self.runtime(format!("cannot assign to constant '{name}'"))),
                None => Err(self.runtime(format!("'{name}' is not defined"))),
            },
        }
    }

    fn write_root(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        if name == "request" {
            self.request = value;
            return Ok(());
        }
        let line = self.line;
        match self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
            Some(local) => {
                local.value = value;
                Ok(())
            }
            None => Err(ScriptError::runtime(line, format!("'{name}' is not defined"))),
        }
    }

    /* ===================== Expressions ===================== */

    pub(super) fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.tick()?;

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                self.checked(Value::Array(items))
            }
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                self.checked(Value::Object(map))
            }
            Expr::Ident(name) => self.lookup(name),
            Expr::Member { object, field } => {
                let object = self.eval(object)?;
                get_member(&object, field).map_err(|m| self.runtime(m))
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                get_index(&object, &index).map_err(|m| self.runtime(m))
            }
            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_builtin(function, args)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => match value.as_f64() {
                        Some(n) => number_value(-n).map_err(|m| self.runtime(m)),
                        None => Err(self.runtime(format!("cannot negate {}", type_name(&value)))),
                    },
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                match op {
                    BinaryOp::And if !truthy(&left) => Ok(left),
                    BinaryOp::Or if truthy(&left) => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval(right),
                    _ => {
                        let right = self.eval(right)?;
                        binary(*op, &left, &right).map_err(|m| self.runtime(m))
                    }
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(local) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return Ok(local.value.clone());
        }
        match name {
            "request" => Ok(self.request.clone()),
            "response" => self
                .response
                .clone()
                .ok_or_else(|| self.runtime("response is only available in post-request scripts")),
            "env" | "console" | "json" => {
                Err(self.runtime(format!("'{name}' can only be used to call its functions")))
            }
            _ => Err(self.runtime(format!("'{name}' is not defined"))),
        }
    }
}

/* ===================== Value semantics ===================== */

pub(super) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(super) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a value: strings as-is, everything else as compact JSON.
pub(super) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts an arithmetic result back to JSON, keeping integers integral.
pub(super) fn number_value(n: f64) -> Result<Value, String> {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| "result is not a finite number".to_string())
}

/// Checks a value against [`MAX_VALUE_BYTES`] and [`MAX_VALUE_DEPTH`],
/// stopping as soon as either is exceeded.
pub(super) fn check_value(value: &Value) -> Result<(), String> {
    let mut size = 0usize;
    let mut pending = vec![(value, 1usize)];

    while let Some((value, depth)) = pending.pop() {
        if depth > MAX_VALUE_DEPTH {
            return Err(format!("value nested deeper than {MAX_VALUE_DEPTH} levels"));
        }
        size += match value {
            Value::String(s) => s.len(),
            Value::Array(items) => {
                pending.extend(items.iter().map(|item| (item, depth + 1)));
                1
            }
            Value::Object(map) => {
                pending.extend(map.values().map(|item| (item, depth + 1)));
                1 + map.keys().map(String::len).sum::<usize>()
            }
            _ => 8,
        };
        if size > MAX_VALUE_BYTES {
            return Err(format!("value exceeds {MAX_VALUE_BYTES} bytes"));
        }
    }

    Ok(())
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let ordering = ordering.ok_or_else(|| {
                format!("cannot compare {} with {}", type_name(left), type_name(right))
            })?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        BinaryOp::Add if left.is_string() || right.is_string() => {
            let (left, right) = (display(left), display(right));
            if left.len() + right.len() > MAX_VALUE_BYTES {
                return Err(format!("string exceeds {MAX_VALUE_BYTES} bytes"));
            }
            return Ok(Value::String(left + &right));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(format!(
            "cannot apply {op:?} to {} and {}",
            type_name(left),
            type_name(right)
        ));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err("division by zero".to_string()),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => return Err(format!("unsupported operator {op:?}")),
    };
    number_value(result)
}

fn get_member(object: &Value, field: &str) -> Result<Value, String> {
    match object {
        Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if field == "length" => Ok(Value::from(items.len())),
        Value::String(s) if field == "length" => Ok(Value::from(s.chars().count())),
        Value::Null => Err(format!("cannot read property '{field}' of null")),
        _ => Ok(Value::Null),
    }
}

fn array_index(index: &Value) -> Option<usize> {
    index
        .as_u64()
        .or_else(|| index.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
        .and_then(|i| usize::try_from(i).ok())
}

fn get_index(object: &Value, index: &Value) -> Result<Value, String> {
    match (object, index) {
        (Value::Object(_), Value::String(key)) => get_member(object, key),
        (Value::Object(map), Value::Number(n)) => {
            Ok(map.get(&n.to_string()).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(items), _) if index.is_number() => Ok(array_index(index)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        (Value::String(s), _) if index.is_number() => Ok(array_index(index)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Null, _) => Err(format!("cannot read property {} of null", display(index))),
        _ => Err(format!(
            "cannot index {} with {}",
            type_name(object),
            type_name(index)
        )),
    }
}

fn write_path(target: &mut Value, keys: &[Value], value: Value) -> Result<(), String> {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };

    match target {
        Value::Object(map) => {
            let key = match key {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => return Err(format!("cannot use {} as a property name", type_name(other))),
            };
            if rest.is_empty() {
                map.insert(key, value);
                return Ok(());
            }
            match map.get_mut(&key) {
                Some(child) => write_path(child, rest, value),
                None => Err(format!("cannot set a property of undefined '{key}'")),
            }
        }
        Value::Array(items) => {
            let index = array_index(key)
                .ok_or_else(|| format!("invalid array index {}", display(key)))?;
            if index == items.len() && rest.is_empty() {
                items.push(value);
                return Ok(());
            }
            let len = items.len();
            match items.get_mut(index) {
                Some(child) => write_path(child, rest, value),
                None => Err(format!("index {index} out of bounds for length {len}")),
            }
        }
        other => Err(format!(
            "cannot set property {} of {}",
            display(key),
            type_name(other)
        )),
    }
}
