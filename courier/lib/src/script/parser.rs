//! PEG parser producing the script syntax tree.

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde_json::{Number, Value};

use super::ast::{Accessor, AssignOp, BinaryOp, Expr, Place, Program, Stmt, StmtKind, UnaryOp};
use crate::error::ScriptError;

#[derive(Parser)]
#[grammar = "script/grammar.pest"]
struct ScriptParser;

type ParseResult<T> = Result<T, ScriptError>;

/// An expression with the height of its tree.
type Built = (Expr, usize);

/// Deepest nesting of parentheses, brackets and braces a script may use.
pub const MAX_NESTING: usize = 32;

/// Deepest expression tree a script may build.
pub const MAX_EXPRESSION_DEPTH: usize = 100;

/// Parses script source into a [`Program`].
///
/// ## Errors
///
/// Returns [`ScriptError::Parse`] with the 1-based position of the first
/// syntax error, or when the script nests deeper than [`MAX_NESTING`]
/// brackets or [`MAX_EXPRESSION_DEPTH`] expressions.
pub fn parse(source: &str) -> ParseResult<Program> {
    check_nesting(source)?;
    let mut pairs = ScriptParser::parse(Rule::script, source).map_err(syntax_error)?;
    let script = pairs.next().ok_or_else(|| malformed(1, "script"))?;
    let statements = children(script)
        .map(build_statement)
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(Program { statements })
}

fn syntax_error(err: pest::error::Error<Rule>) -> ScriptError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let err = err.renamed_rules(|rule| describe(*rule).to_string());
    ScriptError::Parse {
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

/// Rejects bracket nesting beyond [`MAX_NESTING`] before the recursive
/// descent sees it. Brackets inside strings and comments do not count.
fn check_nesting(source: &str) -> ParseResult<()> {
    let mut depth = 0usize;
    let (mut line, mut column) = (1, 0);
    let mut quote = None;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        advance(c, &mut line, &mut column);

        if let Some(open) = quote {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    advance(escaped, &mut line, &mut column);
                }
            } else if c == open || c == '\n' {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                let mut previous = '\0';
                for n in chars.by_ref() {
                    advance(n, &mut line, &mut column);
                    if previous == '*' && n == '/' {
                        break;
                    }
                    previous = n;
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ScriptError::Parse {
                        line,
                        column,
                        message: format!("brackets nested deeper than {MAX_NESTING} levels"),
                    });
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(())
}

fn advance(c: char, line: &mut usize, column: &mut usize) {
    if c == '\n' {
        *line += 1;
        *column = 0;
    } else {
        *column += 1;
    }
}

/// Height of a node whose tallest child has the given height.
fn nested(line: usize, height: usize) -> ParseResult<usize> {
    let height = height + 1;
    if height > MAX_EXPRESSION_DEPTH {
        return Err(ScriptError::Parse {
            line,
            column: 1,
            message: format!("expression nested deeper than {MAX_EXPRESSION_DEPTH} levels"),
        });
    }
    Ok(height)
}

fn describe(rule: Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of script",
        Rule::or_expr
        | Rule::and_expr
        | Rule::eq_expr
        | Rule::cmp_expr
        | Rule::add_expr
        | Rule::mul_expr
        | Rule::unary
        | Rule::postfix => "expression",
        Rule::ident | Rule::place => "identifier",
        Rule::prop_name => "property name",
        Rule::assign_op => "assignment",
        Rule::block => "block",
        Rule::number => "number",
        Rule::string => "string",
        Rule::entry => "object entry",
        Rule::member | Rule::index | Rule::call => "'.', '[' or '('",
        Rule::kw_let | Rule::kw_const => "'let' or 'const'",
        Rule::kw_else => "'else'",
        Rule::kw_of => "'of'",
        Rule::op_or
        | Rule::op_and
        | Rule::op_eq
        | Rule::op_ne
        | Rule::op_le
        | Rule::op_ge
        | Rule::op_lt
        | Rule::op_gt
        | Rule::op_add
        | Rule::op_sub
        | Rule::op_mul
        | Rule::op_div
        | Rule::op_mod => "operator",
        _ => "statement",
    }
}

fn malformed(line: usize, what: &str) -> ScriptError {
    ScriptError::Parse {
        line,
        column: 1,
        message: format!("malformed {what}"),
    }
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Inner pairs without the keyword markers the grammar keeps for atomicity.
fn children(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_if | Rule::kw_else | Rule::kw_for | Rule::kw_of | Rule::kw_throw | Rule::EOI
        )
    })
}

fn next_pair<'a>(
    pairs: &mut impl Iterator<Item = Pair<'a, Rule>>,
    line: usize,
    what: &str,
) -> ParseResult<Pair<'a, Rule>> {
    pairs.next().ok_or_else(|| malformed(line, what))
}

/* ===================== Statements ===================== */

fn build_statement(pair: Pair<'_, Rule>) -> ParseResult<Stmt> {
    let line = line_of(&pair);
    let kind = match pair.as_rule() {
        Rule::block => StmtKind::Block(build_block(pair)?),
        Rule::if_stmt => build_if(pair)?,
        Rule::for_stmt => build_for(pair)?,
        Rule::declare_stmt => {
            let mut inner = children(pair);
            let mutable = next_pair(&mut inner, line, "declaration")?.as_rule() == Rule::kw_let;
            let name = next_pair(&mut inner, line, "declaration")?.as_str().to_string();
            let value = expression(next_pair(&mut inner, line, "declaration")?)?;
            StmtKind::Declare {
                name,
                mutable,
                value,
            }
        }
        Rule::throw_stmt => {
            let mut inner = children(pair);
            StmtKind::Throw(expression(next_pair(&mut inner, line, "throw")?)?)
        }
        Rule::assign_stmt => {
            let mut inner = children(pair);
            let target = build_place(next_pair(&mut inner, line, "assignment")?)?;
            let op = match next_pair(&mut inner, line, "assignment")?.as_str() {
                "+=" => AssignOp::Add,
                "-=" => AssignOp::Sub,
                _ => AssignOp::Set,
            };
            let value = expression(next_pair(&mut inner, line, "assignment")?)?;
            StmtKind::Assign { target, op, value }
        }
        Rule::expr_stmt => {
            let mut inner = children(pair);
            StmtKind::Expr(expression(next_pair(&mut inner, line, "expression")?)?)
        }
        other => return Err(malformed(line, &format!("statement {other:?}"))),
    };
    Ok(Stmt { kind, line })
}

fn build_block(pair: Pair<'_, Rule>) -> ParseResult<Vec<Stmt>> {
    children(pair).map(build_statement).collect()
}

fn build_if(pair: Pair<'_, Rule>) -> ParseResult<StmtKind> {
    let line = line_of(&pair);
    let mut inner = children(pair);
    let mut branches = Vec::new();
    let mut otherwise = None;

    while let Some(next) = inner.next() {
        if next.as_rule() == Rule::block {
            otherwise = Some(build_block(next)?);
            break;
        }
        let test = expression(next)?;
        let body = build_block(next_pair(&mut inner, line, "if body")?)?;
        branches.push((test, body));
    }

    Ok(StmtKind::If {
        branches,
        otherwise,
    })
}

fn build_for(pair: Pair<'_, Rule>) -> ParseResult<StmtKind> {
    let line = line_of(&pair);
    let mut inner = children(pair);
    next_pair(&mut inner, line, "for binding")?;
    let binding = next_pair(&mut inner, line, "for binding")?.as_str().to_string();
    let iterable = expression(next_pair(&mut inner, line, "for iterable")?)?;
    let body = build_block(next_pair(&mut inner, line, "for body")?)?;
    Ok(StmtKind::For {
        binding,
        iterable,
        body,
    })
}

fn build_place(pair: Pair<'_, Rule>) -> ParseResult<Place> {
    let line = line_of(&pair);
    let mut inner = children(pair);
    let root = next_pair(&mut inner, line, "assignment target")?
        .as_str()
        .to_string();
    let path = inner
        .map(|segment| build_accessor(segment, line).map(|(accessor, _)| accessor))
        .collect::<ParseResult<Vec<_>>>()?;
    nested(line, path.len())?;
    Ok(Place { root, path })
}

fn build_accessor(pair: Pair<'_, Rule>, line: usize) -> ParseResult<(Accessor, usize)> {
    let rule = pair.as_rule();
    let mut inner = children(pair);
    let child = next_pair(&mut inner, line, "accessor")?;
    match rule {
        Rule::member => Ok((Accessor::Field(child.as_str().to_string()), 0)),
        Rule::index => {
            let (index, height) = build_expr(child)?;
            Ok((Accessor::Index(index), height))
        }
        other => Err(malformed(line, &format!("accessor {other:?}"))),
    }
}

/* ===================== Expressions ===================== */

fn expression(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
    build_expr(pair).map(|(expr, _)| expr)
}

fn build_expr(pair: Pair<'_, Rule>) -> ParseResult<Built> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::or_expr
        | Rule::and_expr
        | Rule::eq_expr
        | Rule::cmp_expr
        | Rule::add_expr
        | Rule::mul_expr => build_binary(pair),
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        Rule::number => Ok((build_number(pair.as_str(), line)?, 1)),
        Rule::string => {
            let mut inner = children(pair);
            let chars = next_pair(&mut inner, line, "string")?;
            let text = unescape(chars.as_str(), line)?;
            Ok((Expr::Literal(Value::String(text)), 1))
        }
        Rule::true_lit => Ok((Expr::Literal(Value::Bool(true)), 1)),
        Rule::false_lit => Ok((Expr::Literal(Value::Bool(false)), 1)),
        Rule::null_lit => Ok((Expr::Literal(Value::Null), 1)),
        Rule::ident => Ok((Expr::Ident(pair.as_str().to_string()), 1)),
        Rule::array => {
            let mut height = 0;
            let mut items = Vec::new();
            for item in children(pair) {
                let (item, item_height) = build_expr(item)?;
                height = height.max(item_height);
                items.push(item);
            }
            Ok((Expr::Array(items), nested(line, height)?))
        }
        Rule::object => {
            let mut height = 0;
            let mut entries = Vec::new();
            for entry in children(pair) {
                let line = line_of(&entry);
                let mut inner = children(entry);
                let key = next_pair(&mut inner, line, "object key")?;
                let key = match key.as_rule() {
                    Rule::string => {
                        let mut chars = children(key);
                        unescape(next_pair(&mut chars, line, "object key")?.as_str(), line)?
                    }
                    _ => key.as_str().to_string(),
                };
                let (value, value_height) =
                    build_expr(next_pair(&mut inner, line, "object value")?)?;
                height = height.max(value_height);
                entries.push((key, value));
            }
            Ok((Expr::Object(entries), nested(line, height)?))
        }
        other => Err(malformed(line, &format!("expression {other:?}"))),
    }
}

fn build_binary(pair: Pair<'_, Rule>) -> ParseResult<Built> {
    let line = line_of(&pair);
    let mut inner = children(pair);
    let (mut left, mut height) = build_expr(next_pair(&mut inner, line, "operand")?)?;

    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_rule() {
            Rule::op_or => BinaryOp::Or,
            Rule::op_and => BinaryOp::And,
            Rule::op_eq => BinaryOp::Eq,
            Rule::op_ne => BinaryOp::Ne,
            Rule::op_lt => BinaryOp::Lt,
            Rule::op_le => BinaryOp::Le,
            Rule::op_gt => BinaryOp::Gt,
            Rule::op_ge => BinaryOp::Ge,
            Rule::op_add => BinaryOp::Add,
            Rule::op_sub => BinaryOp::Sub,
            Rule::op_mul => BinaryOp::Mul,
            Rule::op_div => BinaryOp::Div,
            Rule::op_mod => BinaryOp::Mod,
            other => return Err(malformed(line, &format!("operator {other:?}"))),
        };
        let (right, right_height) = build_expr(next_pair(&mut inner, line, "right operand")?)?;
        height = nested(line, height.max(right_height))?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }

    Ok((left, height))
}

fn build_unary(pair: Pair<'_, Rule>) -> ParseResult<Built> {
    let line = line_of(&pair);
    let mut parts: Vec<_> = children(pair).collect();
    let operand = parts.pop().ok_or_else(|| malformed(line, "unary operand"))?;
    let (mut expr, mut height) = build_expr(operand)?;

    for op in parts.iter().rev() {
        let op = match op.as_rule() {
            Rule::op_not => UnaryOp::Not,
            _ => UnaryOp::Neg,
        };
        height = nested(line, height)?;
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }

    Ok((expr, height))
}

fn build_postfix(pair: Pair<'_, Rule>) -> ParseResult<Built> {
    let line = line_of(&pair);
    let mut inner = children(pair);
    let (mut expr, mut height) = build_expr(next_pair(&mut inner, line, "expression")?)?;

    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::member | Rule::index => {
                let (accessor, accessor_height) = build_accessor(suffix, line)?;
                height = nested(line, height.max(accessor_height))?;
                match accessor {
                    Accessor::Field(field) => Expr::Member {
                        object: Box::new(expr),
                        field,
                    },
                    Accessor::Index(index) => Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                }
            }
            Rule::call => {
                let column = suffix.as_span().start_pos().line_col().1;
                let function = dotted_name(&expr).ok_or_else(|| ScriptError::Parse {
                    line,
                    column,
                    message: "only builtin functions can be called".to_string(),
                })?;
                let mut args_height = 0;
                let mut args = Vec::new();
                for arg in children(suffix) {
                    let (arg, arg_height) = build_expr(arg)?;
                    args_height = args_height.max(arg_height);
                    args.push(arg);
                }
                height = nested(line, args_height)?;
                Expr::Call { function, args }
            }
            other => return Err(malformed(line, &format!("suffix {other:?}"))),
        };
    }

    Ok((expr, height))
}

fn dotted_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member { object, field } => Some(format!("{}.{field}", dotted_name(object)?)),
        _ => None,
    }
}

fn build_number(text: &str, line: usize) -> ParseResult<Expr> {
    if let Ok(int) = text.parse::<i64>() {
        return Ok(Expr::Literal(Value::from(int)));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(|n| Expr::Literal(Value::Number(n)))
        .ok_or_else(|| ScriptError::Parse {
            line,
            column: 1,
            message: format!("number out of range: {text}"),
        })
}

fn unescape(raw: &str, line: usize) -> ParseResult<String> {
    let bad_escape = |what: &str| ScriptError::Parse {
        line,
        column: 1,
        message: format!("invalid escape sequence {what}"),
    };

    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some('r') => output.push('\r'),
            Some('0') => output.push('\0'),
            Some(c @ ('\\' | '"' | '\'' | '/')) => output.push(c),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| bad_escape(&format!("\\u{hex}")))?;
                output.push(decoded);
            }
            Some(other) => return Err(bad_escape(&format!("\\{other}"))),
            None => return Err(bad_escape("at end of string")),
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(source: &str) -> StmtKind {
        let program = parse(source).unwrap();
        assert_eq!(program.statements.len(), 1, "{source}");
        program.statements.into_iter().next().unwrap().kind
    }

    #[test]
    fn test_declare() {
        assert_eq!(
            single("const x = 1"),
            StmtKind::Declare {
                name: "x".to_string(),
                mutable: false,
                value: Expr::Literal(json!(1)),
            }
        );
    }

    #[test]
    fn test_precedence() {
        let StmtKind::Expr(expr) = single("1 + 2 * 3") else {
            panic!("expected expression");
        };
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Literal(json!(1))),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Literal(json!(2))),
                    right: Box::new(Expr::Literal(json!(3))),
                }),
            }
        );
    }

    #[test]
    fn test_builtin_call_name() {
        let StmtKind::Expr(Expr::Call { function, args }) = single("env.set('token', \"a\\nb\");")
        else {
            panic!("expected call");
        };
        assert_eq!(function, "env.set");
        assert_eq!(args, vec![Expr::Literal(json!("token")), Expr::Literal(json!("a\nb"))]);
    }

    #[test]
    fn test_assign_into_request() {
        let StmtKind::Assign { target, op, .. } = single(r#"request.headers["X-Id"] = "1""#) else {
            panic!("expected assignment");
        };
        assert_eq!(op, AssignOp::Set);
        assert_eq!(target.root, "request");
        assert_eq!(target.path.len(), 2);
        assert_eq!(target.path[0], Accessor::Field("headers".to_string()));
    }

    #[test]
    fn test_strict_equality_maps_to_eq() {
        let StmtKind::Expr(Expr::Binary { op, .. }) = single("a === b") else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Eq);
    }

    #[test]
    fn test_else_if_chain() {
        let kind = single("if (a) { x = 1 } else if (b) { x = 2 } else { x = 3 }");
        let StmtKind::If {
            branches,
            otherwise,
        } = kind
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_for_of() {
        let StmtKind::For { binding, body, .. } = single("for (let item of [1, 2]) { console.log(item) }")
        else {
            panic!("expected for");
        };
        assert_eq!(binding, "item");
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_comments_and_lines() {
        let program = parse("// leading\nlet a = 1;\n/* block\ncomment */\nthrow 'x'").unwrap();
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[0].line, 2);
        assert_eq!(program.statements[1].line, 5);
    }

    #[test]
    fn test_keywords_are_not_identifiers() {
        assert!(parse("let if = 1").is_err());
        assert!(parse("let letter = 1").is_ok());
        assert!(parse("x = response.body.null").is_ok());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse("let a = 1\nlet = 2").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn test_only_builtins_are_callable() {
        let err = parse("(1)(2)").unwrap_err();
        assert!(err.to_string().contains("only builtin functions"));
    }

    #[test]
    fn test_object_literal() {
        let StmtKind::Declare { value, .. } = single(r#"let o = {a: 1, "b c": [true, null],}"#) else {
            panic!("expected declaration");
        };
        assert_eq!(
            value,
            Expr::Object(vec![
                ("a".to_string(), Expr::Literal(json!(1))),
                (
                    "b c".to_string(),
                    Expr::Array(vec![Expr::Literal(json!(true)), Expr::Literal(Value::Null)])
                ),
            ])
        );
    }
}
