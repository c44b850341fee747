//! URL templates: `{param}` placeholders and `{{var}}` environment references.
//!
//! A template such as `{{base_url}}/users/{id}/todos/{todoId}` is resolved in
//! one pass. Environment references are replaced verbatim by the variable's
//! current value, while placeholder values are environment-expanded and then
//! percent-encoded as a single path segment.

use url::Url;

use crate::encoding::encode_component;
use crate::error::{EncodingError, ExecutionError};
use crate::model::{Environment, PathParams};

/// A piece of a parsed URL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
    Placeholder(&'a str),
}

fn tokenize(template: &str) -> Result<Vec<Segment<'_>>, EncodingError> {
    if template.contains('?') {
        return Err(EncodingError::QueryInTemplate {
            template: template.to_string(),
        });
    }

    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while !rest.is_empty() {
        let Some(start) = rest.find(['{', '}']) else {
            segments.push(Segment::Literal(rest));
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let position = offset + start;
        if rest[start..].starts_with('}') {
            return Err(EncodingError::invalid_template(format!(
                "unexpected '}}' at offset {position} in {template:?}"
            )));
        }

        let consumed = if let Some(inner) = rest[start..].strip_prefix("{{") {
            let end = inner.find("}}").ok_or_else(|| {
                EncodingError::invalid_template(format!(
                    "unclosed '{{{{' at offset {position} in {template:?}"
                ))
            })?;
            let name = inner[..end].trim();
            if name.is_empty() || name.contains(['{', '}']) {
                return Err(EncodingError::invalid_template(format!(
                    "invalid variable reference at offset {position} in {template:?}"
                )));
            }
            segments.push(Segment::Variable(name));
            start + 2 + end + 2
        } else {
            let inner = &rest[start + 1..];
            let end = inner.find(['{', '}']).filter(|&i| inner[i..].starts_with('}'));
            let end = end.ok_or_else(|| {
                EncodingError::invalid_template(format!(
                    "unclosed '{{' at offset {position} in {template:?}"
                ))
            })?;
            let name = &inner[..end];
            if name.trim().is_empty() {
                return Err(EncodingError::invalid_template(format!(
                    "empty placeholder at offset {position} in {template:?}"
                )));
            }
            segments.push(Segment::Placeholder(name));
            start + 1 + end + 1
        };

        rest = &rest[consumed..];
        offset += consumed;
    }

    Ok(segments)
}

/// Lists the path placeholder names of a template, in order of first
/// appearance.
///
/// ## Errors
///
/// Returns an [`EncodingError`] when the template is malformed.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::template::placeholders;
///
/// let names = placeholders("{{host}}/users/{id}/todos/{todoId}/{id}").unwrap();
/// assert_eq!(names, vec!["id", "todoId"]);
/// ```
pub fn placeholders(template: &str) -> Result<Vec<&str>, EncodingError> {
    let mut names: Vec<&str> = Vec::new();
    for segment in tokenize(template)? {
        if let Segment::Placeholder(name) = segment {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Replaces `{{var}}` references with current environment values.
///
/// References to unknown variables are left as literal text. Text that does
/// not form a reference passes through unchanged.
pub fn expand_variables(text: &str, environment: &Environment) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };
        let name = after[..end].trim();
        match environment.value(name) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    output.push_str(rest);
    output
}

/// Substitutes a template into a URL string without parsing it.
///
/// ## Errors
///
/// - [`ExecutionError::MissingPathParam`] when a placeholder has no value
/// - [`ExecutionError::UnresolvedVariable`] when a `{{var}}` in the template
///   names an unknown variable
/// - [`ExecutionError::Encoding`] when the template is malformed or a
///   placeholder resolves to `.` or `..`
pub fn substitute(
    template: &str,
    path_params: &PathParams,
    environment: &Environment,
) -> Result<String, ExecutionError> {
    let mut output = String::with_capacity(template.len());
    for segment in tokenize(template)? {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Variable(name) => {
                let value =
                    environment
                        .value(name)
                        .ok_or_else(|| ExecutionError::UnresolvedVariable {
                            name: name.to_string(),
                        })?;
                output.push_str(value);
            }
            Segment::Placeholder(name) => {
                let value =
                    path_params
                        .get(name)
                        .ok_or_else(|| ExecutionError::MissingPathParam {
                            name: name.to_string(),
                        })?;
                let value = expand_variables(value, environment);
                if value == "." || value == ".." {
                    return Err(EncodingError::DotSegment {
                        name: name.to_string(),
                        value,
                    }
                    .into());
                }
                output.push_str(&encode_component(&value));
            }
        }
    }
    Ok(output)
}

/// Parses a resolved URL, joining relative paths onto `base_url`.
///
/// The base URL's own path is kept: `https://api.test/v1` joined with
/// `/users` gives `https://api.test/v1/users`.
///
/// ## Errors
///
/// Returns [`EncodingError::InvalidUrl`] when the result is not an absolute
/// URL and no base URL is available.
pub fn absolute_url(resolved: &str, base_url: Option<&Url>) -> Result<Url, EncodingError> {
    match Url::parse(resolved) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let Some(base) = base_url else {
                return Err(url::ParseError::RelativeUrlWithoutBase.into());
            };
            let base = base.as_str().trim_end_matches('/');
            let path = resolved.trim_start_matches('/');
            Ok(Url::parse(&format!("{base}/{path}"))?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Resolves a URL template into an absolute URL.
///
/// ## Errors
///
/// Everything [`substitute`] and [`absolute_url`] report.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::{Environment, PathParams};
/// use courier_lib::template::resolve_url;
///
/// let env = Environment::new("acme", "dev").with_variable("host", "https://api.acme.test");
/// let params = PathParams::new()
///     .with("id", "1".to_string())
///     .with("todoId", "2".to_string());
///
/// let url = resolve_url("{{host}}/users/{id}/todos/{todoId}", &params, &env, None).unwrap();
/// assert_eq!(url.as_str(), "https://api.acme.test/users/1/todos/2");
/// ```
pub fn resolve_url(
    template: &str,
    path_params: &PathParams,
    environment: &Environment,
    base_url: Option<&Url>,
) -> Result<Url, ExecutionError> {
    let resolved = substitute(template, path_params, environment)?;
    Ok(absolute_url(&resolved, base_url)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> PathParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env() -> Environment {
        Environment::new("ws", "dev")
            .with_variable("host", "https://api.test")
            .with_variable("tenant", "acme corp")
    }

    #[test]
    fn substitutes_placeholders() {
        let path = substitute(
            "/users/{id}/todos/{todoId}",
            &params(&[("id", "1"), ("todoId", "2")]),
            &env(),
        )
        .unwrap();
        assert_eq!(path, "/users/1/todos/2");
    }

    #[test]
    fn placeholder_values_are_one_segment() {
        let path = substitute("/files/{name}", &params(&[("name", "a/b c{x}")]), &env()).unwrap();
        assert_eq!(path, "/files/a%2Fb%20c%7Bx%7D");
    }

    #[test]
    fn placeholder_values_are_env_expanded() {
        let path = substitute(
            "/orgs/{org}/{other}",
            &params(&[("org", "{{tenant}}"), ("other", "{{nope}}")]),
            &env(),
        )
        .unwrap();
        assert_eq!(path, "/orgs/acme%20corp/%7B%7Bnope%7D%7D");
    }

    #[test]
    fn dot_segment_values_are_rejected() {
        for value in [".", ".."] {
            let err = resolve_url(
                "https://api.test/users/{id}/todos",
                &params(&[("id", value)]),
                &env(),
                None,
            )
            .unwrap_err();
            assert!(
                matches!(
                    &err,
                    ExecutionError::Encoding(EncodingError::DotSegment { name, .. }) if name == "id"
                ),
                "{value} gave {err:?}"
            );
        }

        let url = resolve_url(
            "https://api.test/users/{id}/todos",
            &params(&[("id", "...")]),
            &env(),
            None,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://api.test/users/.../todos");
    }

    #[test]
    fn missing_param_is_reported() {
        let err = substitute("/users/{id}", &PathParams::new(), &env()).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingPathParam { name } if name == "id"));
    }

    #[test]
    fn unknown_template_variable_is_reported() {
        let err = substitute("{{missing}}/users", &PathParams::new(), &env()).unwrap_err();
        assert!(matches!(err, ExecutionError::UnresolvedVariable { name } if name == "missing"));
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for template in ["/users/{id", "/users/{}", "/users/id}", "/a/{{host", "/a/{{ }}", "/a/{b{c}"] {
            let err = substitute(template, &params(&[("id", "1")]), &env()).unwrap_err();
            assert!(
                matches!(err, ExecutionError::Encoding(EncodingError::InvalidTemplate { .. })),
                "{template} gave {err:?}"
            );
        }
    }

    #[test]
    fn query_in_template_is_rejected() {
        let err = substitute("/users?page=1", &PathParams::new(), &env()).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Encoding(EncodingError::QueryInTemplate { .. })
        ));
    }

    #[test]
    fn resolves_against_template_variable() {
        let url = resolve_url("{{host}}/users/{id}", &params(&[("id", "7")]), &env(), None).unwrap();
        assert_eq!(url.as_str(), "https://api.test/users/7");
    }

    #[test]
    fn relative_template_joins_base_path() {
        let base = Url::parse("https://api.test/v1/").unwrap();
        let url = resolve_url("/users", &PathParams::new(), &env(), Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/users");
    }

    #[test]
    fn relative_template_without_base_fails() {
        let err = resolve_url("/users", &PathParams::new(), &env(), None).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Encoding(EncodingError::InvalidUrl(_))
        ));
    }

    #[test]
    fn expand_leaves_unknown_and_unclosed_references() {
        let env = env();
        assert_eq!(expand_variables("{{ tenant }}!", &env), "acme corp!");
        assert_eq!(expand_variables("{{nope}} {{tenant", &env), "{{nope}} {{tenant");
        assert_eq!(expand_variables("plain {x}", &env), "plain {x}");
    }

    #[test]
    fn placeholders_are_deduplicated_in_order() {
        assert_eq!(placeholders("/{b}/{a}/{b}").unwrap(), vec!["b", "a"]);
        assert!(placeholders("/static").unwrap().is_empty());
    }

    fn template_and_params() -> impl Strategy<Value = (String, PathParams)> {
        let value = "[^\r\n]{0,10}".prop_filter("dot segments are rejected", |v| v != "." && v != "..");
        proptest::collection::vec(("[a-z][a-zA-Z0-9_]{0,6}", value), 1..5).prop_map(
            |entries| {
                let mut template = String::new();
                let mut params = PathParams::new();
                for (name, value) in entries {
                    template.push_str(&format!("/seg/{{{name}}}"));
                    params.insert(name, value);
                }
                (template, params)
            },
        )
    }

    proptest! {
        #[test]
        fn bound_templates_resolve_without_braces((template, params) in template_and_params()) {
            let resolved = substitute(&template, &params, &Environment::default()).unwrap();
            prop_assert!(!resolved.contains('{'), "resolved contains '{{'");
            prop_assert!(!resolved.contains('}'), "resolved contains '}}'");
        }

        #[test]
        fn unbound_placeholder_fails(
            (template, params) in template_and_params(),
            extra in "[a-z]{1,6}",
        ) {
            let name = format!("missing_{extra}");
            let template = format!("{template}/{{{name}}}");
            let err = substitute(&template, &params, &Environment::default()).unwrap_err();
            let is_missing = matches!(err, ExecutionError::MissingPathParam { name: n } if n == name);
            prop_assert!(is_missing);
        }
    }
}
