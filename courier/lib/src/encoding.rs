//! Percent-encoding for path segments and query strings.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::EncodingError;

/// Everything except the RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes one path segment or query component.
///
/// Space becomes `%20`, never `+`.
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Decodes one percent-encoded component.
///
/// ## Errors
///
/// Returns [`EncodingError::MalformedPercent`] for a `%` not followed by two
/// hex digits, or when the decoded bytes are not UTF-8.
pub fn decode_component(input: &str) -> Result<String, EncodingError> {
    let malformed = || EncodingError::MalformedPercent {
        input: input.to_string(),
    };

    let bytes = input.as_bytes();
    for (i, _) in input.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(malformed());
        }
    }

    percent_decode_str(input)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| malformed())
}

/// Encodes ordered query pairs.
///
/// A `None` value emits the bare key. Pairs keep their input order.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::encoding::encode_query;
///
/// let query = encode_query(&[
///     ("q".to_string(), Some("a b".to_string())),
///     ("flag".to_string(), None),
/// ]);
/// assert_eq!(query, "q=a%20b&flag");
/// ```
pub fn encode_query(pairs: &[(String, Option<String>)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", encode_component(key), encode_component(value)),
            None => encode_component(key),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decodes a query string produced by [`encode_query`].
///
/// A pair without `=` decodes to `None`; `key=` decodes to `Some("")`. Empty
/// segments are skipped.
///
/// ## Errors
///
/// Returns [`EncodingError::MalformedPercent`] for bad escapes.
pub fn decode_query(query: &str) -> Result<Vec<(String, Option<String>)>, EncodingError> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => Ok((decode_component(key)?, Some(decode_component(value)?))),
            None => Ok((decode_component(segment)?, None)),
        })
        .collect()
}
