//! Template, URL, query, and header encoding errors.

use thiserror::Error;

/// Errors raised while turning request parts into wire form.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The URL template is syntactically broken (unclosed or empty braces).
    #[error("Invalid URL template: {message}")]
    InvalidTemplate {
        /// Description of the template error.
        message: String,
    },

    /// The URL template embeds a query string.
    #[error("URL template must not contain a query string: {template}")]
    QueryInTemplate {
        /// The offending template.
        template: String,
    },

    /// The resolved URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A percent-encoded string contains a bad escape or non UTF-8 data.
    #[error("Malformed percent-encoding in {input:?}")]
    MalformedPercent {
        /// The undecodable input.
        input: String,
    },

    /// A path parameter resolved to `.` or `..`, which URL parsing would
    /// collapse into the surrounding path. Percent-encoded dots are
    /// collapsed too, so there is no encoding that keeps the segment.
    #[error("Path parameter {name:?} cannot be the dot segment {value:?}")]
    DotSegment {
        /// The placeholder name.
        name: String,
        /// The resolved value.
        value: String,
    },

    /// A header name or value is not valid HTTP.
    #[error("Invalid header {name:?}: {message}")]
    InvalidHeader {
        /// The header name as given.
        name: String,
        /// Why the header was rejected.
        message: String,
    },
}

impl EncodingError {
    /// Creates an invalid template error.
    pub fn invalid_template(message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            message: message.into(),
        }
    }
}
