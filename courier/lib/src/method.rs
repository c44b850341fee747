//! HTTP methods for API definitions.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// HTTP method of an API definition.
///
/// Methods display upper case and parse case-insensitively, so definitions
/// written as `"get"` or `"GET"` load the same way.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::RestMethod;
///
/// let method: RestMethod = "post".parse().unwrap();
/// assert_eq!(method, RestMethod::Post);
/// assert_eq!(method.to_string(), "POST");
/// assert!(method.has_body());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum RestMethod {
    /// HTTP GET - Retrieve a resource.
    #[default]
    #[serde(alias = "get")]
    Get,
    /// HTTP POST - Create a resource or trigger an action.
    #[serde(alias = "post")]
    Post,
    /// HTTP PUT - Replace a resource entirely.
    #[serde(alias = "put")]
    Put,
    /// HTTP PATCH - Partially update a resource.
    #[serde(alias = "patch")]
    Patch,
    /// HTTP DELETE - Remove a resource.
    #[serde(alias = "delete")]
    Delete,
    /// HTTP HEAD - Retrieve headers only.
    #[serde(alias = "head")]
    Head,
    /// HTTP OPTIONS - Query supported methods.
    #[serde(alias = "options")]
    Options,
    /// HTTP TRACE - Echo the request for debugging.
    #[serde(alias = "trace")]
    Trace,
}

impl RestMethod {
    /// Returns `true` if this method typically has a request body.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Converts to the equivalent `reqwest::Method`.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Trace => reqwest::Method::TRACE,
        }
    }
}

impl From<RestMethod> for reqwest::Method {
    fn from(method: RestMethod) -> Self {
        method.to_reqwest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(RestMethod::Get.to_string(), "GET");
        assert_eq!(RestMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_parse_any_case() {
        assert_eq!("GET".parse::<RestMethod>().unwrap(), RestMethod::Get);
        assert_eq!("patch".parse::<RestMethod>().unwrap(), RestMethod::Patch);
        assert_eq!("Options".parse::<RestMethod>().unwrap(), RestMethod::Options);
        assert!("FETCH".parse::<RestMethod>().is_err());
    }

    #[test]
    fn test_serde_accepts_lowercase() {
        let method: RestMethod = serde_json::from_str(r#""put""#).unwrap();
        assert_eq!(method, RestMethod::Put);
        assert_eq!(serde_json::to_string(&method).unwrap(), r#""PUT""#);
    }

    #[test]
    fn test_has_body() {
        assert!(!RestMethod::Get.has_body());
        assert!(RestMethod::Post.has_body());
        assert!(RestMethod::Patch.has_body());
        assert!(!RestMethod::Delete.has_body());
    }

    #[test]
    fn test_every_method_maps_to_reqwest() {
        for method in [
            RestMethod::Get,
            RestMethod::Post,
            RestMethod::Put,
            RestMethod::Patch,
            RestMethod::Delete,
            RestMethod::Head,
            RestMethod::Options,
            RestMethod::Trace,
        ] {
            assert_eq!(method.to_reqwest().as_str(), method.to_string());
        }
    }
}
