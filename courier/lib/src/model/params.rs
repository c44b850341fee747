//! Ordered key/value sets for path parameters, query parameters, and headers.

use serde::{Deserialize, Serialize};

use crate::body::Body;

/// A single key/value binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param<V> {
    /// Parameter name.
    pub key: String,
    /// Parameter value.
    #[serde(default)]
    pub value: V,
}

/// A path parameter: always carries a value.
pub type PathParam = Param<String>;

/// A query parameter: `None` is a flag-style parameter (`?verbose`).
pub type QueryParam = Param<Option<String>>;

/// A request header.
pub type Header = Param<String>;

/// An ordered list of parameters with unique keys.
///
/// Inserting an existing key replaces its value in place, so the first
/// insertion fixes the position used when encoding.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::QueryParams;
///
/// let mut query = QueryParams::new();
/// query.insert("q", Some("rust".to_string()));
/// query.insert("verbose", None);
/// query.insert("q", Some("serde".to_string()));
///
/// assert_eq!(query.len(), 2);
/// assert_eq!(query.get("q"), Some(&Some("serde".to_string())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Vec<Param<V>>",
    into = "Vec<Param<V>>",
    bound(serialize = "V: Serialize + Clone", deserialize = "V: Deserialize<'de> + Default")
)]
pub struct ParamList<V> {
    entries: Vec<Param<V>>,
}

/// Ordered path parameters.
pub type PathParams = ParamList<String>;

/// Ordered query parameters.
pub type QueryParams = ParamList<Option<String>>;

impl<V> ParamList<V> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|p| p.key == key) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Param { key, value }),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    /// Removes a parameter, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let index = self.entries.iter().position(|p| p.key == key)?;
        Some(self.entries.remove(index).value)
    }

    /// Returns `true` if `key` is bound.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|p| p.key == key)
    }

    /// Iterates over the parameters in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Param<V>> {
        self.entries.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> ParamList<V> {
    /// Overlays `other` on top of `self`; values from `other` win.
    pub fn merge(&mut self, other: &ParamList<V>) {
        for param in &other.entries {
            self.insert(param.key.clone(), param.value.clone());
        }
    }
}

impl QueryParams {
    /// Adds a flag-style parameter with no value.
    pub fn flag(self, key: impl Into<String>) -> Self {
        self.with(key, None)
    }

    /// Returns the parameters as plain ordered pairs.
    pub fn to_pairs(&self) -> Vec<(String, Option<String>)> {
        self.entries
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect()
    }
}

impl<V> Default for ParamList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> From<Vec<Param<V>>> for ParamList<V> {
    fn from(entries: Vec<Param<V>>) -> Self {
        let mut list = Self::new();
        for param in entries {
            list.insert(param.key, param.value);
        }
        list
    }
}

impl<V> From<ParamList<V>> for Vec<Param<V>> {
    fn from(list: ParamList<V>) -> Self {
        list.entries
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for ParamList<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (key, value) in iter {
            list.insert(key, value);
        }
        list
    }
}

impl<'a, V> IntoIterator for &'a ParamList<V> {
    type Item = &'a Param<V>;
    type IntoIter = std::slice::Iter<'a, Param<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Ordered request headers; names are unique ignoring ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Header>", into = "Vec<Header>")]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header. The original spelling of the first
    /// insertion is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|h| h.key.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => self.entries.push(Param { key: name, value }),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a value to a header, joining repeated names with `", "`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|h| h.key.eq_ignore_ascii_case(&name))
        {
            Some(existing) => {
                existing.value.push_str(", ");
                existing.value.push_str(&value);
            }
            None => self.entries.push(Param { key: name, value }),
        }
    }

    /// Returns the value of a header, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns `true` if the header is present, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over the headers in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Header>> for Headers {
    fn from(entries: Vec<Header>) -> Self {
        let mut headers = Self::new();
        for header in entries {
            headers.insert(header.key, header.value);
        }
        headers
    }
}

impl From<Headers> for Vec<Header> {
    fn from(headers: Headers) -> Self {
        headers.entries
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Call-time request inputs: path params, query params, and body.
///
/// Anything set here overrides the definition's defaults: params merge key
/// by key and a non-empty body replaces the definition body. The default
/// value overrides nothing.
///
/// ## Examples
///
/// ```rust
/// use courier_lib::RequestParameters;
///
/// let params = RequestParameters::new()
///     .path("id", "42")
///     .query("expand", "owner")
///     .flag("pretty");
///
/// assert_eq!(params.path_params.get("id").map(String::as_str), Some("42"));
/// assert_eq!(params.query_params.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParameters {
    /// Path parameter bindings.
    #[serde(default)]
    pub path_params: PathParams,
    /// Query parameters.
    #[serde(default)]
    pub query_params: QueryParams,
    /// Request body.
    #[serde(default)]
    pub body: Body,
}

impl RequestParameters {
    /// Creates empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a path parameter.
    pub fn path(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key, value.into());
        self
    }

    /// Adds a query parameter with a value.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key, Some(value.into()));
        self
    }

    /// Adds a flag-style query parameter.
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.query_params.insert(key, None);
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}
