//! Collections of API definitions.

use serde::{Deserialize, Serialize};

use super::api::ApiDefinition;

/// A named group of API definitions within a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Owning workspace.
    pub workspace: String,
    /// Collection name.
    #[serde(alias = "collection")]
    pub name: String,
    /// Definitions, in display order.
    #[serde(default)]
    pub apis: Vec<ApiDefinition>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
            apis: Vec::new(),
        }
    }

    /// Adds a definition, replacing one with the same name.
    pub fn with_api(mut self, api: ApiDefinition) -> Self {
        self.insert(api);
        self
    }

    /// Adds a definition, replacing one with the same name.
    pub fn insert(&mut self, api: ApiDefinition) {
        match self.apis.iter_mut().find(|a| a.name == api.name) {
            Some(existing) => *existing = api,
            None => self.apis.push(api),
        }
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Option<&ApiDefinition> {
        self.apis.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let collection = Collection::new("acme", "users")
            .with_api(ApiDefinition::builder().name("list").url("/users").build())
            .with_api(ApiDefinition::builder().name("get").url("/users/{id}").build());

        assert_eq!(collection.get("get").map(|a| a.url.as_str()), Some("/users/{id}"));
        assert!(collection.get("delete").is_none());
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut collection = Collection::new("acme", "users");
        collection.insert(ApiDefinition::builder().name("list").url("/v1/users").build());
        collection.insert(ApiDefinition::builder().name("list").url("/v2/users").build());

        assert_eq!(collection.apis.len(), 1);
        assert_eq!(collection.apis[0].url, "/v2/users");
    }
}
