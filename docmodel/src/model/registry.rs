//! ModelRegistry for mapping model names to models.

use super::{Model, RelatedModel, RelationResolver};
use crate::document::Document;
use crate::error::{DocModelError, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Named models, in registration order. Reference declarations resolve
/// against this registry at populate time, so models may point at each
/// other in cycles.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model under its own name, replacing any previous one.
    pub fn register(&mut self, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        self.models.insert(model.name().to_string(), Arc::clone(&model));
        model
    }

    /// Retrieves a model by name.
    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).cloned()
    }

    /// Like [`ModelRegistry::get`] but an unknown name is an error.
    pub fn model(&self, name: &str) -> Result<Arc<Model>> {
        self.get(name)
            .ok_or_else(|| DocModelError::UnknownModel(name.to_string()))
    }

    /// Returns all registered model names.
    pub fn list_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    /// Populate `doc` as a document of the named model.
    pub async fn populate(&self, model: &str, doc: &Document) -> Result<Document> {
        self.model(model)?.populate(doc, self).await
    }
}

impl RelationResolver for ModelRegistry {
    fn related(&self, model: &str) -> Option<Arc<dyn RelatedModel>> {
        self.get(model).map(|m| m as Arc<dyn RelatedModel>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDefinition;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ModelRegistry::new();
        registry.register(Model::new("users", SchemaDefinition::new()));
        registry.register(Model::new("posts", SchemaDefinition::new()));

        assert_eq!(registry.list_models(), vec!["users", "posts"]);
        assert_eq!(registry.get("posts").unwrap().name(), "posts");
        assert!(registry.get("tags").is_none());
        assert!(matches!(
            registry.model("tags").unwrap_err(),
            DocModelError::UnknownModel(_)
        ));
        assert!(registry.related("users").is_some());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ModelRegistry::new();
        let first = registry.register(Model::new("users", SchemaDefinition::new()));
        let second = registry.register(Model::new("users", SchemaDefinition::new()));
        assert_eq!(registry.list_models().len(), 1);
        assert!(Arc::ptr_eq(&registry.get("users").unwrap(), &second));
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
