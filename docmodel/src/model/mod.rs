//! Models - schema-bound CRUD over a document store.
//!
//! A [`Model`] is a value: a name, a [`Schema`], an optional store handle, an
//! id generator and an optional validation extension. It holds no document
//! state; every read and write goes to the bound store.
//!
//! ## Example
//!
//! ```ignore
//! use docmodel::{FieldSpec, MemoryStore, Model, SchemaDefinition};
//!
//! let users = Model::new(
//!     "users",
//!     SchemaDefinition::new()
//!         .field("name", FieldSpec::string().required())
//!         .field("age", FieldSpec::number().required()),
//! )
//! .with_store(MemoryStore::new());
//!
//! let saved = users.save(doc).await?;
//! let loaded = users.find_one(saved.id().unwrap()).await?;
//! ```

mod populate;
mod registry;

pub use populate::{RelatedModel, RelationResolver};
pub use registry::ModelRegistry;

use crate::document::{Document, ID_FIELD};
use crate::error::{DocModelError, Result};
use crate::id::{IdGenerator, IdStrategy};
use crate::schema::Schema;
use crate::selector::Selector;
use crate::store::DocumentStore;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Extra whole-document checks run after the schema rules. Returned
/// messages are appended to the schema errors.
pub type ValidationHook = Arc<dyn Fn(&Document) -> Vec<String> + Send + Sync>;

pub struct Model {
    name: String,
    schema: Arc<Schema>,
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    ids: Arc<dyn IdGenerator>,
    extension: Option<ValidationHook>,
}

impl Model {
    /// Create an unbound model. Every operation fails with `NotInitialized`
    /// until a store is bound.
    pub fn new(name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema.into()),
            store: RwLock::new(None),
            ids: Arc::new(IdStrategy::default()),
            extension: None,
        }
    }

    pub fn with_store<S: DocumentStore + 'static>(self, store: S) -> Self {
        self.set_store(Arc::new(store));
        self
    }

    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, ids: G) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_validation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) -> Vec<String> + Send + Sync + 'static,
    {
        self.extension = Some(Arc::new(hook));
        self
    }

    /// Bind (or rebind) the store. Operations already in flight keep the
    /// handle they started with.
    pub fn set_store(&self, store: Arc<dyn DocumentStore>) {
        let mut slot = self.store.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(store);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        let slot = self.store.read().unwrap_or_else(|e| e.into_inner());
        slot.clone().ok_or_else(|| DocModelError::NotInitialized {
            model: self.name.clone(),
        })
    }

    /// Schema rules followed by the validation extension.
    pub fn check(&self, data: &Document) -> Result<()> {
        let mut result = self.schema.validate(data);
        if let Some(hook) = &self.extension {
            result.errors.extend(hook(data));
        }
        result.into_result()
    }

    /// Insert or merge a document.
    ///
    /// An `_id` is assigned before validation when missing, `null` or empty;
    /// a non-string `_id` is rejected. Then defaults are applied and
    /// the document validated. If a document with that id exists, `data` is
    /// merged over it field by field and written against the fetched `_rev`;
    /// otherwise `data` is written as a new document.
    ///
    /// The fetch and the write are separate store calls. A concurrent writer
    /// between them surfaces as the store's conflict error, and a caller
    /// saving a stale full document overwrites newer field values.
    pub async fn save(&self, data: Document) -> Result<Document> {
        let store = self.store()?;
        let mut data = data;

        let needs_id = match data.get(ID_FIELD) {
            None | Some(Value::Null) => true,
            Some(Value::String(id)) => id.is_empty(),
            Some(_) => {
                return Err(DocModelError::ValidationFailed(vec![format!(
                    "Field \"{ID_FIELD}\" must be of type string"
                )]))
            }
        };
        if needs_id {
            data.set_id(self.ids.new_id());
        }
        self.schema.apply_defaults(&mut data);
        self.check(&data)?;

        let id = data.id().unwrap_or_default().to_string();
        let mut doc = match store.get(&id).await {
            Ok(mut existing) => {
                let rev = existing.rev().map(str::to_string);
                existing.merge(&data);
                if let Some(rev) = rev {
                    existing.set_rev(rev);
                }
                existing
            }
            Err(e) if e.is_not_found() => data,
            Err(e) => return Err(e.into()),
        };

        let response = store.put(&doc).await?;
        log::debug!("{}: saved {} at {}", self.name, response.id, response.rev);
        doc.set_id(response.id);
        doc.set_rev(response.rev);
        Ok(doc)
    }

    /// Fetch by id. A missing document is `None`; any other store failure
    /// is returned as is.
    pub async fn find_one(&self, id: &str) -> Result<Option<Document>> {
        let store = self.store()?;
        match store.get(id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Documents matching a selector, in store order.
    pub async fn find(&self, selector: &Selector) -> Result<Vec<Document>> {
        let store = self.store()?;
        Ok(store.query_by_selector(selector).await?)
    }

    /// Like [`Model::find`] but takes a raw JSON selector, and reports both
    /// malformed selectors and store failures as `QueryFailed`.
    pub async fn query(&self, selector: &Value) -> Result<Vec<Document>> {
        let store = self.store()?;
        let selector =
            Selector::parse(selector).map_err(|e| DocModelError::QueryFailed(e.to_string()))?;
        store
            .query_by_selector(&selector)
            .await
            .map_err(|e| DocModelError::QueryFailed(e.to_string()))
    }

    pub async fn find_all(&self) -> Result<Vec<Document>> {
        let store = self.store()?;
        Ok(store.list_all().await?)
    }

    /// Merge `partial` over the stored document and write it back.
    pub async fn update(&self, id: &str, partial: Document) -> Result<Document> {
        let store = self.store()?;
        let mut doc = store.get(id).await.map_err(|e| self.not_found(id, e))?;

        let rev = doc.rev().map(str::to_string);
        doc.merge(&partial);
        doc.set_id(id);
        if let Some(rev) = rev {
            doc.set_rev(rev);
        }

        let response = store.put(&doc).await?;
        log::debug!("{}: updated {} to {}", self.name, id, response.rev);
        doc.set_rev(response.rev);
        Ok(doc)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let store = self.store()?;
        let doc = store.get(id).await.map_err(|e| self.not_found(id, e))?;
        store.remove(&doc).await?;
        log::debug!("{}: deleted {}", self.name, id);
        Ok(())
    }

    fn not_found(&self, id: &str, e: crate::error::StoreError) -> DocModelError {
        if e.is_not_found() {
            DocModelError::NotFound {
                model: self.name.clone(),
                id: id.to_string(),
            }
        } else {
            e.into()
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("bound", &self.store().is_ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::schema::{FieldSpec, SchemaDefinition};
    use crate::store::{MemoryStore, PutResponse, SqliteStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn person_schema() -> SchemaDefinition {
        SchemaDefinition::new()
            .field("name", FieldSpec::string().required())
            .field("age", FieldSpec::number().required())
    }

    fn people() -> Model {
        Model::new("people", person_schema()).with_store(MemoryStore::new())
    }

    /// A store whose every call fails with a backend error.
    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn get(&self, _id: &str) -> std::result::Result<Document, StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn put(&self, _doc: &Document) -> std::result::Result<PutResponse, StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn remove(&self, _doc: &Document) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn query_by_selector(
            &self,
            _selector: &Selector,
        ) -> std::result::Result<Vec<Document>, StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn list_all(&self) -> std::result::Result<Vec<Document>, StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
    }

    /// Reads from a shared map but refuses every write as a conflict.
    struct ConflictingStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for ConflictingStore {
        async fn get(&self, id: &str) -> std::result::Result<Document, StoreError> {
            self.0.get(id).await
        }
        async fn put(&self, doc: &Document) -> std::result::Result<PutResponse, StoreError> {
            Err(StoreError::Conflict {
                id: doc.id().unwrap_or_default().to_string(),
            })
        }
        async fn remove(&self, doc: &Document) -> std::result::Result<(), StoreError> {
            self.0.remove(doc).await
        }
        async fn query_by_selector(
            &self,
            selector: &Selector,
        ) -> std::result::Result<Vec<Document>, StoreError> {
            self.0.query_by_selector(selector).await
        }
        async fn list_all(&self) -> std::result::Result<Vec<Document>, StoreError> {
            self.0.list_all().await
        }
    }

    #[tokio::test]
    async fn test_unbound_model_is_not_initialized() {
        let model = Model::new("people", person_schema());
        let err = model.find_all().await.unwrap_err();
        assert!(matches!(err, DocModelError::NotInitialized { .. }));
        let err = model.save(doc(json!({ "name": "A", "age": 1 }))).await.unwrap_err();
        assert!(matches!(err, DocModelError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_with_ordered_errors() {
        let err = people().save(Document::new()).await.unwrap_err();
        match err {
            DocModelError::ValidationFailed(errors) => assert_eq!(
                errors,
                vec![
                    "Field \"name\" is required".to_string(),
                    "Field \"age\" is required".to_string(),
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_rev() {
        let saved = people().save(doc(json!({ "name": "A", "age": 30 }))).await.unwrap();
        assert!(!saved.id().unwrap().is_empty());
        assert!(saved.rev().unwrap().starts_with("1-"));
        assert_eq!(saved.get("name"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let model = people();
        let saved = model.save(doc(json!({ "name": "A", "age": 30 }))).await.unwrap();
        let loaded = model.find_one(saved.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_save_merges_into_existing() {
        let model = Model::new(
            "things",
            SchemaDefinition::new().field("a", FieldSpec::number()).field("b", FieldSpec::number()),
        )
        .with_store(MemoryStore::new());

        let first = model.save(doc(json!({ "_id": "t1", "a": 1, "b": 2 }))).await.unwrap();
        let merged = model.save(doc(json!({ "_id": "t1", "b": 3 }))).await.unwrap();

        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(3)));
        assert_ne!(merged.rev(), first.rev());
        assert!(merged.rev().unwrap().starts_with("2-"));

        let loaded = model.find_one("t1").await.unwrap().unwrap();
        assert_eq!(loaded.get("a"), Some(&json!(1)));
        assert_eq!(loaded.get("b"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_save_ignores_callers_stale_rev() {
        let model = people();
        let first = model.save(doc(json!({ "name": "A", "age": 1 }))).await.unwrap();
        model.update(first.id().unwrap(), doc(json!({ "age": 2 }))).await.unwrap();

        // `first` still carries revision 1; save writes against the fetched one
        let mut again = first.clone();
        again.insert("name", json!("B"));
        let saved = model.save(again).await.unwrap();
        assert!(saved.rev().unwrap().starts_with("3-"));
        assert_eq!(saved.get("age"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_save_applies_defaults_before_validation() {
        let model = Model::new(
            "users",
            SchemaDefinition::new()
                .field("name", FieldSpec::string().required())
                .field("role", FieldSpec::string().required().default_value(json!("member"))),
        )
        .with_store(MemoryStore::new());
        let saved = model.save(doc(json!({ "name": "A" }))).await.unwrap();
        assert_eq!(saved.get("role"), Some(&json!("member")));
    }

    #[tokio::test]
    async fn test_id_exists_before_validation() {
        let model = Model::new("items", SchemaDefinition::new())
            .with_store(MemoryStore::new())
            .with_id_generator(|| "generated".to_string())
            .with_validation(|d| match d.id() {
                Some("generated") => vec![],
                other => vec![format!("unexpected id {other:?}")],
            });
        let saved = model.save(Document::new()).await.unwrap();
        assert_eq!(saved.id(), Some("generated"));
    }

    #[tokio::test]
    async fn test_validation_extension_appends_errors() {
        let model = Model::new("people", person_schema())
            .with_store(MemoryStore::new())
            .with_validation(|d| {
                if d.get("age").and_then(Value::as_f64).unwrap_or(0.0) < 18.0 {
                    vec!["must be an adult".to_string()]
                } else {
                    vec![]
                }
            });
        let err = model.save(doc(json!({ "age": 10 }))).await.unwrap_err();
        match err {
            DocModelError::ValidationFailed(errors) => assert_eq!(
                errors,
                vec!["Field \"name\" is required".to_string(), "must be an adult".to_string()]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_semantics() {
        let model = people();
        assert_eq!(model.find_one("missing").await.unwrap(), None);

        let err = model.update("missing", Document::new()).await.unwrap_err();
        assert!(matches!(err, DocModelError::NotFound { ref id, .. } if id == "missing"));

        let err = model.delete("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Document not found: people/missing");
    }

    #[tokio::test]
    async fn test_update_merges_and_keeps_id() {
        let model = people();
        let saved = model.save(doc(json!({ "name": "A", "age": 30 }))).await.unwrap();
        let id = saved.id().unwrap().to_string();

        let updated = model
            .update(&id, doc(json!({ "_id": "ignored", "age": 35 })))
            .await
            .unwrap();
        assert_eq!(updated.id(), Some(id.as_str()));
        assert_eq!(updated.get("name"), Some(&json!("A")));
        assert_eq!(updated.get("age"), Some(&json!(35)));
        assert!(updated.rev().unwrap().starts_with("2-"));
        assert!(model.find_one("ignored").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_then_find_one_is_none() {
        let model = people();
        let saved = model.save(doc(json!({ "name": "A", "age": 30 }))).await.unwrap();
        let id = saved.id().unwrap();
        model.delete(id).await.unwrap();
        assert_eq!(model.find_one(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_query_and_find_all() {
        let model = people();
        for (name, age) in [("Alice", 25), ("Bob", 30)] {
            model.save(doc(json!({ "name": name, "age": age }))).await.unwrap();
        }
        assert_eq!(model.find_all().await.unwrap().len(), 2);

        let found = model.find(&Selector::eq("name", json!("Alice"))).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("age"), Some(&json!(25)));

        let older = model.query(&json!({ "age": { "$gte": 30 } })).await.unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].get("name"), Some(&json!("Bob")));
    }

    #[tokio::test]
    async fn test_query_wraps_failures() {
        let err = people().query(&json!({ "age": { "$near": 1 } })).await.unwrap_err();
        assert!(matches!(err, DocModelError::QueryFailed(ref m) if m.contains("$near")));

        let broken = Model::new("people", person_schema()).with_store(BrokenStore);
        let err = broken.query(&json!({})).await.unwrap_err();
        assert!(matches!(err, DocModelError::QueryFailed(ref m) if m.contains("disk on fire")));
    }

    #[tokio::test]
    async fn test_other_store_errors_pass_through() {
        let broken = Model::new("people", person_schema()).with_store(BrokenStore);

        let err = broken.find_one("x").await.unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Backend(_))));

        let err = broken.delete("x").await.unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Backend(_))));

        let err = broken.save(doc(json!({ "name": "A", "age": 1 }))).await.unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Backend(_))));

        let err = broken.find(&Selector::all()).await.unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_rebinding_store() {
        let model = people();
        model.save(doc(json!({ "name": "A", "age": 1 }))).await.unwrap();

        let fresh = MemoryStore::new();
        model.set_store(Arc::new(fresh.clone()));
        assert!(model.find_all().await.unwrap().is_empty());
        model.save(doc(json!({ "name": "B", "age": 2 }))).await.unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_models_are_isolated_by_store() {
        let a = people();
        let b = people();
        a.save(doc(json!({ "name": "A", "age": 1 }))).await.unwrap();
        assert!(b.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_or_rejects_callers_id() {
        let model = Model::new("things", SchemaDefinition::new().field("a", FieldSpec::number()))
            .with_store(MemoryStore::new())
            .with_id_generator(|| "generated".to_string());

        let err = model.save(doc(json!({ "_id": 5, "a": 1 }))).await.unwrap_err();
        match err {
            DocModelError::ValidationFailed(errors) => {
                assert_eq!(errors, vec!["Field \"_id\" must be of type string".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(model.find_all().await.unwrap().is_empty());

        let saved = model.save(doc(json!({ "_id": null, "a": 1 }))).await.unwrap();
        assert_eq!(saved.id(), Some("generated"));
        let saved = model.save(doc(json!({ "_id": "", "a": 2 }))).await.unwrap();
        assert_eq!(saved.id(), Some("generated"));
        let saved = model.save(doc(json!({ "_id": "mine", "a": 3 }))).await.unwrap();
        assert_eq!(saved.id(), Some("mine"));
    }

    #[tokio::test]
    async fn test_conflicts_pass_through() {
        let backing = MemoryStore::new();
        backing.put(&doc(json!({ "_id": "p1", "name": "A", "age": 1 }))).await.unwrap();
        let model = Model::new("people", person_schema()).with_store(ConflictingStore(backing));

        let err = model
            .save(doc(json!({ "_id": "p1", "name": "B", "age": 2 })))
            .await
            .unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Conflict { ref id }) if id == "p1"));

        let err = model.update("p1", doc(json!({ "age": 3 }))).await.unwrap_err();
        assert!(matches!(err, DocModelError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_merge_and_not_found_on_sqlite() {
        let model = Model::new(
            "things",
            SchemaDefinition::new().field("a", FieldSpec::number()).field("b", FieldSpec::number()),
        )
        .with_store(SqliteStore::open_in_memory("things").unwrap());

        model.save(doc(json!({ "_id": "t1", "a": 1, "b": 2 }))).await.unwrap();
        let merged = model.save(doc(json!({ "_id": "t1", "b": 3 }))).await.unwrap();
        assert!(merged.rev().unwrap().starts_with("2-"));

        let loaded = model.find_one("t1").await.unwrap().unwrap();
        assert_eq!(loaded.get("a"), Some(&json!(1)));
        assert_eq!(loaded.get("b"), Some(&json!(3)));
        assert_eq!(loaded.rev(), merged.rev());

        let updated = model.update("t1", doc(json!({ "a": 5 }))).await.unwrap();
        assert!(updated.rev().unwrap().starts_with("3-"));

        assert_eq!(model.find_one("missing").await.unwrap(), None);
        let err = model.update("missing", Document::new()).await.unwrap_err();
        assert!(matches!(err, DocModelError::NotFound { ref id, .. } if id == "missing"));
        let err = model.delete("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Document not found: things/missing");

        model.delete("t1").await.unwrap();
        assert_eq!(model.find_one("t1").await.unwrap(), None);
    }
}
