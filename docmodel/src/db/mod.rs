use crate::error::{DocModelError, Result};
use crate::id::IdStrategy;
use crate::model::{Model, ModelRegistry};
use crate::schema::{parse_schema, parse_schema_str, SchemaFile};
use crate::store::{DocumentStore, MemoryStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main entry point for a data directory.
/// Parses schema.yaml, opens `_store.db`, and registers one model per
/// declared model, each bound to its own collection.
pub struct Database {
    root: Option<PathBuf>,
    schema: SchemaFile,
    registry: ModelRegistry,
}

impl Database {
    /// Open the data directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(DocModelError::Schema(format!(
                "Data directory does not exist: {}",
                root.display()
            )));
        }

        let schema_path = root.join("schema.yaml");
        if !schema_path.exists() {
            return Err(DocModelError::Schema(format!(
                "schema.yaml not found in {}",
                root.display()
            )));
        }
        let schema = parse_schema(&schema_path)?;

        let base = SqliteStore::open(&root.join("_store.db"), "")?;
        let registry = build_registry(&schema, |name| {
            Arc::new(base.collection(name)) as Arc<dyn DocumentStore>
        })?;

        log::info!(
            "Opened {} with {} model(s)",
            root.display(),
            registry.list_models().len()
        );
        Ok(Self {
            root: Some(root),
            schema,
            registry,
        })
    }

    /// Build a database from schema YAML with every model on its own
    /// [`MemoryStore`]. Nothing is persisted.
    pub fn in_memory(schema_yaml: &str) -> Result<Self> {
        let schema = parse_schema_str(schema_yaml)?;
        let registry = build_registry(&schema, |_| {
            Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>
        })?;
        log::info!("Opened in-memory database with {} model(s)", registry.list_models().len());
        Ok(Self {
            root: None,
            schema,
            registry,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.schema.id_strategy()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Look up a declared model.
    pub fn model(&self, name: &str) -> Result<Arc<Model>> {
        self.registry.model(name)
    }

    /// Model names with their document counts.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let mut models = serde_json::Map::new();
        for model in self.registry.iter() {
            let docs = model.find_all().await?;
            models.insert(
                model.name().to_string(),
                serde_json::json!({ "count": docs.len() }),
            );
        }

        Ok(serde_json::json!({
            "id_strategy": self.id_strategy(),
            "models": models,
        }))
    }
}

fn build_registry<F>(schema: &SchemaFile, store_for: F) -> Result<ModelRegistry>
where
    F: Fn(&str) -> Arc<dyn DocumentStore>,
{
    let ids = schema.id_strategy();
    let mut registry = ModelRegistry::new();
    for name in schema.models.keys() {
        let model = Model::new(name.as_str(), schema.definition(name)?).with_id_generator(ids);
        model.set_store(store_for(name));
        registry.register(model);
    }
    Ok(registry)
}
