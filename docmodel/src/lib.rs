pub mod db;
pub mod document;
pub mod error;
pub mod id;
pub mod model;
pub mod schema;
pub mod selector;
pub mod store;
pub mod validation;

pub use db::Database;
pub use document::Document;
pub use error::{DocModelError, Result, StoreError};
pub use id::{IdGenerator, IdStrategy};
pub use model::{Model, ModelRegistry, RelatedModel, RelationResolver};
pub use schema::{FieldSpec, FieldType, Schema, SchemaDefinition, Verdict};
pub use selector::Selector;
pub use store::{DocumentStore, MemoryStore, PutResponse, SqliteStore};
