//! The document store seam.
//!
//! Models never touch storage directly; they call the five primitives below.
//! Durability, indexing and revision tracking belong to the implementation.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::document::Document;
use crate::error::StoreError;
use crate::selector::Selector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    pub id: String,
    pub rev: String,
}

/// A revisioned document store.
///
/// Contract:
/// - `get` fails with [`StoreError::NotFound`] for an unknown id.
/// - `put` requires the current `_rev` when the id already exists and fails
///   with [`StoreError::Conflict`] otherwise. A new id needs no `_rev`.
/// - `remove` fails with `NotFound` for an unknown id and `Conflict` on a
///   stale `_rev`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    async fn put(&self, doc: &Document) -> Result<PutResponse, StoreError>;

    async fn remove(&self, doc: &Document) -> Result<(), StoreError>;

    async fn query_by_selector(&self, selector: &Selector) -> Result<Vec<Document>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Document>, StoreError>;
}

/// Next revision token after `current`: `"<generation>-<32 hex>"`.
pub(crate) fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation.saturating_add(1), uuid::Uuid::new_v4().simple())
}

/// Revision check shared by the bundled stores.
pub(crate) fn check_rev(id: &str, stored: &str, supplied: Option<&str>) -> Result<(), StoreError> {
    if supplied == Some(stored) {
        Ok(())
    } else {
        Err(StoreError::Conflict { id: id.to_string() })
    }
}

pub(crate) fn require_id(doc: &Document) -> Result<&str, StoreError> {
    doc.id()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Backend("document has no _id".into()))
}
