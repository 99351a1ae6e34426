//! MemoryStore - map-backed document store for tests and embedding.

use super::{check_rev, next_rev, require_id, DocumentStore, PutResponse};
use crate::document::Document;
use crate::error::StoreError;
use crate::selector::Selector;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// In-memory document store. Lists in `_id` order. Clone-friendly via Arc;
/// clones share the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        docs.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn put(&self, doc: &Document) -> Result<PutResponse, StoreError> {
        let id = require_id(doc)?.to_string();
        let mut docs = self
            .docs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;

        let current = docs.get(&id).and_then(|d| d.rev().map(str::to_string));
        if let Some(stored) = &current {
            check_rev(&id, stored, doc.rev())?;
        }

        let rev = next_rev(current.as_deref());
        let mut stored = doc.clone();
        stored.set_rev(rev.clone());
        docs.insert(id.clone(), stored);

        Ok(PutResponse { id, rev })
    }

    async fn remove(&self, doc: &Document) -> Result<(), StoreError> {
        let id = require_id(doc)?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;

        let stored = docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        check_rev(id, stored.rev().unwrap_or_default(), doc.rev())?;
        docs.remove(id);
        Ok(())
    }

    async fn query_by_selector(&self, selector: &Selector) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(docs.values().filter(|d| selector.matches(d)).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(docs.values().cloned().collect())
    }
}
