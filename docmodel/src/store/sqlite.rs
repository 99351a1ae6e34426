use super::{check_rev, next_rev, require_id, DocumentStore, PutResponse};
use crate::document::Document;
use crate::error::StoreError;
use crate::selector::Selector;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Durable document store on a single SQLite file.
///
/// Each handle addresses one collection; handles made with
/// [`SqliteStore::collection`] share the underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path, collection: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, collection)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(collection: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, collection)
    }

    fn with_connection(conn: Connection, collection: &str) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                rev TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
        })
    }

    /// Handle to another collection in the same database.
    pub fn collection(&self, name: &str) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            collection: name.to_string(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Number of documents in this collection.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".into()))
    }

    fn current_rev(conn: &Connection, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let rev = conn
            .query_row(
                "SELECT rev FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rev)
    }

    fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, rev, data_json FROM documents WHERE collection = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![self.collection], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                rev: row.get(1)?,
                data_json: row.get(2)?,
            })
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let row = row?;
            match row.to_document() {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    log::warn!("Failed to read document {}/{}: {}", self.collection, row.id, e);
                }
            }
        }
        Ok(docs)
    }
}

/// Raw row from the documents table.
struct StoredRow {
    id: String,
    rev: String,
    data_json: String,
}

impl StoredRow {
    fn to_document(&self) -> Result<Document, StoreError> {
        let value: serde_json::Value = serde_json::from_str(&self.data_json)?;
        let mut doc = Document::from_value(value)
            .ok_or_else(|| StoreError::Backend(format!("row {} is not an object", self.id)))?;
        doc.set_id(self.id.clone());
        doc.set_rev(self.rev.clone());
        Ok(doc)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, rev, data_json FROM documents WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
                |row| {
                    Ok(StoredRow {
                        id: row.get(0)?,
                        rev: row.get(1)?,
                        data_json: row.get(2)?,
                    })
                },
            )
            .optional()?;
        match row {
            Some(row) => row.to_document(),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    async fn put(&self, doc: &Document) -> Result<PutResponse, StoreError> {
        let id = require_id(doc)?.to_string();
        let conn = self.lock()?;

        let current = Self::current_rev(&conn, &self.collection, &id)?;
        if let Some(stored) = &current {
            check_rev(&id, stored, doc.rev())?;
        }
        let rev = next_rev(current.as_deref());

        let mut body = doc.clone();
        body.remove(crate::document::REV_FIELD);
        let data_json = serde_json::to_string(&body)?;

        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, rev, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![self.collection, id, rev, data_json],
        )?;

        Ok(PutResponse { id, rev })
    }

    async fn remove(&self, doc: &Document) -> Result<(), StoreError> {
        let id = require_id(doc)?;
        let conn = self.lock()?;

        let stored = Self::current_rev(&conn, &self.collection, id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        check_rev(id, &stored, doc.rev())?;

        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![self.collection, id],
        )?;
        Ok(())
    }

    async fn query_by_selector(&self, selector: &Selector) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|d| selector.matches(d))
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Document>, StoreError> {
        self.load_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_with_revisions() {
        let store = SqliteStore::open_in_memory("users").unwrap();
        let first = store.put(&doc(json!({ "_id": "a", "name": "Alice" }))).await.unwrap();

        let loaded = store.get("a").await.unwrap();
        assert_eq!(loaded.get("name"), Some(&json!("Alice")));
        assert_eq!(loaded.rev(), Some(first.rev.as_str()));

        assert_eq!(store.put(&doc(json!({ "_id": "a" }))).await.unwrap_err().status(), 409);

        let mut next = loaded.clone();
        next.insert("name", json!("Alicia"));
        let second = store.put(&next).await.unwrap();
        assert!(second.rev.starts_with("2-"));
        assert_eq!(store.get("a").await.unwrap().get("name"), Some(&json!("Alicia")));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let users = SqliteStore::open_in_memory("users").unwrap();
        let posts = users.collection("posts");
        users.put(&doc(json!({ "_id": "x" }))).await.unwrap();

        assert!(posts.get("x").await.unwrap_err().is_not_found());
        assert_eq!(users.count().unwrap(), 1);
        assert_eq!(posts.count().unwrap(), 0);
        assert!(posts.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_query() {
        let store = SqliteStore::open_in_memory("users").unwrap();
        for (id, age) in [("b", 30), ("a", 25)] {
            store.put(&doc(json!({ "_id": id, "age": age }))).await.unwrap();
        }
        let sel = Selector::parse(&json!({ "age": { "$lt": 28 } })).unwrap();
        let young = store.query_by_selector(&sel).await.unwrap();
        assert_eq!(young.len(), 1);
        assert_eq!(young[0].id(), Some("a"));

        let a = store.get("a").await.unwrap();
        store.remove(&a).await.unwrap();
        assert!(store.remove(&a).await.unwrap_err().is_not_found());
        assert_eq!(store.list_all().await.unwrap()[0].id(), Some("b"));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("_store.db");
        {
            let store = SqliteStore::open(&path, "tags").unwrap();
            store.put(&doc(json!({ "_id": "rust", "name": "Rust" }))).await.unwrap();
        }
        let store = SqliteStore::open(&path, "tags").unwrap();
        assert_eq!(store.get("rust").await.unwrap().get("name"), Some(&json!("Rust")));
    }
}
