use thiserror::Error;

/// Failures reported by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Document update conflict: {id}")]
    Conflict { id: String },

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// HTTP-style status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } => 404,
            StoreError::Conflict { .. } => 409,
            StoreError::InvalidSelector(_) => 400,
            StoreError::Backend(_) => 500,
        }
    }

    /// True only for the 404 class. This is the single test the models use
    /// to tell "absent" apart from every other failure.
    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(format!("SQLite error: {e}"))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(format!("JSON error: {e}"))
    }
}

#[derive(Error, Debug)]
pub enum DocModelError {
    #[error("Database not initialized for model '{model}'")]
    NotInitialized { model: String },

    #[error("Validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    #[error("Document not found: {model}/{id}")]
    NotFound { model: String, id: String },

    #[error("Invalid reference field: {0}")]
    InvalidReferenceField(String),

    #[error("Referenced model '{0}' is not registered")]
    UnknownModel(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocModelError>;
