use crate::models::RecordId;

/// Failures surfaced by either storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("A {entity} named '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error("No {entity} with id {id}")]
    NotFound { entity: &'static str, id: RecordId },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Remote store error: {0}")]
    Remote(String),
}

impl StoreError {
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
