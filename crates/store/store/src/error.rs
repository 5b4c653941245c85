use thiserror::Error;

/// Errors from the persistence engine and its storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity type not registered in the model: {0}")]
    UnknownEntityType(String),

    #[error("invalid model: {0}")]
    Model(String),

    #[error("query filters are not supported by this engine")]
    QueryFiltersUnsupported,

    #[error("row {table}/{id} already exists")]
    Conflict { table: String, id: i64 },

    #[error("expected to affect row {table}/{id} but it does not exist")]
    Concurrency { table: String, id: i64 },

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
