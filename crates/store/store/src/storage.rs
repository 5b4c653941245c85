use async_trait::async_trait;

use crate::error::StoreError;

/// A stored row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Trait for the backend that physically holds rows.
///
/// Rows are addressed by table name and integer id. Implementations must be
/// `Send + Sync` and safe for concurrent access; the session issues its
/// writes sequentially during a flush.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new row. Fails with [`StoreError::Conflict`] if the id is taken.
    async fn insert(&self, table: &str, id: i64, row: Row) -> Result<(), StoreError>;

    /// Merge `changes` into an existing row, leaving other columns untouched.
    /// Returns `false` if the row does not exist.
    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<bool, StoreError>;

    /// Physically remove a row. Returns `true` if the row existed.
    async fn delete(&self, table: &str, id: i64) -> Result<bool, StoreError>;

    /// Fetch a single row.
    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>, StoreError>;

    /// Fetch every row of a table, ordered by id.
    async fn scan(&self, table: &str) -> Result<Vec<Row>, StoreError>;
}
