use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use auditable_store::error::StoreError;
use auditable_store::storage::{Row, Storage};

/// In-memory [`Storage`] backed by a [`DashMap`] of tables.
///
/// Each table is a `BTreeMap` keyed by id, so scans come back ordered. This
/// implementation is fully synchronous internally; the async trait methods
/// return immediately.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: DashMap<String, BTreeMap<i64, Row>>,
}

impl MemoryStorage {
    /// Create a new, empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert(&self, table: &str, id: i64, row: Row) -> Result<(), StoreError> {
        let mut rows = self.tables.entry(table.to_owned()).or_default();
        if rows.contains_key(&id) {
            return Err(StoreError::Conflict {
                table: table.to_owned(),
                id,
            });
        }
        rows.insert(id, row);
        Ok(())
    }

    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<bool, StoreError> {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(false);
        };
        let Some(existing) = rows.get_mut(&id) else {
            return Ok(false);
        };
        existing.extend(changes);
        Ok(true)
    }

    async fn delete(&self, table: &str, id: i64) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .get_mut(table)
            .is_some_and(|mut rows| rows.remove(&id).is_some()))
    }

    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .and_then(|rows| rows.get(&id).cloned()))
    }

    async fn scan(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}
