use serde_json::json;

use crate::error::StoreError;
use crate::storage::{Row, Storage};

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// Run the full storage conformance test suite.
///
/// Call this from your backend's test module with a fresh storage instance.
///
/// # Errors
///
/// Returns an error if the backend fails an operation outright; behavioural
/// mismatches panic through `assert!`.
pub async fn run_storage_conformance_tests(storage: &dyn Storage) -> Result<(), StoreError> {
    test_get_missing(storage).await?;
    test_insert_and_get(storage).await?;
    test_insert_conflict(storage).await?;
    test_update_merges_columns(storage).await?;
    test_update_missing(storage).await?;
    test_delete(storage).await?;
    test_scan_ordered_by_id(storage).await?;
    test_tables_are_isolated(storage).await?;
    Ok(())
}

async fn test_get_missing(storage: &dyn Storage) -> Result<(), StoreError> {
    let found = storage.get("conformance_missing", 1).await?;
    assert!(found.is_none(), "get on missing row should return None");
    Ok(())
}

async fn test_insert_and_get(storage: &dyn Storage) -> Result<(), StoreError> {
    let table = "conformance_insert";
    storage
        .insert(table, 1, row(json!({"id": 1, "name": "first"})))
        .await?;
    let found = storage.get(table, 1).await?;
    assert_eq!(found, Some(row(json!({"id": 1, "name": "first"}))));
    Ok(())
}

async fn test_insert_conflict(storage: &dyn Storage) -> Result<(), StoreError> {
    let table = "conformance_conflict";
    storage.insert(table, 7, row(json!({"id": 7}))).await?;
    let second = storage.insert(table, 7, row(json!({"id": 7}))).await;
    assert!(
        matches!(second, Err(StoreError::Conflict { id: 7, .. })),
        "second insert with the same id should conflict"
    );
    Ok(())
}

async fn test_update_merges_columns(storage: &dyn Storage) -> Result<(), StoreError> {
    let table = "conformance_update";
    storage
        .insert(table, 1, row(json!({"id": 1, "name": "old", "flag": false})))
        .await?;

    let existed = storage.update(table, 1, row(json!({"flag": true}))).await?;
    assert!(existed, "update on existing row should return true");

    let found = storage.get(table, 1).await?;
    assert_eq!(
        found,
        Some(row(json!({"id": 1, "name": "old", "flag": true}))),
        "columns not named in the update should be untouched"
    );
    Ok(())
}

async fn test_update_missing(storage: &dyn Storage) -> Result<(), StoreError> {
    let existed = storage
        .update("conformance_update_missing", 99, row(json!({"flag": true})))
        .await?;
    assert!(!existed, "update on missing row should return false");
    let found = storage.get("conformance_update_missing", 99).await?;
    assert!(found.is_none(), "update should not create rows");
    Ok(())
}

async fn test_delete(storage: &dyn Storage) -> Result<(), StoreError> {
    let table = "conformance_delete";
    storage.insert(table, 3, row(json!({"id": 3}))).await?;

    let existed = storage.delete(table, 3).await?;
    assert!(existed, "delete should return true for existing row");
    assert!(storage.get(table, 3).await?.is_none());

    let existed = storage.delete(table, 3).await?;
    assert!(!existed, "delete on missing row should return false");
    Ok(())
}

async fn test_scan_ordered_by_id(storage: &dyn Storage) -> Result<(), StoreError> {
    let table = "conformance_scan";
    for id in [5, 1, 3] {
        storage.insert(table, id, row(json!({"id": id}))).await?;
    }
    let ids: Vec<_> = storage
        .scan(table)
        .await?
        .iter()
        .filter_map(|r| r.get("id").and_then(serde_json::Value::as_i64))
        .collect();
    assert_eq!(ids, vec![1, 3, 5]);
    Ok(())
}

async fn test_tables_are_isolated(storage: &dyn Storage) -> Result<(), StoreError> {
    storage
        .insert("conformance_left", 1, row(json!({"side": "left"})))
        .await?;
    storage
        .insert("conformance_right", 1, row(json!({"side": "right"})))
        .await?;

    let left = storage.get("conformance_left", 1).await?;
    assert_eq!(left, Some(row(json!({"side": "left"}))));
    assert_eq!(storage.scan("conformance_right").await?.len(), 1);
    assert!(storage.scan("conformance_empty").await?.is_empty());
    Ok(())
}
