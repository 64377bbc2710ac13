//! PostgreSQL product store tests.
//!
//! Run with `--features db-tests` against a database reachable through the
//! `POSHAN_DB_*` variables.

#![cfg(feature = "db-tests")]

use chrono::{Duration, TimeZone, Utc};
use poshan_api::{DbConfig, PgProductStore};
use poshan_core::{PageRequest, ProductStore};
use poshan_test_utils::fixtures;

async fn store() -> Result<PgProductStore, String> {
    let store = PgProductStore::from_config(&DbConfig::from_env()).map_err(|e| e.to_string())?;
    store.ensure_schema().await.map_err(|e| e.to_string())?;
    Ok(store)
}

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(fixtures::EPOCH_2024 + secs, 0)
        .single()
        .unwrap_or_default()
}

#[tokio::test]
async fn upsert_replaces_by_barcode() -> Result<(), String> {
    let store = store().await?;
    let code = "40000000000001";

    store
        .upsert(fixtures::record(code, "Poha v1", at(0)))
        .await
        .map_err(|e| e.to_string())?;
    let saved = store
        .upsert(fixtures::record(code, "Poha v2", at(60)))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(saved.name, "Poha v2");

    let found = store
        .find_by_barcode(&fixtures::barcode(code))
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing")?;
    assert_eq!(found.name, "Poha v2");
    assert_eq!(found.last_fetched_at, at(60));
    assert_eq!(found.nutrients, saved.nutrients);
    assert_eq!(found.images, saved.images);
    Ok(())
}

#[tokio::test]
async fn find_many_matches_literally_and_respects_freshness() -> Result<(), String> {
    let store = store().await?;
    store
        .upsert(fixtures::record("40000000000011", "Zz 100% Millet", at(0)))
        .await
        .map_err(|e| e.to_string())?;
    store
        .upsert(fixtures::record("40000000000012", "Zz 1000 Millet", at(0)))
        .await
        .map_err(|e| e.to_string())?;

    let hits = store
        .find_many("zz 100%", PageRequest::default(), at(0) - Duration::days(1))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Zz 100% Millet");

    let none = store
        .find_many("zz 100%", PageRequest::default(), at(1))
        .await
        .map_err(|e| e.to_string())?;
    assert!(none.is_empty());
    Ok(())
}

#[tokio::test]
async fn purge_removes_only_older_records() -> Result<(), String> {
    let store = store().await?;
    store
        .upsert(fixtures::record("40000000000021", "Old Rusk", at(-100)))
        .await
        .map_err(|e| e.to_string())?;
    store
        .upsert(fixtures::record("40000000000022", "New Rusk", at(100)))
        .await
        .map_err(|e| e.to_string())?;

    let removed = store.purge_expired(at(0)).await.map_err(|e| e.to_string())?;
    assert!(removed >= 1);
    assert!(store
        .find_by_barcode(&fixtures::barcode("40000000000021"))
        .await
        .map_err(|e| e.to_string())?
        .is_none());
    assert!(store
        .find_by_barcode(&fixtures::barcode("40000000000022"))
        .await
        .map_err(|e| e.to_string())?
        .is_some());
    store.ping().await.map_err(|e| e.to_string())
}
