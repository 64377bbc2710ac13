//! Persistent product store contract and the in-memory implementation.

use crate::error::StoreError;
use crate::product::{Barcode, PageRequest, ProductRecord};
use crate::Timestamp;
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage for product records, keyed by barcode.
///
/// Implementations perform no freshness checks on point reads; the resolver
/// decides whether a returned record is expired or stale.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fetch a record by barcode.
    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Option<ProductRecord>, StoreError>;

    /// Create or overwrite the record for `record.barcode`.
    async fn upsert(&self, record: ProductRecord) -> Result<ProductRecord, StoreError>;

    /// Records whose name, brand or barcode contains `query` (case-insensitive)
    /// and whose `last_fetched_at` is at or after `fetched_since`, ordered by
    /// name then barcode, one page at a time.
    async fn find_many(
        &self,
        query: &str,
        paging: PageRequest,
        fetched_since: Timestamp,
    ) -> Result<Vec<ProductRecord>, StoreError>;

    /// Delete records fetched before `cutoff`. Returns the number removed.
    async fn purge_expired(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Product store held in process memory.
///
/// Used for local development and tests; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    records: DashMap<Barcode, ProductRecord>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn matches_query(record: &ProductRecord, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
        || record.brand.to_lowercase().contains(needle)
        || record.barcode.as_str().contains(needle)
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Option<ProductRecord>, StoreError> {
        Ok(self.records.get(barcode).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, record: ProductRecord) -> Result<ProductRecord, StoreError> {
        self.records.insert(record.barcode.clone(), record.clone());
        Ok(record)
    }

    async fn find_many(
        &self,
        query: &str,
        paging: PageRequest,
        fetched_since: Timestamp,
    ) -> Result<Vec<ProductRecord>, StoreError> {
        let needle = query.trim().to_lowercase();
        let mut hits: Vec<ProductRecord> = self
            .records
            .iter()
            .filter(|entry| entry.last_fetched_at >= fetched_since)
            .filter(|entry| matches_query(entry.value(), &needle))
            .map(|entry| entry.value().clone())
            .collect();

        hits.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.barcode.cmp(&b.barcode)));

        let offset = usize::try_from(paging.offset()).unwrap_or(usize::MAX);
        Ok(hits
            .into_iter()
            .skip(offset)
            .take(paging.page_size() as usize)
            .collect())
    }

    async fn purge_expired(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        self.records.retain(|_, record| {
            let keep = record.last_fetched_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
