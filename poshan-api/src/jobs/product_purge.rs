//! Periodic deletion of product records past the retention window.
//!
//! Reads already treat expired records as absent; this job reclaims the
//! storage.

use poshan_core::{retention_cutoff, Clock, ProductStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ApiConfig;

#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// How often to purge (default: 1 hour)
    pub interval: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

impl From<&ApiConfig> for PurgeConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            interval: config.product_purge_interval,
        }
    }
}

#[derive(Debug, Default)]
pub struct PurgeMetrics {
    pub cycles: AtomicU64,
    pub records_purged: AtomicU64,
    pub errors: AtomicU64,
}

impl PurgeMetrics {
    pub fn snapshot(&self) -> PurgeSnapshot {
        PurgeSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            records_purged: self.records_purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSnapshot {
    pub cycles: u64,
    pub records_purged: u64,
    pub errors: u64,
}

/// One purge cycle. Store failures are logged and counted, never fatal.
pub async fn purge_once(store: &dyn ProductStore, clock: &dyn Clock, metrics: &PurgeMetrics) -> u64 {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    let cutoff = retention_cutoff(clock.now());

    match store.purge_expired(cutoff).await {
        Ok(0) => {
            tracing::trace!("Product purge found nothing to delete");
            0
        }
        Ok(count) => {
            metrics.records_purged.fetch_add(count, Ordering::Relaxed);
            tracing::info!(purged = count, cutoff = %cutoff, "Purged expired products");
            count
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Product purge failed");
            0
        }
    }
}

/// Purge expired products until shutdown.
pub async fn product_purge_task(
    store: Arc<dyn ProductStore>,
    clock: Arc<dyn Clock>,
    config: PurgeConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<PurgeMetrics> {
    let metrics = Arc::new(PurgeMetrics::default());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Product purge task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Product purge task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                purge_once(store.as_ref(), clock.as_ref(), &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        records_purged = snapshot.records_purged,
        errors = snapshot.errors,
        "Product purge task completed"
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use poshan_core::{InMemoryProductStore, StoreError};
    use poshan_test_utils::{fixtures, ManualClock};

    #[tokio::test]
    async fn test_purge_removes_only_expired() -> Result<(), StoreError> {
        let clock = ManualClock::default();
        let store = InMemoryProductStore::new();
        let now = clock.now();

        store
            .upsert(fixtures::record("12345678", "Old Poha", now - chrono::Duration::days(31)))
            .await?;
        store
            .upsert(fixtures::record("99999999", "Fresh Upma", now - chrono::Duration::days(2)))
            .await?;

        let metrics = PurgeMetrics::default();
        assert_eq!(purge_once(&store, &clock, &metrics).await, 1);
        assert_eq!(store.len(), 1);
        assert!(store
            .find_by_barcode(&fixtures::barcode("99999999"))
            .await?
            .is_some());
        assert_eq!(metrics.snapshot().records_purged, 1);
        Ok(())
    }
}
