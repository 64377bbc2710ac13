//! Periodic removal of idle throttle state.

use poshan_core::RouteThrottle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ApiConfig;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often to sweep (default: 60 seconds)
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl From<&ApiConfig> for SweepConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            interval: config.throttle_sweep_interval,
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweeps: AtomicU64,
    pub keys_removed: AtomicU64,
}

impl SweepMetrics {
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            keys_removed: self.keys_removed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub keys_removed: u64,
}

/// One sweep over every limiter. Returns the number of keys removed.
pub fn sweep_once(throttles: &[Arc<RouteThrottle>], metrics: &SweepMetrics) -> u64 {
    metrics.sweeps.fetch_add(1, Ordering::Relaxed);

    let mut removed = 0u64;
    for throttle in throttles {
        let count = throttle.sweep() as u64;
        if count > 0 {
            tracing::debug!(
                prefix = throttle.prefix(),
                removed = count,
                remaining = throttle.tracked_keys(),
                "swept idle throttle state"
            );
        }
        removed += count;
    }

    metrics.keys_removed.fetch_add(removed, Ordering::Relaxed);
    removed
}

/// Sweep idle throttle state until shutdown.
pub async fn throttle_sweep_task(
    throttles: Vec<Arc<RouteThrottle>>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        limiters = throttles.len(),
        "Throttle sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Throttle sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&throttles, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        keys_removed = snapshot.keys_removed,
        "Throttle sweep task completed"
    );
    metrics
}
