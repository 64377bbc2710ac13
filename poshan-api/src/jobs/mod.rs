//! Background Jobs
//!
//! - `throttle_sweep`: drops idle throttle state from every route limiter
//! - `product_purge`: deletes product records past the retention window
//!
//! Both run until a `watch` shutdown signal flips to `true`:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(throttle_sweep_task(throttles, config, shutdown_rx.clone()));
//! tokio::spawn(product_purge_task(store, clock, config, shutdown_rx));
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod product_purge;
pub mod throttle_sweep;

pub use product_purge::{product_purge_task, PurgeConfig, PurgeMetrics, PurgeSnapshot};
pub use throttle_sweep::{throttle_sweep_task, SweepConfig, SweepMetrics, SweepSnapshot};
