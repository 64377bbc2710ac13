//! Clock abstraction shared by token expiry, throttle windows and product
//! freshness checks.
//!
//! Everything time-dependent in the gateway reads the current instant through
//! [`Clock`] so tests can drive time explicitly instead of sleeping.

use crate::Timestamp;
use chrono::Utc;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> Timestamp;

    /// Current time as Unix epoch seconds.
    ///
    /// Negative for pre-1970 clocks, which callers treat as a broken host.
    fn now_epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl FixedClock {
    /// Build a fixed clock from Unix epoch seconds.
    ///
    /// Out-of-range values fall back to the epoch itself.
    pub fn from_epoch_secs(secs: i64) -> Self {
        Self(chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
