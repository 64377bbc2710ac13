//! Per-key fixed-window admission control.
//!
//! Every protected route group owns a [`RouteThrottle`]: a key prefix, a
//! [`ThrottlePolicy`] and its own [`ThrottleStore`]. A caller is admitted while
//! its window still has points; once the points run out it is rejected until
//! the window resets, or, when the policy carries a block duration, until the
//! block expires regardless of window resets.
//!
//! The default store keeps state in process memory. A deployment with more
//! than one instance needs a shared atomic-counter backend implementing the
//! same [`ThrottleStore::admit`] contract.

use crate::clock::Clock;
use crate::error::ThrottleConfigError;
use crate::Timestamp;
use chrono::Duration;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Caller token used when neither an identity nor an address is known.
pub const ANONYMOUS_CALLER: &str = "anonymous";

// ============================================================================
// POLICY & KEYS
// ============================================================================

/// Admission policy for one route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Admissions allowed per window
    pub points: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// How long a caller stays rejected after exhausting its points (0 = no block)
    pub block_secs: u64,
}

impl ThrottlePolicy {
    pub const fn new(points: u32, window_secs: u64, block_secs: u64) -> Self {
        Self {
            points,
            window_secs,
            block_secs,
        }
    }

    fn window(&self) -> Duration {
        bounded_secs(self.window_secs)
    }

    fn block(&self) -> Option<Duration> {
        (self.block_secs > 0).then(|| bounded_secs(self.block_secs))
    }
}

/// Policy durations are capped so `now + duration` can never overflow.
const MAX_POLICY_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn bounded_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(MAX_POLICY_SECS).min(MAX_POLICY_SECS))
}

/// A route-scoped throttle key, `"<prefix>:<caller>"`.
///
/// Prefixes never contain `:`, so keys built under different prefixes are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey(String);

impl ThrottleKey {
    fn scoped(prefix: &str, caller: &str) -> Self {
        let caller = if caller.trim().is_empty() {
            ANONYMOUS_CALLER
        } else {
            caller
        };
        Self(format!("{}:{}", prefix, caller))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed; `remaining` points are left in the window.
    Admitted { remaining: u32 },
    /// Request is throttled; retry after this many whole seconds (at least 1).
    Rejected { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Backend holding throttle state.
///
/// `admit` must be atomic per key: two concurrent calls for the same key must
/// never both consume the last point.
pub trait ThrottleStore: Send + Sync {
    /// Check and consume one point for `key` under `policy`.
    fn admit(&self, key: &ThrottleKey, policy: &ThrottlePolicy) -> Admission;

    /// Drop state whose window has elapsed and which carries no pending block.
    ///
    /// Returns how many keys were removed.
    fn sweep(&self) -> usize;

    /// Number of keys currently tracked.
    fn tracked_keys(&self) -> usize;
}

#[derive(Debug, Clone)]
struct ThrottleState {
    points_remaining: u32,
    window_reset_at: Timestamp,
    blocked_until: Option<Timestamp>,
}

impl ThrottleState {
    fn fresh(policy: &ThrottlePolicy, now: Timestamp) -> Self {
        Self {
            points_remaining: policy.points,
            window_reset_at: now + policy.window(),
            blocked_until: None,
        }
    }

    fn is_idle(&self, now: Timestamp) -> bool {
        self.window_reset_at <= now && self.blocked_until.map_or(true, |until| until <= now)
    }
}

/// Whole seconds until `until`, rounded up, never below one.
fn retry_after_secs(now: Timestamp, until: Timestamp) -> u64 {
    let millis = (until - now).num_milliseconds().max(0);
    let secs = (millis + 999) / 1000;
    u64::try_from(secs).unwrap_or(1).max(1)
}

/// In-process throttle table.
///
/// `DashMap::entry` holds the shard lock for the whole check-and-decrement,
/// which serializes concurrent admissions per key.
pub struct InMemoryThrottle {
    states: DashMap<ThrottleKey, ThrottleState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryThrottle {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            clock,
        }
    }
}

impl fmt::Debug for InMemoryThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryThrottle")
            .field("tracked_keys", &self.states.len())
            .finish()
    }
}

impl ThrottleStore for InMemoryThrottle {
    fn admit(&self, key: &ThrottleKey, policy: &ThrottlePolicy) -> Admission {
        let now = self.clock.now();
        let mut entry = self
            .states
            .entry(key.clone())
            .or_insert_with(|| ThrottleState::fresh(policy, now));
        let state = entry.value_mut();

        if let Some(until) = state.blocked_until {
            if now < until {
                return Admission::Rejected {
                    retry_after_secs: retry_after_secs(now, until),
                };
            }
            state.blocked_until = None;
        }

        if now >= state.window_reset_at {
            *state = ThrottleState::fresh(policy, now);
        }

        if state.points_remaining > 0 {
            state.points_remaining -= 1;
            return Admission::Admitted {
                remaining: state.points_remaining,
            };
        }

        match policy.block() {
            Some(block) => {
                let until = now + block;
                state.blocked_until = Some(until);
                Admission::Rejected {
                    retry_after_secs: retry_after_secs(now, until),
                }
            }
            None => Admission::Rejected {
                retry_after_secs: retry_after_secs(now, state.window_reset_at),
            },
        }
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.states.retain(|_, state| {
            let keep = !state.is_idle(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn tracked_keys(&self) -> usize {
        self.states.len()
    }
}

// ============================================================================
// ROUTE THROTTLE
// ============================================================================

/// Limiter instance for one route group.
#[derive(Clone)]
pub struct RouteThrottle {
    prefix: String,
    policy: ThrottlePolicy,
    store: Arc<dyn ThrottleStore>,
}

impl RouteThrottle {
    /// Create a limiter over an explicit store.
    pub fn new(
        prefix: impl Into<String>,
        policy: ThrottlePolicy,
        store: Arc<dyn ThrottleStore>,
    ) -> Result<Self, ThrottleConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains(':') {
            return Err(ThrottleConfigError::InvalidPrefix { prefix });
        }
        if policy.window_secs == 0 {
            return Err(ThrottleConfigError::ZeroWindow { prefix });
        }
        if policy.points == 0 {
            return Err(ThrottleConfigError::ZeroPoints { prefix });
        }
        Ok(Self {
            prefix,
            policy,
            store,
        })
    }

    /// Create a limiter with its own in-process table.
    pub fn in_memory(
        prefix: impl Into<String>,
        policy: ThrottlePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ThrottleConfigError> {
        Self::new(prefix, policy, Arc::new(InMemoryThrottle::new(clock)))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    /// Build the key for a caller under this route group.
    pub fn key_for(&self, caller: &str) -> ThrottleKey {
        ThrottleKey::scoped(&self.prefix, caller)
    }

    /// Admission check for a caller (subject id, address, or `anonymous`).
    pub fn check(&self, caller: &str) -> (ThrottleKey, Admission) {
        let key = self.key_for(caller);
        let admission = self.store.admit(&key, &self.policy);
        (key, admission)
    }

    /// Sweep idle state from this limiter's store.
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }
}

impl fmt::Debug for RouteThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteThrottle")
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::{Barrier, Mutex};

    /// Minimal settable clock; the shared fixtures crate has a richer one.
    struct StepClock(Mutex<Timestamp>);

    impl StepClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )))
        }

        fn advance_secs(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Timestamp {
            *self.0.lock().unwrap()
        }
    }

    fn limiter(clock: &Arc<StepClock>, policy: ThrottlePolicy) -> RouteThrottle {
        RouteThrottle::in_memory("barcode", policy, clock.clone()).unwrap()
    }

    #[test]
    fn test_window_exhaustion_and_reset() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(3, 60, 0));

        for expected_remaining in [2, 1, 0] {
            let (_, admission) = throttle.check("10.0.0.1");
            assert_eq!(
                admission,
                Admission::Admitted {
                    remaining: expected_remaining
                }
            );
        }
        let (_, fourth) = throttle.check("10.0.0.1");
        assert_eq!(fourth, Admission::Rejected { retry_after_secs: 60 });

        clock.advance_secs(61);
        let (_, after_reset) = throttle.check("10.0.0.1");
        assert_eq!(after_reset, Admission::Admitted { remaining: 2 });
    }

    #[test]
    fn test_rejection_does_not_consume_points() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(1, 60, 0));

        assert!(throttle.check("u").1.is_admitted());
        for _ in 0..5 {
            assert!(!throttle.check("u").1.is_admitted());
        }
        clock.advance_secs(60);
        assert_eq!(throttle.check("u").1, Admission::Admitted { remaining: 0 });
    }

    #[test]
    fn test_block_outlasts_window_reset() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(1, 10, 30));

        assert!(throttle.check("u").1.is_admitted());
        assert_eq!(
            throttle.check("u").1,
            Admission::Rejected { retry_after_secs: 30 }
        );

        // The window would have reset at t=10, but the block holds until t=30.
        clock.advance_secs(15);
        assert_eq!(
            throttle.check("u").1,
            Admission::Rejected { retry_after_secs: 15 }
        );

        clock.advance_secs(10);
        assert_eq!(
            throttle.check("u").1,
            Admission::Rejected { retry_after_secs: 5 }
        );

        clock.advance_secs(5);
        assert_eq!(throttle.check("u").1, Admission::Admitted { remaining: 0 });
    }

    #[test]
    fn test_repeated_rejections_do_not_extend_block() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(1, 60, 30));

        assert!(throttle.check("u").1.is_admitted());
        assert!(!throttle.check("u").1.is_admitted());
        for _ in 0..29 {
            clock.advance_secs(1);
            assert!(!throttle.check("u").1.is_admitted());
        }
        clock.advance_secs(1);
        // Block over but the window is still exhausted: this rejection arms a new block.
        let (_, admission) = throttle.check("u");
        assert_eq!(admission, Admission::Rejected { retry_after_secs: 30 });
    }

    #[test]
    fn test_prefixes_do_not_share_state() {
        let clock = StepClock::new();
        let store: Arc<dyn ThrottleStore> = Arc::new(InMemoryThrottle::new(clock.clone()));
        let policy = ThrottlePolicy::new(1, 60, 0);
        let chat = RouteThrottle::new("chat", policy, store.clone()).unwrap();
        let barcode = RouteThrottle::new("barcode", policy, store).unwrap();

        assert!(chat.check("user-1").1.is_admitted());
        assert!(!chat.check("user-1").1.is_admitted());
        assert!(barcode.check("user-1").1.is_admitted());
        assert_ne!(chat.key_for("user-1"), barcode.key_for("user-1"));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let clock = StepClock::new();
        let policy = ThrottlePolicy::new(1, 60, 0);
        assert!(matches!(
            RouteThrottle::in_memory("a:b", policy, clock.clone()),
            Err(ThrottleConfigError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            RouteThrottle::in_memory("", policy, clock.clone()),
            Err(ThrottleConfigError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            RouteThrottle::in_memory("chat", ThrottlePolicy::new(1, 0, 0), clock.clone()),
            Err(ThrottleConfigError::ZeroWindow { .. })
        ));
        assert!(matches!(
            RouteThrottle::in_memory("chat", ThrottlePolicy::new(0, 60, 30), clock),
            Err(ThrottleConfigError::ZeroPoints { .. })
        ));
    }

    #[test]
    fn test_blank_caller_maps_to_anonymous() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(1, 60, 0));
        assert_eq!(throttle.key_for("").as_str(), "barcode:anonymous");
        assert_eq!(throttle.key_for("1.2.3.4").as_str(), "barcode:1.2.3.4");
    }

    #[test]
    fn test_sweep_keeps_blocked_and_active_keys() {
        let clock = StepClock::new();
        let throttle = limiter(&clock, ThrottlePolicy::new(1, 10, 60));

        assert!(throttle.check("idle").1.is_admitted());
        assert!(throttle.check("blocked").1.is_admitted());
        assert!(!throttle.check("blocked").1.is_admitted());

        clock.advance_secs(5);
        assert!(throttle.check("active").1.is_admitted());

        clock.advance_secs(6);
        // idle: window elapsed, no block. active: window until t=15. blocked: until t=60.
        assert_eq!(throttle.sweep(), 1);
        assert_eq!(throttle.tracked_keys(), 2);

        clock.advance_secs(60);
        assert_eq!(throttle.sweep(), 2);
        assert_eq!(throttle.tracked_keys(), 0);
    }

    #[test]
    fn test_concurrent_admission_of_last_point() {
        for _ in 0..50 {
            let clock = StepClock::new();
            let throttle = limiter(&clock, ThrottlePolicy::new(2, 60, 0));
            assert!(throttle.check("race").1.is_admitted());

            let barrier = Barrier::new(2);
            let results: Vec<bool> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            throttle.check("race").1.is_admitted()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|admitted| **admitted).count(), 1);
        }
    }
}
