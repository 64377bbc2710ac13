//! Property tests for the route throttle.

use poshan_core::{Admission, RouteThrottle, ThrottlePolicy};
use poshan_test_utils::generators::{arb_caller, arb_policy, arb_prefix};
use poshan_test_utils::ManualClock;
use proptest::prelude::*;
use std::sync::Arc;

fn throttle(
    prefix: &str,
    policy: ThrottlePolicy,
    clock: &Arc<ManualClock>,
) -> Result<RouteThrottle, TestCaseError> {
    RouteThrottle::in_memory(prefix, policy, clock.clone())
        .map_err(|e| TestCaseError::fail(e.to_string()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Within one instant a caller gets exactly `points` admissions with a
    /// strictly decreasing remainder, then only rejections.
    #[test]
    fn admits_exactly_points_per_window(
        policy in arb_policy(),
        caller in arb_caller(),
        extra in 1u32..5,
    ) {
        let clock = Arc::new(ManualClock::default());
        let throttle = throttle("barcode", policy, &clock)?;

        for i in 0..policy.points {
            let (_, admission) = throttle.check(&caller);
            prop_assert_eq!(admission, Admission::Admitted { remaining: policy.points - i - 1 });
        }

        let longest = policy.window_secs.max(policy.block_secs);
        for _ in 0..extra {
            let (_, admission) = throttle.check(&caller);
            match admission {
                Admission::Rejected { retry_after_secs } => {
                    prop_assert!(retry_after_secs >= 1);
                    prop_assert!(retry_after_secs <= longest);
                }
                Admission::Admitted { .. } => prop_assert!(false, "admitted past the limit"),
            }
        }
    }

    /// Waiting out both the window and any block restores a full window.
    #[test]
    fn exhausted_caller_recovers(policy in arb_policy(), caller in arb_caller()) {
        let clock = Arc::new(ManualClock::default());
        let throttle = throttle("search", policy, &clock)?;

        for _ in 0..=policy.points {
            throttle.check(&caller);
        }

        let wait = policy.window_secs.max(policy.block_secs);
        clock.advance_secs(i64::try_from(wait).unwrap_or(i64::MAX));

        let (_, admission) = throttle.check(&caller);
        prop_assert_eq!(admission, Admission::Admitted { remaining: policy.points - 1 });
    }

    /// Exhausting one route group leaves the same caller untouched elsewhere.
    #[test]
    fn prefixes_are_isolated(
        first in arb_prefix(),
        second in arb_prefix(),
        policy in arb_policy(),
        caller in arb_caller(),
    ) {
        prop_assume!(first != second);
        let clock = Arc::new(ManualClock::default());
        let a = throttle(&first, policy, &clock)?;
        let b = throttle(&second, policy, &clock)?;

        for _ in 0..=policy.points {
            a.check(&caller);
        }
        let (a_key, a_admission) = a.check(&caller);
        let (b_key, b_admission) = b.check(&caller);

        prop_assert!(!a_admission.is_admitted());
        prop_assert!(b_admission.is_admitted());
        prop_assert_ne!(&a_key, &b_key);
        prop_assert_eq!(a_key.as_str(), format!("{}:{}", first, caller));
    }
}
