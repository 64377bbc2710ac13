//! Poshan Test Utilities
//!
//! Shared test infrastructure for the Poshan workspace:
//! - A manually advanced clock
//! - A scripted upstream product source that counts its calls
//! - Product fixtures
//! - Proptest generators for barcodes, callers and throttle policies

pub use poshan_core::{
    Barcode, Clock, InMemoryProductStore, PageRequest, ProductDetails, ProductImage,
    ProductRecord, ProductSource, ProductStore, ThrottlePolicy, Timestamp, UpstreamError,
};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when a test advances it.
#[derive(Debug)]
pub struct ManualClock {
    epoch_millis: AtomicI64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn at(start: Timestamp) -> Self {
        Self {
            epoch_millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Start the clock at Unix epoch seconds.
    pub fn from_epoch_secs(secs: i64) -> Self {
        Self {
            epoch_millis: AtomicI64::new(secs.saturating_mul(1000)),
        }
    }

    /// Move the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.epoch_millis
            .fetch_add(secs.saturating_mul(1000), Ordering::SeqCst);
    }

    /// Move the clock forward by a chrono duration.
    pub fn advance(&self, by: chrono::Duration) {
        self.epoch_millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.epoch_millis
            .store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::from_epoch_secs(fixtures::EPOCH_2024)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let millis = self.epoch_millis.load(Ordering::SeqCst);
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

// ============================================================================
// SCRIPTED PRODUCT SOURCE
// ============================================================================

/// In-memory upstream catalogue with call counters and an injectable failure.
#[derive(Debug, Default)]
pub struct ScriptedProductSource {
    products: DashMap<Barcode, ProductDetails>,
    failure: Mutex<Option<UpstreamError>>,
    lookups: AtomicUsize,
    searches: AtomicUsize,
}

impl ScriptedProductSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_product(self, details: ProductDetails) -> Self {
        self.insert(details);
        self
    }

    pub fn insert(&self, details: ProductDetails) {
        self.products.insert(details.barcode.clone(), details);
    }

    /// Make every following call fail with `error`.
    pub fn fail_with(&self, error: UpstreamError) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some(error);
        }
    }

    /// Clear a failure set by [`fail_with`](Self::fail_with).
    pub fn recover(&self) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = None;
        }
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.lookup_calls() + self.search_calls()
    }

    fn scripted_failure(&self) -> Result<(), UpstreamError> {
        match self.failure.lock() {
            Ok(slot) => slot.clone().map_or(Ok(()), Err),
            Err(_) => Err(UpstreamError::Transport {
                reason: "scripted source lock poisoned".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ProductSource for ScriptedProductSource {
    async fn lookup(&self, barcode: &Barcode) -> Result<Option<ProductDetails>, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure()?;
        Ok(self.products.get(barcode).map(|entry| entry.value().clone()))
    }

    async fn search(
        &self,
        query: &str,
        paging: PageRequest,
    ) -> Result<Vec<ProductDetails>, UpstreamError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure()?;

        let needle = query.trim().to_lowercase();
        let mut hits: Vec<ProductDetails> = self
            .products
            .iter()
            .filter(|entry| {
                entry.name.to_lowercase().contains(&needle)
                    || entry.brand.to_lowercase().contains(&needle)
            })
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by(|a, b| a.barcode.cmp(&b.barcode));

        let offset = usize::try_from(paging.offset()).unwrap_or(usize::MAX);
        Ok(hits
            .into_iter()
            .skip(offset)
            .take(paging.page_size() as usize)
            .collect())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use std::collections::BTreeMap;

    /// 2024-01-01 00:00:00 UTC
    pub const EPOCH_2024: i64 = 1_704_067_200;

    /// Parse a barcode that a test knows to be valid.
    ///
    /// Invalid input falls back to `00000000` so fixtures never panic.
    pub fn barcode(code: &str) -> Barcode {
        Barcode::parse(code)
            .or_else(|_| Barcode::parse("00000000"))
            .unwrap_or_else(|_| unreachable!("fallback barcode is valid"))
    }

    /// Upstream details for a packaged food product.
    pub fn product(code: &str, name: &str) -> ProductDetails {
        let mut nutrients = BTreeMap::new();
        nutrients.insert("energy-kcal_100g".to_string(), serde_json::json!(389));
        nutrients.insert("proteins_100g".to_string(), serde_json::json!(13.2));
        nutrients.insert("sugars_100g".to_string(), serde_json::json!(1.1));

        ProductDetails {
            barcode: barcode(code),
            name: name.to_string(),
            brand: "Saffola".to_string(),
            ingredients: "Rolled oats (100%)".to_string(),
            nutrients,
            images: vec![ProductImage {
                kind: "front".to_string(),
                url: format!("https://images.example.org/{}/front.jpg", code),
            }],
        }
    }

    /// The sample product most tests start from.
    pub fn sample_product() -> ProductDetails {
        product("8901058851298", "Masala Oats")
    }

    /// A stored record fetched at `fetched_at`.
    pub fn record(code: &str, name: &str, fetched_at: Timestamp) -> ProductRecord {
        ProductRecord::stamped(product(code, name), fetched_at)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Valid barcodes: 8 to 14 ASCII digits.
    pub fn arb_barcode() -> impl Strategy<Value = Barcode> {
        "[0-9]{8,14}".prop_filter_map("valid barcode", |s| Barcode::parse(&s).ok())
    }

    /// Strings that must never parse as barcodes.
    pub fn arb_invalid_barcode() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9]{1,7}",
            "[0-9]{15,20}",
            "[0-9]{4}[a-zA-Z][0-9]{4}",
            "[0-9]{8} ",
        ]
    }

    /// Caller tokens as the gate produces them: subject ids or addresses.
    pub fn arb_caller() -> impl Strategy<Value = String> {
        prop_oneof![
            "user-[a-z0-9]{4,12}",
            (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
        ]
    }

    /// Route prefixes: non-empty, no `:`.
    pub fn arb_prefix() -> impl Strategy<Value = String> {
        "[a-z]{1,12}"
    }

    /// Small policies that tests can exhaust quickly.
    pub fn arb_policy() -> impl Strategy<Value = ThrottlePolicy> {
        (1u32..10, 1u64..120, 0u64..120)
            .prop_map(|(points, window, block)| ThrottlePolicy::new(points, window, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance_secs(61);
        assert_eq!((clock.now() - start).num_seconds(), 61);
    }

    #[tokio::test]
    async fn test_scripted_source_counts_and_fails() {
        let source = ScriptedProductSource::new().with_product(fixtures::sample_product());
        let code = fixtures::barcode("8901058851298");

        let found = source.lookup(&code).await;
        assert!(matches!(found, Ok(Some(_))));

        source.fail_with(UpstreamError::Status { status: 500 });
        assert!(source.lookup(&code).await.is_err());
        source.recover();

        let hits = source.search("oats", PageRequest::default()).await;
        assert_eq!(hits.map(|h| h.len()), Ok(1));
        assert_eq!(source.lookup_calls(), 2);
        assert_eq!(source.search_calls(), 1);
    }
}
