//! Product Resolver
//!
//! Resolves barcodes and search queries against the persistent store first and
//! the upstream catalogue second. Successful upstream answers are written back
//! to the store; "not found" never writes anything.
//!
//! The resolver holds no records between calls. Two concurrent resolutions of
//! the same barcode may both miss and both upsert; the upsert is idempotent per
//! barcode so the last write wins.

use crate::clock::Clock;
use crate::error::ResolveResult;
use crate::product::{
    retention_cutoff, Barcode, Origin, ProductRecord, Resolution, ResolveOptions, SearchOptions,
    SearchResults,
};
use crate::source::ProductSource;
use crate::store::ProductStore;
use crate::Timestamp;
use chrono::Duration;
use std::sync::Arc;

/// Cache-then-upstream product lookup.
#[derive(Clone)]
pub struct ProductResolver {
    store: Arc<dyn ProductStore>,
    source: Arc<dyn ProductSource>,
    clock: Arc<dyn Clock>,
    stale_after: Option<Duration>,
}

impl ProductResolver {
    pub fn new(
        store: Arc<dyn ProductStore>,
        source: Arc<dyn ProductSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            stale_after: None,
        }
    }

    /// Treat stored records older than `threshold` as stale.
    pub fn with_stale_after(mut self, threshold: Option<Duration>) -> Self {
        self.stale_after = threshold;
        self
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    /// Oldest fetch time a cached record may have and still be served.
    fn fresh_since(&self, now: Timestamp) -> Timestamp {
        let retention = retention_cutoff(now);
        match self.stale_after {
            Some(threshold) => (now - threshold).max(retention),
            None => retention,
        }
    }

    /// Resolve a single barcode.
    pub async fn resolve(
        &self,
        barcode: &Barcode,
        opts: ResolveOptions,
    ) -> ResolveResult<Resolution> {
        if !opts.skip_cache {
            if let Some(record) = self.store.find_by_barcode(barcode).await? {
                let now = self.clock.now();
                if !record.is_stale(now, self.stale_after) && !record.is_expired(now) {
                    tracing::debug!(%barcode, origin = %Origin::Cache, "product resolved");
                    return Ok(Resolution {
                        record: Some(record),
                        origin: Origin::Cache,
                    });
                }
                tracing::debug!(%barcode, "cached product stale, refreshing");
            }
        }

        let Some(details) = self.source.lookup(barcode).await? else {
            tracing::debug!(%barcode, origin = %Origin::NotFound, "product resolved");
            return Ok(Resolution::not_found());
        };

        let record = ProductRecord::stamped(details, self.clock.now());
        let stored = self.store.upsert(record).await?;
        tracing::debug!(%barcode, origin = %Origin::Upstream, "product resolved");

        Ok(Resolution {
            record: Some(stored),
            origin: Origin::Upstream,
        })
    }

    /// Search by free text, cache first.
    ///
    /// A cache hit is any non-empty page of fresh stored matches.
    pub async fn search(&self, query: &str, opts: SearchOptions) -> ResolveResult<SearchResults> {
        let paging = opts.paging;
        let page_result = |records: Vec<ProductRecord>, origin: Origin| SearchResults {
            records,
            origin,
            page: paging.page(),
            page_size: paging.page_size(),
        };

        if !opts.skip_cache {
            let fresh_since = self.fresh_since(self.clock.now());
            let cached = self.store.find_many(query, paging, fresh_since).await?;
            if !cached.is_empty() {
                tracing::debug!(query, hits = cached.len(), origin = %Origin::Cache, "search resolved");
                return Ok(page_result(cached, Origin::Cache));
            }
        }

        let matches = self.source.search(query, paging).await?;
        if matches.is_empty() {
            tracing::debug!(query, origin = %Origin::NotFound, "search resolved");
            return Ok(page_result(Vec::new(), Origin::NotFound));
        }

        let fetched_at = self.clock.now();
        let mut records = Vec::with_capacity(matches.len());
        for details in matches {
            let stored = self
                .store
                .upsert(ProductRecord::stamped(details, fetched_at))
                .await?;
            records.push(stored);
        }
        tracing::debug!(query, hits = records.len(), origin = %Origin::Upstream, "search resolved");

        Ok(page_result(records, Origin::Upstream))
    }
}

impl std::fmt::Debug for ProductResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductResolver")
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{ResolveError, UpstreamError};
    use crate::product::{PageRequest, ProductDetails};
    use crate::store::InMemoryProductStore;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Upstream stub with a fixed catalogue and a call counter.
    #[derive(Default)]
    struct Catalogue {
        products: HashMap<String, ProductDetails>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Catalogue {
        fn with(codes: &[(&str, &str)]) -> Self {
            let products = codes
                .iter()
                .map(|(code, name)| (code.to_string(), details(code, name)))
                .collect();
            Self {
                products,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductSource for Catalogue {
        async fn lookup(&self, barcode: &Barcode) -> Result<Option<ProductDetails>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UpstreamError::Timeout { timeout_secs: 10 });
            }
            Ok(self.products.get(barcode.as_str()).cloned())
        }

        async fn search(
            &self,
            query: &str,
            _paging: PageRequest,
        ) -> Result<Vec<ProductDetails>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UpstreamError::Status { status: 503 });
            }
            let needle = query.to_lowercase();
            let mut hits: Vec<_> = self
                .products
                .values()
                .filter(|p| p.name.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            hits.sort_by(|a, b| a.barcode.cmp(&b.barcode));
            Ok(hits)
        }
    }

    fn details(code: &str, name: &str) -> ProductDetails {
        ProductDetails {
            barcode: Barcode::parse(code).unwrap(),
            name: name.to_string(),
            brand: "Brand".to_string(),
            ingredients: "stuff".to_string(),
            nutrients: BTreeMap::new(),
            images: vec![],
        }
    }

    fn barcode(code: &str) -> Barcode {
        Barcode::parse(code).unwrap()
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::from_epoch_secs(1_709_251_200))
    }

    fn resolver(
        store: Arc<InMemoryProductStore>,
        source: Arc<Catalogue>,
        clock: Arc<FixedClock>,
    ) -> ProductResolver {
        ProductResolver::new(store, source, clock)
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_upstream() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::with(&[("12345678", "Upstream Name")]));
        let clock = clock();
        store
            .upsert(ProductRecord::stamped(details("12345678", "Cached"), clock.now()))
            .await?;

        let resolution = resolver(store, source.clone(), clock)
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await?;

        assert_eq!(resolution.origin, Origin::Cache);
        assert_eq!(resolution.record.map(|r| r.name), Some("Cached".to_string()));
        assert_eq!(source.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_miss_then_upstream_persists() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::with(&[("99999999", "Biscuits")]));
        let clock = clock();
        let resolver = resolver(store.clone(), source.clone(), clock.clone());

        let first = resolver
            .resolve(&barcode("99999999"), ResolveOptions::default())
            .await?;
        assert_eq!(first.origin, Origin::Upstream);
        let record = first.record.expect("upstream record");
        assert_eq!(record.last_fetched_at, clock.now());

        let stored = store.find_by_barcode(&barcode("99999999")).await?;
        assert_eq!(stored.map(|r| r.name), Some("Biscuits".to_string()));

        let second = resolver
            .resolve(&barcode("99999999"), ResolveOptions::default())
            .await?;
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(source.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_writes_nothing() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::default());

        let resolution = resolver(store.clone(), source, clock())
            .resolve(&barcode("00000000"), ResolveOptions::default())
            .await?;

        assert_eq!(resolution, Resolution::not_found());
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_cache_forces_upstream_and_overwrites() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::with(&[("12345678", "Fresh Name")]));
        let clock = clock();
        store
            .upsert(ProductRecord::stamped(details("12345678", "Old Name"), clock.now()))
            .await?;

        let resolution = resolver(store.clone(), source.clone(), clock)
            .resolve(&barcode("12345678"), ResolveOptions { skip_cache: true })
            .await?;

        assert_eq!(resolution.origin, Origin::Upstream);
        assert_eq!(source.calls(), 1);
        let stored = store.find_by_barcode(&barcode("12345678")).await?;
        assert_eq!(stored.map(|r| r.name), Some("Fresh Name".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_and_expired_records_refresh() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::with(&[("12345678", "Refreshed")]));
        let clock = clock();
        store
            .upsert(ProductRecord::stamped(
                details("12345678", "Week Old"),
                clock.now() - Duration::days(8),
            ))
            .await?;

        // Without a threshold an 8 day old record is still fresh.
        let lenient = resolver(store.clone(), source.clone(), clock.clone());
        let hit = lenient
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await?;
        assert_eq!(hit.origin, Origin::Cache);

        let strict = lenient.with_stale_after(Some(Duration::days(7)));
        let refreshed = strict
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await?;
        assert_eq!(refreshed.origin, Origin::Upstream);
        assert_eq!(
            refreshed.record.map(|r| r.last_fetched_at),
            Some(clock.now())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_record_is_not_served() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::default());
        let clock = clock();
        store
            .upsert(ProductRecord::stamped(
                details("12345678", "Ancient"),
                clock.now() - Duration::days(31),
            ))
            .await?;

        let resolution = resolver(store, source.clone(), clock)
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await?;
        assert_eq!(resolution.origin, Origin::NotFound);
        assert_eq!(source.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_retention_boundary_agrees_for_resolve_and_search() -> ResolveResult<()> {
        let clock = clock();
        let boundary = clock.now() - Duration::days(30);
        let store = Arc::new(InMemoryProductStore::new());
        store
            .upsert(ProductRecord::stamped(details("12345678", "Edge Oats"), boundary))
            .await?;
        store
            .upsert(ProductRecord::stamped(
                details("87654321", "Lapsed Oats"),
                boundary - Duration::seconds(1),
            ))
            .await?;
        let source = Arc::new(Catalogue::default());
        let resolver = resolver(store, source.clone(), clock);

        // Exactly 30 days old is still served from cache by both paths
        let edge = resolver
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await?;
        assert_eq!(edge.origin, Origin::Cache);

        let hits = resolver.search("oats", SearchOptions::default()).await?;
        assert_eq!(hits.origin, Origin::Cache);
        let names: Vec<_> = hits.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Edge Oats"]);

        // One second older is gone for both
        let lapsed = resolver
            .resolve(&barcode("87654321"), ResolveOptions::default())
            .await?;
        assert_eq!(lapsed.origin, Origin::NotFound);
        assert_eq!(source.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_upstream_failure_is_distinct_from_not_found() {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue {
            fail: true,
            ..Catalogue::default()
        });

        let result = resolver(store.clone(), source, clock())
            .resolve(&barcode("12345678"), ResolveOptions::default())
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Upstream(UpstreamError::Timeout { .. }))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_search_cache_then_upstream() -> ResolveResult<()> {
        let store = Arc::new(InMemoryProductStore::new());
        let source = Arc::new(Catalogue::with(&[
            ("11111111", "Masala Oats"),
            ("22222222", "Rolled Oats"),
            ("33333333", "Ghee"),
        ]));
        let resolver = resolver(store.clone(), source.clone(), clock());
        let opts = SearchOptions {
            paging: PageRequest::new(Some(1), Some(500)),
            skip_cache: false,
        };

        let first = resolver.search("oats", opts).await?;
        assert_eq!(first.origin, Origin::Upstream);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.page_size, 100);
        assert_eq!(store.len(), 2);

        let second = resolver.search("oats", opts).await?;
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(source.calls(), 1);

        let none = resolver.search("paneer", opts).await?;
        assert_eq!(none.origin, Origin::NotFound);
        assert!(none.records.is_empty());
        assert_eq!(store.len(), 2);
        Ok(())
    }
}
