//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use poshan_core::{
    Clock, ProductResolver, ProductSource, ProductStore, RouteThrottle, ThrottleConfigError,
};

use crate::auth::AuthConfig;
use crate::config::{ApiConfig, BARCODE_GROUP, POSHAN_GROUP, SEARCH_GROUP};

/// One limiter per throttled route group. `None` when throttling is disabled.
#[derive(Debug, Clone, Default)]
pub struct Throttles {
    pub barcode: Option<Arc<RouteThrottle>>,
    pub search: Option<Arc<RouteThrottle>>,
    pub poshan: Option<Arc<RouteThrottle>>,
}

impl Throttles {
    /// Build in-process limiters from the configured policies.
    pub fn from_config(
        config: &ApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ThrottleConfigError> {
        if !config.throttle_enabled {
            return Ok(Self::default());
        }

        let build = |prefix: &str, policy| {
            RouteThrottle::in_memory(prefix, policy, clock.clone()).map(|t| Some(Arc::new(t)))
        };

        Ok(Self {
            barcode: build(BARCODE_GROUP, config.barcode_policy)?,
            search: build(SEARCH_GROUP, config.search_policy)?,
            poshan: build(POSHAN_GROUP, config.poshan_policy)?,
        })
    }

    /// Every configured limiter.
    pub fn all(&self) -> Vec<Arc<RouteThrottle>> {
        [&self.barcode, &self.search, &self.poshan]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cache-then-upstream product resolution.
    pub resolver: Arc<ProductResolver>,
    /// The resolver's store, for readiness probes and the purge job.
    pub store: Arc<dyn ProductStore>,
    pub auth_config: Arc<AuthConfig>,
    pub api_config: Arc<ApiConfig>,
    pub throttles: Throttles,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the resolver and limiters from configuration.
    pub fn new(
        api_config: ApiConfig,
        auth_config: AuthConfig,
        store: Arc<dyn ProductStore>,
        source: Arc<dyn ProductSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ThrottleConfigError> {
        let throttles = Throttles::from_config(&api_config, clock.clone())?;
        let resolver = ProductResolver::new(store.clone(), source, clock)
            .with_stale_after(api_config.product_stale_after);

        Ok(Self {
            resolver: Arc::new(resolver),
            store,
            auth_config: Arc::new(auth_config),
            api_config: Arc::new(api_config),
            throttles,
            start_time: Instant::now(),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("resolver", &self.resolver)
            .field("auth_config", &self.auth_config)
            .field("throttles", &self.throttles)
            .finish()
    }
}

crate::impl_from_ref!(Arc<ProductResolver>, resolver);
crate::impl_from_ref!(Arc<dyn ProductStore>, store);
crate::impl_from_ref!(Arc<AuthConfig>, auth_config);
crate::impl_from_ref!(Instant, start_time);
