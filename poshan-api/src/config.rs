//! API Configuration Module
//!
//! CORS, throttle policies, product freshness and store selection. Loaded
//! from environment variables with defaults suitable for development.

use poshan_core::ThrottlePolicy;
use std::time::Duration;

/// Route group prefixes used for throttle keys.
pub const BARCODE_GROUP: &str = "barcode";
pub const SEARCH_GROUP: &str = "search";
pub const POSHAN_GROUP: &str = "poshan";

/// Check if running in a production environment (`POSHAN_ENVIRONMENT`).
pub fn is_production_environment() -> bool {
    std::env::var("POSHAN_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which product store the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = std::convert::Infallible;

    /// Anything other than `memory` selects PostgreSQL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        })
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, throttling and product freshness.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Throttle Configuration
    // ========================================================================
    /// Whether throttle stages run at all.
    pub throttle_enabled: bool,

    /// Anonymous barcode lookups, keyed by address.
    pub barcode_policy: ThrottlePolicy,

    /// Anonymous product search, keyed by address.
    pub search_policy: ThrottlePolicy,

    /// Authenticated Poshan summary, keyed by subject id.
    pub poshan_policy: ThrottlePolicy,

    /// How often idle throttle state is swept.
    pub throttle_sweep_interval: Duration,

    /// Key anonymous callers on `X-Forwarded-For`/`X-Real-IP`. Clients can
    /// set these freely, so only enable behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,

    // ========================================================================
    // Products
    // ========================================================================
    /// Age after which a stored product is refreshed from upstream.
    /// `None` keeps records fresh until they expire.
    pub product_stale_after: Option<chrono::Duration>,

    /// How often expired products are purged.
    pub product_purge_interval: Duration,

    /// Product store backend.
    pub store_backend: StoreBackend,
}

impl ApiConfig {
    pub const DEFAULT_BARCODE_POLICY: ThrottlePolicy = ThrottlePolicy::new(60, 60, 0);
    pub const DEFAULT_SEARCH_POLICY: ThrottlePolicy = ThrottlePolicy::new(30, 60, 0);
    pub const DEFAULT_POSHAN_POLICY: ThrottlePolicy = ThrottlePolicy::new(10, 60, 60);
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            throttle_enabled: true,
            barcode_policy: Self::DEFAULT_BARCODE_POLICY,
            search_policy: Self::DEFAULT_SEARCH_POLICY,
            poshan_policy: Self::DEFAULT_POSHAN_POLICY,
            throttle_sweep_interval: Duration::from_secs(60),
            trust_proxy_headers: true,

            product_stale_after: None,
            product_purge_interval: Duration::from_secs(3600),
            store_backend: StoreBackend::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `POSHAN_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `POSHAN_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `POSHAN_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `POSHAN_THROTTLE_ENABLED`: "false" disables throttling (default: true)
    /// - `POSHAN_THROTTLE_<GROUP>_POINTS|WINDOW_SECS|BLOCK_SECS` for
    ///   `BARCODE`, `SEARCH` and `POSHAN`
    /// - `POSHAN_THROTTLE_SWEEP_INTERVAL_SECS`: (default: 60)
    /// - `POSHAN_TRUST_PROXY_HEADERS`: "false" keys on the connection address only (default: true)
    /// - `POSHAN_PRODUCT_STALE_AFTER_SECS`: unset or 0 = never stale
    /// - `POSHAN_PRODUCT_PURGE_INTERVAL_SECS`: (default: 3600)
    /// - `POSHAN_STORE`: "postgres" (default) or "memory"
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("POSHAN_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("POSHAN_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let throttle_enabled = std::env::var("POSHAN_THROTTLE_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let trust_proxy_headers = std::env::var("POSHAN_TRUST_PROXY_HEADERS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.trust_proxy_headers);

        let product_stale_after = env_parse::<i64>("POSHAN_PRODUCT_STALE_AFTER_SECS")
            .filter(|secs| *secs > 0)
            .map(chrono::Duration::seconds);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("POSHAN_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),

            throttle_enabled,
            barcode_policy: policy_from_env("BARCODE", defaults.barcode_policy),
            search_policy: policy_from_env("SEARCH", defaults.search_policy),
            poshan_policy: policy_from_env("POSHAN", defaults.poshan_policy),
            throttle_sweep_interval: env_parse("POSHAN_THROTTLE_SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.throttle_sweep_interval),
            trust_proxy_headers,

            product_stale_after,
            product_purge_interval: env_parse("POSHAN_PRODUCT_PURGE_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.product_purge_interval),
            store_backend: std::env::var("POSHAN_STORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// Read `POSHAN_THROTTLE_<GROUP>_*`, keeping defaults for anything unset.
fn policy_from_env(group: &str, default: ThrottlePolicy) -> ThrottlePolicy {
    let var = |field: &str| format!("POSHAN_THROTTLE_{}_{}", group, field);
    ThrottlePolicy::new(
        env_parse(&var("POINTS")).unwrap_or(default.points),
        env_parse(&var("WINDOW_SECS")).unwrap_or(default.window_secs),
        env_parse(&var("BLOCK_SECS")).unwrap_or(default.block_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(config.throttle_enabled);
        assert_eq!(config.barcode_policy, ApiConfig::DEFAULT_BARCODE_POLICY);
        assert_eq!(config.poshan_policy.block_secs, 60);
        assert_eq!(config.product_stale_after, None);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_policy_from_env_overrides_single_fields() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _points = EnvVarGuard::set("POSHAN_THROTTLE_SEARCH_POINTS", Some("3"));
        let _window = EnvVarGuard::set("POSHAN_THROTTLE_SEARCH_WINDOW_SECS", Some("not-a-number"));
        let _block = EnvVarGuard::set("POSHAN_THROTTLE_SEARCH_BLOCK_SECS", Some("30"));

        let policy = policy_from_env("SEARCH", ApiConfig::DEFAULT_SEARCH_POLICY);
        assert_eq!(policy, ThrottlePolicy::new(3, 60, 30));
    }

    #[test]
    fn test_stale_after_zero_means_never() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _stale = EnvVarGuard::set("POSHAN_PRODUCT_STALE_AFTER_SECS", Some("0"));
        assert_eq!(ApiConfig::from_env().product_stale_after, None);

        let _stale = EnvVarGuard::set("POSHAN_PRODUCT_STALE_AFTER_SECS", Some("604800"));
        assert_eq!(
            ApiConfig::from_env().product_stale_after,
            Some(chrono::Duration::days(7))
        );
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("Postgres".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert_eq!("".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
    }

    #[test]
    fn test_trust_proxy_headers_switch() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _trust = EnvVarGuard::set("POSHAN_TRUST_PROXY_HEADERS", None);
        assert!(ApiConfig::from_env().trust_proxy_headers);

        let _trust = EnvVarGuard::set("POSHAN_TRUST_PROXY_HEADERS", Some("FALSE"));
        assert!(!ApiConfig::from_env().trust_proxy_headers);
    }
}
