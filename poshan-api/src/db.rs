//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres and the
//! [`PgProductStore`] implementation of [`ProductStore`] over the `products`
//! table (see `migrations/V1__products.sql`).

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use poshan_core::{Barcode, PageRequest, ProductRecord, ProductStore, StoreError, Timestamp};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

const PRODUCTS_SCHEMA: &str = include_str!("../migrations/V1__products.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Checkout and connect timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "poshan".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("POSHAN_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("POSHAN_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("POSHAN_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("POSHAN_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("POSHAN_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("POSHAN_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("POSHAN_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are opened lazily; an unreachable server surfaces on the
    /// first checkout, bounded by `timeout`.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..PoolConfig::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            ApiError::database_error("Failed to create connection pool")
                .with_diagnostic(e.to_string())
        })
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> StoreError {
    StoreError::Unavailable {
        reason: err.to_string(),
    }
}

fn query_error(err: tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Unavailable {
            reason: err.to_string(),
        }
    } else {
        StoreError::QueryFailed {
            reason: err.to_string(),
        }
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn record_from_row(row: &Row) -> Result<ProductRecord, StoreError> {
    let raw_barcode: String = row.try_get("barcode").map_err(query_error)?;
    let corrupt = |reason: String| StoreError::Corrupt {
        barcode: raw_barcode.clone(),
        reason,
    };

    let barcode = Barcode::parse(&raw_barcode).map_err(|e| corrupt(e.to_string()))?;
    let nutrients: JsonValue = row.try_get("nutrients").map_err(query_error)?;
    let images: JsonValue = row.try_get("images").map_err(query_error)?;

    Ok(ProductRecord {
        barcode,
        name: row.try_get("name").map_err(query_error)?,
        brand: row.try_get("brand").map_err(query_error)?,
        ingredients: row.try_get("ingredients").map_err(query_error)?,
        nutrients: serde_json::from_value(nutrients).map_err(|e| corrupt(e.to_string()))?,
        images: serde_json::from_value(images).map_err(|e| corrupt(e.to_string()))?,
        last_fetched_at: row.try_get("last_fetched_at").map_err(query_error)?,
    })
}

// ============================================================================
// POSTGRES PRODUCT STORE
// ============================================================================

/// [`ProductStore`] backed by the PostgreSQL `products` table.
#[derive(Clone)]
pub struct PgProductStore {
    pool: Pool,
}

impl PgProductStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the `products` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.batch_execute(PRODUCTS_SCHEMA)
            .await
            .map_err(query_error)
    }
}

impl std::fmt::Debug for PgProductStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgProductStore")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Option<ProductRecord>, StoreError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT barcode, name, brand, ingredients, nutrients, images, last_fetched_at \
                 FROM products WHERE barcode = $1",
                &[&barcode.as_str()],
            )
            .await
            .map_err(query_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: ProductRecord) -> Result<ProductRecord, StoreError> {
        let nutrients = serde_json::to_value(&record.nutrients).map_err(|e| {
            StoreError::QueryFailed {
                reason: format!("serialize nutrients: {}", e),
            }
        })?;
        let images = serde_json::to_value(&record.images).map_err(|e| StoreError::QueryFailed {
            reason: format!("serialize images: {}", e),
        })?;

        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO products \
                     (barcode, name, brand, ingredients, nutrients, images, last_fetched_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (barcode) DO UPDATE SET \
                     name = EXCLUDED.name, \
                     brand = EXCLUDED.brand, \
                     ingredients = EXCLUDED.ingredients, \
                     nutrients = EXCLUDED.nutrients, \
                     images = EXCLUDED.images, \
                     last_fetched_at = EXCLUDED.last_fetched_at \
                 RETURNING barcode, name, brand, ingredients, nutrients, images, last_fetched_at",
                &[
                    &record.barcode.as_str(),
                    &record.name,
                    &record.brand,
                    &record.ingredients,
                    &nutrients,
                    &images,
                    &record.last_fetched_at,
                ],
            )
            .await
            .map_err(query_error)?;

        record_from_row(&row)
    }

    async fn find_many(
        &self,
        query: &str,
        paging: PageRequest,
        fetched_since: Timestamp,
    ) -> Result<Vec<ProductRecord>, StoreError> {
        let pattern = like_pattern(query);
        let limit = i64::from(paging.page_size());
        let offset = i64::try_from(paging.offset()).unwrap_or(i64::MAX);

        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT barcode, name, brand, ingredients, nutrients, images, last_fetched_at \
                 FROM products \
                 WHERE (name ILIKE $1 OR brand ILIKE $1 OR barcode ILIKE $1) \
                   AND last_fetched_at >= $2 \
                 ORDER BY name, barcode \
                 LIMIT $3 OFFSET $4",
                &[&pattern, &fetched_since, &limit, &offset],
            )
            .await
            .map_err(query_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn purge_expired(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM products WHERE last_fetched_at < $1", &[&cutoff])
            .await
            .map_err(query_error)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map(|_| ())
            .map_err(query_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "poshan");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("oats"), "%oats%");
        assert_eq!(like_pattern(" 100% "), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() -> ApiResult<()> {
        // No server is contacted until the first checkout
        let config = DbConfig {
            port: 1,
            ..DbConfig::default()
        };
        let store = PgProductStore::from_config(&config)?;
        assert_eq!(store.pool_size(), 0);
        Ok(())
    }
}
