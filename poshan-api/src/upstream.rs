//! Open Food Facts client
//!
//! [`ProductSource`] over an Open Food Facts compatible catalogue. Every
//! request carries the configured deadline; a timeout, a non-2xx status other
//! than 404, or an unreadable payload is an [`UpstreamError`]. A 404 or a
//! `status: 0` body means the catalogue has no such product.

use async_trait::async_trait;
use poshan_core::{Barcode, PageRequest, ProductDetails, ProductImage, ProductSource, UpstreamError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Upstream catalogue configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Catalogue base URL, without trailing slash
    pub base_url: String,
    /// Deadline for each request
    pub timeout: Duration,
    /// Sent as `User-Agent`; Open Food Facts asks clients to identify themselves
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://world.openfoodfacts.org".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("poshan-gateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UpstreamConfig {
    /// Create upstream configuration from environment variables.
    ///
    /// - `POSHAN_UPSTREAM_URL`
    /// - `POSHAN_UPSTREAM_TIMEOUT_SECS` (default: 10)
    /// - `POSHAN_UPSTREAM_USER_AGENT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POSHAN_UPSTREAM_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("POSHAN_UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: std::env::var("POSHAN_UPSTREAM_USER_AGENT")
                .unwrap_or(defaults.user_agent),
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    product: Option<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<OffProduct>,
}

#[derive(Debug, Default, Deserialize)]
struct OffProduct {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    brands: Option<String>,
    #[serde(default)]
    ingredients_text: Option<String>,
    #[serde(default)]
    nutriments: BTreeMap<String, JsonValue>,
    #[serde(default)]
    image_front_url: Option<String>,
    #[serde(default)]
    image_ingredients_url: Option<String>,
    #[serde(default)]
    image_nutrition_url: Option<String>,
}

impl OffProduct {
    fn into_details(self, barcode: Barcode) -> ProductDetails {
        let images = [
            ("front", self.image_front_url),
            ("ingredients", self.image_ingredients_url),
            ("nutrition", self.image_nutrition_url),
        ]
        .into_iter()
        .filter_map(|(kind, url)| {
            url.filter(|u| !u.is_empty()).map(|url| ProductImage {
                kind: kind.to_string(),
                url,
            })
        })
        .collect();

        ProductDetails {
            barcode,
            name: self.product_name.unwrap_or_default(),
            brand: self.brands.unwrap_or_default(),
            ingredients: self.ingredients_text.unwrap_or_default(),
            nutrients: self.nutriments,
            images,
        }
    }
}

fn parse_lookup(barcode: &Barcode, body: &[u8]) -> Result<Option<ProductDetails>, UpstreamError> {
    let response: LookupResponse =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Malformed {
            reason: e.to_string(),
        })?;

    if response.status == 0 {
        return Ok(None);
    }
    Ok(response.product.map(|p| p.into_details(barcode.clone())))
}

fn parse_search(body: &[u8]) -> Result<Vec<ProductDetails>, UpstreamError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Malformed {
            reason: e.to_string(),
        })?;

    Ok(response
        .products
        .into_iter()
        .filter_map(|product| {
            let code = product.code.as_deref().unwrap_or_default();
            match Barcode::parse(code) {
                Ok(barcode) => Some(product.into_details(barcode)),
                Err(_) => {
                    tracing::debug!(code, "skipping upstream product with unusable barcode");
                    None
                }
            }
        })
        .collect())
}

// ============================================================================
// CLIENT
// ============================================================================

/// HTTP client for an Open Food Facts compatible catalogue.
#[derive(Clone)]
pub struct OpenFoodFactsClient {
    client: Client,
    config: UpstreamConfig,
}

impl OpenFoodFactsClient {
    /// Build a client; fails only if the TLS backend cannot initialise.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Transport {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else {
            UpstreamError::Transport {
                reason: err.to_string(),
            }
        }
    }

    /// GET `url`; `Ok(None)` on 404, the body on 2xx.
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Option<Vec<u8>>, UpstreamError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(Some(body.to_vec()))
    }
}

impl std::fmt::Debug for OpenFoodFactsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFoodFactsClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[async_trait]
impl ProductSource for OpenFoodFactsClient {
    async fn lookup(&self, barcode: &Barcode) -> Result<Option<ProductDetails>, UpstreamError> {
        let url = format!("{}/api/v2/product/{}.json", self.config.base_url, barcode);
        tracing::debug!(barcode = %barcode, "upstream product lookup");

        match self.fetch(&url, &[]).await? {
            Some(body) => parse_lookup(barcode, &body),
            None => Ok(None),
        }
    }

    async fn search(
        &self,
        query: &str,
        paging: PageRequest,
    ) -> Result<Vec<ProductDetails>, UpstreamError> {
        let url = format!("{}/cgi/search.pl", self.config.base_url);
        let params = [
            ("search_terms", query.trim().to_string()),
            ("page", paging.page().to_string()),
            ("page_size", paging.page_size().to_string()),
            ("json", "1".to_string()),
        ];
        tracing::debug!(query, page = paging.page(), "upstream product search");

        match self.fetch(&url, &params).await? {
            Some(body) => parse_search(&body),
            None => Ok(Vec::new()),
        }
    }
}
