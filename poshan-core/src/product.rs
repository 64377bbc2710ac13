//! Product records and the barcode type they are keyed by.

use crate::error::BarcodeError;
use crate::Timestamp;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Products not refreshed for this many days are treated as deleted.
pub const PRODUCT_RETENTION_DAYS: i64 = 30;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound for any search page.
pub const MAX_PAGE_SIZE: u32 = 100;

#[allow(clippy::expect_used)]
static BARCODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8,14}$").expect("barcode pattern is a valid regex"));

// ============================================================================
// BARCODE
// ============================================================================

/// An 8 to 14 digit product barcode (EAN-8, UPC-A, EAN-13, GTIN-14).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(try_from = "String", into = "String")]
pub struct Barcode(String);

impl Barcode {
    /// Validate and wrap a barcode string.
    pub fn parse(raw: &str) -> Result<Self, BarcodeError> {
        if BARCODE_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(BarcodeError::Invalid {
                value: raw.chars().take(32).collect(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Barcode {
    type Error = BarcodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Barcode> for String {
    fn from(barcode: Barcode) -> Self {
        barcode.0
    }
}

// ============================================================================
// PRODUCT DATA
// ============================================================================

/// A product image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProductImage {
    /// Image role such as `front`, `ingredients` or `nutrition`
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Product content as reported by the upstream source, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub barcode: Barcode,
    pub name: String,
    pub brand: String,
    pub ingredients: String,
    pub nutrients: BTreeMap<String, serde_json::Value>,
    pub images: Vec<ProductImage>,
}

/// A stored product, unique by barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub barcode: Barcode,
    pub name: String,
    pub brand: String,
    pub ingredients: String,
    /// Nutrient name to value (numbers per 100g, units as strings)
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub nutrients: BTreeMap<String, serde_json::Value>,
    pub images: Vec<ProductImage>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_fetched_at: Timestamp,
}

impl ProductRecord {
    /// Stamp upstream details with the time they were fetched.
    pub fn stamped(details: ProductDetails, fetched_at: Timestamp) -> Self {
        Self {
            barcode: details.barcode,
            name: details.name,
            brand: details.brand,
            ingredients: details.ingredients,
            nutrients: details.nutrients,
            images: details.images,
            last_fetched_at: fetched_at,
        }
    }

    /// Whether the record has outlived the retention window.
    ///
    /// A record fetched exactly at [`retention_cutoff`] is still live; stores
    /// keep and serve it on the same terms.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.last_fetched_at < retention_cutoff(now)
    }

    /// Whether the record should be refreshed from upstream.
    ///
    /// With no threshold a record stays fresh until it expires.
    pub fn is_stale(&self, now: Timestamp, stale_after: Option<Duration>) -> bool {
        match stale_after {
            Some(threshold) => now - self.last_fetched_at > threshold,
            None => self.is_expired(now),
        }
    }
}

/// Oldest `last_fetched_at` that is still inside the retention window.
pub fn retention_cutoff(now: Timestamp) -> Timestamp {
    now - Duration::days(PRODUCT_RETENTION_DAYS)
}

// ============================================================================
// RESOLUTION RESULTS
// ============================================================================

/// Where a resolution was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    Cache,
    Upstream,
    NotFound,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Origin::Cache => "cache",
            Origin::Upstream => "upstream",
            Origin::NotFound => "notFound",
        };
        f.write_str(s)
    }
}

/// Outcome of resolving a single barcode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Resolution {
    pub record: Option<ProductRecord>,
    pub origin: Origin,
}

impl Resolution {
    pub fn not_found() -> Self {
        Self {
            record: None,
            origin: Origin::NotFound,
        }
    }
}

/// Outcome of a product search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchResults {
    pub records: Vec<ProductRecord>,
    pub origin: Origin,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Options for a single barcode resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub skip_cache: bool,
}

/// Validated paging window. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Normalise caller paging: missing or zero values take defaults and the
    /// page size is clamped to [`MAX_PAGE_SIZE`].
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records to skip for this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Options for a product search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub paging: PageRequest,
    pub skip_cache: bool,
}
