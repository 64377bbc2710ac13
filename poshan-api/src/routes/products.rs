//! Product lookup and search.
//!
//! Both routes are anonymous and throttled by client address under their own
//! prefixes (`barcode`, `search`); see [`crate::routes::create_router`].

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use poshan_core::{
    Barcode, Origin, PageRequest, ProductResolver, Resolution, ResolveOptions, SearchOptions,
    SearchResults,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
#[cfg(feature = "openapi")]
use crate::error::ErrorEnvelope;
use crate::state::AppState;

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeParams {
    #[serde(default)]
    pub skip_cache: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub skip_cache: bool,
}

/// Query strings that fail to parse answer with the JSON error envelope.
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::invalid_input("Invalid query parameters").with_diagnostic(e.body_text()))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/products/barcode/{barcode} - Resolve a barcode
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/products/barcode/{barcode}",
    tag = "Products",
    params(
        ("barcode" = String, Path, description = "8 to 14 digit barcode"),
        ("skipCache" = Option<bool>, Query, description = "Bypass the stored copy")
    ),
    responses(
        (status = 200, description = "Product resolved", body = Resolution),
        (status = 400, description = "Malformed barcode", body = ErrorEnvelope),
        (status = 404, description = "No such product", body = ErrorEnvelope),
        (status = 429, description = "Throttled", body = ErrorEnvelope),
        (status = 502, description = "Upstream catalogue unavailable", body = ErrorEnvelope),
    )
))]
pub async fn get_by_barcode(
    State(resolver): State<Arc<ProductResolver>>,
    Path(raw): Path<String>,
    params: Result<Query<BarcodeParams>, QueryRejection>,
) -> ApiResult<Json<Resolution>> {
    let params = query_params(params)?;
    let barcode = Barcode::parse(&raw)?;

    let resolution = resolver
        .resolve(
            &barcode,
            ResolveOptions {
                skip_cache: params.skip_cache,
            },
        )
        .await?;

    tracing::debug!(barcode = %barcode, origin = %resolution.origin, "barcode resolved");

    if resolution.origin == Origin::NotFound {
        return Err(ApiError::not_found(format!("No product found for barcode {}", barcode)));
    }
    Ok(Json(resolution))
}

/// GET /api/products/search - Free-text product search
///
/// An empty result answers 200 with `origin: notFound`.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/products/search",
    tag = "Products",
    params(
        ("q" = String, Query, description = "Search text"),
        ("page" = Option<u32>, Query, description = "1-based page, default 1"),
        ("pageSize" = Option<u32>, Query, description = "Page size, default 20, at most 100"),
        ("skipCache" = Option<bool>, Query, description = "Bypass stored records")
    ),
    responses(
        (status = 200, description = "Search results", body = SearchResults),
        (status = 400, description = "Missing query", body = ErrorEnvelope),
        (status = 429, description = "Throttled", body = ErrorEnvelope),
        (status = 502, description = "Upstream catalogue unavailable", body = ErrorEnvelope),
    )
))]
pub async fn search(
    State(resolver): State<Arc<ProductResolver>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<SearchResults>> {
    let params = query_params(params)?;
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::invalid_input("Query parameter 'q' is required"))?;

    let opts = SearchOptions {
        paging: PageRequest::new(params.page, params.page_size),
        skip_cache: params.skip_cache,
    };
    let results = resolver.search(query, opts).await?;

    tracing::debug!(
        query,
        origin = %results.origin,
        hits = results.records.len(),
        "search resolved"
    );
    Ok(Json(results))
}

// ============================================================================
// ROUTERS
// ============================================================================

pub fn barcode_router() -> Router<AppState> {
    Router::new().route("/barcode/:barcode", get(get_by_barcode))
}

pub fn search_router() -> Router<AppState> {
    Router::new().route("/search", get(search))
}
