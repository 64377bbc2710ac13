//! REST API Routes Module
//!
//! Route groups and the gate stages in front of them:
//! - `/api/products/barcode/{barcode}`: throttle (prefix `barcode`)
//! - `/api/products/search`: throttle (prefix `search`)
//! - `/api/auth/me`: auth
//! - `/api/poshan/summary`: auth, then throttle (prefix `poshan`)
//! - `/health/*`, `/openapi.json`: open
//! - `/auth/dev/token`: open, `dev` feature only

pub mod auth;
#[cfg(feature = "dev")]
pub mod dev_auth;
pub mod health;
pub mod poshan;
pub mod products;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use poshan_core::RouteThrottle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
#[cfg(feature = "openapi")]
use utoipa::OpenApi;

use crate::auth::AuthConfig;
use crate::config::{is_production_environment, ApiConfig, BARCODE_GROUP, POSHAN_GROUP, SEARCH_GROUP};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_gate, throttle_gate, GateState, RATE_LIMIT_REMAINING};
#[cfg(feature = "openapi")]
use crate::openapi::ApiDoc;
use crate::state::AppState;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

/// Validate API configuration for production use.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set POSHAN_CORS_ORIGINS.",
        ));
    }
    if !config.throttle_enabled {
        tracing::warn!(
            "Throttling is disabled in production. Set POSHAN_THROTTLE_ENABLED=true \
             to protect the upstream catalogue."
        );
    }
    Ok(())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow any origin (development); otherwise only the
/// configured origins are allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static(RATE_LIMIT_REMAINING),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

fn gate(
    group: &'static str,
    auth_config: &Arc<AuthConfig>,
    throttle: Option<Arc<RouteThrottle>>,
    trust_proxy_headers: bool,
) -> GateState {
    let state = GateState::new(group, auth_config.clone()).with_proxy_headers(trust_proxy_headers);
    match throttle {
        Some(throttle) => state.with_throttle(throttle),
        None => state,
    }
}

/// Create the complete API router.
///
/// Layers added later run earlier, so on the summary group the auth stage
/// runs before the throttle stage.
pub fn create_router(state: AppState) -> ApiResult<Router> {
    if is_production_environment() {
        validate_api_config_for_production(&state.api_config)?;
    }

    let auth_config = &state.auth_config;
    let throttles = &state.throttles;
    let trust = state.api_config.trust_proxy_headers;
    let barcode_gate = gate(BARCODE_GROUP, auth_config, throttles.barcode.clone(), trust);
    let search_gate = gate(SEARCH_GROUP, auth_config, throttles.search.clone(), trust);
    let auth_only_gate = gate("auth", auth_config, None, trust);
    let poshan_gate = gate(POSHAN_GROUP, auth_config, throttles.poshan.clone(), trust);

    let product_routes = Router::new()
        .merge(
            products::barcode_router()
                .layer(from_fn_with_state(barcode_gate, throttle_gate)),
        )
        .merge(
            products::search_router()
                .layer(from_fn_with_state(search_gate, throttle_gate)),
        );

    let auth_routes =
        auth::create_router().layer(from_fn_with_state(auth_only_gate, auth_gate));

    let poshan_routes = poshan::create_router()
        .layer(from_fn_with_state(poshan_gate.clone(), throttle_gate))
        .layer(from_fn_with_state(poshan_gate, auth_gate));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/api/products", product_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/poshan", poshan_routes)
        .nest("/health", health::create_router());

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", axum::routing::get(openapi_json));
    }

    #[cfg(feature = "dev")]
    {
        router = router.nest("/auth/dev", dev_auth::create_router());
    }

    let cors = build_cors_layer(&state.api_config);

    // Execution order: CORS -> Trace -> gates -> handler
    Ok(router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}
