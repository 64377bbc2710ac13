//! Poshan API - HTTP gateway
//!
//! Axum server in front of the product resolver: bearer token verification,
//! per-route-group throttling, barcode lookup and search with a local cache
//! in front of Open Food Facts, health probes and an OpenAPI document.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod upstream;

// Re-export commonly used types
pub use auth::{issue_token, validate_token, verify_bearer, AuthConfig, Claims, JwtSecret};
pub use config::{ApiConfig, StoreBackend};
pub use db::{DbConfig, PgProductStore};
pub use error::{ApiError, ApiResult, ErrorCode, ErrorEnvelope};
pub use middleware::{auth_gate, throttle_gate, AuthIdentity, GateState};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::{AppState, Throttles};
pub use upstream::{OpenFoodFactsClient, UpstreamConfig};
