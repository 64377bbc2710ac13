//! Identity of the authenticated caller.

use axum::{routing::get, Json, Router};
use poshan_core::Identity;

#[cfg(feature = "openapi")]
use crate::error::ErrorEnvelope;
use crate::middleware::AuthIdentity;
use crate::state::AppState;

/// GET /api/auth/me - The verified identity
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Verified identity", body = Identity),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope),
    ),
    security(
        ("bearer_auth" = [])
    )
))]
pub async fn me(AuthIdentity(identity): AuthIdentity) -> Json<Identity> {
    Json(identity)
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}
