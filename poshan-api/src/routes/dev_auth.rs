//! Development Authentication Endpoints
//!
//! Compiled only with the `dev` feature, and refused at runtime when
//! `POSHAN_ENVIRONMENT` is production.
//!
//! Endpoints:
//! - POST /auth/dev/token - Sign a token for local testing

use axum::{extract::State, routing::post, Json, Router};
use poshan_core::Identity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    auth::{issue_token, AuthConfig},
    config::is_production_environment,
    error::{ApiError, ApiResult},
    state::AppState,
};

// ============================================================================
// TYPES
// ============================================================================

/// Request body for dev token generation.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DevTokenRequest {
    /// Defaults to dev@poshan.local
    #[serde(default = "default_email")]
    pub email: String,

    /// Defaults to an id derived from the email
    #[serde(default)]
    pub subject_id: Option<String>,
}

fn default_email() -> String {
    "dev@poshan.local".to_string()
}

/// Response for dev token generation.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DevTokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub expires_in: i64,
    pub identity: Identity,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /auth/dev/token - Generate a development token
pub async fn generate_dev_token(
    State(auth_config): State<Arc<AuthConfig>>,
    Json(request): Json<DevTokenRequest>,
) -> ApiResult<Json<DevTokenResponse>> {
    if is_production_environment() {
        return Err(ApiError::forbidden("Dev authentication is disabled in production"));
    }

    let subject_id = request
        .subject_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("dev-{}", request.email.replace(['@', '.'], "-")));

    let identity = Identity::new(subject_id, request.email)
        .ok_or_else(|| ApiError::invalid_input("email must not be empty"))?;
    let token = issue_token(&auth_config, &identity)?;

    tracing::info!(subject_id = %identity.subject_id, "Generated dev token");

    Ok(Json(DevTokenResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: auth_config.jwt_expiration_secs,
        identity,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Dev token router. Empty in production.
pub fn create_router() -> Router<AppState> {
    if is_production_environment() {
        tracing::info!("Dev auth disabled (production environment)");
        return Router::new();
    }

    tracing::warn!(
        "Dev auth enabled. Set POSHAN_ENVIRONMENT=production or build without \
         the `dev` feature to disable it."
    );
    Router::new().route("/token", post(generate_dev_token))
}
