//! Poshan nutrition summary.
//!
//! Authenticated and throttled per subject. The summary is a fixed
//! placeholder until nutrition scoring exists.

use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use crate::error::ErrorEnvelope;
use crate::middleware::AuthIdentity;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PoshanSummary {
    pub subject_id: String,
    pub status: String,
    pub message: String,
    pub recommendations: Vec<String>,
}

impl PoshanSummary {
    pub fn placeholder(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            status: "pending".to_string(),
            message: "Your Poshan summary will appear here once you have logged some meals."
                .to_string(),
            recommendations: Vec::new(),
        }
    }
}

/// GET /api/poshan/summary - Placeholder nutrition summary
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/poshan/summary",
    tag = "Poshan",
    responses(
        (status = 200, description = "Summary for the caller", body = PoshanSummary),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope),
        (status = 429, description = "Throttled", body = ErrorEnvelope),
    ),
    security(
        ("bearer_auth" = [])
    )
))]
pub async fn summary(AuthIdentity(identity): AuthIdentity) -> Json<PoshanSummary> {
    Json(PoshanSummary::placeholder(identity.subject_id))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/summary", get(summary))
}
