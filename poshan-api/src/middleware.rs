//! Gate Middleware
//!
//! Pipeline stages that run before a protected handler:
//! - [`auth_gate`] verifies the bearer token and injects the [`Identity`]
//!   into request extensions
//! - [`throttle_gate`] admits or rejects the caller against the route
//!   group's [`RouteThrottle`]
//!
//! Stages are applied per route group with `from_fn_with_state`. For groups
//! needing both, the auth layer is added last so it runs first and the
//! throttle keys on the verified subject id. A failing stage short-circuits
//! with the [`ApiError`] response.

use crate::auth::{verify_bearer, AuthConfig};
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use poshan_core::{Admission, Identity, RouteThrottle, ANONYMOUS_CALLER};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Response header carrying the points left in the current window.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// State shared by the gate stages of one route group.
#[derive(Debug, Clone)]
pub struct GateState {
    /// Route group name, used in logs
    pub group: &'static str,

    /// Token verification configuration
    pub auth_config: Arc<AuthConfig>,

    /// Limiter for the group; `None` when throttling is disabled
    pub throttle: Option<Arc<RouteThrottle>>,

    /// Whether forwarding headers may name the client address
    pub trust_proxy_headers: bool,
}

impl GateState {
    pub fn new(group: &'static str, auth_config: Arc<AuthConfig>) -> Self {
        Self {
            group,
            auth_config,
            throttle: None,
            trust_proxy_headers: true,
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<RouteThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn with_proxy_headers(mut self, trusted: bool) -> Self {
        self.trust_proxy_headers = trusted;
        self
    }
}

// ============================================================================
// AUTH STAGE
// ============================================================================

/// Verify `Authorization: Bearer <token>` and inject the caller's identity.
pub async fn auth_gate(
    State(state): State<GateState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let identity = verify_bearer(&state.auth_config, auth_header).map_err(|err| {
        tracing::info!(
            group = state.group,
            kind = %err.code,
            diagnostic = err.diagnostic.as_deref().unwrap_or(""),
            "authentication rejected"
        );
        err
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// ============================================================================
// THROTTLE STAGE
// ============================================================================

/// Best-effort client address: `X-Forwarded-For` first hop, then
/// `X-Real-IP`, then the connection address.
///
/// The forwarding headers are caller-controlled. With `trust_proxy_headers`
/// off only the connection address counts, so a client cannot rotate them
/// to dodge an address-keyed throttle.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connection: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    if !trust_proxy_headers {
        return connection.map(|addr| addr.ip());
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok());
    if forwarded.is_some() {
        return forwarded;
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    if real_ip.is_some() {
        return real_ip;
    }

    connection.map(|addr| addr.ip())
}

/// Throttle caller token: verified subject id, else client address, else
/// [`ANONYMOUS_CALLER`].
fn caller_for(request: &Request, trust_proxy_headers: bool) -> String {
    if let Some(identity) = request.extensions().get::<Identity>() {
        return identity.subject_id.clone();
    }

    let connection = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    extract_client_ip(request.headers(), connection, trust_proxy_headers)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| ANONYMOUS_CALLER.to_string())
}

/// Admit the caller against the group's limiter.
///
/// Rejections answer 429 with `Retry-After`; admitted responses carry
/// `X-RateLimit-Remaining`.
pub async fn throttle_gate(
    State(state): State<GateState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(throttle) = state.throttle.as_ref() else {
        return Ok(next.run(request).await);
    };

    let caller = caller_for(&request, state.trust_proxy_headers);
    let (key, admission) = throttle.check(&caller);

    match admission {
        Admission::Admitted { remaining } => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response.headers_mut().insert(RATE_LIMIT_REMAINING, value);
            }
            Ok(response)
        }
        Admission::Rejected { retry_after_secs } => {
            tracing::warn!(
                group = state.group,
                prefix = throttle.prefix(),
                key = %key,
                kind = "rate_limited",
                retry_after_secs,
                "request throttled"
            );
            Err(ApiError::rate_limited(retry_after_secs))
        }
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The verified caller, as injected by [`auth_gate`].
///
/// Handlers take this by value and pass the identity on explicitly. Using it
/// on a route without the auth stage is a wiring bug and answers 500.
#[derive(Debug, Clone)]
pub struct AuthIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthIdentity)
            .ok_or_else(|| {
                ApiError::internal_error("Identity missing from request")
                    .with_diagnostic("auth_gate is not applied to this route")
            })
    }
}

impl std::ops::Deref for AuthIdentity {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
