//! Error Types for the Poshan API
//!
//! Every failure leaving the gateway is an [`ApiError`]: an [`ErrorCode`]
//! that fixes the HTTP status, a caller-facing message, and an optional
//! diagnostic that is logged but never sent to the caller.
//!
//! Errors are rendered as `{"error": {"message": "...", "code": 401}}` where
//! `code` is the HTTP status.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use poshan_core::{BarcodeError, ResolveError, StoreError, ThrottleConfigError, UpstreamError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Failure categories for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Gate failures (401, 403, 429)
    // ========================================================================
    /// No usable `Authorization: Bearer <token>` header
    AuthenticationRequired,

    /// Token present but bad signature, malformed, expired or incomplete
    InvalidCredential,

    /// Operation refused in the current environment
    Forbidden,

    /// Throttle rejected the caller
    RateLimited,

    // ========================================================================
    // Request failures (400, 404)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// No product matched
    NotFound,

    // ========================================================================
    // Dependency and server failures (5xx)
    // ========================================================================
    /// Upstream product catalogue failed or timed out
    UpstreamUnavailable,

    /// Product store operation failed
    DatabaseError,

    /// Anything else
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::AuthenticationRequired | ErrorCode::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationRequired => "Authentication required",
            ErrorCode::InvalidCredential => "Invalid or expired token",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::RateLimited => "Too many requests",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::NotFound => "Product not found",
            ErrorCode::UpstreamUnavailable => "Product catalogue unavailable",
            ErrorCode::DatabaseError => "Product store unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error for API operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Caller-facing message
    pub message: String,

    /// Internal detail for logs only
    pub diagnostic: Option<String>,

    /// Seconds the caller should wait, sent as `Retry-After`
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostic: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Attach a diagnostic that is logged but never returned.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationRequired, message)
    }

    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCredential, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a RateLimited error carrying the retry delay.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::RateLimited,
            format!("Too many requests. Retry after {} seconds", retry_after_secs),
        );
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    /// Human-readable message
    pub message: String,
    /// HTTP status code
    pub code: u16,
}

impl From<&ApiError> for ErrorEnvelope {
    fn from(err: &ApiError) -> Self {
        Self {
            error: ErrorBody {
                message: err.message.clone(),
                code: err.status_code().as_u16(),
            },
        }
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(
                code = %self.code,
                message = %self.message,
                diagnostic = self.diagnostic.as_deref().unwrap_or(""),
                "request failed"
            );
        } else {
            tracing::debug!(
                code = %self.code,
                message = %self.message,
                diagnostic = self.diagnostic.as_deref().unwrap_or(""),
                "request rejected"
            );
        }

        let mut response = (status, Json(ErrorEnvelope::from(&self))).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<BarcodeError> for ApiError {
    fn from(err: BarcodeError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::from_code(ErrorCode::UpstreamUnavailable).with_diagnostic(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        // Store details (hosts, SQL) stay out of the response body
        ApiError::from_code(ErrorCode::DatabaseError).with_diagnostic(err.to_string())
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Upstream(e) => e.into(),
            ResolveError::Store(e) => e.into(),
        }
    }
}

impl From<ThrottleConfigError> for ApiError {
    fn from(err: ThrottleConfigError) -> Self {
        ApiError::internal_error("Invalid throttle configuration").with_diagnostic(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
