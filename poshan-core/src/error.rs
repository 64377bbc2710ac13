//! Error types for Poshan core operations

use thiserror::Error;

/// Barcode validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BarcodeError {
    #[error("Invalid barcode '{value}': expected 8 to 14 digits")]
    Invalid { value: String },
}

/// Throttle configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThrottleConfigError {
    #[error("Throttle prefix '{prefix}' must be non-empty and must not contain ':'")]
    InvalidPrefix { prefix: String },

    #[error("Throttle window for '{prefix}' must be at least one second")]
    ZeroWindow { prefix: String },

    #[error("Throttle policy for '{prefix}' must allow at least one point")]
    ZeroPoints { prefix: String },
}

/// Persistent product store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Stored record for {barcode} is corrupt: {reason}")]
    Corrupt { barcode: String, reason: String },
}

/// Upstream product source errors.
///
/// "No match" is not an error; sources report it as `Ok(None)` or an empty list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Upstream transport failure: {reason}")]
    Transport { reason: String },

    #[error("Upstream payload malformed: {reason}")]
    Malformed { reason: String },
}

/// Product resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
