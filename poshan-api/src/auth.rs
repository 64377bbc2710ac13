//! Authentication Module
//!
//! Bearer token verification for the Poshan API. A request carries
//! `Authorization: Bearer <jwt>`; the token is HS256-signed with the shared
//! secret and carries `{subjectId, email, iat, exp}`. A verified token yields
//! an [`Identity`].
//!
//! Signature checking is delegated to `jsonwebtoken`; expiry is checked here
//! against the injected [`Clock`] so tests never depend on wall-clock time.

use crate::config::is_production_environment;
use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use poshan_core::{Clock, Identity, SystemClock};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Shortest secret accepted in production.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// Shared signing secret. Never printed.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Wrap a secret, rejecting blank values.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.trim().is_empty() {
            return Err(ApiError::invalid_input("JWT secret must not be empty"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (use sparingly, only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }

    fn insecure_default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into()))
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing and verification
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (default: HS256)
    pub jwt_algorithm: Algorithm,

    /// Lifetime of issued tokens in seconds (default: 1 hour)
    pub jwt_expiration_secs: i64,

    /// Leeway applied to `exp` in seconds (default: 60)
    pub jwt_clock_skew_secs: i64,

    /// Clock for expiry checks (injected for testing)
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<Clock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::insecure_default(),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `POSHAN_JWT_SECRET`: JWT signing secret
    /// - `POSHAN_JWT_EXPIRATION_SECS`: issued token lifetime (default: 3600)
    /// - `POSHAN_JWT_CLOCK_SKEW_SECS`: expiry leeway (default: 60)
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("POSHAN_JWT_SECRET")
            .ok()
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_else(JwtSecret::insecure_default);

        Self {
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("POSHAN_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            jwt_clock_skew_secs: std::env::var("POSHAN_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &i64| *secs >= 0)
                .unwrap_or(60),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry checks and issued-at stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Refuse insecure secrets when `POSHAN_ENVIRONMENT` is production.
    ///
    /// Outside production the same problems only log a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        self.validate_secret(is_production_environment())
    }

    fn validate_secret(&self, production: bool) -> ApiResult<()> {
        if self.jwt_secret.is_insecure_default() {
            if production {
                return Err(ApiError::invalid_input(
                    "Cannot start in production with the default JWT secret. \
                     Set POSHAN_JWT_SECRET.",
                ));
            }
            tracing::warn!(
                "Using the insecure default JWT secret. Set POSHAN_JWT_SECRET \
                 before deploying."
            );
            return Ok(());
        }

        if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            if production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars, need {}).",
                    self.jwt_secret.len(),
                    MIN_PRODUCTION_SECRET_LEN
                )));
            }
            tracing::warn!(
                secret_len = self.jwt_secret.len(),
                "JWT secret is short; use at least {} characters in production",
                MIN_PRODUCTION_SECRET_LEN
            );
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// Claims carried by a Poshan access token.
///
/// Identity fields default to empty so a token missing them decodes and is
/// then rejected as incomplete rather than as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default)]
    pub subject_id: String,

    #[serde(default)]
    pub email: String,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Claims for `identity`, issued now according to `clock`.
    pub fn new(identity: &Identity, expiration_secs: i64, clock: &dyn Clock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            iat: now,
            exp: now.saturating_add(expiration_secs),
        }
    }

    /// Identity carried by the claims, if both fields are present.
    pub fn identity(&self) -> Option<Identity> {
        Identity::new(self.subject_id.clone(), self.email.clone())
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and exactly one token segment
/// must follow it.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// Check `exp` against `now` with `leeway_secs` of tolerance.
fn validate_expiry(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now.saturating_sub(leeway_secs) {
        return Err(ApiError::invalid_credential("Token has expired"));
    }
    Ok(())
}

/// Verify a token's signature and expiry and return its claims.
pub fn validate_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    // Signature and structure only; time checks use our clock below
    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| {
            let message = match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "Token signature is invalid",
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_) => "Token is missing exp",
                _ => "Token is invalid",
            };
            ApiError::invalid_credential(message).with_diagnostic(e.to_string())
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(
            timestamp = now,
            "System clock returned pre-epoch time - server time is broken"
        );
        return Err(ApiError::internal_error("Server time configuration error"));
    }

    validate_expiry(now, claims.exp, config.jwt_clock_skew_secs)?;
    Ok(claims)
}

/// Verify an `Authorization` header and return the caller's identity.
///
/// A missing or non-Bearer header is `AuthenticationRequired`; anything wrong
/// with the token itself is `InvalidCredential`.
pub fn verify_bearer(config: &AuthConfig, header: Option<&str>) -> ApiResult<Identity> {
    let header = header.ok_or_else(|| {
        ApiError::authentication_required("Authorization header is required")
    })?;
    let token = bearer_token(header).ok_or_else(|| {
        ApiError::authentication_required("Authorization header must be 'Bearer <token>'")
    })?;

    let claims = validate_token(config, token)?;
    claims
        .identity()
        .ok_or_else(|| ApiError::invalid_credential("Token payload incomplete"))
}

/// Sign a token for `identity`.
pub fn issue_token(config: &AuthConfig, identity: &Identity) -> ApiResult<String> {
    let claims = Claims::new(identity, config.jwt_expiration_secs, &*config.clock);
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key).map_err(|e| {
        ApiError::internal_error("Failed to generate token").with_diagnostic(e.to_string())
    })
}

// ============================================================================
// TESTS
// ============================================================================
