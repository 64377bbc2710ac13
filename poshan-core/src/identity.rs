//! Caller identity carried by a verified credential.

use serde::{Deserialize, Serialize};

/// Identity extracted from a verified bearer token.
///
/// Both fields are guaranteed non-empty; construct through [`Identity::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable subject identifier (user id)
    pub subject_id: String,
    /// Email address bound to the subject
    pub email: String,
}

impl Identity {
    /// Build an identity, rejecting blank fields.
    ///
    /// Returns `None` when either field is empty or whitespace.
    pub fn new(subject_id: impl Into<String>, email: impl Into<String>) -> Option<Self> {
        let subject_id = subject_id.into();
        let email = email.into();
        if subject_id.trim().is_empty() || email.trim().is_empty() {
            return None;
        }
        Some(Self { subject_id, email })
    }
}
