//! Shared-secret authentication for admin operations
//!
//! Admin callers present the secret in the `X-API-Key` header. There are no
//! sessions and no tokens; every admin call is checked on its own.

use axum::http::HeaderMap;

use crate::error::QaError;

/// Header carrying the admin secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Admin secret checker
#[derive(Clone)]
pub struct AdminAuth {
    secret: String,
}

impl AdminAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check a caller-supplied credential
    ///
    /// Absence and mismatch are both `Unauthorized`. An empty configured
    /// secret never matches.
    pub fn verify(&self, credential: Option<&str>) -> Result<(), QaError> {
        match credential {
            Some(key) if !self.secret.is_empty() && key == self.secret => Ok(()),
            _ => Err(QaError::Unauthorized),
        }
    }

    /// Extract the API key from request headers
    pub fn api_key(headers: &HeaderMap) -> Option<&str> {
        headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth").field("secret", &"<redacted>").finish()
    }
}
