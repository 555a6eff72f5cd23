//! Token Cache Format
//!
//! Persisted credential state between runs. The provider accepts a
//! previously saved cache to skip the interactive flow; writing the cache
//! back to disk is the host application's job, after a run completes.
//!
//! ## Security Features
//!
//! - Token values are never logged or exposed in error messages
//! - `Debug` output redacts both token fields
//!
//! ## Example
//!
//! ```
//! use core_auth::{CachedTokens, CredentialSession};
//!
//! let session = CredentialSession::new(
//!     "access_token_value".to_string(),
//!     Some("refresh_token_value".to_string()),
//!     3600,
//!     vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
//! );
//!
//! let cache = CachedTokens::from_session(&session);
//! let json = cache.to_json().unwrap();
//! let restored = CachedTokens::from_json(&json).unwrap();
//! assert_eq!(restored.refresh_token, Some("refresh_token_value".to_string()));
//! ```

use crate::error::{AuthError, Result};
use crate::types::CredentialSession;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential state persisted between runs.
///
/// The refresh token is the durable part; the access token and expiry are
/// kept so an unexpired session can be resumed without any network round
/// trip at all.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedTokens {
    /// Last known access token, if still worth trying
    pub access_token: Option<String>,
    /// Long-lived refresh token
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Scopes granted when the tokens were issued
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CachedTokens {
    /// Capture a session for persistence.
    pub fn from_session(session: &CredentialSession) -> Self {
        Self {
            access_token: Some(session.access_token.clone()),
            refresh_token: session.refresh_token.clone(),
            expires_at: Some(session.expires_at),
            scopes: session.scopes.clone(),
        }
    }

    /// Rebuild a session from cached state.
    ///
    /// Returns `None` when the cache has no access token or no expiry; a
    /// refresh-token-only cache still seeds the refresh path but cannot be
    /// resumed directly.
    pub fn to_session(&self) -> Option<CredentialSession> {
        let access_token = self.access_token.clone()?;
        let expires_at = self.expires_at?;
        Some(CredentialSession {
            access_token,
            refresh_token: self.refresh_token.clone(),
            expires_at,
            scopes: self.scopes.clone(),
        })
    }

    /// Parse a cache from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCache` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidCache(format!("Malformed token cache: {}", e)))
    }

    /// Serialize the cache to JSON for persistence.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AuthError::InvalidCache(format!("Failed to serialize token cache: {}", e)))
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for CachedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokens")
            .field(
                "access_token",
                if self.access_token.is_some() {
                    &"[REDACTED]"
                } else {
                    &"None"
                },
            )
            .field(
                "refresh_token",
                if self.refresh_token.is_some() {
                    &"[REDACTED]"
                } else {
                    &"None"
                },
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}
