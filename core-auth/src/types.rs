use serde::{Deserialize, Serialize};
use std::fmt;

/// An authorized credential session.
///
/// Holds the access token used for API requests, the refresh token used to
/// obtain replacements, the expiry timestamp, and the scopes the user
/// actually granted.
///
/// # Security
///
/// Tokens should never be logged. The `Debug` implementation redacts both
/// token fields.
///
/// # Examples
///
/// ```
/// use core_auth::CredentialSession;
/// use chrono::{Duration, Utc};
///
/// let session = CredentialSession {
///     access_token: "ya29.a0...".to_string(),
///     refresh_token: Some("1//0g...".to_string()),
///     expires_at: Utc::now() + Duration::hours(1),
///     scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
/// };
///
/// assert!(!session.is_expired());
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialSession {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens, when the
    /// authorization server issued one
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Scopes granted by the user
    pub scopes: Vec<String>,
}

impl CredentialSession {
    /// Create a new session from token endpoint values.
    ///
    /// # Arguments
    ///
    /// * `access_token` - The OAuth access token
    /// * `refresh_token` - The OAuth refresh token, if issued
    /// * `expires_in` - Number of seconds until token expiration
    /// * `scopes` - Scopes granted for this session
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in),
            scopes,
        }
    }

    /// Check if the access token is expired or will expire soon.
    ///
    /// Uses a 300 second buffer so tokens are replaced before they actually
    /// lapse mid-request.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(300)
    }

    /// Check if the access token is expired with a custom buffer.
    ///
    /// # Arguments
    ///
    /// * `buffer_seconds` - Number of seconds before expiration to consider expired
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds);
        now >= self.expires_at - buffer
    }

    /// Get the time remaining until token expiration.
    ///
    /// Returns `None` if the token is already expired.
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = chrono::Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// Check that every required scope was granted.
    pub fn grants_scopes(&self, required: &[String]) -> bool {
        self.missing_scopes(required).is_empty()
    }

    /// List the required scopes that were not granted.
    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.scopes.iter().any(|granted| granted == *scope))
            .cloned()
            .collect()
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for CredentialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSession")
            .field("access_token", &"[REDACTED]")
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
