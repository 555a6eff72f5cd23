//! OAuth client secrets loading.
//!
//! Desktop OAuth clients are registered in the provider's console and
//! downloaded as a JSON file with an `installed` (or `web`) section. Only
//! the client identity and the two endpoint URLs matter here; everything
//! else in the file is ignored.

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client identity and endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Authorization endpoint URL
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint URL
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Downloaded secrets file wrapper. Desktop registrations use `installed`;
/// some consoles emit `web` for loopback clients.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse client secrets from the downloaded JSON.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSecrets` if the JSON is malformed or
    /// contains neither an `installed` nor a `web` section.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidSecrets(format!("Malformed secrets JSON: {}", e)))?;

        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidSecrets(
                "Secrets JSON has neither an 'installed' nor a 'web' section".to_string(),
            )
        })
    }
}

// Custom Debug implementation to avoid logging the client secret
impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
