//! Credential Access Abstraction
//!
//! The HTTP layer attaches a bearer token to every API request and needs a
//! way to obtain a replacement when the remote service rejects one. This
//! trait decouples that need from any concrete OAuth implementation.

use async_trait::async_trait;

use crate::error::Result;

/// Source of bearer tokens for authenticated API calls.
///
/// Implementations hold a credential session and coordinate refreshes so
/// that concurrent callers reporting the same rejected token trigger at
/// most one refresh round trip.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns the current access token.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unauthorized`](crate::error::BridgeError::Unauthorized)
    /// if no credential session is held.
    async fn access_token(&self) -> Result<String>;

    /// Exchanges a rejected access token for a fresh one.
    ///
    /// `stale_token` is the token the server answered 401 to. If another
    /// caller has already replaced it, the current token is returned without
    /// a new refresh round trip.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unauthorized`](crate::error::BridgeError::Unauthorized)
    /// when the refresh itself is rejected; the session cannot be repaired
    /// without a new interactive authorization.
    async fn refresh_after_unauthorized(&self, stale_token: &str) -> Result<String>;
}
