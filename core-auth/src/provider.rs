//! # Credential Provider
//!
//! High-level credential acquisition for the sync engine.
//!
//! ## Overview
//!
//! The `CredentialProvider` turns client secrets, an optional token cache,
//! and the browser-based authorization flow into one operation: *give me a
//! usable credential session within this deadline*. It prefers the cheapest
//! path that works:
//!
//! 1. An unexpired cached session is returned directly.
//! 2. An expired session with a refresh token is refreshed.
//! 3. Otherwise the interactive loopback flow runs in its own task, bounded
//!    by the caller's deadline.
//!
//! Every acquired session is checked against the required scopes before it
//! is handed out.
//!
//! ## Mid-run refresh
//!
//! During a sync run the HTTP layer reports rejected tokens through the
//! [`TokenSource`] trait. Refreshes are single-flight: concurrent callers
//! holding the same stale token trigger one refresh round trip, and the
//! stragglers receive the replacement that is already installed.

use crate::cache::CachedTokens;
use crate::error::{AuthError, Result};
use crate::flow::{CallbackServer, OAuthFlow};
use crate::secrets::ClientSecrets;
use crate::types::CredentialSession;
use async_trait::async_trait;
use bridge_traits::auth::TokenSource;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::HttpClient;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout_at;
use tracing::{debug, info, instrument, warn};

/// Default deadline for credential acquisition (2 minutes).
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

/// Credential acquisition and refresh for a single OAuth client.
pub struct CredentialProvider {
    flow: OAuthFlow,
    required_scopes: Vec<String>,
    event_bus: EventBus,
    session: Arc<RwLock<Option<CredentialSession>>>,
    /// Refresh token from a cache that had no resumable access token
    spare_refresh_token: Option<String>,
    /// Serializes mid-run refreshes so concurrent 401 reports trigger one
    refresh_lock: Arc<Mutex<()>>,
}

impl CredentialProvider {
    /// Creates a new provider.
    ///
    /// # Arguments
    ///
    /// * `secrets` - OAuth client identity and endpoints
    /// * `scopes` - Scopes the engine requires
    /// * `http_client` - HTTP transport for token endpoint requests
    /// * `event_bus` - Event bus for auth progress events
    pub fn new(
        secrets: ClientSecrets,
        scopes: Vec<String>,
        http_client: Arc<dyn HttpClient>,
        event_bus: EventBus,
    ) -> Self {
        let flow = OAuthFlow::new(secrets, scopes.clone(), http_client);
        Self {
            flow,
            required_scopes: scopes,
            event_bus,
            session: Arc::new(RwLock::new(None)),
            spare_refresh_token: None,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Seeds the provider with tokens persisted by a previous run.
    pub fn with_cached_tokens(mut self, cache: CachedTokens) -> Self {
        match cache.to_session() {
            Some(session) => {
                self.session = Arc::new(RwLock::new(Some(session)));
            }
            None => {
                self.spare_refresh_token = cache.refresh_token;
            }
        }
        self
    }

    /// Returns the current session, for persisting back to the token cache.
    pub async fn session(&self) -> Option<CredentialSession> {
        self.session.read().await.clone()
    }

    /// Acquires a credential session within the given deadline.
    ///
    /// Tries the cached session, then a refresh, then the interactive
    /// browser flow. The whole operation is bounded by `wait`; when the
    /// deadline passes, the in-flight flow is aborted and
    /// `AuthError::FlowTimeout` is returned.
    ///
    /// # Errors
    ///
    /// - `AuthError::FlowTimeout` - deadline passed before authorization
    /// - `AuthError::Denied` - the user declined consent
    /// - `AuthError::ScopeInsufficient` - granted scopes don't cover the
    ///   required ones
    #[instrument(skip(self))]
    pub async fn acquire(&self, wait: Duration) -> Result<CredentialSession> {
        let deadline = tokio::time::Instant::now() + wait;

        // Fast path: an unexpired cached session
        {
            let session = self.session.read().await;
            if let Some(s) = session.as_ref() {
                if !s.is_expired() {
                    debug!("Using cached credential session");
                    return self.check_scopes(s.clone(), "cache");
                }
            }
        }

        // Refresh path: a refresh token from an expired session or the cache
        if let Some(refresh_token) = self.stored_refresh_token().await {
            match timeout_at(deadline, self.flow.refresh_access_token(&refresh_token)).await {
                Ok(Ok(session)) => {
                    info!("Resumed credentials via token refresh");
                    self.install_session(session.clone()).await;
                    return self.check_scopes(session, "refresh");
                }
                Ok(Err(e)) => {
                    warn!("Cached refresh token rejected, starting interactive flow: {}", e);
                }
                Err(_) => return self.flow_timed_out(wait),
            }
        }

        // Interactive flow runs in its own task so the deadline can abort it
        // without leaving the loopback listener behind.
        let flow = self.flow.clone();
        let bus = self.event_bus.clone();
        let mut handle = tokio::spawn(run_interactive_flow(flow, bus));

        let flow_result = match timeout_at(deadline, &mut handle).await {
            Ok(joined) => joined
                .map_err(|e| AuthError::Other(format!("Authorization task failed: {}", e)))?,
            Err(_) => {
                handle.abort();
                return self.flow_timed_out(wait);
            }
        };

        let session = flow_result?;
        info!("Interactive authorization completed");
        self.install_session(session.clone()).await;
        self.check_scopes(session, "interactive")
    }

    fn flow_timed_out<T>(&self, wait: Duration) -> Result<T> {
        let event = CoreEvent::Auth(AuthEvent::AuthError {
            message: format!("Authorization timed out after {:?}", wait),
            recoverable: true,
        });
        let _ = self.event_bus.emit(event);
        Err(AuthError::FlowTimeout(wait))
    }

    /// Verify the session covers the required scopes, then announce it.
    fn check_scopes(&self, session: CredentialSession, source: &str) -> Result<CredentialSession> {
        let missing = session.missing_scopes(&self.required_scopes);
        if !missing.is_empty() {
            warn!(missing = ?missing, "Granted scopes are insufficient");
            let event = CoreEvent::Auth(AuthEvent::AuthError {
                message: format!("Granted scopes are missing: {:?}", missing),
                recoverable: false,
            });
            let _ = self.event_bus.emit(event);
            return Err(AuthError::ScopeInsufficient { missing });
        }

        let event = CoreEvent::Auth(AuthEvent::SessionAcquired {
            expires_at: session.expires_at.timestamp(),
            source: source.to_string(),
        });
        let _ = self.event_bus.emit(event);

        Ok(session)
    }

    async fn stored_refresh_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .or_else(|| self.spare_refresh_token.clone())
    }

    async fn install_session(&self, session: CredentialSession) {
        let mut slot = self.session.write().await;
        *slot = Some(session);
    }

    /// Replace a rejected access token, refreshing at most once across
    /// concurrent callers.
    async fn refreshed_token(&self, stale_token: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited on the lock
        {
            let session = self.session.read().await;
            if let Some(s) = session.as_ref() {
                if s.access_token != stale_token {
                    debug!("Token already replaced by a concurrent refresh");
                    return Ok(s.access_token.clone());
                }
            }
        }

        let refresh_token = self
            .stored_refresh_token()
            .await
            .ok_or_else(|| AuthError::Expired("No refresh token available".to_string()))?;

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        let session = self
            .flow
            .refresh_access_token(&refresh_token)
            .await
            .map_err(|e| {
                let event = CoreEvent::Auth(AuthEvent::AuthError {
                    message: format!("Token refresh failed: {}", e),
                    recoverable: false,
                });
                let _ = self.event_bus.emit(event);
                AuthError::Expired(e.to_string())
            })?;

        self.install_session(session.clone()).await;

        let event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            expires_at: session.expires_at.timestamp(),
        });
        let _ = self.event_bus.emit(event);

        info!("Access token refreshed after rejection");
        Ok(session.access_token)
    }
}

/// The complete interactive flow: loopback listener, authorization URL,
/// callback wait, code exchange.
async fn run_interactive_flow(flow: OAuthFlow, event_bus: EventBus) -> Result<CredentialSession> {
    let server = CallbackServer::bind().await?;
    let redirect_uri = server.redirect_uri()?;
    let (auth_url, verifier) = flow.build_auth_url(&redirect_uri)?;

    let event = CoreEvent::Auth(AuthEvent::FlowStarted { auth_url });
    let _ = event_bus.emit(event);

    let state = verifier.state().to_string();
    let code = server.accept_authorization(state.clone()).await?;
    flow.exchange_code(&code, &state, &verifier, &redirect_uri)
        .await
}

#[async_trait]
impl TokenSource for CredentialProvider {
    async fn access_token(&self) -> BridgeResult<String> {
        let session = self.session.read().await;
        session
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(BridgeError::Unauthorized)
    }

    async fn refresh_after_unauthorized(&self, stale_token: &str) -> BridgeResult<String> {
        match self.refreshed_token(stale_token).await {
            Ok(token) => Ok(token),
            Err(AuthError::Expired(reason)) => {
                warn!("Credential session is expired: {}", reason);
                Err(BridgeError::Unauthorized)
            }
            Err(e) => Err(BridgeError::OperationFailed(e.to_string())),
        }
    }
}
