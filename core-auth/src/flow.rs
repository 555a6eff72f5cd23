//! OAuth 2.0 Authorization Flow with PKCE Support
//!
//! This module implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for the
//! browser-based desktop authorization flow, including the loopback callback
//! server that receives the redirect.
//!
//! # Overview
//!
//! The flow pieces are:
//! - Building authorization URLs with a PKCE challenge
//! - A one-shot HTTP listener on an ephemeral loopback port for the redirect
//! - Exchanging authorization codes for tokens
//! - Refreshing access tokens
//! - State verification for CSRF protection
//!
//! # Security
//!
//! - Uses PKCE (Proof Key for Code Exchange) for additional security
//! - Generates cryptographically secure random state and code verifier
//! - Validates the state parameter to prevent CSRF attacks
//! - Never logs sensitive values (tokens, codes, verifiers)
//!
//! # Example
//!
//! ```no_run
//! use core_auth::flow::{CallbackServer, OAuthFlow};
//! use core_auth::ClientSecrets;
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! # let secrets = ClientSecrets::from_json("{}")?;
//! let flow = OAuthFlow::new(
//!     secrets,
//!     vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
//!     http_client,
//! );
//!
//! let server = CallbackServer::bind().await?;
//! let redirect_uri = server.redirect_uri()?;
//! let (auth_url, verifier) = flow.build_auth_url(&redirect_uri)?;
//! // Open auth_url in a browser, then:
//! let state = verifier.state().to_string();
//! let code = server.accept_authorization(state.clone()).await?;
//! let session = flow.exchange_code(&code, &state, &verifier, &redirect_uri).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::secrets::ClientSecrets;
use crate::types::CredentialSession;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpRequest};
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Contains the code verifier that must be held during the authorization
/// flow and presented when exchanging the authorization code, plus the
/// state parameter used for CSRF protection.
///
/// # Security
///
/// The verifier is never sent to the authorization server; only the
/// challenge derived from it appears in the authorization URL.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    /// The code verifier (base64-url-encoded random string)
    verifier: String,
    /// The state parameter for CSRF protection
    state: String,
}

impl PkceVerifier {
    /// Create a new PKCE verifier with cryptographically secure random values.
    ///
    /// Generates:
    /// - A 32-byte random code verifier (base64-url-encoded)
    /// - A 16-byte random state parameter (base64-url-encoded)
    ///
    /// Both values use URL-safe base64 encoding without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        // Code verifier must be 43-128 characters per RFC 7636
        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    /// Get the code verifier string.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Get the state parameter.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Compute the code challenge from the verifier.
    ///
    /// Uses the S256 method: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        let hash = hasher.finalize();
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth 2.0 flow for a single client registration.
///
/// Handles the authorization code flow with PKCE and token refresh against
/// the endpoints named in the client secrets.
#[derive(Clone)]
pub struct OAuthFlow {
    secrets: ClientSecrets,
    scopes: Vec<String>,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlow {
    /// Create a new flow.
    ///
    /// # Arguments
    ///
    /// * `secrets` - Client identity and endpoint URLs
    /// * `scopes` - Scopes to request during authorization
    /// * `http_client` - HTTP transport for token endpoint requests
    pub fn new(secrets: ClientSecrets, scopes: Vec<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            secrets,
            scopes,
            http_client,
        }
    }

    /// Scopes this flow requests.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Build the authorization URL with a PKCE challenge.
    ///
    /// Returns both the URL the user must visit and the PKCE verifier, which
    /// must be kept for the code exchange.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - The loopback redirect target, usually from
    ///   [`CallbackServer::redirect_uri`]
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization endpoint URL cannot be parsed.
    #[instrument(skip(self))]
    pub fn build_auth_url(&self, redirect_uri: &str) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = url::Url::parse(&self.secrets.auth_uri)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.secrets.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("access_type", "offline"); // Request refresh token
        }

        debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for a credential session.
    ///
    /// Called after the loopback callback delivered the authorization code
    /// and state.
    ///
    /// # Arguments
    ///
    /// * `code` - The authorization code from the callback
    /// * `state` - The state parameter from the callback
    /// * `verifier` - The PKCE verifier from [`build_auth_url`](Self::build_auth_url)
    /// * `redirect_uri` - The redirect URI the authorization request used
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The state doesn't match (CSRF protection)
    /// - The authorization code is rejected
    /// - Network errors occur
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<CredentialSession> {
        // Verify state to prevent CSRF attacks
        if state != verifier.state() {
            warn!("OAuth state mismatch during code exchange");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", &self.secrets.client_id);
        params.insert("client_secret", &self.secrets.client_secret);
        params.insert("code_verifier", verifier.verifier());

        debug!("Exchanging authorization code for tokens");

        let encoded_body = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::post(self.secrets.token_uri.clone()).form(encoded_body);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            warn!(
                status = status,
                error = %error_body,
                "Token exchange failed while exchanging authorization code"
            );

            return Err(AuthError::TokenEndpoint {
                status,
                message: error_body,
            });
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        info!(
            "Successfully exchanged code for tokens (expires in {}s)",
            token_response.expires_in
        );

        let scopes = scopes_from_response(token_response.scope.as_deref(), &self.scopes);
        Ok(CredentialSession::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
            scopes,
        ))
    }

    /// Refresh an access token using a refresh token.
    ///
    /// The token endpoint is retried on server errors with a short backoff;
    /// client errors (revoked or invalid refresh token) fail immediately.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenRefreshFailed` if the refresh token is
    /// rejected or retries are exhausted.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<CredentialSession> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.secrets.client_id);
        params.insert("client_secret", &self.secrets.client_secret);

        debug!("Refreshing access token");

        let encoded_body = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;
        let body = Bytes::from(encoded_body);

        let mut attempts = 0;
        const MAX_RETRIES: u32 = 3;

        loop {
            attempts += 1;

            let request = HttpRequest::post(self.secrets.token_uri.clone())
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body.clone());

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

            if response.is_success() {
                let token_response: TokenResponse = response.json().map_err(|e| {
                    AuthError::Other(format!("Failed to parse token response: {}", e))
                })?;

                info!(
                    "Successfully refreshed token (expires in {}s)",
                    token_response.expires_in
                );

                let scopes = scopes_from_response(token_response.scope.as_deref(), &self.scopes);
                return Ok(CredentialSession::new(
                    token_response.access_token,
                    // Refresh responses usually omit the refresh token; keep the old one
                    token_response
                        .refresh_token
                        .or_else(|| Some(refresh_token.to_string())),
                    token_response.expires_in,
                    scopes,
                ));
            }

            let status = response.status;

            if (400..500).contains(&status) {
                let error_body = response
                    .text()
                    .unwrap_or_else(|_| "Unable to read error response".to_string());

                warn!(
                    status = status,
                    error = %error_body,
                    "Token refresh failed without retry"
                );

                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token endpoint returned {}: {}",
                    status, error_body
                )));
            }

            if attempts >= MAX_RETRIES {
                let error_body = response
                    .text()
                    .unwrap_or_else(|_| "Unable to read error response".to_string());

                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {} - {}",
                    attempts, status, error_body
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                status = status,
                attempts = attempts,
                delay_ms = delay.as_millis(),
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[allow(dead_code)]
    token_type: Option<String>,
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600 // Default to 1 hour if not specified
}

/// Resolve granted scopes from the token response.
///
/// The endpoint reports granted scopes as a space-separated string; when the
/// field is absent, the requested scopes are assumed granted.
fn scopes_from_response(scope: Option<&str>, requested: &[String]) -> Vec<String> {
    match scope {
        Some(s) if !s.trim().is_empty() => s.split_whitespace().map(String::from).collect(),
        _ => requested.to_vec(),
    }
}

// ============================================================================
// Loopback callback server
// ============================================================================

/// Query parameters delivered to the loopback redirect.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    /// Parse the request target of a callback request, e.g.
    /// `/?code=abc&state=xyz`.
    fn from_target(target: &str) -> Self {
        let query = match target.split_once('?') {
            Some((_, query)) => query,
            None => return Self::default(),
        };

        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

const CALLBACK_OK_PAGE: &str = "<html><body><h1>Authorization complete</h1>\
<p>You may close this window and return to the terminal.</p></body></html>";

const CALLBACK_ERR_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
<p>Return to the terminal for details.</p></body></html>";

/// One-shot HTTP listener for the OAuth redirect.
///
/// Binds an ephemeral port on the loopback interface, waits for the
/// browser's redirect, answers it with a small HTML page, and hands the
/// authorization code back. Requests without OAuth parameters (such as
/// favicon fetches) are answered with 404 and the listener keeps waiting.
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    /// Bind a listener on an ephemeral loopback port.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Listener(format!("Failed to bind loopback port: {}", e)))?;
        Ok(Self { listener })
    }

    /// The redirect URI the authorization request must use.
    pub fn redirect_uri(&self) -> Result<String> {
        let addr = self
            .listener
            .local_addr()
            .map_err(|e| AuthError::Listener(format!("Failed to read local address: {}", e)))?;
        Ok(format!("http://127.0.0.1:{}", addr.port()))
    }

    /// Wait for the authorization redirect and return the code.
    ///
    /// # Arguments
    ///
    /// * `expected_state` - The state parameter issued with the
    ///   authorization URL; mismatching callbacks are rejected
    ///
    /// # Errors
    ///
    /// - `AuthError::Denied` if the provider reported an error (the user
    ///   declined consent)
    /// - `AuthError::StateMismatch` if the state parameter differs
    /// - `AuthError::CallbackParse` if the redirect carried no usable code
    pub async fn accept_authorization(self, expected_state: String) -> Result<String> {
        loop {
            let (mut stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| AuthError::Listener(format!("Accept failed: {}", e)))?;

            debug!(peer = %peer, "Callback connection received");

            let target = match read_request_target(&mut stream).await {
                Ok(target) => target,
                Err(e) => {
                    warn!("Discarding unreadable callback request: {}", e);
                    continue;
                }
            };

            let params = CallbackParams::from_target(&target);

            if let Some(error) = params.error {
                respond(&mut stream, "400 Bad Request", CALLBACK_ERR_PAGE).await;
                return Err(AuthError::Denied(error));
            }

            let Some(code) = params.code else {
                // Browsers also fetch /favicon.ico; keep waiting
                respond(&mut stream, "404 Not Found", "").await;
                continue;
            };

            match params.state {
                Some(state) if state == expected_state => {
                    respond(&mut stream, "200 OK", CALLBACK_OK_PAGE).await;
                    info!("Authorization code received on loopback callback");
                    return Ok(code);
                }
                state => {
                    respond(&mut stream, "400 Bad Request", CALLBACK_ERR_PAGE).await;
                    return Err(AuthError::StateMismatch {
                        expected: expected_state,
                        actual: state.unwrap_or_default(),
                    });
                }
            }
        }
    }
}

/// Read the request line of an incoming HTTP request and return its target.
async fn read_request_target(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    // Read until the end of the request head or a sane size cap
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| AuthError::Listener(format!("Read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > 8192 {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head
        .lines()
        .next()
        .ok_or_else(|| AuthError::CallbackParse("Empty request".to_string()))?;

    // Request line: METHOD SP target SP version
    let mut parts = request_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::CallbackParse("Missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| AuthError::CallbackParse("Missing request target".to_string()))?;

    Ok(target.to_string())
}

/// Write a minimal HTTP response. Failures are ignored; the browser side of
/// the callback is best-effort.
async fn respond(stream: &mut TcpStream, status_line: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to write callback response: {}", e);
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn test_secrets() -> ClientSecrets {
        ClientSecrets::from_json(
            r#"{"installed": {
                "client_id": "test-client",
                "client_secret": "test-secret",
                "auth_uri": "https://provider.test/auth",
                "token_uri": "https://provider.test/token"
            }}"#,
        )
        .unwrap()
    }

    fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    /// HTTP client that replays a scripted sequence of responses.
    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
        calls: AtomicU32,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<BridgeResult<HttpResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(BridgeError::OperationFailed(
                        "Scripted client ran out of responses".to_string(),
                    ))
                })
        }
    }

    fn flow_with(client: Arc<dyn HttpClient>) -> OAuthFlow {
        OAuthFlow::new(
            test_secrets(),
            vec!["scope.a".to_string(), "scope.b".to_string()],
            client,
        )
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert!(!verifier.verifier().is_empty());
        assert!(!verifier.state().is_empty());

        // Challenge should be deterministic for same verifier
        let challenge1 = verifier.challenge();
        let challenge2 = verifier.challenge();
        assert_eq!(challenge1, challenge2);

        // Different verifiers should produce different values
        let verifier2 = PkceVerifier::new();
        assert_ne!(verifier.verifier(), verifier2.verifier());
        assert_ne!(verifier.state(), verifier2.state());
        assert_ne!(verifier.challenge(), verifier2.challenge());
    }

    #[test]
    fn test_pkce_challenge_is_base64url() {
        let verifier = PkceVerifier {
            verifier: "test_verifier".to_string(),
            state: "test_state".to_string(),
        };

        let challenge = verifier.challenge();

        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        assert!(!challenge.contains('='));
        assert_eq!(challenge, verifier.challenge());
    }

    #[test]
    fn test_build_auth_url() {
        let flow = flow_with(Arc::new(ScriptedHttpClient::new(vec![])));
        let (url, verifier) = flow.build_auth_url("http://127.0.0.1:9999").unwrap();

        assert!(url.starts_with("https://provider.test/auth?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("redirect_uri=http"));
        assert!(url.contains("response_type=code"));
        // URL encoding can use either + or %20 for spaces
        assert!(url.contains("scope=scope.a+scope.b") || url.contains("scope=scope.a%20scope.b"));
        assert!(url.contains(&format!("state={}", verifier.state())));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_build_auth_url_invalid_endpoint() {
        let mut secrets = test_secrets();
        secrets.auth_uri = "not a valid url".to_string();
        let flow = OAuthFlow::new(
            secrets,
            vec![],
            Arc::new(ScriptedHttpClient::new(vec![])),
        );

        assert!(flow.build_auth_url("http://127.0.0.1:9999").is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_state_mismatch() {
        let client = Arc::new(ScriptedHttpClient::new(vec![]));
        let flow = flow_with(client.clone());
        let verifier = PkceVerifier::new();

        let result = flow
            .exchange_code("code", "wrong-state", &verifier, "http://127.0.0.1:9999")
            .await;

        assert!(matches!(result, Err(AuthError::StateMismatch { .. })));
        // State is checked before any network traffic
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(json_response(
            200,
            serde_json::json!({
                "access_token": "fresh-access",
                "refresh_token": "fresh-refresh",
                "expires_in": 3599,
                "scope": "scope.a scope.b",
                "token_type": "Bearer"
            }),
        ))]));
        let flow = flow_with(client.clone());
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        let session = flow
            .exchange_code("auth-code", &state, &verifier, "http://127.0.0.1:9999")
            .await
            .unwrap();

        assert_eq!(session.access_token, "fresh-access");
        assert_eq!(session.refresh_token.as_deref(), Some("fresh-refresh"));
        assert_eq!(
            session.scopes,
            vec!["scope.a".to_string(), "scope.b".to_string()]
        );
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exchange_code_endpoint_error() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(json_response(
            400,
            serde_json::json!({"error": "invalid_grant"}),
        ))]));
        let flow = flow_with(client);
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        let result = flow
            .exchange_code("bad-code", &state, &verifier, "http://127.0.0.1:9999")
            .await;

        assert!(matches!(
            result,
            Err(AuthError::TokenEndpoint { status: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_retries_server_errors() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(json_response(503, serde_json::json!({}))),
            Ok(json_response(
                200,
                serde_json::json!({
                    "access_token": "refreshed",
                    "expires_in": 3600
                }),
            )),
        ]));
        let flow = flow_with(client.clone());

        let session = flow.refresh_access_token("old-refresh").await.unwrap();

        assert_eq!(session.access_token, "refreshed");
        // Refresh token is carried over when the response omits it
        assert_eq!(session.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_client_error_no_retry() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(json_response(
            400,
            serde_json::json!({"error": "invalid_grant"}),
        ))]));
        let flow = flow_with(client.clone());

        let result = flow.refresh_access_token("revoked").await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_exhausts_retries() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(json_response(503, serde_json::json!({}))),
            Ok(json_response(503, serde_json::json!({}))),
            Ok(json_response(503, serde_json::json!({}))),
        ]));
        let flow = flow_with(client.clone());

        let result = flow.refresh_access_token("old-refresh").await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "ya29.a0...",
            "refresh_token": "1//0g...",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "scope.a scope.b"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "ya29.a0...");
        assert_eq!(response.refresh_token, Some("1//0g...".to_string()));
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope, Some("scope.a scope.b".to_string()));
    }

    #[test]
    fn test_token_response_deserialization_minimal() {
        let json = r#"{"access_token": "token"}"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "token");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.expires_in, 3600); // Default value
    }

    #[test]
    fn test_scopes_from_response() {
        let requested = vec!["scope.a".to_string(), "scope.b".to_string()];

        // Explicit grant list wins
        assert_eq!(
            scopes_from_response(Some("scope.a"), &requested),
            vec!["scope.a".to_string()]
        );
        // Absent scope field means everything requested was granted
        assert_eq!(scopes_from_response(None, &requested), requested);
        assert_eq!(scopes_from_response(Some("  "), &requested), requested);
    }

    #[test]
    fn test_callback_params_parsing() {
        let params = CallbackParams::from_target("/?code=abc&state=xyz");
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.error, None);

        let params = CallbackParams::from_target("/?error=access_denied");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.code, None);

        let params = CallbackParams::from_target("/favicon.ico");
        assert_eq!(params, CallbackParams::default());

        // Percent-encoded values are decoded
        let params = CallbackParams::from_target("/?code=a%2Fb&state=s");
        assert_eq!(params.code.as_deref(), Some("a/b"));
    }

    #[tokio::test]
    async fn test_callback_server_receives_code() {
        let server = CallbackServer::bind().await.unwrap();
        let redirect_uri = server.redirect_uri().unwrap();
        let addr = redirect_uri.strip_prefix("http://").unwrap().to_string();

        let accept = tokio::spawn(server.accept_authorization("expected-state".to_string()));

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /?code=the-code&state=expected-state HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        let code = accept.await.unwrap().unwrap();
        assert_eq!(code, "the-code");
    }

    #[tokio::test]
    async fn test_callback_server_skips_favicon_requests() {
        let server = CallbackServer::bind().await.unwrap();
        let redirect_uri = server.redirect_uri().unwrap();
        let addr = redirect_uri.strip_prefix("http://").unwrap().to_string();

        let accept = tokio::spawn(server.accept_authorization("s".to_string()));

        // A favicon probe must not terminate the wait
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404"));

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /?code=ok&state=s HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        assert_eq!(accept.await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_callback_server_reports_denial() {
        let server = CallbackServer::bind().await.unwrap();
        let redirect_uri = server.redirect_uri().unwrap();
        let addr = redirect_uri.strip_prefix("http://").unwrap().to_string();

        let accept = tokio::spawn(server.accept_authorization("s".to_string()));

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /?error=access_denied HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let result = accept.await.unwrap();
        assert!(matches!(result, Err(AuthError::Denied(e)) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_callback_server_rejects_state_mismatch() {
        let server = CallbackServer::bind().await.unwrap();
        let redirect_uri = server.redirect_uri().unwrap();
        let addr = redirect_uri.strip_prefix("http://").unwrap().to_string();

        let accept = tokio::spawn(server.accept_authorization("right".to_string()));

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /?code=c&state=wrong HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let result = accept.await.unwrap();
        assert!(matches!(result, Err(AuthError::StateMismatch { .. })));
    }
}
