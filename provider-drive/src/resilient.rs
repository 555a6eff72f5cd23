//! Resilient request layer for the Drive API
//!
//! Wraps the transport seam with bearer-token injection, rate-limit retry,
//! and a single refresh cycle for rejected tokens. Retry scheduling lives
//! here and nowhere else; the transport executes exactly one round trip per
//! call.

use bridge_traits::auth::TokenSource;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{DriveError, Result};

/// Default per-request timeout when the caller does not set one
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resilient Drive API client
///
/// Every request carries `Authorization: Bearer <token>` from the
/// [`TokenSource`]. Responses with status 429 or 503 are retried on the
/// [`RetryPolicy`] schedule, honoring a delta-seconds `Retry-After` header
/// when the server sends one. A 401 triggers exactly one token refresh and
/// one retried request; a second 401 surfaces as
/// [`BridgeError::Unauthorized`].
pub struct ApiClient {
    /// HTTP transport implementation
    transport: Arc<dyn HttpClient>,

    /// Bearer token source, shared with the rest of the run
    tokens: Arc<dyn TokenSource>,

    /// Retry schedule for 429/503 and transport failures
    retry: RetryPolicy,
}

impl ApiClient {
    /// Create a client with the default retry schedule.
    pub fn new(transport: Arc<dyn HttpClient>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            transport,
            tokens,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry schedule.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Convenience GET against an API URL.
    pub async fn get(&self, url: impl Into<String>) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    /// Execute a request with authentication and retry handling.
    ///
    /// Returns `Ok` only for 2xx responses; any other final status is
    /// wrapped as [`DriveError::Api`] carrying the total attempt count.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.access_token().await?;
        let (mut response, mut attempts) = self.send_with_retry(&request, &token).await?;

        if response.status == 401 {
            debug!("Access token rejected, requesting refresh");
            let fresh = self.tokens.refresh_after_unauthorized(&token).await?;

            let (retried, more) = self.send_with_retry(&request, &fresh).await?;
            if retried.status == 401 {
                warn!("Request still unauthorized after token refresh");
                return Err(BridgeError::Unauthorized.into());
            }
            response = retried;
            attempts += more;
        }

        if response.is_success() {
            Ok(response)
        } else {
            warn!(
                "API request failed: status={} body={}",
                response.status,
                String::from_utf8_lossy(&response.body)
            );
            Err(DriveError::Api {
                status: response.status,
                attempts,
            })
        }
    }

    /// Issue one logical request, retrying rate limits and transport
    /// failures on the policy schedule.
    ///
    /// Returns the final response together with the number of attempts made.
    /// Rate-limit exhaustion and transport exhaustion return `Err`; every
    /// other status is handed back for the caller to classify.
    async fn send_with_retry(
        &self,
        request: &HttpRequest,
        token: &str,
    ) -> Result<(HttpResponse, u32)> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let prepared = self.prepare(request, token);

            match self.transport.execute(prepared).await {
                Ok(response) if response.status == 429 || response.status == 503 => {
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            "API request failed after {} attempts: status={}",
                            attempt, response.status
                        );
                        return Err(DriveError::Api {
                            status: response.status,
                            attempts: attempt,
                        });
                    }

                    let delay = response
                        .retry_after_secs()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                    let delay = self.jittered(delay);
                    warn!(
                        "API request throttled (attempt {}/{}): status={}, retrying in {:?}",
                        attempt, self.retry.max_attempts, response.status, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok((response, attempt)),
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        warn!("API request failed after {} attempts: {}", attempt, e);
                        return Err(DriveError::Api {
                            status: 0,
                            attempts: attempt,
                        });
                    }

                    let delay = self.jittered(self.retry.delay_for_attempt(attempt));
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Attach the bearer token and the default timeout to one attempt.
    fn prepare(&self, request: &HttpRequest, token: &str) -> HttpRequest {
        let mut prepared = request.clone().bearer_token(token);
        if prepared.timeout.is_none() {
            prepared.timeout = Some(REQUEST_TIMEOUT);
        }
        prepared
    }

    /// Add up to a quarter of the delay as random jitter when enabled.
    fn jittered(&self, delay: Duration) -> Duration {
        if !self.retry.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay / 4).max(Duration::from_millis(1));
        delay + rand::thread_rng().gen_range(Duration::ZERO..=spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bytes::Bytes;
    use mockall::{mock, Sequence};
    use std::collections::HashMap;

    mock! {
        Transport {}

        #[async_trait::async_trait]
        impl HttpClient for Transport {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        Tokens {}

        #[async_trait::async_trait]
        impl TokenSource for Tokens {
            async fn access_token(&self) -> BridgeResult<String>;
            async fn refresh_after_unauthorized(&self, stale_token: &str) -> BridgeResult<String>;
        }
    }

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    fn response_with_retry_after(status: u16, secs: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), secs.to_string());
        HttpResponse {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    fn static_tokens(token: &str) -> MockTokens {
        let mut tokens = MockTokens::new();
        let token = token.to_string();
        tokens
            .expect_access_token()
            .returning(move || Ok(token.clone()));
        tokens
    }

    fn client(transport: MockTransport, tokens: MockTokens) -> ApiClient {
        ApiClient::new(Arc::new(transport), Arc::new(tokens))
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from("payload"),
            })
        });

        let client = client(transport, static_tokens("token-1"));
        let response = client.get("https://api.example.com/data").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"payload");
    }

    #[tokio::test]
    async fn test_bearer_header_and_default_timeout_attached() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|req| {
                req.headers.get("Authorization").map(String::as_str) == Some("Bearer token-1")
                    && req.timeout == Some(Duration::from_secs(30))
            })
            .returning(|_| Ok(response(200)));

        let client = client(transport, static_tokens("token-1"));
        client.get("https://api.example.com/data").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_rate_limit_exhausts_attempts() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(4)
            .returning(|_| Ok(response(429)));

        let client = client(transport, static_tokens("token-1"));
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(DriveError::Api {
                status: 429,
                attempts: 4
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_overrides_backoff() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response_with_retry_after(429, "7")));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200)));

        let client = client(transport, static_tokens("token-1"));
        let start = tokio::time::Instant::now();
        client.get("https://api.example.com/data").await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        for _ in 0..2 {
            transport
                .expect_execute()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(response(503)));
        }
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200)));

        let client = client(transport, static_tokens("token-1"));
        let start = tokio::time::Instant::now();
        client.get("https://api.example.com/data").await.unwrap();

        // 1s after the first attempt, 2s after the second.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_within_spread() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(429)));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200)));

        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        let client = ApiClient::new(
            Arc::new(transport),
            Arc::new(static_tokens("token-1")),
        )
        .with_retry_policy(policy);

        let start = tokio::time::Instant::now();
        client.get("https://api.example.com/data").await.unwrap();

        // Base delay 1s plus at most a quarter of it.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(1300), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_non_retryable_status_returns_immediately() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(400)));

        let client = client(transport, static_tokens("token-1"));
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(DriveError::Api {
                status: 400,
                attempts: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_retries() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.headers.get("Authorization").map(String::as_str) == Some("Bearer stale")
            })
            .returning(|_| Ok(response(401)));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.headers.get("Authorization").map(String::as_str) == Some("Bearer fresh")
            })
            .returning(|_| Ok(response(200)));

        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .times(1)
            .returning(|| Ok("stale".to_string()));
        tokens
            .expect_refresh_after_unauthorized()
            .times(1)
            .withf(|stale| stale == "stale")
            .returning(|_| Ok("fresh".to_string()));

        let client = client(transport, tokens);
        let response = client.get("https://api.example.com/data").await.unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_second_unauthorized_surfaces_as_auth_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(2)
            .returning(|_| Ok(response(401)));

        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .times(1)
            .returning(|| Ok("stale".to_string()));
        tokens
            .expect_refresh_after_unauthorized()
            .times(1)
            .returning(|_| Ok("fresh".to_string()));

        let client = client(transport, tokens);
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(DriveError::Bridge(BridgeError::Unauthorized))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejection_propagates() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401)));

        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .times(1)
            .returning(|| Ok("stale".to_string()));
        tokens
            .expect_refresh_after_unauthorized()
            .times(1)
            .returning(|_| Err(BridgeError::Unauthorized));

        let client = client(transport, tokens);
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(DriveError::Bridge(BridgeError::Unauthorized))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retry_then_succeed() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200)));

        let client = client(transport, static_tokens("token-1"));
        let response = client.get("https://api.example.com/data").await.unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_exhaustion_reports_status_zero() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(4)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let client = client(transport, static_tokens("token-1"));
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(DriveError::Api {
                status: 0,
                attempts: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_caller_timeout_preserved() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|req| req.timeout == Some(Duration::from_secs(60)))
            .returning(|_| Ok(response(200)));

        let client = client(transport, static_tokens("token-1"));
        let request = HttpRequest::get("https://api.example.com/export")
            .timeout(Duration::from_secs(60));
        client.request(request).await.unwrap();
    }
}
