use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization flow timed out after {0:?}")]
    FlowTimeout(Duration),

    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Granted scopes do not cover required scopes; missing: {missing:?}")]
    ScopeInsufficient { missing: Vec<String> },

    #[error("Credential session expired and could not be refreshed: {0}")]
    Expired(String),

    #[error("OAuth state mismatch: expected '{expected}', got '{actual}'")]
    StateMismatch { expected: String, actual: String },

    #[error("Invalid client secrets: {0}")]
    InvalidSecrets(String),

    #[error("Invalid token cache: {0}")]
    InvalidCache(String),

    #[error("Callback parse error: {0}")]
    CallbackParse(String),

    #[error("Token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Callback listener error: {0}")]
    Listener(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
