use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Permission denied for resource: {0}")]
    PermissionDenied(String),

    #[error("Authorization was rejected by the remote service")]
    Unauthorized,

    #[error("HTTP request failed with status {status} after {attempts} attempt(s)")]
    Http { status: u16, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
