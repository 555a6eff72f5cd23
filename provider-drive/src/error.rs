//! Error types for the Drive revision provider

use thiserror::Error;

use bridge_traits::error::BridgeError;

/// Drive provider errors
#[derive(Error, Debug)]
pub enum DriveError {
    /// Document does not exist (HTTP 404)
    #[error("Document not found: {document_id}")]
    NotFound { document_id: String },

    /// Caller may not read the document (HTTP 403)
    #[error("Permission denied for document: {document_id}")]
    PermissionDenied { document_id: String },

    /// API kept failing past the retry budget, or answered with a
    /// non-retryable error status. Status 0 marks transport failures.
    #[error("Drive API error (status {status}) after {attempts} attempt(s)")]
    Api { status: u16, attempts: u32 },

    /// Failed to parse an API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Bridge error
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for Drive operations
pub type Result<T> = std::result::Result<T, DriveError>;

impl From<DriveError> for BridgeError {
    fn from(error: DriveError) -> Self {
        match error {
            DriveError::NotFound { document_id } => BridgeError::NotFound(document_id),
            DriveError::PermissionDenied { document_id } => {
                BridgeError::PermissionDenied(document_id)
            }
            DriveError::Api { status, attempts } => BridgeError::Http { status, attempts },
            DriveError::Parse(msg) => BridgeError::OperationFailed(format!("Parse error: {}", msg)),
            DriveError::Bridge(e) => e,
        }
    }
}
