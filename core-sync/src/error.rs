use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Could not extract a document identifier from '{reference}'")]
    InvalidReference { reference: String },

    #[error("Invalid granularity: {0}")]
    InvalidGranularity(String),

    #[error("Authorization expired and could not be refreshed")]
    AuthExpired,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
