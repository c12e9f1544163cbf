//! Error types of the derivative pipeline

use cumulus_core::AppError;
use cumulus_storage::StorageError;
use thiserror::Error;

/// Failure to serve a thumbnail.
#[derive(Debug, Error)]
pub enum ThumbError {
    /// The file is unknown or has never had a thumbnail generated.
    #[error("Object does not exist")]
    ObjectNotExist,

    #[error("Storage handler error: {0}")]
    Handler(#[source] StorageError),

    /// No handler could be built for the file's storage policy.
    #[error("Storage policy error: {0}")]
    Policy(#[source] StorageError),
}

impl From<ThumbError> for AppError {
    fn from(err: ThumbError) -> Self {
        AppError::NotFound(err.to_string())
    }
}

/// Failure of one generation job.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Storage handler error: {0}")]
    Handler(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Failed to persist picture info: {0}")]
    Persistence(String),

    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: u64, written: u64 },

    #[error("Blocking task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for GenerationError {
    fn from(err: tokio::task::JoinError) -> Self {
        GenerationError::Join(err.to_string())
    }
}
