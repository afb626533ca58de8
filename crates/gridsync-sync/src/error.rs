//! Error types for relay and client synchronization.

use thiserror::Error;

/// Errors that can occur while exchanging messages.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, SyncError>;
