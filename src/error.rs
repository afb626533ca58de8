//! Error types for the Gridsync binaries

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the Gridsync application
#[derive(Error, Debug)]
pub enum GridsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write identity: {0}")]
    Identity(#[from] toml::ser::Error),

    #[error("{0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, GridsyncError>;
