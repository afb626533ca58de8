//! Error types for Gridsync core.

use thiserror::Error;

/// Errors that can occur while managing a workbook
#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown page: {0}")]
    UnknownPage(String),

    #[error("Invalid sort direction: {0}")]
    InvalidSortDirection(String),

    #[error("No file path set")]
    NoFilePath,
}

pub type Result<T> = std::result::Result<T, WorkbookError>;
