//! VideoVault Error Definitions
//!
//! Defines error types used throughout the crate.

use thiserror::Error;

use super::AssetId;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Validation Errors (rejected before any state is created)
    // =========================================================================
    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size_bytes} bytes exceeds ceiling of {max_bytes} bytes")]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    // =========================================================================
    // Catalog Errors
    // =========================================================================
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    #[error("Duplicate asset id: {0}")]
    DuplicateId(AssetId),

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// True for errors a caller can recover from by retrying with a
    /// different file; these never leave state behind.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::UnsupportedType(_) | CoreError::TooLarge { .. }
        )
    }
}
