//! Error types for Tally.

use tally_core::ValidationError;
use tally_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Tally operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Adjustment not found.
    #[error("adjustment not found: {0}")]
    AdjustmentNotFound(String),
}

/// Result type for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;
