//! Error types for the sync module.

use thiserror::Error;

use crate::session::SessionStatus;

/// Errors that can occur during a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Identity creation or connection failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The peer sent a payload that failed validation.
    #[error("invalid payload: {0}")]
    Validation(#[from] tally_core::ValidationError),

    /// The peer sent something that is not a sync message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Timeout waiting for the peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The peer closed the channel mid-session.
    #[error("connection closed by peer")]
    PeerClosed,

    /// An action was called in a state that does not allow it.
    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },

    /// Fewer choices than conflicts were supplied.
    #[error("{remaining} entry conflicts still unresolved")]
    UnresolvedConflicts { remaining: usize },
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Malformed(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
