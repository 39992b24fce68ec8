//! Error types for Tally Core.

use thiserror::Error;

/// Reasons a peer-supplied payload is refused.
///
/// Every variant carries enough context to tell the user which record was
/// rejected. A payload that produces any of these never reaches the merge
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("too many entries: {count} exceeds the limit of {max}")]
    TooManyEntries { count: usize, max: usize },

    #[error("too many adjustments: {count} exceeds the limit of {max}")]
    TooManyAdjustments { count: usize, max: usize },

    #[error("reserved entry key {0:?}")]
    ReservedKey(String),

    #[error("malformed entry date {0:?}")]
    InvalidEntryDate(String),

    #[error("entry {date}: {field} is not a valid HH:MM time ({value:?})")]
    InvalidTime {
        date: String,
        field: &'static str,
        value: String,
    },

    #[error("entry {date}: negative break minutes ({minutes})")]
    NegativeBreak { date: String, minutes: i64 },

    #[error("adjustment {id:?}: {reason}")]
    InvalidAdjustment { id: String, reason: String },

    #[error("duplicate adjustment id {0:?}")]
    DuplicateAdjustment(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid leave balance: {0}")]
    InvalidLeaveBalance(String),

    #[error("structural error: {0}")]
    StructuralError(String),
}
