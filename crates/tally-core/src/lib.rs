//! # Tally Core
//!
//! Pure primitives for Tally: day entries, balance adjustments, settings,
//! payload validation and the merge engine.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! a deterministic function of its inputs.
//!
//! ## Key Types
//!
//! - [`SyncPayload`] - One device's full exportable state snapshot
//! - [`DayEntry`] - The record kept for a single calendar day
//! - [`Adjustment`] - An immutable manual balance correction
//! - [`Settings`] - Scheduling rules shared by both devices
//! - [`SyncResult`] - The output of [`merge_payloads`], possibly with conflicts
//!
//! ## Trust Boundary
//!
//! Payloads that arrive from a peer must pass [`validate_payload`] before they
//! reach the merge engine. The merge engine itself cannot fail.

pub mod error;
pub mod merge;
pub mod model;
pub mod resolve;
pub mod validation;

pub use error::ValidationError;
pub use merge::{
    detect_entry_conflicts, detect_settings_conflict, merge_adjustments, merge_entries,
    merge_leave_balance, merge_payloads, ConflictEntry, MergeSummary, SettingsConflict,
    SyncResult,
};
pub use model::{
    Adjustment, DayEntry, DayType, LeaveBalance, MergedState, NonWorkingDayDisplay, Settings,
    SyncPayload,
};
pub use resolve::{resolve_entry_conflicts, resolve_settings_conflict, Resolution};
pub use validation::{
    is_valid_date, is_valid_time, limits, validate_adjustment, validate_entry, validate_entry_key,
    validate_leave_balance, validate_payload, validate_settings,
};
