//! Payload validation: the trust boundary for data received from a peer.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};

use crate::error::ValidationError;
use crate::model::{Adjustment, DayEntry, LeaveBalance, Settings, SyncPayload};

/// Bounds on payload size.
pub mod limits {
    /// Max keys in `SyncPayload.entries`.
    pub const MAX_ENTRIES: usize = 10_000;
    /// Max items in `SyncPayload.adjustments`.
    pub const MAX_ADJUSTMENTS: usize = 5_000;
    /// Entry keys that name structural properties in script runtimes.
    pub const RESERVED_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];
}

/// True for a `YYYY-MM-DD` string naming a real calendar day.
pub fn is_valid_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
        && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// True for a zero-padded 24-hour `HH:MM` string.
pub fn is_valid_time(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit())
        && NaiveTime::parse_from_str(s, "%H:%M").is_ok()
}

/// Validate a payload received from a peer.
///
/// This performs:
/// - Size limits on entries and adjustments
/// - Entry key checks (reserved names, date format)
/// - Per-entry field checks
/// - Per-adjustment field checks and id uniqueness
/// - Settings and leave balance range checks
pub fn validate_payload(payload: &SyncPayload) -> Result<(), ValidationError> {
    // 1. Size limits
    if payload.entries.len() > limits::MAX_ENTRIES {
        return Err(ValidationError::TooManyEntries {
            count: payload.entries.len(),
            max: limits::MAX_ENTRIES,
        });
    }
    if payload.adjustments.len() > limits::MAX_ADJUSTMENTS {
        return Err(ValidationError::TooManyAdjustments {
            count: payload.adjustments.len(),
            max: limits::MAX_ADJUSTMENTS,
        });
    }

    // 2. Entries
    for (date, entry) in &payload.entries {
        validate_entry_key(date)?;
        validate_entry(date, entry)?;
    }

    // 3. Adjustments
    let mut seen = HashSet::with_capacity(payload.adjustments.len());
    for adjustment in &payload.adjustments {
        validate_adjustment(adjustment)?;
        if !seen.insert(adjustment.id.as_str()) {
            return Err(ValidationError::DuplicateAdjustment(adjustment.id.clone()));
        }
    }

    // 4. Settings
    validate_settings(&payload.settings)?;

    // 5. Leave balance
    if let Some(leave) = &payload.leave_balance {
        validate_leave_balance(leave)?;
    }

    Ok(())
}

/// Check an entry map key.
pub fn validate_entry_key(key: &str) -> Result<(), ValidationError> {
    if limits::RESERVED_KEYS.contains(&key) {
        return Err(ValidationError::ReservedKey(key.to_string()));
    }
    if !is_valid_date(key) {
        return Err(ValidationError::InvalidEntryDate(key.to_string()));
    }
    Ok(())
}

/// Check the fields of a single day entry.
pub fn validate_entry(date: &str, entry: &DayEntry) -> Result<(), ValidationError> {
    for (field, value) in [("start", &entry.start), ("end", &entry.end)] {
        if let Some(time) = value {
            if !is_valid_time(time) {
                return Err(ValidationError::InvalidTime {
                    date: date.to_string(),
                    field,
                    value: time.clone(),
                });
            }
        }
    }

    if entry.break_minutes < 0 {
        return Err(ValidationError::NegativeBreak {
            date: date.to_string(),
            minutes: entry.break_minutes,
        });
    }

    Ok(())
}

/// Check a single adjustment.
pub fn validate_adjustment(adjustment: &Adjustment) -> Result<(), ValidationError> {
    if adjustment.id.is_empty() {
        return Err(ValidationError::InvalidAdjustment {
            id: adjustment.id.clone(),
            reason: "empty id".into(),
        });
    }
    if !is_valid_date(&adjustment.date) {
        return Err(ValidationError::InvalidAdjustment {
            id: adjustment.id.clone(),
            reason: format!("malformed date {:?}", adjustment.date),
        });
    }
    Ok(())
}

/// Check settings ranges.
pub fn validate_settings(settings: &Settings) -> Result<(), ValidationError> {
    if let Some(day) = settings.working_days.iter().find(|d| **d > 6) {
        return Err(ValidationError::InvalidSettings(format!(
            "working day {day} outside 0..=6"
        )));
    }
    if !settings.expected_minutes_per_day.is_finite() || settings.expected_minutes_per_day < 0.0
    {
        return Err(ValidationError::InvalidSettings(format!(
            "expectedMinutesPerDay {} is not a non-negative number",
            settings.expected_minutes_per_day
        )));
    }
    if settings.week_starts_on > 1 {
        return Err(ValidationError::InvalidSettings(format!(
            "weekStartsOn {} must be 0 or 1",
            settings.week_starts_on
        )));
    }
    if !settings.non_working_day_rate.is_finite() || settings.non_working_day_rate <= 0.0 {
        return Err(ValidationError::InvalidSettings(format!(
            "nonWorkingDayRate {} is not a positive number",
            settings.non_working_day_rate
        )));
    }
    Ok(())
}

/// Check a leave balance.
pub fn validate_leave_balance(leave: &LeaveBalance) -> Result<(), ValidationError> {
    if !leave.total_days.is_finite() {
        return Err(ValidationError::InvalidLeaveBalance(
            "totalDays is not a number".into(),
        ));
    }
    for (field, value) in [
        ("periodStart", &leave.period_start),
        ("periodEnd", &leave.period_end),
    ] {
        if !is_valid_date(value) {
            return Err(ValidationError::InvalidLeaveBalance(format!(
                "{field} {value:?} is not a date"
            )));
        }
    }
    Ok(())
}
