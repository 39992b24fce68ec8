//! Record types exchanged between devices.
//!
//! Field names on the wire are camelCase and must stay stable across
//! versions. Unknown fields are ignored on decode so that newer peers can add
//! fields without breaking older ones.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Classification of a day, used by balance calculations outside the sync engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayType {
    #[default]
    Normal,
    Sick,
    SickHalf,
    Holiday,
    HolidayHalf,
    Flexi,
    FlexiHalf,
}

/// The record kept for one calendar day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    /// Start of work, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// End of work, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default)]
    pub break_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_type: Option<DayType>,
}

impl DayEntry {
    /// Create an entry with start and end times and no break.
    pub fn worked(start: &str, end: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..Self::default()
        }
    }

    /// Create an entry that only carries a day type.
    pub fn of_type(day_type: DayType) -> Self {
        Self {
            day_type: Some(day_type),
            ..Self::default()
        }
    }

    /// Set the break length.
    pub fn with_break(mut self, minutes: i64) -> Self {
        self.break_minutes = minutes;
        self
    }

    /// Set the day type.
    pub fn with_type(mut self, day_type: DayType) -> Self {
        self.day_type = Some(day_type);
        self
    }

    /// The day type, with an absent tag read as [`DayType::Normal`].
    pub fn effective_day_type(&self) -> DayType {
        self.day_type.unwrap_or_default()
    }

    /// True when every field is absent, zero or default.
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.break_minutes == 0
            && self.effective_day_type() == DayType::Normal
    }
}

impl PartialEq for DayEntry {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.break_minutes == other.break_minutes
            && self.effective_day_type() == other.effective_day_type()
    }
}

impl Eq for DayEntry {}

/// A manual balance correction. Immutable once created; identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    /// Signed minutes added to the balance.
    pub minutes: i64,
    pub note: String,
}

/// How days outside `working_days` are shown in the day grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonWorkingDayDisplay {
    #[default]
    Show,
    Disable,
    Hide,
}

/// Scheduling rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Weekday indices, 0 = Sunday.
    pub working_days: Vec<u8>,
    pub expected_minutes_per_day: f64,
    /// 0 = Sunday, 1 = Monday.
    pub week_starts_on: u8,
    pub non_working_day_display: NonWorkingDayDisplay,
    /// Multiplier applied to time worked on non-working days.
    pub non_working_day_rate: f64,
}

impl Settings {
    /// Working days as a set, ignoring order and repetition.
    pub fn working_day_set(&self) -> BTreeSet<u8> {
        self.working_days.iter().copied().collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_days: vec![1, 2, 3, 4, 5],
            expected_minutes_per_day: 480.0,
            week_starts_on: 1,
            non_working_day_display: NonWorkingDayDisplay::Show,
            non_working_day_rate: 1.0,
        }
    }
}

impl PartialEq for Settings {
    fn eq(&self, other: &Self) -> bool {
        self.working_day_set() == other.working_day_set()
            && self.expected_minutes_per_day == other.expected_minutes_per_day
            && self.week_starts_on == other.week_starts_on
            && self.non_working_day_display == other.non_working_day_display
            && self.non_working_day_rate == other.non_working_day_rate
    }
}

/// Leave allowance for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBalance {
    pub total_days: f64,
    pub period_start: String,
    pub period_end: String,
}

/// A snapshot of one device's state offered for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Keyed by ISO date.
    pub entries: BTreeMap<String, DayEntry>,
    pub adjustments: Vec<Adjustment>,
    pub settings: Settings,
    #[serde(default)]
    pub leave_balance: Option<LeaveBalance>,
    /// Epoch milliseconds at snapshot time.
    pub timestamp: i64,
}

impl SyncPayload {
    /// An empty payload with default settings.
    pub fn empty(timestamp: i64) -> Self {
        Self {
            entries: BTreeMap::new(),
            adjustments: Vec::new(),
            settings: Settings::default(),
            leave_balance: None,
            timestamp,
        }
    }
}

/// Fully reconciled state, ready for persistence.
///
/// Only produced from a [`crate::SyncResult`] with no pending conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedState {
    pub entries: BTreeMap<String, DayEntry>,
    pub adjustments: Vec<Adjustment>,
    pub settings: Settings,
    pub leave_balance: Option<LeaveBalance>,
}
