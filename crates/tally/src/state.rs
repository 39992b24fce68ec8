//! In-memory application state for one device.
//!
//! [`LocalState`] holds what a device knows about its own time records and
//! plugs into a sync session as its [`SyncApplication`]: snapshots go out as
//! [`SyncPayload`]s and reconciled [`MergedState`]s replace the local records.

use std::collections::BTreeMap;

use rand::Rng;

use tally_core::{
    limits, validate_adjustment, validate_entry, validate_entry_key, validate_leave_balance,
    validate_settings, Adjustment, DayEntry, LeaveBalance, MergedState, Settings, SyncPayload,
    ValidationError,
};
use tally_sync::SyncApplication;

use crate::error::{Result, TallyError};

/// One device's time records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    entries: BTreeMap<String, DayEntry>,
    adjustments: Vec<Adjustment>,
    settings: Settings,
    leave_balance: Option<LeaveBalance>,
    merges: usize,
}

impl LocalState {
    /// Create an empty state with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, DayEntry> {
        &self.entries
    }

    pub fn entry(&self, date: &str) -> Option<&DayEntry> {
        self.entries.get(date)
    }

    pub fn adjustments(&self) -> &[Adjustment] {
        &self.adjustments
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn leave_balance(&self) -> Option<&LeaveBalance> {
        self.leave_balance.as_ref()
    }

    /// How many merged states have been applied.
    pub fn merge_count(&self) -> usize {
        self.merges
    }

    /// Record a day. An empty entry clears the date instead.
    ///
    /// A new date is refused once [`limits::MAX_ENTRIES`] dates are recorded,
    /// so every snapshot stays acceptable to a peer.
    pub fn set_entry(&mut self, date: &str, entry: DayEntry) -> Result<()> {
        validate_entry_key(date)?;
        if entry.is_empty() {
            self.entries.remove(date);
            return Ok(());
        }
        validate_entry(date, &entry)?;
        if !self.entries.contains_key(date) && self.entries.len() >= limits::MAX_ENTRIES {
            return Err(ValidationError::TooManyEntries {
                count: self.entries.len() + 1,
                max: limits::MAX_ENTRIES,
            }
            .into());
        }
        self.entries.insert(date.to_string(), entry);
        Ok(())
    }

    /// Add a balance correction and return its generated id.
    ///
    /// Fails once [`limits::MAX_ADJUSTMENTS`] corrections are recorded.
    pub fn add_adjustment(&mut self, date: &str, minutes: i64, note: &str) -> Result<String> {
        if self.adjustments.len() >= limits::MAX_ADJUSTMENTS {
            return Err(ValidationError::TooManyAdjustments {
                count: self.adjustments.len() + 1,
                max: limits::MAX_ADJUSTMENTS,
            }
            .into());
        }
        let adjustment = Adjustment {
            id: new_adjustment_id(),
            date: date.to_string(),
            minutes,
            note: note.to_string(),
        };
        validate_adjustment(&adjustment)?;
        let id = adjustment.id.clone();
        self.adjustments.push(adjustment);
        Ok(id)
    }

    /// Remove a balance correction by id.
    pub fn remove_adjustment(&mut self, id: &str) -> Result<Adjustment> {
        let index = self
            .adjustments
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| TallyError::AdjustmentNotFound(id.to_string()))?;
        Ok(self.adjustments.remove(index))
    }

    pub fn set_settings(&mut self, settings: Settings) -> Result<()> {
        validate_settings(&settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn set_leave_balance(&mut self, leave: Option<LeaveBalance>) -> Result<()> {
        if let Some(leave) = &leave {
            validate_leave_balance(leave)?;
        }
        self.leave_balance = leave;
        Ok(())
    }

    /// Snapshot taken at an explicit time.
    pub fn snapshot_at(&self, timestamp: i64) -> SyncPayload {
        SyncPayload {
            entries: self.entries.clone(),
            adjustments: self.adjustments.clone(),
            settings: self.settings.clone(),
            leave_balance: self.leave_balance.clone(),
            timestamp,
        }
    }
}

impl SyncApplication for LocalState {
    fn current_payload(&self) -> SyncPayload {
        self.snapshot_at(now_millis())
    }

    fn on_merged(&mut self, state: MergedState) {
        tracing::info!(
            entries = state.entries.len(),
            adjustments = state.adjustments.len(),
            "replacing local state with merged state"
        );
        self.entries = state.entries;
        self.adjustments = state.adjustments;
        self.settings = state.settings;
        self.leave_balance = state.leave_balance;
        self.merges += 1;
    }
}

fn new_adjustment_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
