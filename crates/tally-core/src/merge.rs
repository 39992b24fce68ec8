//! Deterministic merge of two payloads.
//!
//! All functions here are pure: they read two snapshots and build a fresh
//! [`SyncResult`]. Neither input is modified. Conflicts are reported, never
//! decided; picking a side is the caller's job (see [`crate::resolve`]).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Adjustment, DayEntry, LeaveBalance, MergedState, Settings, SyncPayload};

/// A date where both sides hold different non-empty entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub date: String,
    pub local: DayEntry,
    pub remote: DayEntry,
}

/// Both sides' settings, when they are not structurally equal.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsConflict {
    pub local: Settings,
    pub remote: Settings,
}

/// Output of [`merge_payloads`].
///
/// `merged_entries` holds every non-conflicting date. Conflicting dates are
/// absent from it until resolved. `merged_settings` holds the local settings
/// until a settings conflict is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub merged_entries: BTreeMap<String, DayEntry>,
    pub merged_adjustments: Vec<Adjustment>,
    pub merged_settings: Settings,
    pub merged_leave_balance: Option<LeaveBalance>,
    /// Sorted by date.
    pub entry_conflicts: Vec<ConflictEntry>,
    pub settings_conflict: Option<SettingsConflict>,
    summary: MergeSummary,
}

/// Counters describing where merged records came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Dates only the local side had.
    pub entries_from_local: usize,
    /// Dates only the remote side had.
    pub entries_from_remote: usize,
    /// Dates where both sides held the same entry.
    pub identical_entries: usize,
    /// Adjustments the remote side contributed.
    pub adjustments_from_remote: usize,
    /// Entry conflicts detected by the merge.
    pub entry_conflicts: usize,
    pub settings_conflict: bool,
}

impl SyncResult {
    /// True when no conflict is pending.
    pub fn is_resolved(&self) -> bool {
        self.entry_conflicts.is_empty() && self.settings_conflict.is_none()
    }

    /// Counters captured at merge time.
    pub fn summary(&self) -> MergeSummary {
        self.summary
    }

    /// The reconciled state, or `None` while any conflict is pending.
    pub fn into_merged_state(self) -> Option<MergedState> {
        if !self.is_resolved() {
            return None;
        }
        Some(MergedState {
            entries: self.merged_entries,
            adjustments: self.merged_adjustments,
            settings: self.merged_settings,
            leave_balance: self.merged_leave_balance,
        })
    }
}

fn non_empty<'a>(entries: &'a BTreeMap<String, DayEntry>, date: &str) -> Option<&'a DayEntry> {
    entries.get(date).filter(|entry| !entry.is_empty())
}

fn all_dates<'a>(local: &'a SyncPayload, remote: &'a SyncPayload) -> BTreeSet<&'a str> {
    local
        .entries
        .keys()
        .chain(remote.entries.keys())
        .map(String::as_str)
        .collect()
}

/// Find dates where both sides hold non-empty, unequal entries.
///
/// The result is sorted by date.
pub fn detect_entry_conflicts(local: &SyncPayload, remote: &SyncPayload) -> Vec<ConflictEntry> {
    all_dates(local, remote)
        .into_iter()
        .filter_map(|date| {
            match (non_empty(&local.entries, date), non_empty(&remote.entries, date)) {
                (Some(l), Some(r)) if l != r => Some(ConflictEntry {
                    date: date.to_string(),
                    local: l.clone(),
                    remote: r.clone(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Merge entries for every non-conflicting date.
///
/// A date that is empty on both sides is omitted. Conflicting dates are left
/// out so the caller can fill them in after resolution.
pub fn merge_entries(local: &SyncPayload, remote: &SyncPayload) -> BTreeMap<String, DayEntry> {
    let mut merged = BTreeMap::new();
    for date in all_dates(local, remote) {
        let picked = match (non_empty(&local.entries, date), non_empty(&remote.entries, date)) {
            (Some(l), Some(r)) if l == r => Some(l),
            (Some(_), Some(_)) => None,
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        };
        if let Some(entry) = picked {
            merged.insert(date.to_string(), entry.clone());
        }
    }
    merged
}

/// Union adjustments by id. The local copy wins on a shared id.
///
/// The result is stably sorted by date, so adjustments on the same day keep
/// local-then-remote order.
pub fn merge_adjustments(local: &[Adjustment], remote: &[Adjustment]) -> Vec<Adjustment> {
    let mut seen = BTreeSet::new();
    let mut merged = Vec::with_capacity(local.len() + remote.len());
    for adjustment in local.iter().chain(remote) {
        if seen.insert(adjustment.id.as_str()) {
            merged.push(adjustment.clone());
        }
    }
    merged.sort_by(|a, b| a.date.cmp(&b.date));
    merged
}

/// Compare settings structurally.
pub fn detect_settings_conflict(local: &Settings, remote: &Settings) -> Option<SettingsConflict> {
    if local == remote {
        return None;
    }
    Some(SettingsConflict {
        local: local.clone(),
        remote: remote.clone(),
    })
}

/// Take whichever side defines a leave balance, preferring local.
pub fn merge_leave_balance(
    local: Option<&LeaveBalance>,
    remote: Option<&LeaveBalance>,
) -> Option<LeaveBalance> {
    local.or(remote).cloned()
}

/// Run the full merge of two payloads.
pub fn merge_payloads(local: &SyncPayload, remote: &SyncPayload) -> SyncResult {
    let entry_conflicts = detect_entry_conflicts(local, remote);
    let merged_entries = merge_entries(local, remote);
    let merged_adjustments = merge_adjustments(&local.adjustments, &remote.adjustments);
    let settings_conflict = detect_settings_conflict(&local.settings, &remote.settings);
    let merged_leave_balance =
        merge_leave_balance(local.leave_balance.as_ref(), remote.leave_balance.as_ref());

    let mut summary = MergeSummary {
        entry_conflicts: entry_conflicts.len(),
        settings_conflict: settings_conflict.is_some(),
        ..MergeSummary::default()
    };
    for date in merged_entries.keys() {
        match (
            non_empty(&local.entries, date).is_some(),
            non_empty(&remote.entries, date).is_some(),
        ) {
            (true, true) => summary.identical_entries += 1,
            (true, false) => summary.entries_from_local += 1,
            (false, _) => summary.entries_from_remote += 1,
        }
    }
    let local_ids: BTreeSet<&str> = local.adjustments.iter().map(|a| a.id.as_str()).collect();
    summary.adjustments_from_remote = remote
        .adjustments
        .iter()
        .filter(|a| !local_ids.contains(a.id.as_str()))
        .count();

    SyncResult {
        merged_entries,
        merged_adjustments,
        merged_settings: local.settings.clone(),
        merged_leave_balance,
        entry_conflicts,
        settings_conflict,
        summary,
    }
}
