//! Applying the user's choices to a conflicted [`SyncResult`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::merge::SyncResult;

/// Which side's version to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
}

/// Apply per-date choices to the pending entry conflicts.
///
/// Each conflict with a matching choice is moved into `merged_entries` and
/// removed from `entry_conflicts`. Conflicts without a choice stay pending.
/// Choices for dates that are not in conflict are ignored.
///
/// Returns the number of conflicts still pending.
pub fn resolve_entry_conflicts(
    result: &mut SyncResult,
    choices: &BTreeMap<String, Resolution>,
) -> usize {
    let pending = std::mem::take(&mut result.entry_conflicts);
    for conflict in pending {
        match choices.get(&conflict.date) {
            Some(Resolution::Local) => {
                result.merged_entries.insert(conflict.date, conflict.local);
            }
            Some(Resolution::Remote) => {
                result.merged_entries.insert(conflict.date, conflict.remote);
            }
            None => result.entry_conflicts.push(conflict),
        }
    }
    result.entry_conflicts.len()
}

/// Settle a pending settings conflict. No-op when there is none.
pub fn resolve_settings_conflict(result: &mut SyncResult, choice: Resolution) {
    if let Some(conflict) = result.settings_conflict.take() {
        result.merged_settings = match choice {
            Resolution::Local => conflict.local,
            Resolution::Remote => conflict.remote,
        };
    }
}
