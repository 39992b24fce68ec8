//! Hostile payload vectors.
//!
//! Each vector is a raw frame a malicious or buggy peer could send, paired
//! with the rejection [`tally_sync::decode`] must produce. Any implementation
//! of the wire protocol should reject the same frames.

use serde_json::{json, Value};

use tally_core::{limits, ValidationError};
use tally_sync::SyncError;

/// The class of rejection a vector must trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    Structural,
    TooManyEntries,
    TooManyAdjustments,
    ReservedKey,
    InvalidEntryDate,
    InvalidTime,
    NegativeBreak,
    InvalidAdjustment,
    DuplicateAdjustment,
    InvalidSettings,
    InvalidLeaveBalance,
}

impl Rejection {
    /// True if `error` belongs to this class.
    pub fn matches(&self, error: &SyncError) -> bool {
        use ValidationError as V;
        match (self, error) {
            (Rejection::Malformed, SyncError::Malformed(_)) => true,
            (Rejection::Structural, SyncError::Validation(V::StructuralError(_))) => true,
            (Rejection::TooManyEntries, SyncError::Validation(V::TooManyEntries { .. })) => true,
            (Rejection::TooManyAdjustments, SyncError::Validation(V::TooManyAdjustments { .. })) => {
                true
            }
            (Rejection::ReservedKey, SyncError::Validation(V::ReservedKey(_))) => true,
            (Rejection::InvalidEntryDate, SyncError::Validation(V::InvalidEntryDate(_))) => true,
            (Rejection::InvalidTime, SyncError::Validation(V::InvalidTime { .. })) => true,
            (Rejection::NegativeBreak, SyncError::Validation(V::NegativeBreak { .. })) => true,
            (Rejection::InvalidAdjustment, SyncError::Validation(V::InvalidAdjustment { .. })) => {
                true
            }
            (Rejection::DuplicateAdjustment, SyncError::Validation(V::DuplicateAdjustment(_))) => {
                true
            }
            (Rejection::InvalidSettings, SyncError::Validation(V::InvalidSettings(_))) => true,
            (Rejection::InvalidLeaveBalance, SyncError::Validation(V::InvalidLeaveBalance(_))) => {
                true
            }
            _ => false,
        }
    }
}

/// A hostile frame and its expected rejection.
#[derive(Debug, Clone)]
pub struct HostileVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The raw frame.
    pub frame: String,
    pub expected: Rejection,
}

/// A payload that passes every check.
pub fn valid_payload() -> Value {
    json!({
        "entries": {
            "2024-01-10": { "start": "09:00", "end": "17:00", "breakMinutes": 30 },
            "2024-01-11": { "dayType": "holiday" }
        },
        "adjustments": [
            { "id": "a1", "date": "2024-01-02", "minutes": -15, "note": "left early" }
        ],
        "settings": {
            "workingDays": [1, 2, 3, 4, 5],
            "expectedMinutesPerDay": 480,
            "weekStartsOn": 1,
            "nonWorkingDayDisplay": "show",
            "nonWorkingDayRate": 1
        },
        "leaveBalance": { "totalDays": 25, "periodStart": "2024-01-01", "periodEnd": "2024-12-31" },
        "timestamp": 1_704_873_600_000i64
    })
}

/// Wrap a payload in a `SYNC_REQUEST` frame.
pub fn request_frame(payload: Value) -> String {
    json!({ "type": "SYNC_REQUEST", "payload": payload }).to_string()
}

fn mutated(name: &'static str, expected: Rejection, mutate: impl FnOnce(&mut Value)) -> HostileVector {
    let mut payload = valid_payload();
    mutate(&mut payload);
    HostileVector {
        name,
        frame: request_frame(payload),
        expected,
    }
}

/// Get all hostile vectors.
pub fn all_vectors() -> Vec<HostileVector> {
    vec![
        HostileVector {
            name: "not json",
            frame: "{\"type\": \"SYNC_REQUEST\"".into(),
            expected: Rejection::Malformed,
        },
        HostileVector {
            name: "unknown message type",
            frame: json!({ "type": "SYNC_DELETE_ALL", "payload": valid_payload() }).to_string(),
            expected: Rejection::Malformed,
        },
        HostileVector {
            name: "request without payload",
            frame: json!({ "type": "SYNC_REQUEST" }).to_string(),
            expected: Rejection::Malformed,
        },
        mutated("entries as list", Rejection::Structural, |p| {
            p["entries"] = json!([]);
        }),
        mutated("adjustments as mapping", Rejection::Structural, |p| {
            p["adjustments"] = json!({});
        }),
        mutated("missing settings", Rejection::Malformed, |p| {
            if let Some(map) = p.as_object_mut() {
                map.remove("settings");
            }
        }),
        mutated("timestamp as string", Rejection::Malformed, |p| {
            p["timestamp"] = json!("now");
        }),
        mutated("unknown day type", Rejection::Malformed, |p| {
            p["entries"]["2024-01-11"]["dayType"] = json!("sabbatical");
        }),
        mutated("too many entries", Rejection::TooManyEntries, |p| {
            let entries: serde_json::Map<String, Value> = (0..=limits::MAX_ENTRIES)
                .map(|i| (format!("e{i}"), json!({})))
                .collect();
            p["entries"] = Value::Object(entries);
        }),
        mutated("too many adjustments", Rejection::TooManyAdjustments, |p| {
            p["adjustments"] = Value::Array(vec![json!({}); limits::MAX_ADJUSTMENTS + 1]);
        }),
        mutated("__proto__ entry key", Rejection::ReservedKey, |p| {
            p["entries"]["__proto__"] = json!({ "start": "09:00" });
        }),
        mutated("constructor entry key", Rejection::ReservedKey, |p| {
            p["entries"]["constructor"] = json!({});
        }),
        mutated("entry key not a date", Rejection::InvalidEntryDate, |p| {
            p["entries"]["tomorrow"] = json!({});
        }),
        mutated("entry key impossible date", Rejection::InvalidEntryDate, |p| {
            p["entries"]["2024-02-30"] = json!({});
        }),
        mutated("entry key with signed year", Rejection::InvalidEntryDate, |p| {
            p["entries"]["+202-01-10"] = json!({ "start": "09:00" });
        }),
        mutated("adjustment date with padded year", Rejection::InvalidAdjustment, |p| {
            p["adjustments"][0]["date"] = json!(" 202-01-02");
        }),
        mutated("start hour out of range", Rejection::InvalidTime, |p| {
            p["entries"]["2024-01-10"]["start"] = json!("24:00");
        }),
        mutated("end without leading zero", Rejection::InvalidTime, |p| {
            p["entries"]["2024-01-10"]["end"] = json!("9:00");
        }),
        mutated("negative break", Rejection::NegativeBreak, |p| {
            p["entries"]["2024-01-10"]["breakMinutes"] = json!(-5);
        }),
        mutated("adjustment with empty id", Rejection::InvalidAdjustment, |p| {
            p["adjustments"][0]["id"] = json!("");
        }),
        mutated("adjustment with bad date", Rejection::InvalidAdjustment, |p| {
            p["adjustments"][0]["date"] = json!("2024-13-01");
        }),
        mutated("duplicate adjustment id", Rejection::DuplicateAdjustment, |p| {
            let copy = p["adjustments"][0].clone();
            if let Some(list) = p["adjustments"].as_array_mut() {
                list.push(copy);
            }
        }),
        mutated("week starts on tuesday", Rejection::InvalidSettings, |p| {
            p["settings"]["weekStartsOn"] = json!(2);
        }),
        mutated("working day seven", Rejection::InvalidSettings, |p| {
            p["settings"]["workingDays"] = json!([1, 7]);
        }),
        mutated("negative expected minutes", Rejection::InvalidSettings, |p| {
            p["settings"]["expectedMinutesPerDay"] = json!(-1);
        }),
        mutated("zero non-working rate", Rejection::InvalidSettings, |p| {
            p["settings"]["nonWorkingDayRate"] = json!(0);
        }),
        mutated("leave period not a date", Rejection::InvalidLeaveBalance, |p| {
            p["leaveBalance"]["periodEnd"] = json!("end of year");
        }),
    ]
}

/// Decode every vector, returning (name, rejected as expected, outcome).
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .into_iter()
        .map(|vector| match tally_sync::decode(&vector.frame) {
            Ok(_) => (vector.name.to_string(), false, "accepted".to_string()),
            Err(e) => (
                vector.name.to_string(),
                vector.expected.matches(&e),
                e.to_string(),
            ),
        })
        .collect()
}
