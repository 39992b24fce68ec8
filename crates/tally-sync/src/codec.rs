//! Wire codec: JSON text in, validated [`SyncMessage`] out.
//!
//! Nothing received from a peer is trusted until [`decode`] returns `Ok`.
//! Decoding runs in stages so that cheap checks reject hostile input before
//! expensive ones run:
//!
//! 1. Frame size bound
//! 2. JSON parse and message tag check ([`is_sync_message`])
//! 3. Entry/adjustment counts on the untyped value
//! 4. Typed deserialization (top-level shape, enums, field types)
//! 5. [`validate_payload`] (formats, ranges, reserved keys)

use serde_json::Value;

use tally_core::{limits, validate_payload, ValidationError};

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;

/// Largest frame accepted from a peer, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const TAGS_WITH_PAYLOAD: &[&str] = &["SYNC_REQUEST", "SYNC_RESPONSE"];
const TAG_COMPLETE: &str = "SYNC_COMPLETE";

/// Structural check: an object with a known `type` tag, and an object
/// `payload` when the tag requires one.
pub fn is_sync_message(value: &Value) -> bool {
    let Some(tag) = value.get("type").and_then(Value::as_str) else {
        return false;
    };
    if tag == TAG_COMPLETE {
        return true;
    }
    TAGS_WITH_PAYLOAD.contains(&tag) && value.get("payload").is_some_and(Value::is_object)
}

/// Serialize a message for the wire.
pub fn encode(message: &SyncMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parse and validate a message received from a peer.
pub fn decode(data: &str) -> Result<SyncMessage> {
    if data.len() > MAX_MESSAGE_BYTES {
        return Err(SyncError::Malformed(format!(
            "message of {} bytes exceeds the limit of {MAX_MESSAGE_BYTES}",
            data.len()
        )));
    }

    let value: Value = serde_json::from_str(data)?;
    if !is_sync_message(&value) {
        return Err(SyncError::Malformed("not a sync message".into()));
    }
    // A payload on SYNC_COMPLETE is an unknown extra field and is ignored.
    let carries_payload = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|tag| TAGS_WITH_PAYLOAD.contains(&tag));
    if carries_payload {
        if let Some(payload) = value.get("payload") {
            check_counts(payload)?;
        }
    }

    let message: SyncMessage = serde_json::from_value(value)?;
    if let Some(payload) = message.payload() {
        validate_payload(payload)?;
    }
    Ok(message)
}

/// Bound collection sizes before typed deserialization allocates for them.
fn check_counts(payload: &Value) -> Result<()> {
    let entries = payload
        .get("entries")
        .and_then(Value::as_object)
        .ok_or_else(|| ValidationError::StructuralError("entries is not a mapping".into()))?;
    if entries.len() > limits::MAX_ENTRIES {
        return Err(ValidationError::TooManyEntries {
            count: entries.len(),
            max: limits::MAX_ENTRIES,
        }
        .into());
    }

    let adjustments = payload
        .get("adjustments")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::StructuralError("adjustments is not a list".into()))?;
    if adjustments.len() > limits::MAX_ADJUSTMENTS {
        return Err(ValidationError::TooManyAdjustments {
            count: adjustments.len(),
            max: limits::MAX_ADJUSTMENTS,
        }
        .into());
    }

    Ok(())
}
