//! Sync protocol message types.
//!
//! Three messages make up a session:
//!
//! ```text
//! Initiator                           Host
//!   |-------- SYNC_REQUEST ---------->|   (after the host accepts)
//!   |<------- SYNC_RESPONSE ----------|
//!   |   ... each side resolves its own conflicts ...
//!   |<------- SYNC_COMPLETE --------->|   (whichever finishes first)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use tally_core::SyncPayload;

/// Opaque identity of a transport endpoint, shared out of band (e.g. as a QR code).
///
/// Single-use: a fresh identity is created for every hosting session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identity string received from elsewhere.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identity.
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle for one channel of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Sync protocol messages, tagged by `"type"` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    /// Initiator's snapshot, sent once the channel opens.
    #[serde(rename = "SYNC_REQUEST")]
    SyncRequest { payload: SyncPayload },

    /// Host's snapshot, sent in reply to a request.
    #[serde(rename = "SYNC_RESPONSE")]
    SyncResponse { payload: SyncPayload },

    /// The sender has applied its merged state.
    #[serde(rename = "SYNC_COMPLETE")]
    SyncComplete {},
}

impl SyncMessage {
    pub fn sync_request(payload: SyncPayload) -> Self {
        SyncMessage::SyncRequest { payload }
    }

    pub fn sync_response(payload: SyncPayload) -> Self {
        SyncMessage::SyncResponse { payload }
    }

    pub fn sync_complete() -> Self {
        SyncMessage::SyncComplete {}
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::SyncRequest { .. } => "SYNC_REQUEST",
            SyncMessage::SyncResponse { .. } => "SYNC_RESPONSE",
            SyncMessage::SyncComplete {} => "SYNC_COMPLETE",
        }
    }

    /// The carried payload, if any.
    pub fn payload(&self) -> Option<&SyncPayload> {
        match self {
            SyncMessage::SyncRequest { payload } | SyncMessage::SyncResponse { payload } => {
                Some(payload)
            }
            SyncMessage::SyncComplete {} => None,
        }
    }
}
