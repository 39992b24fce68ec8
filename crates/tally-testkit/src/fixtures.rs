//! Test fixtures and helpers.
//!
//! Common setup code for session and integration tests.

use std::sync::Arc;

use tally_core::{DayEntry, MergedState, SyncPayload};
use tally_sync::{
    MemoryConnector, MemoryNetwork, Result, SessionConfig, SessionController, SessionStatus,
    SyncApplication,
};

/// A fixed timestamp: 2024-01-10T08:00:00Z.
pub const TIMESTAMP: i64 = 1_704_873_600_000;

/// Build a payload from `(date, entry)` pairs with default settings.
pub fn payload_with_entries(entries: &[(&str, DayEntry)]) -> SyncPayload {
    let mut payload = SyncPayload::empty(TIMESTAMP);
    for (date, entry) in entries {
        payload.entries.insert(date.to_string(), entry.clone());
    }
    payload
}

/// An application that serves a fixed payload and records every merge.
#[derive(Debug, Clone)]
pub struct RecordingApp {
    pub payload: SyncPayload,
    pub merged: Vec<MergedState>,
}

impl RecordingApp {
    pub fn new(payload: SyncPayload) -> Self {
        Self {
            payload,
            merged: Vec::new(),
        }
    }

    /// The single merged state, if exactly one was applied.
    pub fn merged_once(&self) -> Option<&MergedState> {
        match self.merged.as_slice() {
            [state] => Some(state),
            _ => None,
        }
    }
}

impl SyncApplication for RecordingApp {
    fn current_payload(&self) -> SyncPayload {
        self.payload.clone()
    }

    fn on_merged(&mut self, state: MergedState) {
        self.merged.push(state);
    }
}

/// Two controllers on one memory network.
pub struct SessionPair<A: SyncApplication> {
    pub network: Arc<MemoryNetwork>,
    pub host: SessionController<MemoryConnector, A>,
    pub guest: SessionController<MemoryConnector, A>,
}

impl SessionPair<RecordingApp> {
    /// A pair of [`RecordingApp`]s serving the given payloads.
    pub fn recording(host: SyncPayload, guest: SyncPayload) -> Self {
        Self::new(RecordingApp::new(host), RecordingApp::new(guest))
    }
}

impl<A: SyncApplication> SessionPair<A> {
    pub fn new(host: A, guest: A) -> Self {
        Self::with_config(host, guest, SessionConfig::default())
    }

    pub fn with_config(host: A, guest: A, config: SessionConfig) -> Self {
        let network = MemoryNetwork::new();
        Self {
            host: SessionController::new(network.connector(), host, config.clone()),
            guest: SessionController::new(network.connector(), guest, config),
            network,
        }
    }

    /// Host, scan and dial, leaving the host awaiting acceptance.
    pub async fn connect(&mut self) -> Result<()> {
        let id = self.host.start_hosting().await?;
        self.guest.start_scanning()?;
        self.guest.connect_to_peer(id).await?;
        self.host.drain_events();
        debug_assert_eq!(self.host.status(), SessionStatus::AwaitingAcceptance);
        Ok(())
    }

    /// Deliver queued events on both sides until neither has any left.
    pub fn pump(&mut self) {
        while self.host.drain_events() + self.guest.drain_events() > 0 {}
    }

    /// Both statuses, host first.
    pub fn statuses(&self) -> (SessionStatus, SessionStatus) {
        (self.host.status(), self.guest.status())
    }
}
