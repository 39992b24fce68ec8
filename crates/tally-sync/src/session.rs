//! Sync session state machine.
//!
//! ```text
//! idle ─┬─ start_hosting ──> hosting ── incoming ──> awaiting-acceptance ── accept ─┐
//!       └─ start_scanning ─> scanning ── connect_to_peer ──> connecting ──────────────┤
//!                                                                                      v
//!        complete <── (no conflicts) <── syncing-settings <── syncing-entries <── payload
//!            ^                                  │
//!            └── resolve ── settings-conflict <─┴─> entry-conflicts ── resolve ──┘
//! ```
//!
//! `error` is reachable from every state and left only through [`SessionController::reset`].
//!
//! The controller is single-threaded and event-driven. Every transition runs to
//! completion inside one call: a user action, [`SessionController::handle_event`],
//! or [`SessionController::handle_timeout`]. [`SessionController::step`] waits
//! for the next transport event or the armed deadline and dispatches it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use tally_core::{
    merge_payloads, resolve_entry_conflicts, resolve_settings_conflict, MergedState, Resolution,
    SyncPayload, SyncResult,
};

use crate::codec;
use crate::error::{Result, SyncError};
use crate::messages::{ConnectionId, PeerId, SyncMessage};
use crate::transport::{Connector, EventReceiver, Transport, TransportEvent};

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Idle,
    Hosting,
    Scanning,
    Connecting,
    AwaitingAcceptance,
    SyncingEntries,
    SyncingSettings,
    EntryConflicts,
    SettingsConflict,
    Complete,
    Error,
}

impl SessionStatus {
    /// True while the session may still receive transport events.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != SessionStatus::Idle
    }

    /// True once the session has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Error)
    }

    /// True when the session is blocked on a user decision.
    pub fn awaiting_input(&self) -> bool {
        matches!(
            self,
            SessionStatus::AwaitingAcceptance
                | SessionStatus::EntryConflicts
                | SessionStatus::SettingsConflict
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Hosting => "hosting",
            SessionStatus::Scanning => "scanning",
            SessionStatus::Connecting => "connecting",
            SessionStatus::AwaitingAcceptance => "awaiting-acceptance",
            SessionStatus::SyncingEntries => "syncing-entries",
            SessionStatus::SyncingSettings => "syncing-settings",
            SessionStatus::EntryConflicts => "entry-conflicts",
            SessionStatus::SettingsConflict => "settings-conflict",
            SessionStatus::Complete => "complete",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host application: source of local snapshots and sink for merged state.
pub trait SyncApplication: Send {
    /// Snapshot of the current local state.
    fn current_payload(&self) -> SyncPayload;

    /// Persist a fully reconciled state. Called at most once per session.
    fn on_merged(&mut self, state: MergedState);
}

/// Configuration for session timing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a host waits for an incoming connection.
    pub host_timeout: Duration,
    /// How long a dial may go unanswered.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn with_host_timeout(mut self, timeout: Duration) -> Self {
        self.host_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// What the UI needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub status: SessionStatus,
    /// Our identity while hosting, to be shown to the other device.
    pub peer_identity: Option<PeerId>,
    /// Human-readable reason, set in the `error` state.
    pub error: Option<String>,
    /// Merge output, for rendering conflict choices.
    pub sync_result: Option<SyncResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Host,
    Initiator,
}

/// The transport owned by the current session, with its event stream.
struct ActiveTransport<T> {
    transport: T,
    events: EventReceiver,
}

enum Wake {
    Event(Option<TransportEvent>),
    Deadline,
}

/// Drives one sync session at a time over transports opened by `C`.
pub struct SessionController<C: Connector, A: SyncApplication> {
    connector: C,
    app: A,
    config: SessionConfig,
    active: Option<ActiveTransport<C::Transport>>,
    role: Option<Role>,
    status: SessionStatus,
    peer_identity: Option<PeerId>,
    error: Option<String>,
    /// The channel the session runs over, once accepted or dialed.
    connection: Option<ConnectionId>,
    /// An incoming channel the host has not accepted yet.
    pending: Option<ConnectionId>,
    /// Data that arrived on `pending` before acceptance. Holds at most one frame.
    buffered: Option<String>,
    /// The snapshot the initiator offered in its request.
    offered: Option<SyncPayload>,
    sync_result: Option<SyncResult>,
    deadline: Option<Instant>,
    view: watch::Sender<SessionView>,
}

impl<C: Connector, A: SyncApplication> SessionController<C, A> {
    /// Create an idle controller.
    pub fn new(connector: C, app: A, config: SessionConfig) -> Self {
        let (view, _) = watch::channel(SessionView {
            status: SessionStatus::Idle,
            peer_identity: None,
            error: None,
            sync_result: None,
        });
        Self {
            connector,
            app,
            config,
            active: None,
            role: None,
            status: SessionStatus::Idle,
            peer_identity: None,
            error: None,
            connection: None,
            pending: None,
            buffered: None,
            offered: None,
            sync_result: None,
            deadline: None,
            view,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn peer_identity(&self) -> Option<&PeerId> {
        self.peer_identity.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sync_result(&self) -> Option<&SyncResult> {
        self.sync_result.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Watch the session state. Receives a new [`SessionView`] on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Current state as a [`SessionView`].
    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            peer_identity: self.peer_identity.clone(),
            error: self.error.clone(),
            sync_result: self.sync_result.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User actions
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish a fresh identity and wait for a peer to dial it.
    pub async fn start_hosting(&mut self) -> Result<PeerId> {
        self.ensure_not_failed("start hosting")?;
        self.open_transport(Role::Host);

        let created = match self.transport_mut() {
            Ok(transport) => transport.create_identity().await,
            Err(e) => Err(e),
        };
        match created {
            Ok(id) => {
                tracing::info!(peer = %id, "hosting sync session");
                self.peer_identity = Some(id.clone());
                self.arm_host_timeout();
                self.set_status(SessionStatus::Hosting);
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Enter scanning mode, ready for [`Self::connect_to_peer`].
    pub fn start_scanning(&mut self) -> Result<()> {
        self.ensure_not_failed("start scanning")?;
        self.teardown();
        self.set_status(SessionStatus::Scanning);
        Ok(())
    }

    /// Dial a host and send our snapshot.
    pub async fn connect_to_peer(&mut self, peer: PeerId) -> Result<()> {
        self.ensure_not_failed("connect")?;
        self.open_transport(Role::Initiator);
        self.set_status(SessionStatus::Connecting);

        let timeout = self.config.connect_timeout;
        let attempt = match self.transport_mut() {
            Ok(transport) => tokio::time::timeout(timeout, transport.connect(&peer)).await,
            Err(e) => Ok(Err(e)),
        };
        let conn = match attempt {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => {
                return Err(self.fail(SyncError::Timeout(format!(
                    "peer {peer} did not answer within {}s",
                    timeout.as_secs()
                ))))
            }
        };

        tracing::info!(%peer, %conn, "connected, sending sync request");
        let payload = self.app.current_payload();
        self.connection = Some(conn);
        self.send_to_peer(&SyncMessage::sync_request(payload.clone()));
        self.offered = Some(payload);
        self.set_status(SessionStatus::SyncingEntries);
        Ok(())
    }

    /// Accept the pending connection and replay anything it already sent.
    pub fn accept_connection(&mut self) -> Result<()> {
        self.expect_status("accept a connection", SessionStatus::AwaitingAcceptance)?;
        let Some(conn) = self.pending.take() else {
            return Err(self.invalid_state("accept a connection"));
        };

        tracing::info!(%conn, "connection accepted");
        self.connection = Some(conn);
        self.set_status(SessionStatus::SyncingEntries);

        if let Some(data) = self.buffered.take() {
            tracing::debug!(%conn, "replaying buffered message");
            self.on_data(conn, data);
        }
        Ok(())
    }

    /// Refuse the pending connection and go back to waiting.
    pub fn reject_connection(&mut self) -> Result<()> {
        self.expect_status("reject a connection", SessionStatus::AwaitingAcceptance)?;
        if let Some(conn) = self.pending.take() {
            tracing::info!(%conn, "connection rejected");
            if let Some(active) = self.active.as_mut() {
                active.transport.close(conn);
            }
        }
        self.buffered = None;
        self.arm_host_timeout();
        self.set_status(SessionStatus::Hosting);
        Ok(())
    }

    /// Apply one choice per conflicting date.
    ///
    /// All or nothing: if any conflicting date has no choice, nothing is
    /// applied, the session stays in `entry-conflicts` and
    /// [`SyncError::UnresolvedConflicts`] reports how many dates lack one.
    /// Choices for dates that are not in conflict are ignored.
    pub fn resolve_entry_conflicts(
        &mut self,
        choices: &BTreeMap<String, Resolution>,
    ) -> Result<()> {
        self.expect_status("resolve entry conflicts", SessionStatus::EntryConflicts)?;
        let Some(result) = self.sync_result.as_mut() else {
            return Err(self.invalid_state("resolve entry conflicts"));
        };

        let missing = result
            .entry_conflicts
            .iter()
            .filter(|conflict| !choices.contains_key(&conflict.date))
            .count();
        if missing > 0 {
            return Err(SyncError::UnresolvedConflicts { remaining: missing });
        }

        resolve_entry_conflicts(result, choices);
        tracing::info!("entry conflicts resolved");
        self.advance();
        Ok(())
    }

    /// Pick a side for the settings conflict and finish the session.
    pub fn resolve_settings_conflict(&mut self, choice: Resolution) -> Result<()> {
        self.expect_status("resolve the settings conflict", SessionStatus::SettingsConflict)?;
        let Some(result) = self.sync_result.as_mut() else {
            return Err(self.invalid_state("resolve the settings conflict"));
        };

        resolve_settings_conflict(result, choice);
        tracing::info!(?choice, "settings conflict resolved");
        self.advance();
        Ok(())
    }

    /// Tear down everything and return to `idle`. Safe from any state.
    pub fn reset(&mut self) {
        tracing::debug!(from = %self.status, "resetting session");
        self.teardown();
        self.error = None;
        self.set_status(SessionStatus::Idle);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for the next transport event or deadline and handle it.
    ///
    /// Returns `false` without waiting when there is nothing to wait for: no
    /// open transport, or the session is idle or finished.
    pub async fn step(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        let deadline = self.deadline;
        let wake = {
            let Some(active) = self.active.as_mut() else {
                return false;
            };
            tokio::select! {
                event = active.events.recv() => Wake::Event(event),
                _ = wait_until(deadline) => Wake::Deadline,
            }
        };

        match wake {
            Wake::Event(Some(event)) => self.handle_event(event),
            Wake::Event(None) => {
                self.fail(SyncError::TransportError("event stream ended".into()));
            }
            Wake::Deadline => self.handle_timeout(),
        }
        true
    }

    /// Handle every transport event that is already queued, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match self.active.as_mut() {
                Some(active) => active.events.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.fail(SyncError::TransportError("event stream ended".into()));
                    break;
                }
            }
        }
        handled
    }

    /// Dispatch one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(id) => tracing::debug!(peer = %id, "transport opened"),
            TransportEvent::IncomingConnection(conn) => self.on_incoming(conn),
            TransportEvent::Data { conn, data } => self.on_data(conn, data),
            TransportEvent::Closed { conn } => self.on_closed(conn),
            TransportEvent::Error(reason) => {
                self.fail(SyncError::TransportError(reason));
            }
        }
    }

    /// Fire the host timeout if its deadline has passed.
    pub fn handle_timeout(&mut self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }
        self.deadline = None;
        if self.status == SessionStatus::Hosting {
            self.fail(SyncError::Timeout(format!(
                "no peer connected within {}s",
                self.config.host_timeout.as_secs()
            )));
        }
    }

    fn on_incoming(&mut self, conn: ConnectionId) {
        if self.status != SessionStatus::Hosting {
            tracing::warn!(%conn, status = %self.status, "refusing extra connection");
            if let Some(active) = self.active.as_mut() {
                active.transport.close(conn);
            }
            return;
        }
        tracing::info!(%conn, "incoming connection awaiting acceptance");
        self.deadline = None;
        self.pending = Some(conn);
        self.set_status(SessionStatus::AwaitingAcceptance);
    }

    fn on_data(&mut self, conn: ConnectionId, data: String) {
        if self.pending == Some(conn) {
            if self.buffered.is_none() {
                tracing::debug!(%conn, "buffering message until accepted");
                self.buffered = Some(data);
            } else {
                tracing::warn!(%conn, "dropping message, one is already buffered");
            }
            return;
        }
        if self.connection != Some(conn) {
            tracing::debug!(%conn, "ignoring data from unknown channel");
            return;
        }

        match codec::decode(&data) {
            Ok(message) => self.on_message(message),
            Err(e) => {
                tracing::warn!(%conn, "rejected message from peer: {}", e);
                self.fail(e);
            }
        }
    }

    fn on_message(&mut self, message: SyncMessage) {
        tracing::debug!(kind = message.kind(), status = %self.status, "received message");
        match (message, self.role, self.status) {
            (SyncMessage::SyncRequest { payload }, Some(Role::Host), SessionStatus::SyncingEntries) => {
                let local = self.app.current_payload();
                self.send_to_peer(&SyncMessage::sync_response(local.clone()));
                self.process(local, payload);
            }
            (
                SyncMessage::SyncResponse { payload },
                Some(Role::Initiator),
                SessionStatus::SyncingEntries,
            ) => {
                let local = match self.offered.take() {
                    Some(offered) => offered,
                    None => self.app.current_payload(),
                };
                self.process(local, payload);
            }
            (
                SyncMessage::SyncComplete {},
                _,
                SessionStatus::SyncingEntries
                | SessionStatus::SyncingSettings
                | SessionStatus::EntryConflicts
                | SessionStatus::SettingsConflict,
            ) => {
                tracing::info!("peer completed the session");
                self.sync_result = None;
                self.set_status(SessionStatus::Complete);
            }
            (message, _, status) => {
                tracing::warn!("ignoring unexpected {} while {}", message.kind(), status);
            }
        }
    }

    fn on_closed(&mut self, conn: ConnectionId) {
        if self.pending == Some(conn) {
            tracing::info!(%conn, "pending peer disconnected");
            self.pending = None;
            self.buffered = None;
            self.arm_host_timeout();
            self.set_status(SessionStatus::Hosting);
            return;
        }
        if self.connection == Some(conn) && self.status.is_active() {
            self.fail(SyncError::PeerClosed);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Merge and completion
    // ─────────────────────────────────────────────────────────────────────────

    fn process(&mut self, local: SyncPayload, remote: SyncPayload) {
        let result = merge_payloads(&local, &remote);
        let summary = result.summary();
        tracing::info!(
            from_local = summary.entries_from_local,
            from_remote = summary.entries_from_remote,
            identical = summary.identical_entries,
            adjustments_from_remote = summary.adjustments_from_remote,
            entry_conflicts = summary.entry_conflicts,
            "entries merged"
        );
        self.sync_result = Some(result);
        self.set_status(SessionStatus::SyncingSettings);
        if summary.settings_conflict {
            tracing::info!("settings differ");
        }
        self.advance();
    }

    /// Stop at the next pending conflict, or finish.
    fn advance(&mut self) {
        let Some(result) = self.sync_result.as_ref() else {
            return;
        };
        if !result.entry_conflicts.is_empty() {
            self.set_status(SessionStatus::EntryConflicts);
        } else if result.settings_conflict.is_some() {
            self.set_status(SessionStatus::SettingsConflict);
        } else {
            self.finalize();
        }
    }

    fn finalize(&mut self) {
        let Some(state) = self.sync_result.take().and_then(SyncResult::into_merged_state) else {
            return;
        };
        tracing::info!(
            entries = state.entries.len(),
            adjustments = state.adjustments.len(),
            "applying merged state"
        );
        self.app.on_merged(state);
        self.send_to_peer(&SyncMessage::sync_complete());
        self.set_status(SessionStatus::Complete);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace any previous transport with a fresh one.
    fn open_transport(&mut self, role: Role) {
        self.teardown();
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.connector.open(tx);
        self.active = Some(ActiveTransport {
            transport,
            events: rx,
        });
        self.role = Some(role);
    }

    fn transport_mut(&mut self) -> Result<&mut C::Transport> {
        self.active
            .as_mut()
            .map(|active| &mut active.transport)
            .ok_or_else(|| SyncError::TransportError("no transport open".into()))
    }

    /// Drop the transport and all in-flight session state.
    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.transport.destroy();
        }
        self.role = None;
        self.peer_identity = None;
        self.connection = None;
        self.pending = None;
        self.buffered = None;
        self.offered = None;
        self.sync_result = None;
        self.deadline = None;
    }

    /// Move to `error`, discarding the session. Returns the error for propagation.
    fn fail(&mut self, error: SyncError) -> SyncError {
        tracing::warn!(from = %self.status, "sync session failed: {}", error);
        self.teardown();
        self.error = Some(error.to_string());
        self.set_status(SessionStatus::Error);
        error
    }

    fn arm_host_timeout(&mut self) {
        self.deadline = Some(Instant::now() + self.config.host_timeout);
    }

    fn send_to_peer(&mut self, message: &SyncMessage) {
        if let (Some(conn), Some(active)) = (self.connection, self.active.as_mut()) {
            tracing::debug!(%conn, kind = message.kind(), "sending message");
            active.transport.send(conn, message);
        }
    }

    fn ensure_not_failed(&self, action: &'static str) -> Result<()> {
        if self.status == SessionStatus::Error {
            return Err(self.invalid_state(action));
        }
        Ok(())
    }

    fn expect_status(&self, action: &'static str, expected: SessionStatus) -> Result<()> {
        if self.status != expected {
            return Err(self.invalid_state(action));
        }
        Ok(())
    }

    fn invalid_state(&self, action: &'static str) -> SyncError {
        SyncError::InvalidState {
            action,
            status: self.status,
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            tracing::debug!(from = %self.status, to = %status, "session transition");
        }
        self.status = status;
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, MemoryNetwork, MemoryTransport};
    use std::sync::Arc;
    use tally_core::{DayEntry, Settings};

    #[derive(Default)]
    struct TestApp {
        payload: Option<SyncPayload>,
        merged: Vec<MergedState>,
    }

    impl TestApp {
        fn with(payload: SyncPayload) -> Self {
            Self {
                payload: Some(payload),
                merged: Vec::new(),
            }
        }
    }

    impl SyncApplication for TestApp {
        fn current_payload(&self) -> SyncPayload {
            self.payload.clone().unwrap_or_else(|| SyncPayload::empty(0))
        }

        fn on_merged(&mut self, state: MergedState) {
            self.merged.push(state);
        }
    }

    type Controller = SessionController<MemoryConnector, TestApp>;

    fn controller(network: &Arc<MemoryNetwork>, payload: SyncPayload) -> Controller {
        SessionController::new(
            network.connector(),
            TestApp::with(payload),
            SessionConfig::default(),
        )
    }

    fn entry_payload(date: &str, entry: DayEntry) -> SyncPayload {
        let mut payload = SyncPayload::empty(1_704_873_600_000);
        payload.entries.insert(date.into(), entry);
        payload
    }

    /// Host and guest connected, host not yet accepted.
    async fn connected(host_payload: SyncPayload, guest_payload: SyncPayload) -> (Controller, Controller) {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, host_payload);
        let mut guest = controller(&network, guest_payload);

        let id = host.start_hosting().await.unwrap();
        guest.start_scanning().unwrap();
        guest.connect_to_peer(id).await.unwrap();
        assert_eq!(guest.status(), SessionStatus::SyncingEntries);

        host.drain_events();
        assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);
        (host, guest)
    }

    #[tokio::test]
    async fn test_sync_without_conflicts() {
        let (mut host, mut guest) = connected(
            SyncPayload::empty(0),
            entry_payload("2024-01-10", DayEntry::worked("09:00", "17:00")),
        )
        .await;

        host.accept_connection().unwrap();
        assert_eq!(host.status(), SessionStatus::Complete);

        guest.drain_events();
        assert_eq!(guest.status(), SessionStatus::Complete);

        assert_eq!(host.app().merged.len(), 1);
        assert_eq!(guest.app().merged.len(), 1);
        assert_eq!(host.app().merged[0], guest.app().merged[0]);
        assert_eq!(
            host.app().merged[0].entries["2024-01-10"],
            DayEntry::worked("09:00", "17:00")
        );
    }

    #[tokio::test]
    async fn test_entry_conflict_resolution() {
        let (mut host, mut guest) = connected(
            entry_payload("2024-01-10", DayEntry::worked("09:00", "17:00").with_break(30)),
            entry_payload("2024-01-10", DayEntry::worked("09:00", "17:00")),
        )
        .await;

        host.accept_connection().unwrap();
        assert_eq!(host.status(), SessionStatus::EntryConflicts);
        guest.drain_events();
        assert_eq!(guest.status(), SessionStatus::EntryConflicts);
        assert_eq!(guest.sync_result().unwrap().entry_conflicts.len(), 1);

        let choices = BTreeMap::from([("2024-01-10".to_string(), Resolution::Remote)]);
        guest.resolve_entry_conflicts(&choices).unwrap();
        assert_eq!(guest.status(), SessionStatus::Complete);
        assert_eq!(guest.app().merged[0].entries["2024-01-10"].break_minutes, 30);

        // The host sees the guest finish first and stops without applying.
        host.drain_events();
        assert_eq!(host.status(), SessionStatus::Complete);
        assert!(host.app().merged.is_empty());
    }

    #[tokio::test]
    async fn test_partial_resolution_applies_nothing() {
        let mut host_payload = entry_payload("2024-01-10", DayEntry::worked("08:00", "16:00"));
        host_payload
            .entries
            .insert("2024-01-11".into(), DayEntry::worked("08:00", "16:00"));
        let mut guest_payload = entry_payload("2024-01-10", DayEntry::worked("09:00", "17:00"));
        guest_payload
            .entries
            .insert("2024-01-11".into(), DayEntry::worked("09:00", "17:00"));

        let (mut host, _guest) = connected(host_payload, guest_payload).await;
        host.accept_connection().unwrap();

        let partial = BTreeMap::from([("2024-01-10".to_string(), Resolution::Local)]);
        let before = host.sync_result().cloned();
        let err = host.resolve_entry_conflicts(&partial).unwrap_err();
        assert!(matches!(err, SyncError::UnresolvedConflicts { remaining: 1 }));
        assert_eq!(host.status(), SessionStatus::EntryConflicts);
        assert!(host.app().merged.is_empty());
        // Nothing from the partial set was applied.
        assert_eq!(host.sync_result().cloned(), before);
        assert_eq!(host.sync_result().unwrap().entry_conflicts.len(), 2);

        let choices = BTreeMap::from([
            ("2024-01-10".to_string(), Resolution::Local),
            ("2024-01-11".to_string(), Resolution::Remote),
        ]);
        host.resolve_entry_conflicts(&choices).unwrap();
        assert_eq!(host.status(), SessionStatus::Complete);
        let merged = &host.app().merged[0];
        assert_eq!(merged.entries["2024-01-10"].start.as_deref(), Some("08:00"));
        assert_eq!(merged.entries["2024-01-11"].start.as_deref(), Some("09:00"));
    }

    #[tokio::test]
    async fn test_settings_conflict_after_entries() {
        let mut host_payload = entry_payload("2024-01-10", DayEntry::worked("09:00", "17:00"));
        host_payload.settings = Settings {
            working_days: vec![0, 1, 2, 3, 4, 5, 6],
            ..Settings::default()
        };
        let guest_payload = entry_payload("2024-01-10", DayEntry::worked("10:00", "17:00"));

        let (mut host, _guest) = connected(host_payload, guest_payload).await;
        host.accept_connection().unwrap();
        assert_eq!(host.status(), SessionStatus::EntryConflicts);

        let choices = BTreeMap::from([("2024-01-10".to_string(), Resolution::Local)]);
        host.resolve_entry_conflicts(&choices).unwrap();
        assert_eq!(host.status(), SessionStatus::SettingsConflict);

        host.resolve_settings_conflict(Resolution::Remote).unwrap();
        assert_eq!(host.status(), SessionStatus::Complete);
        assert_eq!(host.app().merged[0].settings.working_days, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_reject_returns_to_hosting() {
        let (mut host, mut guest) =
            connected(SyncPayload::empty(0), SyncPayload::empty(0)).await;

        host.reject_connection().unwrap();
        assert_eq!(host.status(), SessionStatus::Hosting);
        assert!(host.peer_identity().is_some());

        guest.drain_events();
        assert_eq!(guest.status(), SessionStatus::Error);
        assert_eq!(guest.error(), Some("connection closed by peer"));

        // The buffered request was discarded with the connection.
        host.drain_events();
        assert_eq!(host.status(), SessionStatus::Hosting);
        assert!(host.app().merged.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_timeout() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let id = host.start_hosting().await.unwrap();

        while host.status() == SessionStatus::Hosting {
            assert!(host.step().await);
        }
        assert_eq!(host.status(), SessionStatus::Error);
        assert!(host.error().unwrap().contains("no peer connected within 120s"));
        assert!(!network.is_registered(&id));
        assert!(!host.step().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_connection_cancels_timeout() {
        let (mut host, _guest) = connected(SyncPayload::empty(0), SyncPayload::empty(0)).await;

        tokio::time::advance(Duration::from_secs(300)).await;
        host.handle_timeout();
        assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let network = MemoryNetwork::new();
        let mut guest = controller(&network, SyncPayload::empty(0));
        guest.start_scanning().unwrap();

        let err = guest
            .connect_to_peer(PeerId::new("no-such-peer"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(guest.status(), SessionStatus::Error);
        assert!(guest.error().unwrap().contains("did not answer within 10s"));
    }

    async fn hostile_peer(host: &mut Controller, network: &Arc<MemoryNetwork>) -> (MemoryTransport, ConnectionId) {
        let id = host.start_hosting().await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut attacker = network.connector().open(tx);
        let conn = attacker.connect(&id).await.unwrap();
        (attacker, conn)
    }

    #[tokio::test]
    async fn test_hostile_payload_is_rejected() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let (mut attacker, conn) = hostile_peer(&mut host, &network).await;

        let mut payload = serde_json::to_value(SyncPayload::empty(0)).unwrap();
        payload["entries"]["__proto__"] = serde_json::json!({ "start": "09:00" });
        let frame = serde_json::json!({ "type": "SYNC_REQUEST", "payload": payload });
        attacker.send_raw(conn, frame.to_string());

        host.drain_events();
        assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);
        host.accept_connection().unwrap();

        assert_eq!(host.status(), SessionStatus::Error);
        assert!(host.error().unwrap().contains("__proto__"));
        assert!(host.app().merged.is_empty());
        assert!(host.sync_result().is_none());
    }

    #[tokio::test]
    async fn test_only_one_message_is_buffered() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let (mut attacker, conn) = hostile_peer(&mut host, &network).await;

        let request = codec::encode(&SyncMessage::sync_request(SyncPayload::empty(5))).unwrap();
        attacker.send_raw(conn, request);
        attacker.send_raw(conn, "garbage".into());

        host.drain_events();
        host.accept_connection().unwrap();

        // The garbage frame was dropped, so only the valid request was replayed.
        assert_eq!(host.status(), SessionStatus::Complete);
        assert_eq!(host.app().merged.len(), 1);
    }

    #[tokio::test]
    async fn test_second_incoming_connection_is_closed() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let (_first, _conn) = hostile_peer(&mut host, &network).await;
        host.drain_events();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut second = network.connector().open(tx);
        let id = host.peer_identity().cloned().unwrap();
        let conn = second.connect(&id).await.unwrap();

        host.drain_events();
        assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed { conn }));
    }

    #[tokio::test]
    async fn test_pending_peer_leaving_returns_to_hosting() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let (attacker, _conn) = hostile_peer(&mut host, &network).await;
        host.drain_events();
        assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);

        drop(attacker);
        host.drain_events();
        assert_eq!(host.status(), SessionStatus::Hosting);
    }

    #[tokio::test]
    async fn test_actions_in_wrong_state() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));

        assert!(matches!(
            host.accept_connection(),
            Err(SyncError::InvalidState { status: SessionStatus::Idle, .. })
        ));
        assert!(host.reject_connection().is_err());
        assert!(host.resolve_settings_conflict(Resolution::Local).is_err());
        assert!(host.resolve_entry_conflicts(&BTreeMap::new()).is_err());
    }

    #[tokio::test]
    async fn test_error_requires_reset() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        host.start_hosting().await.unwrap();
        host.handle_event(TransportEvent::Error("ice failed".into()));
        assert_eq!(host.status(), SessionStatus::Error);
        assert_eq!(host.error(), Some("transport error: ice failed"));

        assert!(host.start_hosting().await.is_err());

        host.reset();
        assert_eq!(host.status(), SessionStatus::Idle);
        assert_eq!(host.error(), None);
        assert!(host.start_hosting().await.is_ok());
    }

    #[tokio::test]
    async fn test_restarting_host_releases_previous_identity() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));

        let first = host.start_hosting().await.unwrap();
        let second = host.start_hosting().await.unwrap();
        assert_ne!(first, second);
        assert!(!network.is_registered(&first));
        assert!(network.is_registered(&second));

        host.reset();
        assert!(!network.is_registered(&second));
        assert_eq!(host.peer_identity(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let network = MemoryNetwork::new();
        let mut host = controller(&network, SyncPayload::empty(0));
        let mut view = host.subscribe();
        assert_eq!(view.borrow().status, SessionStatus::Idle);

        let id = host.start_hosting().await.unwrap();
        assert!(view.has_changed().unwrap());
        let current = view.borrow_and_update().clone();
        assert_eq!(current.status, SessionStatus::Hosting);
        assert_eq!(current.peer_identity, Some(id));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(SessionStatus::AwaitingAcceptance.to_string(), "awaiting-acceptance");
        assert_eq!(
            serde_json::to_value(SessionStatus::EntryConflicts).unwrap(),
            "entry-conflicts"
        );
        assert!(SessionStatus::SettingsConflict.awaiting_input());
        assert!(!SessionStatus::Idle.is_active());
        assert!(SessionStatus::Hosting.is_active());
    }
}
