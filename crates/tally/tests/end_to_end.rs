//! End-to-end sync sessions between two devices over the memory transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tally::core::{LeaveBalance, Settings};
use tally::sync::{
    ConnectionId, Connector, MemoryNetwork, MemoryTransport, SyncMessage, Transport, TransportEvent,
};
use tally::{
    DayEntry, DayType, LocalState, PeerId, Resolution, Session, SessionConfig, SessionStatus,
};
use tally_testkit::fixtures::SessionPair;
use tally_testkit::vectors::all_vectors;
use tokio::sync::mpsc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn device(entries: &[(&str, DayEntry)]) -> LocalState {
    let mut state = LocalState::new();
    for (date, entry) in entries {
        state.set_entry(date, entry.clone()).unwrap();
    }
    state
}

#[tokio::test]
async fn test_disjoint_devices_converge() {
    init_tracing();
    let mut laptop = device(&[("2024-01-08", DayEntry::worked("09:00", "17:00"))]);
    laptop.add_adjustment("2024-01-02", 30, "on call").unwrap();
    let mut phone = device(&[("2024-01-09", DayEntry::of_type(DayType::Sick))]);
    phone
        .set_leave_balance(Some(LeaveBalance {
            total_days: 25.0,
            period_start: "2024-01-01".into(),
            period_end: "2024-12-31".into(),
        }))
        .unwrap();

    let mut pair = SessionPair::new(laptop, phone);
    pair.connect().await.unwrap();
    pair.host.accept_connection().unwrap();
    pair.pump();

    assert_eq!(pair.statuses(), (SessionStatus::Complete, SessionStatus::Complete));
    let host = pair.host.app();
    let guest = pair.guest.app();
    assert_eq!(host.merge_count(), 1);
    assert_eq!(guest.merge_count(), 1);
    assert_eq!(host.entries(), guest.entries());
    assert_eq!(host.entries().len(), 2);
    assert_eq!(host.adjustments(), guest.adjustments());
    assert_eq!(host.leave_balance(), guest.leave_balance());
    assert!(host.leave_balance().is_some());
}

#[tokio::test]
async fn test_conflicting_day_is_resolved_by_user() {
    init_tracing();
    let laptop = device(&[("2024-01-10", DayEntry::worked("09:00", "17:00").with_break(30))]);
    let phone = device(&[("2024-01-10", DayEntry::worked("09:00", "17:00"))]);

    let mut pair = SessionPair::new(laptop, phone);
    pair.connect().await.unwrap();
    pair.host.accept_connection().unwrap();
    pair.pump();
    assert_eq!(
        pair.statuses(),
        (SessionStatus::EntryConflicts, SessionStatus::EntryConflicts)
    );

    let conflicts = &pair.guest.sync_result().unwrap().entry_conflicts;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].remote.break_minutes, 30);

    let choices = BTreeMap::from([("2024-01-10".to_string(), Resolution::Remote)]);
    pair.guest.resolve_entry_conflicts(&choices).unwrap();
    pair.pump();

    assert_eq!(pair.statuses(), (SessionStatus::Complete, SessionStatus::Complete));
    assert_eq!(
        pair.guest.app().entry("2024-01-10").unwrap().break_minutes,
        30
    );
    // The side that finished second does not apply anything.
    assert_eq!(pair.host.app().merge_count(), 0);
}

#[tokio::test]
async fn test_settings_conflict_only() {
    init_tracing();
    let mut laptop = LocalState::new();
    laptop
        .set_settings(Settings {
            working_days: vec![5, 4, 3, 2, 1],
            ..Settings::default()
        })
        .unwrap();
    let mut phone = LocalState::new();
    phone
        .set_settings(Settings {
            expected_minutes_per_day: 450.0,
            ..Settings::default()
        })
        .unwrap();

    let mut pair = SessionPair::new(laptop, phone);
    pair.connect().await.unwrap();
    pair.host.accept_connection().unwrap();
    assert_eq!(pair.host.status(), SessionStatus::SettingsConflict);

    pair.host.resolve_settings_conflict(Resolution::Remote).unwrap();
    assert_eq!(pair.host.status(), SessionStatus::Complete);
    assert_eq!(pair.host.app().settings().expected_minutes_per_day, 450.0);
}

#[tokio::test]
async fn test_reordered_working_days_do_not_conflict() {
    let mut laptop = LocalState::new();
    laptop
        .set_settings(Settings {
            working_days: vec![5, 4, 3, 2, 1],
            ..Settings::default()
        })
        .unwrap();

    let mut pair = SessionPair::new(laptop, LocalState::new());
    pair.connect().await.unwrap();
    pair.host.accept_connection().unwrap();
    pair.pump();
    assert_eq!(pair.statuses(), (SessionStatus::Complete, SessionStatus::Complete));
}

#[tokio::test]
async fn test_reject_then_accept_next_peer() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut host = Session::new(network.connector(), LocalState::new(), SessionConfig::default());
    let mut first = Session::new(network.connector(), LocalState::new(), SessionConfig::default());
    let mut second = Session::new(
        network.connector(),
        device(&[("2024-01-10", DayEntry::worked("07:30", "15:30"))]),
        SessionConfig::default(),
    );

    let id = host.start_hosting().await.unwrap();
    first.connect_to_peer(id.clone()).await.unwrap();
    host.drain_events();
    host.reject_connection().unwrap();
    first.drain_events();
    assert_eq!(first.status(), SessionStatus::Error);

    second.connect_to_peer(id).await.unwrap();
    host.drain_events();
    assert_eq!(host.status(), SessionStatus::AwaitingAcceptance);
    host.accept_connection().unwrap();
    assert_eq!(host.status(), SessionStatus::Complete);
    assert!(host.app().entry("2024-01-10").is_some());
}

/// A raw transport dialing `host`, for playing a misbehaving peer.
async fn attacker(network: &Arc<MemoryNetwork>, host: &PeerId) -> (MemoryTransport, ConnectionId) {
    let (tx, _rx) = mpsc::unbounded_channel::<TransportEvent>();
    let mut transport = network.connector().open(tx);
    let conn = transport.connect(host).await.unwrap();
    (transport, conn)
}

#[tokio::test]
async fn test_hostile_frames_never_reach_state() {
    init_tracing();
    for vector in all_vectors() {
        let network = MemoryNetwork::new();
        let original = device(&[("2024-01-10", DayEntry::worked("09:00", "17:00"))]);
        let mut host = Session::new(network.connector(), original.clone(), SessionConfig::default());
        let id = host.start_hosting().await.unwrap();

        let (mut peer, conn) = attacker(&network, &id).await;
        peer.send_raw(conn, vector.frame.clone());
        host.drain_events();
        host.accept_connection().unwrap();

        assert_eq!(host.status(), SessionStatus::Error, "vector {:?}", vector.name);
        assert!(host.error().is_some());
        assert_eq!(host.app().merge_count(), 0);
        assert_eq!(host.app().entries(), original.entries());
    }
}

#[tokio::test]
async fn test_unexpected_message_is_ignored() {
    let network = MemoryNetwork::new();
    let mut host = Session::new(network.connector(), LocalState::new(), SessionConfig::default());
    let id = host.start_hosting().await.unwrap();
    let (mut peer, conn) = attacker(&network, &id).await;
    host.drain_events();
    host.accept_connection().unwrap();

    // A response is only meaningful to an initiator.
    let stray = SyncMessage::sync_response(LocalState::new().snapshot_at(0));
    peer.send(conn, &stray);
    host.drain_events();
    assert_eq!(host.status(), SessionStatus::SyncingEntries);

    peer.send(conn, &SyncMessage::sync_request(LocalState::new().snapshot_at(0)));
    host.drain_events();
    assert_eq!(host.status(), SessionStatus::Complete);
}

#[tokio::test]
async fn test_peer_leaving_mid_session() {
    let network = MemoryNetwork::new();
    let mut host = Session::new(
        network.connector(),
        device(&[("2024-01-10", DayEntry::worked("09:00", "17:00"))]),
        SessionConfig::default(),
    );
    let id = host.start_hosting().await.unwrap();
    let (peer, _conn) = attacker(&network, &id).await;
    host.drain_events();
    host.accept_connection().unwrap();

    drop(peer);
    host.drain_events();
    assert_eq!(host.status(), SessionStatus::Error);
    assert_eq!(host.error(), Some("connection closed by peer"));
    assert!(host.app().entry("2024-01-10").is_some());

    host.reset();
    assert_eq!(host.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_custom_host_timeout() {
    let network = MemoryNetwork::new();
    let config = SessionConfig::default().with_host_timeout(Duration::from_secs(5));
    let mut host = Session::new(network.connector(), LocalState::new(), config);
    let mut view = host.subscribe();
    host.start_hosting().await.unwrap();

    let started = tokio::time::Instant::now();
    while host.step().await {}
    assert_eq!(host.status(), SessionStatus::Error);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(host.error().unwrap().contains("5s"));

    let seen = view.borrow_and_update().clone();
    assert_eq!(seen.status, SessionStatus::Error);
    assert!(seen.peer_identity.is_none());
}
