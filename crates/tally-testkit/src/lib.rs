//! # Tally Testkit
//!
//! Testing utilities for Tally.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Hostile vectors**: Raw frames a peer could send, with the rejection each must produce
//! - **Generators**: Proptest strategies for valid payloads
//! - **Fixtures**: Recording applications and paired sessions over a memory network
//!
//! ## Hostile Vectors
//!
//! ```rust
//! use tally_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, outcome) in verify_all_vectors() {
//!     assert!(ok, "{name}: {outcome}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tally_testkit::generators::payload;
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_total(a in payload(), b in payload()) {
//!         let _ = tally_core::merge_payloads(&a, &b);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tally_testkit::fixtures::SessionPair;
//! use tally_core::SyncPayload;
//!
//! async fn example() {
//!     let mut pair = SessionPair::recording(SyncPayload::empty(0), SyncPayload::empty(0));
//!     pair.connect().await.unwrap();
//!     pair.host.accept_connection().unwrap();
//!     pair.pump();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{payload_with_entries, RecordingApp, SessionPair, TIMESTAMP};
pub use vectors::{all_vectors, verify_all_vectors, HostileVector, Rejection};
