//! # Tally Sync
//!
//! Peer-to-peer sync protocol for reconciling two devices' time records.
//!
//! ## Overview
//!
//! One device hosts and shows its identity; the other dials it. After the host
//! accepts, each side sends its full snapshot, merges locally, walks the user
//! through any conflicts, and applies the merged state.
//!
//! ## Key Properties
//!
//! - **Untrusted input**: every frame is bounded, parsed and validated before use
//! - **Consent**: the host accepts or rejects each incoming connection
//! - **Single session**: extra connections are closed, stale events are discarded
//! - **Transport-agnostic**: anything implementing [`Transport`] works
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tally_sync::{MemoryNetwork, SessionConfig, SessionController, SyncApplication};
//! use tally_core::{MergedState, SyncPayload};
//!
//! struct App;
//!
//! impl SyncApplication for App {
//!     fn current_payload(&self) -> SyncPayload {
//!         SyncPayload::empty(0)
//!     }
//!     fn on_merged(&mut self, _state: MergedState) {}
//! }
//!
//! async fn example() -> tally_sync::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let mut host = SessionController::new(network.connector(), App, SessionConfig::default());
//!     let id = host.start_hosting().await?;
//!     println!("share {id} with the other device");
//!
//!     while host.step().await {
//!         if host.status().awaiting_input() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod session;
pub mod transport;

pub use codec::{decode, encode, is_sync_message, MAX_MESSAGE_BYTES};
pub use error::{Result, SyncError};
pub use messages::{ConnectionId, PeerId, SyncMessage};
pub use session::{
    SessionConfig, SessionController, SessionStatus, SessionView, SyncApplication,
};
pub use transport::{
    memory::MemoryConnector, memory::MemoryNetwork, memory::MemoryTransport, Connector,
    EventReceiver, EventSender, Transport, TransportEvent,
};
