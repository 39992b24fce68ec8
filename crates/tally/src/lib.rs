//! # Tally
//!
//! The unified API for Tally: local-first working-time records reconciled
//! directly between two devices.
//!
//! ## Overview
//!
//! Tally keeps a device's records in memory and syncs them with one peer at a
//! time:
//!
//! - **Entries**: one record per calendar day (start, end, break, day type)
//! - **Adjustments**: immutable manual balance corrections
//! - **Settings**: working days and scheduling rules
//! - **Sync**: a consent-gated session that merges both snapshots and asks the
//!   user about every genuine conflict
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tally::{LocalState, Session, SessionConfig};
//! use tally::core::DayEntry;
//! use tally::sync::MemoryNetwork;
//!
//! async fn example() -> tally::Result<()> {
//!     let mut state = LocalState::new();
//!     state.set_entry("2024-01-10", DayEntry::worked("09:00", "17:00"))?;
//!
//!     let network = MemoryNetwork::new();
//!     let mut session = Session::new(network.connector(), state, SessionConfig::default());
//!     let id = session.start_hosting().await?;
//!     println!("scan {id} on the other device");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tally::core` - Records, validation and the merge engine
//! - `tally::sync` - Wire protocol, transports and the session controller

pub mod error;
pub mod state;

// Re-export component crates
pub use tally_core as core;
pub use tally_sync as sync;

pub use error::{Result, TallyError};
pub use state::LocalState;

pub use tally_core::{
    Adjustment, DayEntry, DayType, LeaveBalance, MergedState, Resolution, Settings, SyncPayload,
    SyncResult,
};
pub use tally_sync::{PeerId, SessionConfig, SessionStatus, SessionView};

/// A sync session driving a [`LocalState`].
pub type Session<C> = tally_sync::SessionController<C, LocalState>;
