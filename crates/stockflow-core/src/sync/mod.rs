//! Realtime cache synchronization
//!
//! Consumes realtime events, de-duplicates user notifications and keeps the
//! query cache honest by invalidating the domains each event touches.

mod coordinator;
mod ledger;

pub use coordinator::{ChannelState, MessageOutcome, SyncCoordinator};
pub use ledger::{DedupLedger, DEDUP_WINDOW};
