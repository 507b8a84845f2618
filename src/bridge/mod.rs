//! Polling-to-stream bridge.
//!
//! - [`snapshot`]: parsing gateway status replies and reconciling them against
//!   the previous tail pointer.
//! - [`poll_bridge`]: [`PollBridge`], which serializes polls and writes and feeds
//!   the [`ByteQueue`](crate::data::ByteQueue).
//! - [`worker`]: [`PollWorker`], the background loop that drives polling.

pub mod poll_bridge;
pub mod snapshot;
pub mod worker;

pub use poll_bridge::{BridgeStats, PollBridge};
pub use snapshot::{reconcile, reconcile_raw, BufferSnapshot, PollOutcome, Reconciled, SnapshotError};
pub use worker::PollWorker;
