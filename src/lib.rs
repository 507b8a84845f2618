//! # hub_stream
//!
//! Presents an HTTP-polled ring-buffer gateway (such as a home-automation hub
//! that exposes its serial traffic only through a status page) as an ordinary
//! bidirectional byte stream.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: The [`SnapshotFetcher`](hardware::SnapshotFetcher) trait that a
//!   gateway transport implements, plus [`MockHub`](hardware::MockHub), a simulated
//!   gateway used by tests and the demo.
//! - **`bridge`**: Snapshot parsing and tail reconciliation, the
//!   [`PollBridge`](bridge::PollBridge) that serializes polls and writes, and the
//!   background [`PollWorker`](bridge::PollWorker).
//! - **`data`**: The [`ByteQueue`](data::ByteQueue) that carries inbound bytes from
//!   the poll worker to readers.
//! - **`stream`**: [`StreamAdapter`](stream::StreamAdapter) with `AsyncRead` and
//!   `AsyncWrite` halves.
//! - **`config`**: Figment-based configuration loading and validation.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The crate-wide [`BridgeError`](error::BridgeError).

pub mod bridge;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod stream;

pub use error::{BridgeError, BridgeResult};
pub use stream::StreamAdapter;
