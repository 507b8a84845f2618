//! Gateway Adapters
//!
//! The collaborator boundary to hub hardware ([`SnapshotFetcher`]) and an
//! in-process simulator ([`MockHub`]) for tests and demos.

pub mod fetcher;
pub use fetcher::{SnapshotFetcher, TransportError};

pub mod mock;
pub use mock::MockHub;
