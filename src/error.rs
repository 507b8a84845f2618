//! Custom error types for the bridge.
//!
//! This module defines the primary error type, `BridgeError`, returned by the
//! operations of [`PollBridge`](crate::bridge::PollBridge) and by configuration
//! loading. Using the `thiserror` crate it gives one consistent way to report the
//! few things that can go wrong between a consumer and the gateway.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`**: Wraps [`TransportError`], a failure reported by the
//!   [`SnapshotFetcher`](crate::hardware::SnapshotFetcher) collaborator while
//!   fetching, sending or clearing. The poll worker logs these and keeps going;
//!   direct callers of `open()`/`write()` decide whether to retry.
//! - **`Closed`**: The bridge has been closed. Further polls and writes are refused.
//! - **`NotOpen`**: `poll()` or `write()` was called before a successful `open()`.
//! - **`Config`**: Wraps errors from `figment` while loading configuration files.
//! - **`Configuration`**: Semantic configuration errors caught by validation.
//!
//! Malformed status replies have no variant here: they are absorbed inside
//! reconciliation (see [`SnapshotError`](crate::bridge::SnapshotError)) and never
//! reach a caller of `poll()`. End of stream on the read side is
//! [`QueueClosed`](crate::data::QueueClosed), which is not a failure.

use crate::hardware::TransportError;
use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by bridge operations and configuration loading.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The gateway transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bridge was closed.
    #[error("Bridge is closed")]
    Closed,

    /// The bridge has not been opened yet.
    #[error("Bridge is not open; call open() first")]
    NotOpen,

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for BridgeError {
    fn from(value: figment::Error) -> Self {
        BridgeError::Config(Box::new(value))
    }
}

impl BridgeError {
    /// Whether the poll loop may keep running after this error.
    ///
    /// Transport failures are expected to be transient; everything else means the
    /// bridge is shut down or misused.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}

impl From<BridgeError> for std::io::Error {
    fn from(value: BridgeError) -> Self {
        let kind = match &value {
            BridgeError::Closed => std::io::ErrorKind::BrokenPipe,
            BridgeError::NotOpen => std::io::ErrorKind::NotConnected,
            BridgeError::Transport(TransportError::Io(err)) => err.kind(),
            BridgeError::Transport(_) => std::io::ErrorKind::Other,
            BridgeError::Config(_) | BridgeError::Configuration(_) => {
                std::io::ErrorKind::InvalidInput
            }
        };
        std::io::Error::new(kind, value)
    }
}
