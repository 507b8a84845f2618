//! Collaborator boundary to the gateway transport.

use async_trait::async_trait;

/// An error that can occur when talking to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The gateway could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The gateway refused or failed an outbound payload.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A status or clear request failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else the transport wants to report.
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Boundary to the gateway that exposes its link as a polled ring buffer.
///
/// Implementations own the transport (HTTP requests, authentication, timeouts).
/// The bridge only ever calls these three operations, and never concurrently:
/// every call happens under the bridge's lock.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch the raw buffer status.
    ///
    /// The reply is a run of hex pairs holding the gateway's ring buffer contents,
    /// followed by two hex characters that encode the tail pointer. The bridge
    /// splits and validates the reply itself, so a corrupt reply must still be
    /// returned as `Ok`.
    async fn fetch_status(&self) -> Result<String, TransportError>;

    /// Transmit a hex-encoded payload. No response body is consumed.
    async fn send(&self, payload_hex: &str) -> Result<(), TransportError>;

    /// Reset the gateway ring buffer and its tail pointer to zero.
    async fn clear(&self) -> Result<(), TransportError>;

    /// Short description used in log fields.
    fn info(&self) -> String {
        "gateway".to_string()
    }
}
