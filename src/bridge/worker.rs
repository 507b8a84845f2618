//! Background task that drives [`PollBridge::poll`] at a fixed cadence.
//!
//! Without this loop nothing fetches inbound data, and readers would wait
//! forever. Transport failures are logged and the loop carries on; closing the
//! bridge interrupts the sleep and ends the task.

use crate::bridge::PollBridge;
use crate::error::BridgeError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Consecutive failures after which logging escalates to `error`.
const ESCALATE_AFTER: u32 = 5;

/// Handle to a running poll loop.
pub struct PollWorker {
    handle: JoinHandle<()>,
}

impl PollWorker {
    /// Spawn the poll loop on the current Tokio runtime.
    pub fn spawn(bridge: Arc<PollBridge>, poll_interval: Duration) -> Self {
        let handle = tokio::spawn(run(bridge, poll_interval));
        Self { handle }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit. Close the bridge first or this waits forever.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "poll worker panicked");
        }
    }

    /// Stop the loop without waiting for it.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run(bridge: Arc<PollBridge>, poll_interval: Duration) {
    let mut closed = bridge.subscribe_closed();
    let mut consecutive_failures: u32 = 0;

    debug!(interval_ms = poll_interval.as_millis() as u64, "poll worker started");

    while !bridge.is_closed() {
        match bridge.poll().await {
            Ok(()) => consecutive_failures = 0,
            Err(BridgeError::Closed) => break,
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                if consecutive_failures >= ESCALATE_AFTER {
                    error!(
                        error = %e,
                        consecutive_failures,
                        "poll failed repeatedly, will retry next tick"
                    );
                } else {
                    warn!(error = %e, "poll failed, will retry next tick");
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            // The flag only ever flips to true, so any change means closed.
            _ = closed.changed() => break,
        }
    }

    debug!("poll worker stopped");
}
