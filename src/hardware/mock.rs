//! Mock gateway for testing
//!
//! `MockHub` implements [`SnapshotFetcher`] for exercising the bridge without
//! physical hardware. It simulates the gateway's ring buffer:
//! - Device traffic written at the tail pointer with wrap-around
//! - Buffer clears on request and after accepting a payload
//! - Controllable failure injection and reply corruption
//! - Call logging for test verification

use crate::hardware::fetcher::{SnapshotFetcher, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Ring size used by [`MockHub::default`], matching common hub firmware.
pub const DEFAULT_RING_SIZE: usize = 100;

/// Largest ring a one-byte tail pointer can address.
pub const MAX_RING_SIZE: usize = 256;

struct HubState {
    ring: Vec<u8>,
    tail: usize,
    sent: Vec<Vec<u8>>,
}

impl HubState {
    fn clear(&mut self) {
        self.ring.fill(0);
        self.tail = 0;
    }
}

/// Simulated ring-buffer gateway
///
/// # Example
///
/// ```
/// use hub_stream::hardware::{MockHub, SnapshotFetcher};
///
/// # tokio_test::block_on(async {
/// let hub = MockHub::new(4);
/// hub.inject(&[0x02, 0x50]);
/// assert_eq!(hub.fetch_status().await.unwrap(), "0250000002");
/// # })
/// ```
pub struct MockHub {
    state: Mutex<HubState>,
    latency: Duration,
    clear_on_send: bool,
    should_fail_next: AtomicBool,
    should_fail_send: AtomicBool,
    corrupt_next: AtomicBool,
    call_log: Mutex<Vec<String>>,
}

impl MockHub {
    /// Create a hub with a ring of `ring_size` bytes.
    ///
    /// The size is clamped to `1..=MAX_RING_SIZE` so that the tail pointer
    /// always fits in its two hex digits.
    pub fn new(ring_size: usize) -> Self {
        let ring_size = ring_size.clamp(1, MAX_RING_SIZE);
        Self {
            state: Mutex::new(HubState {
                ring: vec![0; ring_size],
                tail: 0,
                sent: Vec::new(),
            }),
            latency: Duration::ZERO,
            clear_on_send: true,
            should_fail_next: AtomicBool::new(false),
            should_fail_send: AtomicBool::new(false),
            corrupt_next: AtomicBool::new(false),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Set simulated latency applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Choose whether accepting a payload also clears the ring (default true).
    pub fn with_clear_on_send(mut self, enabled: bool) -> Self {
        self.clear_on_send = enabled;
        self
    }

    /// Simulate device traffic arriving at the gateway.
    ///
    /// Bytes are written at the tail pointer and wrap to index 0 at the end of
    /// the ring, exactly like the hardware does.
    pub fn inject(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        let size = state.ring.len();
        for &byte in bytes {
            let idx = state.tail;
            state.ring[idx] = byte;
            state.tail = (idx + 1) % size;
        }
    }

    /// Overwrite the whole ring and tail pointer.
    pub fn set_buffer(&self, ring: &[u8], tail: usize) {
        let mut state = self.state.lock();
        let size = state.ring.len();
        let n = ring.len().min(size);
        state.ring.fill(0);
        state.ring[..n].copy_from_slice(&ring[..n]);
        state.tail = tail % size;
    }

    /// Current tail pointer.
    pub fn tail(&self) -> usize {
        self.state.lock().tail
    }

    /// Payloads accepted through [`SnapshotFetcher::send`], decoded.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Trigger a failure on the next operation
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Fail the next [`SnapshotFetcher::send`] only, leaving fetches alone.
    pub fn trigger_send_failure(&self) {
        self.should_fail_send.store(true, Ordering::SeqCst);
    }

    /// Return an unparsable tail field from the next status fetch.
    pub fn corrupt_next_status(&self) {
        self.corrupt_next.store(true, Ordering::SeqCst);
    }

    /// Get a copy of the call log for verification
    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    /// Clear the call log
    pub fn clear_call_log(&self) {
        self.call_log.lock().clear();
    }

    fn log_call(&self, method: &str) {
        self.call_log.lock().push(method.to_string());
    }

    async fn simulate(&self, method: &str) -> Result<(), TransportError> {
        self.log_call(method);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "mock {method} failure"
            )));
        }
        Ok(())
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new(DEFAULT_RING_SIZE)
    }
}

#[async_trait]
impl SnapshotFetcher for MockHub {
    async fn fetch_status(&self) -> Result<String, TransportError> {
        self.simulate("fetch_status").await?;

        let state = self.state.lock();
        let mut reply = hex::encode_upper(&state.ring);
        if self.corrupt_next.swap(false, Ordering::SeqCst) {
            reply.push_str("ZZ");
        } else {
            // A full 256-byte ring reports tail 0 after wrapping, so this always fits.
            reply.push_str(&format!("{:02X}", state.tail as u8));
        }
        Ok(reply)
    }

    async fn send(&self, payload_hex: &str) -> Result<(), TransportError> {
        self.simulate("send").await?;
        if self.should_fail_send.swap(false, Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock send rejected".to_string()));
        }

        let payload = hex::decode(payload_hex)
            .map_err(|e| TransportError::SendFailed(format!("payload is not hex: {e}")))?;

        let mut state = self.state.lock();
        state.sent.push(payload);
        if self.clear_on_send {
            state.clear();
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), TransportError> {
        self.simulate("clear").await?;
        self.state.lock().clear();
        Ok(())
    }

    fn info(&self) -> String {
        format!("MockHub (ring: {} bytes)", self.state.lock().ring.len())
    }
}
