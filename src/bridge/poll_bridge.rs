//! Serialized polling and writing against one gateway.
//!
//! [`PollBridge`] owns the tracking state for a single gateway connection. Every
//! poll and every write runs under one async mutex, so a write can never slip
//! between a poll's fetch and its reconciliation.

use crate::bridge::snapshot::{reconcile_raw, PollOutcome};
use crate::data::ByteQueue;
use crate::error::{BridgeError, BridgeResult};
use crate::hardware::{SnapshotFetcher, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, trace, warn};

/// Tracking state, only touched while holding the bridge lock.
#[derive(Debug, Default)]
struct StreamState {
    /// Tail seen on the previous successful poll; `None` until anchored.
    last_tail: Option<u8>,
    opened: bool,
}

/// Counters describing bridge activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Successful status fetches.
    pub polls: u64,
    /// Bytes appended to the queue.
    pub bytes_received: u64,
    /// Payload bytes accepted by the gateway.
    pub bytes_sent: u64,
    /// Payloads accepted by the gateway.
    pub writes: u64,
    /// Polls that reset tracking because of a malformed reply.
    pub resyncs: u64,
    /// Polls that observed a cleared buffer.
    pub buffer_clears: u64,
    /// Polls that observed the ring wrapping.
    pub wraps: u64,
    /// Failed fetch, send or clear calls.
    pub transport_errors: u64,
}

#[derive(Default)]
struct StatCounters {
    polls: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    writes: AtomicU64,
    resyncs: AtomicU64,
    buffer_clears: AtomicU64,
    wraps: AtomicU64,
    transport_errors: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            polls: self.polls.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            buffer_clears: self.buffer_clears.load(Ordering::Relaxed),
            wraps: self.wraps.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Bridge between a polled gateway and a [`ByteQueue`].
///
/// # Example
///
/// ```
/// use hub_stream::bridge::PollBridge;
/// use hub_stream::data::ByteQueue;
/// use hub_stream::hardware::MockHub;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let hub = Arc::new(MockHub::new(16));
/// let queue = Arc::new(ByteQueue::default());
/// let bridge = PollBridge::new(hub.clone(), queue.clone());
///
/// bridge.open().await.unwrap();
/// hub.inject(&[0x02, 0x50]);
/// bridge.poll().await.unwrap();
///
/// assert_eq!(queue.read_one().await, Ok(0x02));
/// # })
/// ```
pub struct PollBridge {
    fetcher: Arc<dyn SnapshotFetcher>,
    queue: Arc<ByteQueue>,
    state: Mutex<StreamState>,
    closed: watch::Sender<bool>,
    stats: StatCounters,
}

impl PollBridge {
    /// Create a bridge that feeds `queue` from `fetcher`.
    pub fn new(fetcher: Arc<dyn SnapshotFetcher>, queue: Arc<ByteQueue>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            fetcher,
            queue,
            state: Mutex::new(StreamState::default()),
            closed,
            stats: StatCounters::default(),
        }
    }

    /// Clear the gateway buffer and start tracking from tail 0.
    ///
    /// A transport failure here should be treated as fatal for this connection
    /// attempt.
    #[instrument(skip(self), fields(gateway = %self.fetcher.info()))]
    pub async fn open(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }

        self.fetcher
            .clear()
            .await
            .map_err(|e| self.transport_failure(e))?;

        state.last_tail = Some(0);
        state.opened = true;
        info!("bridge opened");
        Ok(())
    }

    /// Fetch one snapshot and queue whatever arrived since the last poll.
    ///
    /// Malformed replies are absorbed: tracking is reset and `Ok(())` returned.
    pub async fn poll(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        self.poll_locked(&mut state).await
    }

    async fn poll_locked(&self, state: &mut StreamState) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        if !state.opened {
            return Err(BridgeError::NotOpen);
        }

        let raw = self
            .fetcher
            .fetch_status()
            .await
            .map_err(|e| self.transport_failure(e))?;
        StatCounters::bump(&self.stats.polls, 1);

        let reconciled = reconcile_raw(state.last_tail, &raw);
        match &reconciled.outcome {
            PollOutcome::Malformed(e) => {
                StatCounters::bump(&self.stats.resyncs, 1);
                warn!(error = %e, "malformed status reply, resynchronizing");
            }
            PollOutcome::Resynchronized => {
                debug!(tail = ?reconciled.next_tail, "tail anchored");
            }
            PollOutcome::Cleared => {
                StatCounters::bump(&self.stats.buffer_clears, 1);
                debug!("gateway buffer cleared");
            }
            PollOutcome::Wrapped { discarded_residue } => {
                StatCounters::bump(&self.stats.wraps, 1);
                debug!(
                    from = ?state.last_tail,
                    to = ?reconciled.next_tail,
                    discarded_residue,
                    "ring buffer wrapped"
                );
            }
            PollOutcome::Advanced => {
                trace!(from = ?state.last_tail, to = ?reconciled.next_tail, "tail advanced");
            }
        }

        if !reconciled.bytes.is_empty() {
            self.queue.compact();
            self.queue.append(&reconciled.bytes);
            StatCounters::bump(&self.stats.bytes_received, reconciled.bytes.len() as u64);
            debug!(bytes = reconciled.bytes.len(), "queued inbound bytes");
        }

        state.last_tail = reconciled.next_tail;
        Ok(())
    }

    /// Drain pending inbound bytes, then transmit `payload`.
    ///
    /// The gateway resets its tail pointer when it accepts a payload, so tracking
    /// restarts at 0 afterwards. If the internal poll fails nothing is sent.
    pub async fn write(&self, payload: &[u8]) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        if payload.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        self.poll_locked(&mut state).await?;

        let payload_hex = hex::encode_upper(payload);
        if let Err(e) = self.fetcher.send(&payload_hex).await {
            // Unknown whether the gateway reset its pointer; re-anchor on the next poll.
            state.last_tail = None;
            return Err(self.transport_failure(e));
        }

        state.last_tail = Some(0);
        StatCounters::bump(&self.stats.writes, 1);
        StatCounters::bump(&self.stats.bytes_sent, payload.len() as u64);
        debug!(bytes = payload.len(), "payload sent");
        Ok(())
    }

    /// Mark the bridge closed and finish the queue. Idempotent.
    pub fn close(&self) {
        let was_closed = self.closed.send_replace(true);
        self.queue.finish();
        if !was_closed {
            info!("bridge closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Receiver that observes `true` once the bridge is closed.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Whether [`open`](Self::open) has succeeded.
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.opened
    }

    /// Tail pointer remembered from the last poll.
    pub async fn last_tail(&self) -> Option<u8> {
        self.state.lock().await.last_tail
    }

    /// Activity counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats.snapshot()
    }

    /// Queue this bridge feeds.
    pub fn queue(&self) -> &Arc<ByteQueue> {
        &self.queue
    }

    fn transport_failure(&self, err: TransportError) -> BridgeError {
        StatCounters::bump(&self.stats.transport_errors, 1);
        BridgeError::Transport(err)
    }
}

impl Drop for PollBridge {
    fn drop(&mut self) {
        self.queue.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockHub;
    use tracing_test::traced_test;

    fn bridge_for(hub: &Arc<MockHub>) -> (PollBridge, Arc<ByteQueue>) {
        let queue = Arc::new(ByteQueue::new(8));
        let fetcher: Arc<dyn SnapshotFetcher> = hub.clone();
        (PollBridge::new(fetcher, Arc::clone(&queue)), queue)
    }

    fn drain(queue: &ByteQueue) -> Vec<u8> {
        let mut buf = vec![0u8; queue.available()];
        let n = queue.try_read_into(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn open_clears_gateway() {
        let hub = Arc::new(MockHub::new(8));
        hub.inject(&[1, 2, 3]);
        let (bridge, _queue) = bridge_for(&hub);

        bridge.open().await.unwrap();

        assert_eq!(hub.call_log(), vec!["clear"]);
        assert_eq!(hub.tail(), 0);
        assert_eq!(bridge.last_tail().await, Some(0));
        assert!(bridge.is_open().await);
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let hub = Arc::new(MockHub::new(8));
        hub.trigger_failure();
        let (bridge, _queue) = bridge_for(&hub);

        assert!(matches!(bridge.open().await, Err(BridgeError::Transport(_))));
        assert!(!bridge.is_open().await);
        assert_eq!(bridge.stats().transport_errors, 1);
    }

    #[tokio::test]
    async fn poll_before_open_is_rejected() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);

        assert!(matches!(bridge.poll().await, Err(BridgeError::NotOpen)));
        assert!(hub.call_log().is_empty());
    }

    #[tokio::test]
    async fn poll_queues_new_bytes_once() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.inject(&[0x02, 0x50, 0x11]);
        bridge.poll().await.unwrap();
        bridge.poll().await.unwrap();

        assert_eq!(drain(&queue), vec![0x02, 0x50, 0x11]);
        assert_eq!(bridge.last_tail().await, Some(3));
        assert_eq!(bridge.stats().bytes_received, 3);
        assert_eq!(bridge.stats().polls, 2);
    }

    #[tokio::test]
    async fn poll_follows_ring_wrap() {
        let hub = Arc::new(MockHub::new(4));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.inject(&[1, 2, 3]);
        bridge.poll().await.unwrap();
        hub.inject(&[4, 5]);
        bridge.poll().await.unwrap();

        assert_eq!(drain(&queue), vec![1, 2, 3, 4, 5]);
        assert_eq!(bridge.last_tail().await, Some(1));
        assert_eq!(bridge.stats().wraps, 1);
    }

    #[tokio::test]
    async fn cleared_gateway_resets_tail() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.inject(&[1, 2]);
        bridge.poll().await.unwrap();
        hub.clear().await.unwrap();
        bridge.poll().await.unwrap();

        assert_eq!(drain(&queue), vec![1, 2]);
        assert_eq!(bridge.last_tail().await, Some(0));
        assert_eq!(bridge.stats().buffer_clears, 1);
    }

    #[tokio::test]
    async fn malformed_reply_resynchronizes() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.inject(&[1]);
        hub.corrupt_next_status();
        bridge.poll().await.unwrap();
        assert_eq!(bridge.last_tail().await, None);

        // Next good reply only anchors; bytes seen during the corruption are lost.
        hub.inject(&[2]);
        bridge.poll().await.unwrap();
        assert_eq!(bridge.last_tail().await, Some(2));
        assert!(queue.is_empty());

        hub.inject(&[3]);
        bridge.poll().await.unwrap();
        assert_eq!(drain(&queue), vec![3]);
        assert_eq!(bridge.stats().resyncs, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_reply_is_logged() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.corrupt_next_status();
        bridge.poll().await.unwrap();

        assert!(logs_contain("malformed status reply"));
    }

    #[tokio::test]
    async fn poll_transport_failure_is_returned() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.trigger_failure();
        let err = bridge.poll().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(bridge.last_tail().await, Some(0));
    }

    #[tokio::test]
    async fn write_drains_then_sends() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();
        hub.clear_call_log();

        hub.inject(&[0xAA, 0xBB]);
        bridge.write(&[0x02, 0x62]).await.unwrap();

        assert_eq!(hub.call_log(), vec!["fetch_status", "send"]);
        assert_eq!(drain(&queue), vec![0xAA, 0xBB]);
        assert_eq!(hub.sent_payloads(), vec![vec![0x02, 0x62]]);
        assert_eq!(bridge.last_tail().await, Some(0));

        let stats = bridge.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.bytes_sent, 2);
    }

    #[tokio::test]
    async fn write_aborts_when_drain_fails() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.trigger_failure();
        assert!(bridge.write(&[0x01]).await.is_err());
        assert!(hub.sent_payloads().is_empty());
    }

    #[tokio::test]
    async fn send_failure_forces_resync() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        hub.trigger_send_failure();
        assert!(matches!(
            bridge.write(&[0x01]).await,
            Err(BridgeError::Transport(TransportError::SendFailed(_)))
        ));
        assert_eq!(bridge.last_tail().await, None);
    }

    #[tokio::test]
    async fn empty_write_is_noop() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        bridge.open().await.unwrap();
        hub.clear_call_log();

        bridge.write(&[]).await.unwrap();
        assert!(hub.call_log().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, queue) = bridge_for(&hub);
        bridge.open().await.unwrap();

        bridge.close();
        bridge.close();

        assert!(bridge.is_closed());
        assert!(queue.is_finished());
        assert!(matches!(bridge.poll().await, Err(BridgeError::Closed)));
        assert!(matches!(bridge.write(&[1]).await, Err(BridgeError::Closed)));
        assert!(matches!(bridge.open().await, Err(BridgeError::Closed)));
    }

    #[tokio::test]
    async fn close_notifies_subscribers() {
        let hub = Arc::new(MockHub::new(8));
        let (bridge, _queue) = bridge_for(&hub);
        let mut closed = bridge.subscribe_closed();

        bridge.close();
        closed.changed().await.unwrap();
        assert!(*closed.borrow());
    }
}
