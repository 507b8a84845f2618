//! Byte-stream facade over a [`PollBridge`]
//!
//! [`StreamAdapter`] hands out a [`StreamReader`] that drains the
//! [`ByteQueue`] and a [`StreamWriter`] that forwards payloads to
//! [`PollBridge::write`]. Both implement the Tokio I/O traits, so protocol
//! code written against `AsyncRead`/`AsyncWrite` works unchanged on top of a
//! polled gateway.
//!
//! # Example
//!
//! ```
//! use hub_stream::config::BridgeSettings;
//! use hub_stream::hardware::MockHub;
//! use hub_stream::stream::StreamAdapter;
//! use std::sync::Arc;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # tokio_test::block_on(async {
//! let hub = Arc::new(MockHub::new(32));
//! let settings = BridgeSettings { poll_interval_ms: 5, ..Default::default() };
//! let mut adapter = StreamAdapter::connect(hub.clone(), &settings).await.unwrap();
//!
//! adapter.writer().write_all(&[0x02, 0x60]).await.unwrap();
//! assert_eq!(hub.sent_payloads(), vec![vec![0x02, 0x60]]);
//!
//! hub.inject(&[0x02, 0x60, 0x06]);
//! let mut reply = [0u8; 3];
//! adapter.reader().read_exact(&mut reply).await.unwrap();
//! assert_eq!(reply, [0x02, 0x60, 0x06]);
//!
//! adapter.close().await;
//! # })
//! ```

use crate::bridge::{BridgeStats, PollBridge, PollWorker};
use crate::config::BridgeSettings;
use crate::data::{ByteQueue, QueueClosed};
use crate::error::{BridgeError, BridgeResult};
use crate::hardware::SnapshotFetcher;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::info;

type ReadyFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type WriteFuture = Pin<Box<dyn Future<Output = BridgeResult<()>> + Send>>;

/// Stream endpoints for one gateway connection.
pub struct StreamAdapter {
    bridge: Arc<PollBridge>,
    queue: Arc<ByteQueue>,
    worker: Option<PollWorker>,
}

impl StreamAdapter {
    /// Wrap an existing bridge and the queue it feeds.
    ///
    /// No poll worker is started; the caller drives [`PollBridge::poll`].
    pub fn new(bridge: Arc<PollBridge>, queue: Arc<ByteQueue>) -> Self {
        Self {
            bridge,
            queue,
            worker: None,
        }
    }

    /// Open a bridge on `fetcher` and start polling it in the background.
    pub async fn connect(
        fetcher: Arc<dyn SnapshotFetcher>,
        settings: &BridgeSettings,
    ) -> BridgeResult<Self> {
        let gateway = fetcher.info();
        let queue = Arc::new(ByteQueue::new(settings.initial_capacity));
        let bridge = Arc::new(PollBridge::new(fetcher, Arc::clone(&queue)));
        bridge.open().await?;

        let worker = PollWorker::spawn(Arc::clone(&bridge), settings.poll_interval());
        info!(
            gateway = %gateway,
            poll_interval_ms = settings.poll_interval_ms,
            "stream connected"
        );

        Ok(Self {
            bridge,
            queue,
            worker: Some(worker),
        })
    }

    /// Inbound half.
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            queue: Arc::clone(&self.queue),
            pending: None,
        }
    }

    /// Outbound half.
    pub fn writer(&self) -> StreamWriter {
        StreamWriter {
            bridge: Arc::clone(&self.bridge),
            pending: None,
        }
    }

    /// Underlying bridge.
    pub fn bridge(&self) -> &Arc<PollBridge> {
        &self.bridge
    }

    /// Bridge activity counters.
    pub fn stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.bridge.is_closed()
    }

    /// Close the bridge and wait for the poll worker to stop.
    ///
    /// Readers drain what is already queued and then see end of stream.
    pub async fn close(&mut self) {
        self.bridge.close();
        if let Some(worker) = self.worker.take() {
            worker.join().await;
        }
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        // The worker observes the flag and exits on its own.
        self.bridge.close();
    }
}

/// Reading half of a [`StreamAdapter`].
pub struct StreamReader {
    queue: Arc<ByteQueue>,
    pending: Option<ReadyFuture>,
}

// The halves are not `Sync`, so these return futures that own a queue or
// bridge handle instead of borrowing `self`, keeping them `Send`.
impl StreamReader {
    /// Next byte, suspending until one arrives.
    pub fn read_one(&self) -> impl Future<Output = Result<u8, QueueClosed>> + Send + 'static {
        let queue = Arc::clone(&self.queue);
        async move { queue.read_one().await }
    }

    /// Up to `buf.len()` bytes, suspending until at least one arrives.
    pub fn read<'a>(
        &self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<usize, QueueClosed>> + Send + 'a {
        let queue = Arc::clone(&self.queue);
        async move {
            let len = buf.len();
            queue.read_into(buf, len).await
        }
    }
}

impl AsyncRead for StreamReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            match self.queue.try_read_into(buf.initialize_unfilled()) {
                Ok(0) => {}
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                // Finished and drained: end of stream
                Err(QueueClosed) => return Poll::Ready(Ok(())),
            }

            let queue = Arc::clone(&self.queue);
            let pending = self
                .pending
                .get_or_insert_with(|| Box::pin(async move { queue.readable().await }));
            match pending.as_mut().poll(cx) {
                Poll::Ready(()) => self.pending = None,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Writing half of a [`StreamAdapter`].
pub struct StreamWriter {
    bridge: Arc<PollBridge>,
    pending: Option<(WriteFuture, usize)>,
}

impl StreamWriter {
    /// Drain inbound data, then send `payload` to the gateway.
    pub fn write<'a>(
        &self,
        payload: &'a [u8],
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'a {
        let bridge = Arc::clone(&self.bridge);
        async move { bridge.write(payload).await }
    }

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let Some((future, len)) = self.pending.as_mut() else {
            return Poll::Ready(Ok(0));
        };
        let len = *len;
        match future.as_mut().poll(cx) {
            Poll::Ready(result) => {
                self.pending = None;
                Poll::Ready(result.map(|()| len).map_err(io::Error::from))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for StreamWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        // After Pending the caller retries with the same buffer, so an in-flight
        // write completes for it.
        if self.pending.is_none() {
            if self.bridge.is_closed() {
                return Poll::Ready(Err(BridgeError::Closed.into()));
            }
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }
            let bridge = Arc::clone(&self.bridge);
            let payload = buf.to_vec();
            let future: WriteFuture = Box::pin(async move { bridge.write(&payload).await });
            self.pending = Some((future, buf.len()));
        }
        self.poll_pending(cx)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Every accepted write has already reached the gateway.
        self.poll_pending(cx).map_ok(|_| ())
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.poll_pending(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(_)) => {}
        }
        self.bridge.close();
        Poll::Ready(Ok(()))
    }
}
