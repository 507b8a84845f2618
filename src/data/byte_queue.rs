//! Growable FIFO byte queue with suspending reads.
//!
//! The poll worker appends decoded gateway bytes and the stream consumer reads
//! them back in order. Reads suspend the calling task until data arrives or the
//! queue is finished; appends never block.
//!
//! # Memory Layout
//! ```text
//! storage: [ consumed | unread            | free              ]
//!            0          read_index          write_index        storage.len()
//! ```
//!
//! `storage.len()` is the capacity. When an append does not fit past
//! `write_index`, capacity doubles (or grows to fit, whichever is larger).
//! [`ByteQueue::compact`] moves the unread region back to index 0.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

/// Capacity used by [`ByteQueue::default`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// The queue was finished and holds no more bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stream closed")]
pub struct QueueClosed;

struct QueueState {
    storage: Vec<u8>,
    read_index: usize,
    write_index: usize,
    done: bool,
}

impl QueueState {
    fn available(&self) -> usize {
        self.write_index - self.read_index
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.available());
        buf[..n].copy_from_slice(&self.storage[self.read_index..self.read_index + n]);
        self.read_index += n;
        n
    }
}

/// Thread-safe FIFO byte buffer shared by one producer and one consumer.
///
/// # Example
///
/// ```
/// use hub_stream::data::ByteQueue;
///
/// # tokio_test::block_on(async {
/// let queue = ByteQueue::new(8);
/// queue.append(&[0x02, 0x50]);
/// assert_eq!(queue.read_one().await, Ok(0x02));
///
/// queue.finish();
/// assert_eq!(queue.read_one().await, Ok(0x50));
/// assert!(queue.read_one().await.is_err());
/// # })
/// ```
pub struct ByteQueue {
    state: Mutex<QueueState>,
    data_ready: Notify,
}

impl ByteQueue {
    /// Create a queue with the given initial backing capacity.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                storage: vec![0; initial_capacity],
                read_index: 0,
                write_index: 0,
                done: false,
            }),
            data_ready: Notify::new(),
        }
    }

    /// Append bytes and wake any suspended reader.
    ///
    /// Bytes appended after [`finish`](Self::finish) are dropped.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.done {
                warn!(dropped = bytes.len(), "append after finish, dropping bytes");
                return;
            }

            let needed = state.write_index + bytes.len();
            if needed > state.storage.len() {
                let new_capacity = (state.storage.len() * 2).max(needed);
                state.storage.resize(new_capacity, 0);
            }

            let start = state.write_index;
            state.storage[start..needed].copy_from_slice(bytes);
            state.write_index = needed;
        }

        self.data_ready.notify_waiters();
    }

    /// Read the next byte, suspending until one is available.
    ///
    /// Returns [`QueueClosed`] once the queue is finished and drained.
    pub async fn read_one(&self) -> Result<u8, QueueClosed> {
        let mut byte = [0u8; 1];
        self.read_into(&mut byte, 1).await?;
        Ok(byte[0])
    }

    /// Copy up to `max_len` bytes into `buf`, suspending until at least one is
    /// available.
    ///
    /// A successful return always carries at least one byte unless `max_len` or
    /// `buf` is zero-length.
    pub async fn read_into(&self, buf: &mut [u8], max_len: usize) -> Result<usize, QueueClosed> {
        let limit = max_len.min(buf.len());
        if limit == 0 {
            return Ok(0);
        }

        loop {
            // Register before checking state so an append between the check and
            // the await still wakes us.
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.available() > 0 {
                    return Ok(state.copy_out(&mut buf[..limit]));
                }
                if state.done {
                    return Err(QueueClosed);
                }
            }

            notified.await;
        }
    }

    /// Suspend until a read would not suspend: bytes are available or the queue
    /// is finished. Consumes nothing.
    pub async fn readable(&self) {
        loop {
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state.available() > 0 || state.done {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Copy whatever is available without suspending.
    pub fn try_read_into(&self, buf: &mut [u8]) -> Result<usize, QueueClosed> {
        let mut state = self.state.lock();
        if state.available() == 0 && state.done {
            return Err(QueueClosed);
        }
        Ok(state.copy_out(buf))
    }

    /// Mark the queue finished and wake every waiter. Idempotent.
    pub fn finish(&self) {
        self.state.lock().done = true;
        self.data_ready.notify_waiters();
    }

    /// Drop the consumed prefix by moving unread bytes to the front.
    pub fn compact(&self) {
        let mut state = self.state.lock();
        if state.read_index == 0 {
            return;
        }
        let (start, end) = (state.read_index, state.write_index);
        state.storage.copy_within(start..end, 0);
        state.write_index = end - start;
        state.read_index = 0;
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.state.lock().available()
    }

    /// Whether there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Current backing capacity.
    pub fn capacity(&self) -> usize {
        self.state.lock().storage.len()
    }

    /// Whether [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.state.lock().done
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
