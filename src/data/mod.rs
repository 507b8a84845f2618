//! Buffering between the poll worker and stream consumers.
pub mod byte_queue;

pub use byte_queue::{ByteQueue, QueueClosed, DEFAULT_CAPACITY};
