//! Gateway status replies and their reconciliation against the previous poll.
//!
//! The gateway reports its ring buffer as a hex string whose last two characters
//! encode the tail pointer. [`reconcile`] compares one such reply with the tail
//! seen on the previous poll and works out which bytes are new.

use thiserror::Error;

/// A status reply that could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Reply is shorter than the two-character tail field.
    #[error("status reply too short for a tail field ({0} chars)")]
    MissingTail(usize),

    /// Tail field is not a hex byte.
    #[error("tail field {0:?} is not a hex byte")]
    InvalidTail(String),

    /// Buffer body is not an even-length run of hex pairs.
    #[error("buffer data is not valid hex: {0}")]
    InvalidHex(String),

    /// Tail points past the end of the buffer.
    #[error("tail {tail} is beyond the {len}-byte buffer")]
    TailOutOfRange {
        /// Reported tail pointer
        tail: u8,
        /// Decoded buffer length
        len: usize,
    },
}

/// One decoded copy of the gateway ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Buffer contents, decoded from hex pairs.
    pub data: Vec<u8>,
    /// Byte index the gateway will write next.
    pub tail: u8,
}

impl BufferSnapshot {
    /// Split a raw status reply into buffer data and tail pointer.
    ///
    /// # Example
    /// ```
    /// use hub_stream::bridge::BufferSnapshot;
    ///
    /// let snapshot = BufferSnapshot::parse("0250AB0002").unwrap();
    /// assert_eq!(snapshot.data, vec![0x02, 0x50, 0xAB, 0x00]);
    /// assert_eq!(snapshot.tail, 2);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, SnapshotError> {
        let raw = raw.trim();
        if raw.len() < 2 || !raw.is_char_boundary(raw.len() - 2) {
            return Err(SnapshotError::MissingTail(raw.chars().count()));
        }

        let (body, tail_field) = raw.split_at(raw.len() - 2);
        if !tail_field.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SnapshotError::InvalidTail(tail_field.to_string()));
        }
        let tail = u8::from_str_radix(tail_field, 16)
            .map_err(|_| SnapshotError::InvalidTail(tail_field.to_string()))?;

        let data = hex::decode(body).map_err(|e| SnapshotError::InvalidHex(e.to_string()))?;
        if usize::from(tail) > data.len() {
            return Err(SnapshotError::TailOutOfRange {
                tail,
                len: data.len(),
            });
        }

        Ok(Self { data, tail })
    }

    /// Whether the whole buffer holds the fill value, i.e. it was just cleared.
    pub fn is_cleared(&self) -> bool {
        is_fill(&self.data)
    }
}

fn is_fill(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// What a poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Reply was unusable; tracking was reset.
    Malformed(SnapshotError),
    /// No reference tail yet; this poll only anchored it.
    Resynchronized,
    /// Gateway buffer was empty after a clear.
    Cleared,
    /// Tail moved forward (or not at all).
    Advanced,
    /// Tail wrapped past the end of the ring.
    Wrapped {
        /// Whether the pre-wrap segment was discarded as clear residue.
        discarded_residue: bool,
    },
}

/// Result of reconciling one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Newly observed bytes in arrival order.
    pub bytes: Vec<u8>,
    /// Tail to remember for the next poll.
    pub next_tail: Option<u8>,
    /// Which branch was taken.
    pub outcome: PollOutcome,
}

impl Reconciled {
    fn empty(next_tail: Option<u8>, outcome: PollOutcome) -> Self {
        Self {
            bytes: Vec::new(),
            next_tail,
            outcome,
        }
    }
}

/// Parse a raw reply and reconcile it. Malformed replies reset tracking.
pub fn reconcile_raw(last_tail: Option<u8>, raw: &str) -> Reconciled {
    match BufferSnapshot::parse(raw) {
        Ok(snapshot) => reconcile(last_tail, &snapshot),
        Err(e) => Reconciled::empty(None, PollOutcome::Malformed(e)),
    }
}

/// Work out which bytes of `snapshot` arrived since the tail `last_tail`.
///
/// Identical snapshots yield nothing after the first, and a byte is never
/// reported by two consecutive calls that thread `next_tail` through.
pub fn reconcile(last_tail: Option<u8>, snapshot: &BufferSnapshot) -> Reconciled {
    let Some(last_tail) = last_tail else {
        return Reconciled::empty(Some(snapshot.tail), PollOutcome::Resynchronized);
    };

    if snapshot.is_cleared() {
        return Reconciled::empty(Some(0), PollOutcome::Cleared);
    }

    let data = &snapshot.data;
    let last = usize::from(last_tail).min(data.len());
    let tail = usize::from(snapshot.tail);

    let (bytes, outcome) = if tail >= last {
        (data[last..tail].to_vec(), PollOutcome::Advanced)
    } else {
        let before_wrap = &data[last..];
        // An all-zero pre-wrap segment is left over from a clear that raced the wrap.
        let discarded_residue = is_fill(before_wrap);
        let mut bytes = Vec::with_capacity(before_wrap.len() + tail);
        if !discarded_residue {
            bytes.extend_from_slice(before_wrap);
        }
        bytes.extend_from_slice(&data[..tail]);
        (bytes, PollOutcome::Wrapped { discarded_residue })
    };

    Reconciled {
        bytes,
        next_tail: Some(snapshot.tail),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(data: &[u8], tail: u8) -> BufferSnapshot {
        BufferSnapshot {
            data: data.to_vec(),
            tail,
        }
    }

    #[test]
    fn parse_splits_tail() {
        let snap = BufferSnapshot::parse("AABBCCDDEE05").unwrap();
        assert_eq!(snap.data, vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert_eq!(snap.tail, 5);
    }

    #[test]
    fn parse_accepts_lowercase_and_whitespace() {
        let snap = BufferSnapshot::parse(" 0a0b01\n").unwrap();
        assert_eq!(snap.data, vec![0x0A, 0x0B]);
        assert_eq!(snap.tail, 1);
    }

    #[test]
    fn parse_rejects_bad_replies() {
        assert_eq!(BufferSnapshot::parse("A"), Err(SnapshotError::MissingTail(1)));
        assert_eq!(
            BufferSnapshot::parse("AABBZZ"),
            Err(SnapshotError::InvalidTail("ZZ".into()))
        );
        assert_eq!(
            BufferSnapshot::parse("AA+1"),
            Err(SnapshotError::InvalidTail("+1".into()))
        );
        assert!(matches!(
            BufferSnapshot::parse("ABC01"),
            Err(SnapshotError::InvalidHex(_))
        ));
        assert_eq!(
            BufferSnapshot::parse("AABB03"),
            Err(SnapshotError::TailOutOfRange { tail: 3, len: 2 })
        );
    }

    #[test]
    fn no_wrap_delivers_span() {
        let data = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE];
        let out = reconcile(Some(2), &snapshot(&data, 5));
        assert_eq!(out.bytes, vec![0xCC, 0xDD, 0xEE]);
        assert_eq!(out.next_tail, Some(5));
        assert_eq!(out.outcome, PollOutcome::Advanced);
    }

    #[test]
    fn wrap_delivers_end_then_start() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let out = reconcile(Some(8), &snapshot(&data, 2));
        assert_eq!(out.bytes, vec![9, 10, 1, 2]);
        assert_eq!(out.next_tail, Some(2));
        assert_eq!(
            out.outcome,
            PollOutcome::Wrapped {
                discarded_residue: false
            }
        );
    }

    #[test]
    fn wrap_drops_zeroed_segment() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 0, 0];
        let out = reconcile(Some(8), &snapshot(&data, 2));
        assert_eq!(out.bytes, vec![1, 2]);
        assert_eq!(
            out.outcome,
            PollOutcome::Wrapped {
                discarded_residue: true
            }
        );
    }

    #[test]
    fn wrap_keeps_partially_zero_segment() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 0, 9];
        let out = reconcile(Some(8), &snapshot(&data, 1));
        assert_eq!(out.bytes, vec![0, 9, 1]);
    }

    #[test]
    fn cleared_buffer_resets_tail() {
        let out = reconcile(Some(7), &snapshot(&[0; 10], 4));
        assert!(out.bytes.is_empty());
        assert_eq!(out.next_tail, Some(0));
        assert_eq!(out.outcome, PollOutcome::Cleared);
    }

    #[test]
    fn first_poll_only_anchors() {
        let out = reconcile(None, &snapshot(&[1, 2, 3, 4], 3));
        assert!(out.bytes.is_empty());
        assert_eq!(out.next_tail, Some(3));
        assert_eq!(out.outcome, PollOutcome::Resynchronized);
    }

    #[test]
    fn unchanged_snapshot_is_idempotent() {
        let snap = snapshot(&[5, 6, 7, 0], 3);
        let first = reconcile(Some(0), &snap);
        assert_eq!(first.bytes, vec![5, 6, 7]);

        let second = reconcile(first.next_tail, &snap);
        assert!(second.bytes.is_empty());
        assert_eq!(second.next_tail, Some(3));
    }

    #[test]
    fn stale_tail_beyond_shorter_buffer_is_clamped() {
        let out = reconcile(Some(200), &snapshot(&[1, 2, 3, 4], 2));
        assert_eq!(out.bytes, vec![1, 2]);
    }

    #[test]
    fn malformed_reply_forces_resync() {
        let out = reconcile_raw(Some(4), "0102XX");
        assert!(out.bytes.is_empty());
        assert_eq!(out.next_tail, None);
        assert!(matches!(out.outcome, PollOutcome::Malformed(_)));

        let next = reconcile_raw(out.next_tail, "01020002");
        assert!(next.bytes.is_empty());
        assert_eq!(next.next_tail, Some(2));
        assert_eq!(next.outcome, PollOutcome::Resynchronized);
    }

    #[test]
    fn consecutive_polls_never_repeat_bytes() {
        // Ring of 6 filled in three steps, wrapping once.
        let steps: [(&[u8], u8); 3] = [
            (&[1, 2, 0, 0, 0, 0], 2),
            (&[1, 2, 3, 4, 5, 0], 5),
            (&[7, 2, 3, 4, 5, 6], 1),
        ];

        let mut tail = Some(0);
        let mut seen = Vec::new();
        for (data, t) in steps {
            let out = reconcile(tail, &snapshot(data, t));
            seen.extend(out.bytes);
            tail = out.next_tail;
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
    }
}
