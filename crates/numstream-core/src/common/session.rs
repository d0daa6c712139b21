//! Progress record for one logical sequence delivery.
//!
//! Both ends of a call keep their own [`Session`]: the server drains one from
//! its cursor, the client appends what it receives. Only derived values
//! (remaining quantity, continuation seed, individual values, the checksum)
//! ever cross the wire.
//!
//! ## Invariants
//!
//! - The sequence is append-only.
//! - `0 <= position <= len`; the cursor only moves forward and saturates at
//!   `len`, which marks the session as exhausted.
//! - The checksum always covers the whole sequence, independent of the
//!   cursor, and is recomputed on every query.

use crate::{checksum, types::Value};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Read-only handle on a session's cursor.
///
/// The cursor is advanced with an atomic increment, so a probe can observe
/// the position of a session that is being drained by another task without
/// taking the session's lock.
#[derive(Clone, Debug)]
pub struct CursorProbe(Arc<AtomicUsize>);

impl CursorProbe {
    /// Returns the position the cursor was at when observed.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Mutable state of a single sequence delivery.
#[derive(Debug)]
pub struct Session {
    target_quantity: i64,
    sequence: Vec<Value>,
    cursor: Arc<AtomicUsize>,
    last_accessed: Instant,
}

impl Session {
    /// Creates a session that should ultimately hold `target_quantity`
    /// values, starting from `sequence` with the cursor at the first element.
    pub fn new(target_quantity: i64, sequence: Vec<Value>) -> Self {
        Self {
            target_quantity,
            sequence,
            cursor: Arc::new(AtomicUsize::new(0)),
            last_accessed: Instant::now(),
        }
    }

    /// Total number of values the session should ultimately hold.
    pub const fn target_quantity(&self) -> i64 {
        self.target_quantity
    }

    /// Number of values accumulated so far.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// True until the first value is appended.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Returns a probe that keeps observing this session's cursor.
    pub fn cursor_probe(&self) -> CursorProbe {
        CursorProbe(Arc::clone(&self.cursor))
    }

    /// Number of additional values a continuation request must supply.
    ///
    /// Negative only when more values arrived than were asked for.
    pub fn remaining(&self) -> i64 {
        self.target_quantity - self.sequence.len() as i64
    }

    /// True once the cursor has moved past the last value.
    pub fn is_exhausted(&self) -> bool {
        self.position() >= self.sequence.len()
    }

    /// Returns the value under the cursor, or `None` once exhausted.
    pub fn current(&mut self) -> Option<&Value> {
        self.touch();
        self.sequence.get(self.position())
    }

    /// Moves the cursor forward by one.
    ///
    /// Returns `true` while the cursor still points at a value.
    pub fn advance(&mut self) -> bool {
        self.touch();
        let len = self.sequence.len();
        if self.position() < len {
            self.cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.position() < len
    }

    /// Appends a value to the end of the sequence.
    pub fn append(&mut self, value: Value) {
        self.touch();
        self.sequence.push(value);
    }

    /// Returns the most recently appended value without moving the cursor.
    pub fn last(&mut self) -> Option<&Value> {
        self.touch();
        self.sequence.last()
    }

    /// Sum of every value in the sequence.
    pub fn checksum(&mut self) -> Value {
        self.touch();
        checksum::checksum(&self.sequence)
    }

    /// Every value accumulated so far, in order.
    pub fn sequence(&mut self) -> &[Value] {
        self.touch();
        &self.sequence
    }

    /// When the session was last read or modified.
    pub const fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// How long the session has gone untouched as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}
