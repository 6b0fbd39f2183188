//! Lamport logical clock.
//!
//! Every participant owns one clock. It is incremented before each send and
//! advanced on each receive, so that if event A happened-before event B then
//! `clock(A) < clock(B)`. The converse does not hold: a smaller clock value
//! does NOT imply causal precedence, and concurrent events may carry any
//! relative values.
//!
//! # Invariants
//!
//! - The value never decreases.
//! - After `observe(c)` the value is strictly greater than `c` (saturating at
//!   `u64::MAX`).

/// Scalar logical clock owned by a single participant.
///
/// Not shared between tasks: a participant that sends from several tasks
/// keeps its clock behind its own lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// Start a clock at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a clock at a given value.
    pub fn starting_at(value: u64) -> Self {
        Self { value }
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Advance for a local send and return the value to stamp on it.
    pub fn increment(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Advance past a clock value received from a peer.
    ///
    /// Sets the clock to `max(local, received) + 1` and returns it.
    pub fn observe(&mut self, received: u64) -> u64 {
        self.value = self.value.max(received).saturating_add(1);
        self.value
    }
}
