//! Transactional acquisition counters.
//!
//! One mutex guards the whole counter set, so every operation observes and
//! restores the invariant as a unit:
//!
//! ```text
//! 0 <= read <= acquired   and   acquired - read <= capacity - overflow_margin
//! ```
//!
//! The producer advances `acquired` (and sacrifices the oldest unread frame
//! when the backlog would exceed the margin-adjusted capacity); the consumer
//! advances `read`. Nothing else touches the fields directly.

use crate::error::{AcqError, AcqResult};
use parking_lot::Mutex;
use tracing::warn;

/// Consistent point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Frames the driver has completed since the session started.
    pub acquired: u64,
    /// Frames consumed by the reader (including sacrificed ones).
    pub read: u64,
    /// Frames overwritten before being read.
    pub missed: u64,
    /// Overflow events since the counters were created.
    pub overflow_count: u64,
    /// Whether an overflow is currently signalled and not yet cleared.
    pub overflow: bool,
}

impl CounterSnapshot {
    /// Frames produced but not yet consumed.
    #[must_use]
    pub fn backlog(&self) -> u64 {
        self.acquired - self.read
    }
}

/// Result of recording one completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredReport {
    /// Total acquired count after the update.
    pub acquired: u64,
    /// Frames sacrificed by this update to keep the backlog bounded.
    pub sacrificed: u64,
}

#[derive(Debug, Default)]
struct CounterState {
    acquired: u64,
    read: u64,
    missed: u64,
    overflow_count: u64,
    overflow: bool,
}

/// Lock-protected counter set shared by the producer and consumer sides.
#[derive(Debug)]
pub struct AcqCounters {
    capacity: usize,
    overflow_margin: usize,
    state: Mutex<CounterState>,
}

impl AcqCounters {
    /// Create a zeroed counter set for a ring of `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize, overflow_margin: usize) -> Self {
        debug_assert!(
            overflow_margin < capacity,
            "overflow_margin must be smaller than capacity"
        );
        Self {
            capacity,
            overflow_margin,
            state: Mutex::new(CounterState::default()),
        }
    }

    /// Ring capacity these counters were sized for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Trailing slots reserved before backlog counts as overflow.
    #[must_use]
    pub fn overflow_margin(&self) -> usize {
        self.overflow_margin
    }

    /// Zero all counters for a new session.
    ///
    /// `initial_overflow_count` carries the cumulative overflow count across
    /// a restart; pass 0 for a fresh device.
    pub fn reset(&self, initial_overflow_count: u64) {
        let mut state = self.state.lock();
        *state = CounterState {
            overflow_count: initial_overflow_count,
            ..CounterState::default()
        };
    }

    /// Record one frame completed by the driver.
    ///
    /// If the unread backlog would exceed `capacity - overflow_margin`, the
    /// oldest unread frame is sacrificed: `read` and `missed` advance
    /// together so the invariant holds on exit.
    pub fn record_acquired(&self) -> AcquiredReport {
        let mut state = self.state.lock();
        state.acquired += 1;

        let threshold = (self.capacity - self.overflow_margin) as u64;
        let mut sacrificed = 0;
        while state.acquired - state.read > threshold {
            state.read += 1;
            state.missed += 1;
            sacrificed += 1;
        }

        if sacrificed > 0 {
            warn!(
                acquired = state.acquired,
                read = state.read,
                missed = state.missed,
                sacrificed,
                "unread backlog exceeded ring margin, oldest frame sacrificed"
            );
        }

        AcquiredReport {
            acquired: state.acquired,
            sacrificed,
        }
    }

    /// Record `n` frames consumed by the reader.
    ///
    /// Fails with [`AcqError::Logic`] if this would move `read` past
    /// `acquired`.
    pub fn record_read(&self, n: u64) -> AcqResult<()> {
        let mut state = self.state.lock();
        if state.read + n > state.acquired {
            return Err(AcqError::Logic(format!(
                "record_read({}) would move read ({}) past acquired ({})",
                n, state.read, state.acquired
            )));
        }
        state.read += n;
        Ok(())
    }

    /// Advance `read` to `next_read` if it is not already there.
    ///
    /// Unlike [`record_read`](Self::record_read) this is idempotent against
    /// concurrent sacrifices: frames the producer already gave up on are not
    /// counted twice. Returns how many frames this call actually consumed.
    pub(crate) fn advance_read_to(&self, next_read: u64) -> u64 {
        let mut state = self.state.lock();
        let target = next_read.min(state.acquired);
        if target <= state.read {
            return 0;
        }
        let consumed = target - state.read;
        state.read = target;
        consumed
    }

    /// Consistent snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let state = self.state.lock();
        CounterSnapshot {
            acquired: state.acquired,
            read: state.read,
            missed: state.missed,
            overflow_count: state.overflow_count,
            overflow: state.overflow,
        }
    }

    /// Set the overflow flag.
    ///
    /// Idempotent until cleared: the count only increments on the first
    /// signal. Returns whether this call newly set the flag.
    pub fn signal_overflow(&self) -> bool {
        let mut state = self.state.lock();
        if state.overflow {
            return false;
        }
        state.overflow = true;
        state.overflow_count += 1;
        warn!(
            acquired = state.acquired,
            read = state.read,
            overflow_count = state.overflow_count,
            "buffer overflow signalled"
        );
        true
    }

    /// Clear the overflow flag after recovery.
    pub fn clear_overflow(&self) {
        self.state.lock().overflow = false;
    }
}
