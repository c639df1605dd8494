//! Consumer-side blocking waits for new frames.
//!
//! A [`FrameWaiter`] polls the shared counters at a short interval until
//! its policy's predicate holds or the deadline elapses. Polling keeps the
//! hot producer path free of wakeup bookkeeping; at a ~1 ms interval the
//! added latency is far below any realistic frame period.
//!
//! Waiters are per reader thread: the `SinceLastWait` bookmark is plain
//! mutable state inside the waiter, not shared.

use crate::counters::AcqCounters;
use crate::error::{AcqError, AcqResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What counts as "a new frame" for a wait call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Return as soon as any unread frame exists (`acquired > read`).
    SinceLastRead,
    /// Return once a frame newer than the one observed at the previous
    /// wait call exists. The first call behaves like [`Self::SinceNow`].
    SinceLastWait,
    /// Return once a frame completes after this call starts.
    SinceNow,
}

/// Blocking wait handle over one acquisition's counters.
pub struct FrameWaiter {
    counters: Arc<AcqCounters>,
    live: Option<Arc<AtomicBool>>,
    interval: Duration,
    last_wait_frame: Option<u64>,
}

impl FrameWaiter {
    /// Create a standalone waiter with the given polling interval.
    ///
    /// A standalone waiter has no cancellation source; waits end only by
    /// success or timeout. [`crate::acquisition::Acquisition::waiter`]
    /// attaches the loop's liveness flag so waits also end when the loop
    /// stops.
    #[must_use]
    pub fn new(counters: Arc<AcqCounters>, interval: Duration) -> Self {
        Self {
            counters,
            live: None,
            interval,
            last_wait_frame: None,
        }
    }

    pub(crate) fn with_liveness(
        counters: Arc<AcqCounters>,
        interval: Duration,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            counters,
            live: Some(live),
            interval,
            last_wait_frame: None,
        }
    }

    /// Block until `policy` is satisfied or `timeout` elapses.
    ///
    /// Returns [`AcqError::WaitTimeout`] exactly when the deadline passes
    /// without a qualifying frame, and [`AcqError::Stopped`] when the
    /// acquisition loop stops while the wait is in progress.
    pub fn wait_for_frame(&mut self, policy: WaitPolicy, timeout: Duration) -> AcqResult<()> {
        let deadline = Instant::now() + timeout;

        let baseline = match policy {
            WaitPolicy::SinceLastRead => None,
            WaitPolicy::SinceNow => Some(self.counters.snapshot().acquired),
            WaitPolicy::SinceLastWait => {
                let baseline = self
                    .last_wait_frame
                    .unwrap_or_else(|| self.counters.snapshot().acquired);
                // First call: leave a bookmark even if this wait times out.
                self.last_wait_frame = Some(baseline);
                Some(baseline)
            }
        };

        loop {
            let snap = self.counters.snapshot();
            let ready = match baseline {
                Some(frame) => snap.acquired > frame,
                None => snap.acquired > snap.read,
            };
            if ready {
                if matches!(policy, WaitPolicy::SinceLastWait) {
                    self.last_wait_frame = Some(snap.acquired);
                }
                return Ok(());
            }

            if let Some(live) = &self.live {
                if !live.load(Ordering::Acquire) {
                    return Err(AcqError::Stopped);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AcqError::WaitTimeout { timeout });
            }
            thread::sleep(self.interval.min(deadline - now));
        }
    }
}
