//! Acquisition session: state machine, producer loop, requeue bookkeeping.
//!
//! One [`Acquisition`] owns the frame ring, the counters, and whichever
//! notification style the device uses. `start()` sizes and queues the ring,
//! arms the driver, and spawns the producer context; every completion
//! notification then advances the counters and re-arms one slot so the
//! driver never starves. `stop()` is idempotent, callable from any thread,
//! and bounded: a producer thread that refuses to exit is reported, not
//! silently leaked.
//!
//! Overflow never stops the loop. It is recorded in the counters and left
//! for the device layer's recovery policy, typically [`Acquisition::restart`].

use crate::adapter::{CallbackEvent, CameraAdapter, PollEvent, PollWaiter};
use crate::config::AcqConfig;
use crate::counters::{AcqCounters, CounterSnapshot};
use crate::data::{FrameShape, PixelDecoder};
use crate::error::{AcqError, AcqResult, AdapterError, AdapterErrorKind};
use crate::notify::{callback_trampoline, CallbackMailbox, NotificationSource};
use crate::reader::FrameReader;
use crate::ring::FrameRing;
use crate::wait::FrameWaiter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle of an acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No session active.
    Stopped,
    /// `start()` is preparing the ring and the driver.
    Starting,
    /// The producer context is consuming notifications.
    Running,
    /// `stop()` is tearing the session down.
    Stopping,
}

/// State shared with the producer context for one session.
struct SessionShared {
    ring: FrameRing,
    counters: Arc<AcqCounters>,
    stop: AtomicBool,
    live: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<AdapterError>>>,
    /// Buffers kept armed ahead of the write position at steady state.
    lead: u64,
    /// Slots handed to the driver before capture started.
    initial_queued: u64,
}

impl SessionShared {
    /// Handle one frame-completion notification.
    ///
    /// Returns `false` when the loop must stop (driver fault on requeue).
    fn on_frame<A>(&self, reported_slot: usize, adapter: &A) -> bool
    where
        A: CameraAdapter + ?Sized,
    {
        // Single producer: `acquired` is stable until we advance it, so the
        // completed frame's logical index is the current count.
        let completed = self.counters.snapshot().acquired;
        let expected_slot = self.ring.slot_index(completed);
        if reported_slot != expected_slot {
            // At-least-once delivery: duplicated or reordered completions
            // happen on real hardware. Our own bookkeeping stays authoritative.
            warn!(
                reported_slot,
                expected_slot,
                frame = completed,
                "driver reported an unexpected buffer, keeping loop order"
            );
        }

        self.ring.mark_returned(completed);
        let report = self.counters.record_acquired();
        if report.sacrificed > 0 {
            self.counters.signal_overflow();
        }

        // Re-arm the slot that will hold frame `completed + lead`. Its
        // previous occupant is strictly below the read cursor (the sacrifice
        // threshold guarantees it), so the driver never overwrites unread
        // data. Targets still covered by the initial queueing are skipped.
        let target = completed + self.lead;
        if target >= self.initial_queued {
            let raw = self.ring.raw_slot(target);
            self.ring.mark_queued(target);
            if let Err(err) = adapter.queue_buffer(raw) {
                self.ring.mark_returned(target);
                self.record_fault(err);
                return false;
            }
        }
        true
    }

    fn record_fault(&self, err: AdapterError) {
        error!(error = %err, "driver fault stops the acquisition loop");
        *self.fault.lock() = Some(err);
    }
}

struct SessionState {
    run: RunState,
    shared: Option<Arc<SessionShared>>,
    join: Option<thread::JoinHandle<()>>,
    shape: Option<FrameShape>,
}

/// Owns the producer side of one device's frame stream.
pub struct Acquisition {
    config: AcqConfig,
    source: NotificationSource,
    counters: Arc<AcqCounters>,
    live: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<AdapterError>>>,
    state: Mutex<SessionState>,
}

impl Acquisition {
    /// Create an acquisition over `source` with the given configuration.
    pub fn new(config: AcqConfig, source: NotificationSource) -> AcqResult<Self> {
        config.validate()?;
        let counters = Arc::new(AcqCounters::new(
            config.buffer_count,
            config.overflow_margin,
        ));
        Ok(Self {
            config,
            source,
            counters,
            live: Arc::new(AtomicBool::new(false)),
            fault: Arc::new(Mutex::new(None)),
            state: Mutex::new(SessionState {
                run: RunState::Stopped,
                shared: None,
                join: None,
                shape: None,
            }),
        })
    }

    /// Start capturing frames of the given geometry.
    ///
    /// Validates the driver-reported frame size against the ring slots
    /// (disagreement is fatal), queues the initial buffers, starts capture,
    /// and spawns the producer context.
    pub fn start(&self, shape: FrameShape) -> AcqResult<()> {
        let mut session = self.state.lock();
        if session.run != RunState::Stopped {
            return Err(AcqError::AlreadyRunning);
        }
        session.run = RunState::Starting;

        match self.start_session(&mut session, shape) {
            Ok(()) => {
                session.run = RunState::Running;
                Ok(())
            }
            Err(err) => {
                // Best-effort teardown of whatever got armed before the
                // failure; the driver tolerates stopping an idle capture.
                self.live.store(false, Ordering::Release);
                if let NotificationSource::Callback(adapter) = &self.source {
                    let _ = adapter.unregister_frame_callback();
                }
                if let Err(stop_err) = self.source.stop_capture() {
                    warn!(error = %stop_err, "cleanup stop_capture failed after start error");
                }
                session.shared = None;
                session.join = None;
                session.run = RunState::Stopped;
                Err(err)
            }
        }
    }

    fn start_session(&self, session: &mut SessionState, shape: FrameShape) -> AcqResult<()> {
        let expected = shape.frame_bytes();
        if expected == 0 {
            return Err(AcqError::Config(
                "frame shape resolves to zero bytes".to_string(),
            ));
        }

        let reported = self.source.configure(expected)?;
        if reported != expected {
            return Err(AcqError::SizeMismatch { expected, reported });
        }

        let ring = FrameRing::allocate(self.config.buffer_count, expected)?;

        let overflow_count = self.counters.snapshot().overflow_count;
        self.counters.reset(overflow_count);
        *self.fault.lock() = None;

        let limit = self
            .source
            .queue_limit()
            .unwrap_or(self.config.buffer_count)
            .max(1);
        let initial_queued = self.config.buffer_count.min(limit) as u64;
        let lead = self.config.overflow_margin.min(limit) as u64;

        for frame in 0..initial_queued {
            let raw = ring.raw_slot(frame);
            ring.mark_queued(frame);
            if let Err(err) = self.source.queue_buffer(raw) {
                ring.mark_returned(frame);
                return Err(err.into());
            }
        }

        // The trampoline must be in place before capture starts: drivers
        // deliver the first completion on their own schedule.
        let mailbox = if let NotificationSource::Callback(adapter) = &self.source {
            let mailbox = Arc::new(CallbackMailbox::new());
            adapter.register_frame_callback(callback_trampoline(Arc::clone(&mailbox)))?;
            Some(mailbox)
        } else {
            None
        };

        self.source.start_capture()?;
        self.live.store(true, Ordering::Release);

        let shared = Arc::new(SessionShared {
            ring,
            counters: Arc::clone(&self.counters),
            stop: AtomicBool::new(false),
            live: Arc::clone(&self.live),
            fault: Arc::clone(&self.fault),
            lead,
            initial_queued,
        });

        let join = match &self.source {
            NotificationSource::Polling(adapter) => {
                let shared = Arc::clone(&shared);
                let adapter = Arc::clone(adapter);
                let poll_timeout = self.config.poll_timeout;
                thread::Builder::new()
                    .name("acq-poll".to_string())
                    .spawn(move || poll_producer(&shared, &adapter, poll_timeout))
                    .map_err(|err| AcqError::Spawn(err.to_string()))?
            }
            NotificationSource::Callback(adapter) => {
                let mailbox = mailbox.ok_or_else(|| {
                    AcqError::Logic("callback source without a mailbox".to_string())
                })?;
                let shared = Arc::clone(&shared);
                let adapter = Arc::clone(adapter);
                let idle_wait = self.config.poll_timeout;
                thread::Builder::new()
                    .name("acq-drain".to_string())
                    .spawn(move || drain_producer(&shared, &adapter, &mailbox, idle_wait))
                    .map_err(|err| AcqError::Spawn(err.to_string()))?
            }
        };

        info!(
            adapter = self.source.name(),
            capacity = self.config.buffer_count,
            overflow_margin = self.config.overflow_margin,
            lead,
            initial_queued,
            frame_bytes = expected,
            "acquisition started"
        );

        session.shared = Some(shared);
        session.join = Some(join);
        session.shape = Some(shape);
        Ok(())
    }

    /// Stop the session and release the ring.
    ///
    /// Idempotent: stopping a stopped acquisition is a no-op. Safe to call
    /// from any thread, including while waits are in progress elsewhere
    /// (they observe the stop and return [`AcqError::Stopped`]).
    pub fn stop(&self) -> AcqResult<()> {
        let mut session = self.state.lock();
        if session.run == RunState::Stopped {
            return Ok(());
        }
        session.run = RunState::Stopping;

        if let Some(shared) = &session.shared {
            shared.stop.store(true, Ordering::Release);
        }
        self.live.store(false, Ordering::Release);

        // Unregister before joining so the driver stops invoking the
        // trampoline while teardown proceeds.
        if let NotificationSource::Callback(adapter) = &self.source {
            if let Err(err) = adapter.unregister_frame_callback() {
                warn!(error = %err, "failed to unregister frame callback");
            }
        }

        let mut result = Ok(());
        if let Some(handle) = session.join.take() {
            let deadline = Instant::now() + self.config.stop_deadline;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    error!(
                        deadline = ?self.config.stop_deadline,
                        "producer thread did not exit in time"
                    );
                    result = Err(AcqError::ShutdownTimeout {
                        deadline: self.config.stop_deadline,
                    });
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            if result.is_ok() && handle.join().is_err() {
                error!("producer thread panicked");
            }
        }

        if let Err(err) = self.source.stop_capture() {
            if result.is_ok() {
                result = Err(err.into());
            } else {
                warn!(error = %err, "stop_capture failed during aborted shutdown");
            }
        }

        if let Some(shared) = session.shared.take() {
            shared.ring.mark_all_returned();
            if let Err(err) = shared.ring.release() {
                warn!(error = %err, "frame ring still busy at stop");
            }
        }

        let overflow_count = self.counters.snapshot().overflow_count;
        self.counters.reset(overflow_count);

        session.run = RunState::Stopped;
        info!("acquisition stopped");
        result
    }

    /// Recovery action: stop, clear the overflow flag, start again.
    ///
    /// This is the step that consumes an overflow event; the cumulative
    /// overflow count survives the restart.
    pub fn restart(&self) -> AcqResult<()> {
        let shape = self
            .state
            .lock()
            .shape
            .ok_or_else(|| AcqError::Logic("restart before any start".to_string()))?;
        self.stop()?;
        self.counters.clear_overflow();
        self.start(shape)
    }

    /// Blocking wait handle bound to this acquisition's counters and
    /// liveness.
    #[must_use]
    pub fn waiter(&self) -> FrameWaiter {
        FrameWaiter::with_liveness(
            Arc::clone(&self.counters),
            self.config.wait_interval,
            Arc::clone(&self.live),
        )
    }

    /// Frame reader over the running session's ring.
    ///
    /// Fails with [`AcqError::Stopped`] when no session is active.
    pub fn reader(&self, decoder: Arc<dyn PixelDecoder>) -> AcqResult<FrameReader> {
        let session = self.state.lock();
        let shared = session.shared.as_ref().ok_or(AcqError::Stopped)?;
        let shape = session.shape.ok_or(AcqError::Stopped)?;
        Ok(FrameReader::new(
            shared.ring.clone(),
            Arc::clone(&self.counters),
            shape,
            decoder,
        ))
    }

    /// Consistent counter snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Shared counters, for callers that drive reads themselves.
    #[must_use]
    pub fn counters(&self) -> &Arc<AcqCounters> {
        &self.counters
    }

    /// The terminal driver fault that stopped the producer, if any.
    #[must_use]
    pub fn last_fault(&self) -> Option<AdapterError> {
        self.fault.lock().clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.state.lock().run
    }

    /// Whether a session is active and its producer has not faulted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        // The producer thread must not outlive the adapter handles.
        if self.state.lock().run != RunState::Stopped {
            if let Err(err) = self.stop() {
                warn!(error = %err, "stop during drop failed");
            }
        }
    }
}

/// Producer loop for the polling variant.
///
/// Transient timeouts are retried indefinitely; a driver error records a
/// fault and exits the loop.
fn poll_producer(shared: &Arc<SessionShared>, adapter: &Arc<dyn PollWaiter>, poll_timeout: Duration) {
    debug!("polling producer started");
    while !shared.stop.load(Ordering::Acquire) {
        match adapter.wait_buffer(poll_timeout) {
            Ok(PollEvent::WouldBlock) => continue,
            Ok(PollEvent::Frame { slot }) => {
                if !shared.on_frame(slot, adapter.as_ref()) {
                    break;
                }
            }
            Ok(PollEvent::Overflow) => {
                shared.counters.signal_overflow();
            }
            Err(err) => {
                shared.record_fault(err);
                break;
            }
        }
    }
    shared.live.store(false, Ordering::Release);
    debug!("polling producer exited");
}

/// Producer loop for the callback variant: drains the trampoline mailbox on
/// an owned thread so no acquisition logic runs on the driver's thread.
fn drain_producer(
    shared: &Arc<SessionShared>,
    adapter: &Arc<dyn crate::adapter::CallbackRegistrar>,
    mailbox: &Arc<CallbackMailbox>,
    idle_wait: Duration,
) {
    debug!("callback drain started");
    while !shared.stop.load(Ordering::Acquire) {
        if mailbox.is_poisoned() {
            shared.record_fault(AdapterError::new(
                adapter.name(),
                AdapterErrorKind::Unknown,
                "frame callback panicked",
            ));
            break;
        }
        match mailbox.pop_wait(idle_wait) {
            Some(CallbackEvent::Frame { slot }) => {
                if !shared.on_frame(slot, adapter.as_ref()) {
                    break;
                }
            }
            Some(CallbackEvent::Overflow) => {
                shared.counters.signal_overflow();
            }
            Some(CallbackEvent::Fault(err)) => {
                shared.record_fault(err);
                break;
            }
            None => continue,
        }
    }
    shared.live.store(false, Ordering::Release);
    debug!("callback drain exited");
}
