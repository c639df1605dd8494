//! Driver adapter contract.
//!
//! Everything vendor-specific (function tables, parameter translation,
//! DLL loading) stays behind these traits. The core only needs four
//! things from a driver: configure a capture, feed it buffers, start/stop
//! it, and learn when a buffer is full. The last part comes in two shapes,
//! matching how real SDKs deliver completions:
//!
//! - [`PollWaiter`]: the SDK exposes a blocking wait call; the core runs it
//!   on a dedicated thread with a short timeout.
//! - [`CallbackRegistrar`]: the SDK invokes a callback on its own thread;
//!   the core hands it a trampoline that only enqueues a notification.
//!
//! Adapters implement [`CameraAdapter`] plus at least one of the two.

use crate::error::AdapterError;
use std::time::Duration;

/// Raw DMA target handed to the driver for one ring slot.
#[derive(Debug, Clone, Copy)]
pub struct RawSlot {
    /// Ring slot index the buffer belongs to.
    pub slot: usize,
    /// Start of the writable region.
    pub ptr: *mut u8,
    /// Length of the writable region in bytes.
    pub len: usize,
}

// SAFETY: the pointer targets a ring slot that stays allocated for the whole
// acquisition session; which context may write through it is governed by the
// slot's queued state, not by which thread holds the RawSlot value.
#[allow(unsafe_code)]
unsafe impl Send for RawSlot {}
#[allow(unsafe_code)]
unsafe impl Sync for RawSlot {}

/// Outcome of one driver wait call in the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A queued buffer was filled.
    Frame {
        /// Slot index of the completed buffer.
        slot: usize,
    },
    /// Nothing completed before the wait timeout. Not an error.
    WouldBlock,
    /// The hardware reported a buffer overflow.
    Overflow,
}

/// Notification delivered through a driver callback.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    /// A queued buffer was filled.
    Frame {
        /// Slot index of the completed buffer.
        slot: usize,
    },
    /// The hardware reported a buffer overflow.
    Overflow,
    /// The driver reported a fault; the acquisition loop stops.
    Fault(AdapterError),
}

/// Callback handed to a [`CallbackRegistrar`] adapter.
///
/// Invoked on the driver's own thread; implementations provided by the core
/// never block for long and never unwind across the call.
pub type FrameCallback = Box<dyn FnMut(CallbackEvent) + Send>;

/// Capture control surface every driver adapter provides.
pub trait CameraAdapter: Send + Sync {
    /// Adapter name used in errors and logs.
    fn name(&self) -> &str;

    /// Prepare a capture for frames of `frame_bytes` bytes.
    ///
    /// Returns the frame size the driver will actually produce; the core
    /// treats any disagreement with the allocated slot size as fatal.
    fn configure(&self, frame_bytes: usize) -> Result<usize, AdapterError>;

    /// Maximum number of buffers the driver accepts in flight, if limited.
    fn queue_limit(&self) -> Option<usize> {
        None
    }

    /// Hand one ring slot to the driver as a write target.
    fn queue_buffer(&self, slot: RawSlot) -> Result<(), AdapterError>;

    /// Start hardware capture.
    fn start_capture(&self) -> Result<(), AdapterError>;

    /// Stop hardware capture and return all queued buffers.
    fn stop_capture(&self) -> Result<(), AdapterError>;
}

/// Adapter whose SDK exposes a blocking "wait for buffer" primitive.
pub trait PollWaiter: CameraAdapter {
    /// Block up to `timeout` for the next completed buffer.
    ///
    /// Returns [`PollEvent::WouldBlock`] on timeout; that is a normal
    /// outcome, retried indefinitely by the polling loop.
    fn wait_buffer(&self, timeout: Duration) -> Result<PollEvent, AdapterError>;
}

/// Adapter whose SDK delivers completions through a registered callback.
pub trait CallbackRegistrar: CameraAdapter {
    /// Register the frame-completion callback.
    fn register_frame_callback(&self, callback: FrameCallback) -> Result<(), AdapterError>;

    /// Unregister the frame-completion callback.
    ///
    /// After this returns the driver must not invoke the callback again.
    fn unregister_frame_callback(&self) -> Result<(), AdapterError>;
}
