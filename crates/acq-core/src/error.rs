//! Error types for the acquisition core.
//!
//! Two layers, matching how faults travel through the system:
//!
//! - [`AdapterError`] is anything a driver adapter reports: queueing,
//!   capture control, SDK lifecycle. It carries the adapter name and a
//!   coarse [`AdapterErrorKind`] so callers can match on the failure class
//!   without parsing messages.
//! - [`AcqError`] is the core's own error type. Transient conditions (a
//!   poll timeout inside the producer loop) never appear here; every
//!   variant is either recoverable by the caller retrying
//!   ([`AcqError::WaitTimeout`]) or fatal to the current acquisition
//!   session ([`AcqError::SizeMismatch`], [`AcqError::ShutdownTimeout`]).
//!
//! Counter-logic violations (`read > acquired` and friends) are defensive
//! checks that should never trigger in correct use; they surface as
//! [`AcqError::Logic`] rather than being silently tolerated.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Adapter Errors
// =============================================================================

/// Coarse classification of a driver adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// SDK or device initialization failed.
    Initialization,
    /// The adapter rejected a configuration request.
    Configuration,
    /// Communication with the device failed mid-session.
    Communication,
    /// Starting, running, or aborting a capture failed.
    Capture,
    /// SDK or device teardown failed.
    Shutdown,
    /// The hardware reported a fault.
    Hardware,
    /// Anything the adapter could not classify.
    Unknown,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AdapterErrorKind::Initialization => "initialization",
            AdapterErrorKind::Configuration => "configuration",
            AdapterErrorKind::Communication => "communication",
            AdapterErrorKind::Capture => "capture",
            AdapterErrorKind::Shutdown => "shutdown",
            AdapterErrorKind::Hardware => "hardware",
            AdapterErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error reported by a driver adapter.
#[derive(Error, Debug, Clone)]
#[error("adapter '{adapter}' {kind} error: {message}")]
pub struct AdapterError {
    /// Name of the adapter that produced the error.
    pub adapter: String,
    /// Failure class.
    pub kind: AdapterErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl AdapterError {
    /// Create a new adapter error.
    pub fn new(
        adapter: impl Into<String>,
        kind: AdapterErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Core Errors
// =============================================================================

/// Convenience alias for results using the core error type.
pub type AcqResult<T> = std::result::Result<T, AcqError>;

/// Primary error type for the acquisition core.
#[derive(Error, Debug)]
pub enum AcqError {
    /// The frame ring could not be allocated.
    #[error("failed to allocate frame ring: {reason}")]
    Allocation {
        /// Why allocation was refused.
        reason: String,
    },

    /// `release()` was called while slots were still queued to the driver.
    #[error("frame ring still has {in_flight} slot(s) queued to the driver")]
    RingBusy {
        /// Number of slots the driver currently owns.
        in_flight: usize,
    },

    /// The driver-reported frame size disagrees with the allocated slots.
    ///
    /// Fatal: continuing would corrupt every frame.
    #[error("driver reports {reported}-byte frames but {expected}-byte slots were requested")]
    SizeMismatch {
        /// Slot size the caller asked for.
        expected: usize,
        /// Frame size the driver reported.
        reported: usize,
    },

    /// No qualifying frame arrived before the deadline.
    #[error("no new frame within {timeout:?}")]
    WaitTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The acquisition loop is not running.
    ///
    /// Returned by waits cancelled by `stop()` and by operations that need
    /// a live session.
    #[error("acquisition is not running")]
    Stopped,

    /// `start()` was called on a session that is already running.
    #[error("acquisition is already running")]
    AlreadyRunning,

    /// The producer thread did not exit within the shutdown deadline.
    ///
    /// Fatal: the thread is not silently leaked, the caller is told.
    #[error("producer thread did not exit within {deadline:?}")]
    ShutdownTimeout {
        /// The deadline that elapsed.
        deadline: Duration,
    },

    /// Spawning the producer thread failed.
    #[error("failed to spawn producer thread: {0}")]
    Spawn(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A counter invariant would have been violated.
    #[error("counter logic violation: {0}")]
    Logic(String),

    /// A driver adapter reported a non-transient error.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
