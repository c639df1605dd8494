//! `acq-core`
//!
//! Ring-buffer frame acquisition core shared by camera drivers.
//!
//! Every streaming camera backend faces the same problem: the vendor driver
//! (or its hardware callback) writes completed frames into a fixed pool of
//! buffers asynchronously, while a user thread wants the frames in order,
//! with loss detection and bounded blocking waits. This crate is that
//! recurring middle layer, written once:
//!
//! - [`FrameRing`]: the fixed pool of equally sized buffers, indexed by
//!   logical frame number modulo capacity.
//! - [`AcqCounters`]: the transactional `acquired`/`read`/`missed` counter
//!   set; the only state both sides mutate.
//! - [`NotificationSource`]: how the core learns a buffer is full, either
//!   a polling thread over the driver's wait call or a driver callback
//!   bridged onto an owned drain thread.
//! - [`Acquisition`]: the producer-side loop; requeues buffers, advances
//!   counters, detects overflow, and owns the start/stop state machine.
//! - [`FrameWaiter`]: consumer-side blocking waits with three trigger
//!   policies and a hard deadline.
//! - [`FrameReader`]: ordered range reads against the ring, wraparound
//!   included.
//!
//! Vendor specifics stay behind two narrow seams: a [`CameraAdapter`]
//! supplies raw frame bytes, and a [`PixelDecoder`] turns one frame's bytes
//! into a typed image. SDK-global init/teardown is handled by the
//! refcounted [`sdk`] registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use acq_core::{Acquisition, AcqConfig, FrameRange, FrameShape, NotificationSource, WaitPolicy};
//! use std::time::Duration;
//!
//! let acq = Acquisition::new(AcqConfig::default(), NotificationSource::Polling(adapter))?;
//! acq.start(FrameShape { width: 2048, height: 2048, bytes_per_pixel: 2 })?;
//!
//! let mut waiter = acq.waiter();
//! waiter.wait_for_frame(WaitPolicy::SinceLastRead, Duration::from_secs(1))?;
//!
//! let reader = acq.reader(decoder)?;
//! let snap = acq.snapshot();
//! let frames = reader.read_frames(FrameRange::new(snap.read, snap.acquired - 1)?)?;
//!
//! acq.stop()?;
//! ```

pub mod acquisition;
pub mod adapter;
pub mod config;
pub mod counters;
pub mod data;
pub mod error;
pub mod notify;
pub mod reader;
pub mod ring;
pub mod sdk;
pub mod wait;

pub use acquisition::{Acquisition, RunState};
pub use adapter::{
    CallbackEvent, CallbackRegistrar, CameraAdapter, FrameCallback, PollEvent, PollWaiter, RawSlot,
};
pub use config::AcqConfig;
pub use counters::{AcqCounters, AcquiredReport, CounterSnapshot};
pub use data::{Frame, FrameShape, PixelDecoder};
pub use error::{AcqError, AcqResult, AdapterError, AdapterErrorKind};
pub use notify::NotificationSource;
pub use reader::{split_ring_range, FrameRange, FrameReader};
pub use ring::FrameRing;
pub use sdk::{open_sdk, sdk_ref_count, SdkGuard, SdkLifecycle};
pub use wait::{FrameWaiter, WaitPolicy};
