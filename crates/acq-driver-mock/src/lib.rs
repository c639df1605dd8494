//! Mock camera driver for testing and simulation against `acq-core`.
//!
//! Provides a simulated sensor behind the real adapter traits, so the
//! acquisition core can be exercised end to end without hardware:
//!
//! - [`MockCamera`]: implements [`acq_core::CameraAdapter`] plus both
//!   notification styles ([`acq_core::PollWaiter`] and
//!   [`acq_core::CallbackRegistrar`]), with configurable frame period,
//!   an in-flight queue limit, and fault injection.
//! - [`generate_test_pattern`]: deterministic 16-bit frames whose first two
//!   pixels encode the frame number, so tests can verify ordering and loss.
//! - [`Mono16Decoder`]: the matching [`acq_core::PixelDecoder`].

pub mod camera;
pub mod decoder;
pub mod pattern;

pub use camera::{MockCamera, MockCameraConfig};
pub use decoder::Mono16Decoder;
pub use pattern::{embedded_frame_number, generate_test_pattern};
