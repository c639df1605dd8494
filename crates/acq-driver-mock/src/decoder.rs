//! Pixel decoding for the mock camera's wire format.

use acq_core::{Frame, PixelDecoder};

/// Decoder for 16-bit monochrome frames, Little Endian.
///
/// The mock camera emits plain LE 16-bit pixels; real backends put their
/// bit-unpacking and byte-order handling behind the same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mono16Decoder;

impl PixelDecoder for Mono16Decoder {
    fn decode(&self, raw: &[u8], width: u32, height: u32) -> Frame {
        Frame::from_bytes(width, height, 16, raw.to_vec())
    }
}
