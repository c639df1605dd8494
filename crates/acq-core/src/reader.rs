//! Ordered frame reads against the ring.
//!
//! A read request names logical frame indices, which never wrap; the reader
//! clamps the request to what is still available, maps it onto ring slots
//! (splitting once where the ring wraps), decodes each frame through the
//! device-supplied [`PixelDecoder`], and advances the read counter.

use crate::counters::AcqCounters;
use crate::data::{Frame, FrameShape, PixelDecoder};
use crate::error::{AcqError, AcqResult};
use crate::ring::FrameRing;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inclusive span of logical frame indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    first: u64,
    last: u64,
}

impl FrameRange {
    /// Create a range covering frames `first..=last`.
    pub fn new(first: u64, last: u64) -> AcqResult<Self> {
        if first > last {
            return Err(AcqError::Logic(format!(
                "frame range first ({}) exceeds last ({})",
                first, last
            )));
        }
        Ok(Self { first, last })
    }

    /// First frame in the range.
    #[must_use]
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Last frame in the range.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Number of frames covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// A range always covers at least one frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Split a logical range into ring-contiguous chunks.
///
/// Returns one chunk when the range does not cross a ring boundary, two
/// when it wraps: `[first, cut)` and `[cut, last]` where `cut` is the next
/// multiple of `capacity` above `first`.
#[must_use]
pub fn split_ring_range(range: FrameRange, capacity: usize) -> (FrameRange, Option<FrameRange>) {
    let capacity = capacity as u64;
    let cut = (range.first / capacity + 1) * capacity;
    if range.last < cut {
        (range, None)
    } else {
        (
            FrameRange {
                first: range.first,
                last: cut - 1,
            },
            Some(FrameRange {
                first: cut,
                last: range.last,
            }),
        )
    }
}

/// Decodes ranges of completed frames out of the ring.
///
/// Created by [`crate::acquisition::Acquisition::reader`] while a session
/// is running.
pub struct FrameReader {
    ring: FrameRing,
    counters: Arc<AcqCounters>,
    shape: FrameShape,
    decoder: Arc<dyn PixelDecoder>,
}

impl FrameReader {
    pub(crate) fn new(
        ring: FrameRing,
        counters: Arc<AcqCounters>,
        shape: FrameShape,
        decoder: Arc<dyn PixelDecoder>,
    ) -> Self {
        Self {
            ring,
            counters,
            shape,
            decoder,
        }
    }

    /// Decode the requested frames, in acquisition order.
    ///
    /// The request is clamped to `[read, acquired - 1]`: frames already
    /// consumed (or sacrificed) are skipped without decoding, frames not yet
    /// acquired are left for a later call. The read counter advances past
    /// everything up to the end of the clamped range, so skipping forward
    /// consumes the frames jumped over.
    #[allow(unsafe_code)]
    pub fn read_frames(&self, range: FrameRange) -> AcqResult<Vec<Frame>> {
        let snap = self.counters.snapshot();
        if snap.acquired == 0 {
            return Ok(Vec::new());
        }
        let newest = snap.acquired - 1;

        let lo = range.first().max(snap.read);
        let hi = range.last().min(newest);
        if lo > hi {
            // Entirely behind the read cursor or entirely in the future.
            return Ok(Vec::new());
        }

        let clamped = FrameRange { first: lo, last: hi };
        let (head, tail) = split_ring_range(clamped, self.ring.capacity());

        let mut frames = Vec::with_capacity(clamped.len() as usize);
        for chunk in std::iter::once(head).chain(tail) {
            for frame in chunk.first()..=chunk.last() {
                // SAFETY: read <= frame <= acquired - 1 was established from
                // the snapshot above, so the slot holds a completed frame
                // and is not queued to the driver (re-queued slots only ever
                // hold frames below the read cursor).
                let raw = unsafe { self.ring.slot(frame) };
                frames.push(self.decoder.decode(raw, self.shape.width, self.shape.height));
            }
        }

        // Frames sacrificed while we were decoding may have been overwritten
        // mid-read; drop them rather than hand back torn images.
        let read_now = self.counters.snapshot().read;
        if read_now > lo {
            let stale = (read_now.min(hi + 1) - lo) as usize;
            warn!(
                stale,
                first = lo,
                "frames overwritten during read, dropping stale decodes"
            );
            frames.drain(..stale);
        }

        let consumed = self.counters.advance_read_to(hi + 1);
        debug!(
            first = lo,
            last = hi,
            decoded = frames.len(),
            consumed,
            "frames read"
        );
        Ok(frames)
    }

    /// Geometry used for decoding.
    #[must_use]
    pub fn shape(&self) -> FrameShape {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decoder that records which slot bytes it saw: first byte of each raw
    /// frame becomes the single "pixel".
    struct FirstByteDecoder;

    impl PixelDecoder for FirstByteDecoder {
        fn decode(&self, raw: &[u8], width: u32, height: u32) -> Frame {
            Frame::from_u8(width, height, vec![raw[0]])
        }
    }

    fn range(first: u64, last: u64) -> FrameRange {
        FrameRange::new(first, last).expect("valid range")
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(matches!(FrameRange::new(5, 4), Err(AcqError::Logic(_))));
        assert_eq!(range(3, 3).len(), 1);
    }

    #[test]
    fn split_keeps_non_wrapping_ranges_whole() {
        let (head, tail) = split_ring_range(range(1, 3), 4);
        assert_eq!(head, range(1, 3));
        assert!(tail.is_none());
    }

    #[test]
    fn split_cuts_at_the_ring_boundary() {
        // Capacity 4, frames 6..=9: slots 2,3 then 0,1.
        let (head, tail) = split_ring_range(range(6, 9), 4);
        assert_eq!(head, range(6, 7));
        assert_eq!(tail, Some(range(8, 9)));
        assert_eq!(head.first() % 4, 2);
        assert_eq!(head.last() % 4, 3);
        let tail = tail.expect("wrapped range has a tail");
        assert_eq!(tail.first() % 4, 0);
        assert_eq!(tail.last() % 4, 1);
    }

    #[test]
    fn split_handles_range_starting_on_a_boundary() {
        let (head, tail) = split_ring_range(range(8, 9), 4);
        assert_eq!(head, range(8, 9));
        assert!(tail.is_none());
    }

    fn reader_with(capacity: usize, margin: usize) -> (FrameReader, Arc<AcqCounters>, FrameRing) {
        let ring = FrameRing::allocate(capacity, 4).expect("allocate ring");
        let counters = Arc::new(AcqCounters::new(capacity, margin));
        let reader = FrameReader::new(
            ring.clone(),
            Arc::clone(&counters),
            FrameShape {
                width: 2,
                height: 2,
                bytes_per_pixel: 1,
            },
            Arc::new(FirstByteDecoder),
        );
        (reader, counters, ring)
    }

    /// Stamp each frame's slot with the low byte of its logical index.
    #[allow(unsafe_code)]
    fn produce(ring: &FrameRing, counters: &AcqCounters, frames: u64) {
        let start = counters.snapshot().acquired;
        for frame in start..start + frames {
            // SAFETY: test is single-threaded, no driver owns any slot.
            unsafe {
                ring.slot_mut(frame)[0] = frame as u8;
            }
            counters.record_acquired();
        }
    }

    #[test]
    fn reads_frames_in_acquisition_order() {
        let (reader, counters, ring) = reader_with(8, 2);
        produce(&ring, &counters, 4);

        let frames = reader.read_frames(range(0, 3)).expect("read");
        let stamps: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(stamps, vec![0, 1, 2, 3]);
        assert_eq!(counters.snapshot().read, 4);
    }

    #[test]
    fn wrapped_read_crosses_the_ring_seam() {
        let (reader, counters, ring) = reader_with(4, 1);
        // 10 frames through a 4-slot ring; backlog capped at 3, so frames
        // 7, 8, 9 are the ones still readable.
        produce(&ring, &counters, 10);
        assert_eq!(counters.snapshot().read, 7);

        let frames = reader.read_frames(range(7, 9)).expect("read");
        let stamps: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(stamps, vec![7, 8, 9], "slots 3, 0, 1 in logical order");
        assert_eq!(counters.snapshot().read, 10);
    }

    #[test]
    fn request_below_read_cursor_fast_forwards() {
        let (reader, counters, ring) = reader_with(8, 2);
        produce(&ring, &counters, 6);
        counters.record_read(4).expect("consume 4");

        // Frames 0..=3 are gone; only 4 and 5 decode.
        let frames = reader.read_frames(range(0, 5)).expect("read");
        let stamps: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(stamps, vec![4, 5]);
        assert_eq!(counters.snapshot().read, 6);
    }

    #[test]
    fn request_beyond_acquired_is_clamped() {
        let (reader, counters, ring) = reader_with(8, 2);
        produce(&ring, &counters, 3);

        let frames = reader.read_frames(range(0, 100)).expect("read");
        assert_eq!(frames.len(), 3, "only acquired frames decode");
        assert_eq!(counters.snapshot().read, 3);
    }

    #[test]
    fn fully_consumed_request_returns_nothing() {
        let (reader, counters, ring) = reader_with(8, 2);
        produce(&ring, &counters, 4);
        counters.record_read(4).expect("consume all");

        let frames = reader.read_frames(range(0, 3)).expect("read");
        assert!(frames.is_empty());
        assert_eq!(counters.snapshot().read, 4, "cursor does not move backwards");
    }

    #[test]
    fn nothing_acquired_reads_empty() {
        let (reader, counters, _ring) = reader_with(8, 2);
        let frames = reader.read_frames(range(0, 3)).expect("read");
        assert!(frames.is_empty());
        assert_eq!(counters.snapshot().read, 0);
    }

    #[test]
    fn skipping_ahead_consumes_the_jumped_frames() {
        // The end-to-end counter scenario: capacity 8, margin 2, 12 frames
        // with no reads caps the backlog at 6 (read=6, missed=6); reading
        // (8, 11) then decodes 4 frames and consumes through frame 11.
        let (reader, counters, ring) = reader_with(8, 2);
        produce(&ring, &counters, 12);

        let snap = counters.snapshot();
        assert_eq!(snap.acquired, 12);
        assert_eq!(snap.read, 6);
        assert_eq!(snap.missed, 6);

        let frames = reader.read_frames(range(8, 11)).expect("read");
        let stamps: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(stamps, vec![8, 9, 10, 11]);
        assert_eq!(counters.snapshot().read, 12);
    }
}
