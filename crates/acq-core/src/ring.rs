//! Fixed ring of frame buffers shared between the driver and the reader.
//!
//! The ring owns `capacity` equally sized byte buffers. A buffer is
//! identified by its slot index `0..capacity`; logical frame `i` always
//! lands in slot `i % capacity`. Ownership of a slot is exchanged by
//! counter convention, not by a per-slot lock: a slot is driver-owned while
//! it is queued for a future frame, and reader-owned while it holds a frame
//! `f` with `read <= f < acquired`. Those ranges never overlap because
//! `acquired` only advances after the driver finished writing, and a slot is
//! only re-queued once its previous occupant dropped below `read`.
//!
//! The `queued` flags exist for bookkeeping and defensive checks (refusing
//! to release a ring the driver still writes into), not for synchronization.

use crate::adapter::RawSlot;
use crate::error::{AcqError, AcqResult};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

struct RingInner {
    /// Slot storage. Accessed through raw pointers by the driver (write
    /// side) and through shared slices by the reader; the counter partition
    /// keeps the two from ever touching the same slot.
    slots: Vec<UnsafeCell<Vec<u8>>>,
    slot_bytes: usize,
    queued: Vec<AtomicBool>,
    in_flight: AtomicUsize,
    released: AtomicBool,
}

// SAFETY: RingInner is shared across the producer thread, the driver's
// thread, and reader threads. The UnsafeCell contents are only written by
// the driver while the slot is queued, and only read by the reader while the
// slot holds a frame below `acquired`; the counter partition documented on
// the module keeps these disjoint.
#[allow(unsafe_code)]
unsafe impl Send for RingInner {}
#[allow(unsafe_code)]
unsafe impl Sync for RingInner {}

/// Handle to the shared frame ring. Cheap to clone.
#[derive(Clone)]
pub struct FrameRing {
    inner: Arc<RingInner>,
}

impl FrameRing {
    /// Allocate a ring of `buffer_count` buffers of `slot_bytes` each.
    ///
    /// Buffers are zero-filled; the driver overwrites them.
    pub fn allocate(buffer_count: usize, slot_bytes: usize) -> AcqResult<Self> {
        if buffer_count < 1 {
            return Err(AcqError::Allocation {
                reason: "ring needs at least one buffer".to_string(),
            });
        }
        if slot_bytes == 0 {
            return Err(AcqError::Allocation {
                reason: "slot size must be non-zero".to_string(),
            });
        }

        let slots: Vec<UnsafeCell<Vec<u8>>> = (0..buffer_count)
            .map(|_| UnsafeCell::new(vec![0u8; slot_bytes]))
            .collect();
        let queued = (0..buffer_count).map(|_| AtomicBool::new(false)).collect();

        info!(
            buffer_count,
            slot_bytes,
            total_mb = (buffer_count * slot_bytes) as f64 / (1024.0 * 1024.0),
            "frame ring allocated"
        );

        Ok(Self {
            inner: Arc::new(RingInner {
                slots,
                slot_bytes,
                queued,
                in_flight: AtomicUsize::new(0),
                released: AtomicBool::new(false),
            }),
        })
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Size in bytes of each slot.
    #[must_use]
    pub fn slot_bytes(&self) -> usize {
        self.inner.slot_bytes
    }

    /// Number of slots currently queued to the driver.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Ring slot index for a logical frame.
    #[must_use]
    pub fn slot_index(&self, frame: u64) -> usize {
        (frame % self.capacity() as u64) as usize
    }

    /// Raw write target for the slot of `frame`, to be handed to the driver.
    ///
    /// The pointer stays valid for the lifetime of the ring; ownership is
    /// tracked by slot index.
    #[must_use]
    #[allow(unsafe_code)]
    pub fn raw_slot(&self, frame: u64) -> RawSlot {
        let index = self.slot_index(frame);
        // SAFETY: the cell's Vec is never resized after allocation, so the
        // data pointer is stable. Taking the pointer does not read or write
        // the buffer contents.
        let ptr = unsafe { (*self.inner.slots[index].get()).as_mut_ptr() };
        RawSlot {
            slot: index,
            ptr,
            len: self.inner.slot_bytes,
        }
    }

    /// Shared view of the slot holding `frame`.
    ///
    /// # Safety
    ///
    /// The caller must ensure the frame is reader-owned, i.e.
    /// `read <= frame <= acquired - 1` for the counters governing this ring,
    /// so the driver is not concurrently writing the slot.
    #[must_use]
    #[allow(unsafe_code)]
    pub unsafe fn slot(&self, frame: u64) -> &[u8] {
        let index = self.slot_index(frame);
        debug_assert!(
            !self.inner.queued[index].load(Ordering::Acquire),
            "slot {} read while queued to the driver",
            index
        );
        &*self.inner.slots[index].get()
    }

    /// Exclusive view of the slot holding `frame`.
    ///
    /// # Safety
    ///
    /// Same ownership requirement as [`slot`](Self::slot), plus no other
    /// reference to this slot may exist for the lifetime of the borrow.
    #[must_use]
    #[allow(unsafe_code)]
    pub unsafe fn slot_mut(&self, frame: u64) -> &mut [u8] {
        let index = self.slot_index(frame);
        debug_assert!(
            !self.inner.queued[index].load(Ordering::Acquire),
            "slot {} written while queued to the driver",
            index
        );
        &mut *self.inner.slots[index].get()
    }

    /// Mark the slot of `frame` as queued to the driver.
    pub(crate) fn mark_queued(&self, frame: u64) {
        let index = self.slot_index(frame);
        let was = self.inner.queued[index].swap(true, Ordering::AcqRel);
        debug_assert!(!was, "slot {} queued twice", index);
        if !was {
            self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Mark the slot of `frame` as returned by the driver.
    pub(crate) fn mark_returned(&self, frame: u64) {
        let index = self.slot_index(frame);
        let was = self.inner.queued[index].swap(false, Ordering::AcqRel);
        if was {
            self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Mark every slot as returned (after the driver aborted capture).
    pub(crate) fn mark_all_returned(&self) {
        for flag in &self.inner.queued {
            flag.store(false, Ordering::Release);
        }
        self.inner.in_flight.store(0, Ordering::Release);
    }

    /// Validate that the ring can be torn down.
    ///
    /// Fails with [`AcqError::RingBusy`] while any slot is still queued to
    /// the driver; the caller must stop capture first. On success the ring
    /// is flagged released; the backing memory is freed when the last
    /// handle drops.
    pub fn release(&self) -> AcqResult<()> {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            return Err(AcqError::RingBusy { in_flight });
        }
        self.inner.released.store(true, Ordering::Release);
        info!(
            buffer_count = self.capacity(),
            slot_bytes = self.slot_bytes(),
            "frame ring released"
        );
        Ok(())
    }
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("capacity", &self.capacity())
            .field("slot_bytes", &self.slot_bytes())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
