//! This module defines the [FrameWriter] and [FrameReader] types for working
//! with a fixed-capacity ring of reusable decoded-frame slots, useful when a
//! single decode thread produces frames and a single render step consumes
//! them.
//!
//! Every slot's pixel buffer is allocated once up front and reused for the
//! whole session. Ownership of a slot alternates strictly between "producer
//! may mutate" and "consumer may read" through an explicit per-slot state
//! tag, so the two sides never race on pixel data and the consumer never
//! observes a half-written frame.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::dims::Dimensions;

/// The slot count used when the caller has no opinion. Enough for the
/// producer to stay a few frames ahead without hoarding memory.
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// Fewer slots than this and the producer and consumer could never overlap.
pub const MIN_SLOT_COUNT: usize = 2;

/// What the producer should do when every slot holds an unread frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Block until the consumer frees a slot. Never drops a frame; the
    /// consumer observes every sequence number with no gaps.
    #[default]
    Block,
    /// Evict the oldest unread frame to keep latency bounded. The consumer
    /// may observe gaps in sequence numbers, but never reordering.
    ///
    /// A slot the consumer has already claimed is never evicted; if the
    /// oldest unread frame is mid-read, the producer waits for its release
    /// before evicting the then-oldest one.
    DropOldest,
}

/// Where a slot currently is in the producer/consumer handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Reusable. Nothing interesting inside.
    Empty,
    /// The producer holds a [WriteSlot] for it.
    Writing,
    /// Published and waiting to be consumed.
    Ready,
    /// The consumer holds a [ReadSlot] for it.
    Reading,
}

/// The bookkeeping half of a slot. The pixel bytes live in a separate
/// per-slot mutex (see [RingShared::pixels]) so this stays small and the
/// ring lock is never held across pixel work.
#[derive(Debug)]
struct SlotControl {
    state: SlotState,
    /// Assigned at publish. `0` means the slot has never been written.
    sequence: u64,
}

#[derive(Debug)]
struct RingControl {
    slots: Box<[SlotControl]>,
    /// Next slot to write. Advanced only at publish.
    write_cursor: usize,
    /// Oldest unread slot. Advanced only at release (or eviction).
    read_cursor: usize,
    /// How many slots are currently [SlotState::Ready].
    ready_count: usize,
    next_sequence: u64,
    shut_down: bool,
}

#[derive(Debug)]
struct RingShared {
    control: Mutex<RingControl>,
    /// The producer parks here when the ring is full.
    writable: Condvar,
    /// One buffer per slot, index-aligned with [RingControl::slots]. A pixel
    /// mutex is only ever locked by the side the state tag says owns the
    /// slot, so these locks are uncontended; they exist so the borrow of the
    /// bytes can outlive the ring lock.
    pixels: Box<[Mutex<Box<[u8]>>]>,
    dimensions: Dimensions,
    stride_bytes: usize,
    policy: BackpressurePolicy,
}

/// The producer's handle to the ring. See [with_slot_count] to construct.
#[derive(Debug)]
pub struct FrameWriter {
    shared: Arc<RingShared>,
}

/// The consumer's handle to the ring. See [with_slot_count] to construct.
#[derive(Debug)]
pub struct FrameReader {
    shared: Arc<RingShared>,
}

/// Create a connected [FrameWriter]/[FrameReader] pair over `slot_count`
/// preallocated slots sized for `dimensions` (RGBA8, tightly packed rows).
///
/// Returns [None] if `slot_count` is below [MIN_SLOT_COUNT].
pub fn with_slot_count(
    dimensions: Dimensions,
    slot_count: usize,
    policy: BackpressurePolicy,
) -> Option<(FrameWriter, FrameReader)> {
    if slot_count < MIN_SLOT_COUNT {
        return None;
    }

    let stride_bytes = dimensions.stride_bytes();
    let frame_bytes = dimensions.frame_bytes(stride_bytes);

    let shared = Arc::new(RingShared {
        control: Mutex::new(RingControl {
            slots: (0..slot_count)
                .map(|_| SlotControl {
                    state: SlotState::Empty,
                    sequence: 0,
                })
                .collect(),
            write_cursor: 0,
            read_cursor: 0,
            ready_count: 0,
            next_sequence: 1,
            shut_down: false,
        }),
        writable: Condvar::new(),
        pixels: (0..slot_count)
            .map(|_| Mutex::new(vec![0u8; frame_bytes].into_boxed_slice()))
            .collect(),
        dimensions,
        stride_bytes,
        policy,
    });

    Some((
        FrameWriter {
            shared: shared.clone(),
        },
        FrameReader { shared },
    ))
}

impl FrameWriter {
    /// Claim exclusive mutable access to the next slot, blocking while the
    /// ring is full (under [BackpressurePolicy::Block]) or after evicting
    /// the oldest unread frame (under [BackpressurePolicy::DropOldest]).
    ///
    /// [None] is not an error: it means the ring has been shut down and the
    /// producer should exit its loop.
    pub fn acquire_write_slot(&self) -> Option<WriteSlot<'_>> {
        let mut control = self.shared.control.lock().expect(POISON_MSG);

        let index = loop {
            if control.shut_down {
                return None;
            }

            let index = control.write_cursor;
            if control.slots[index].state == SlotState::Empty
                && control.ready_count < control.slots.len() - 1
            {
                control.slots[index].state = SlotState::Writing;
                break index;
            }

            if self.shared.policy == BackpressurePolicy::DropOldest
                && control.slots[control.read_cursor].state == SlotState::Ready
            {
                let evicted = control.read_cursor;
                let dropped_sequence = control.slots[evicted].sequence;
                control.slots[evicted].state = SlotState::Empty;
                control.read_cursor = (evicted + 1) % control.slots.len();
                control.ready_count -= 1;
                log::debug!("Evicted unread frame {dropped_sequence} to bound latency.");
                continue;
            }

            control = self.shared.writable.wait(control).expect(POISON_MSG);
        };

        drop(control);

        // Uncontended: the state tag says this side owns the slot now.
        let pixels = self.shared.pixels[index].lock().expect(POISON_MSG);

        Some(WriteSlot {
            shared: &self.shared,
            index,
            pixels: Some(pixels),
        })
    }

    /// Idempotently shut the ring down, waking a blocked
    /// [Self::acquire_write_slot] call. Frames already published stay
    /// readable so the consumer can drain.
    pub fn shutdown(&self) {
        shutdown(&self.shared);
    }

    pub fn dimensions(&self) -> Dimensions {
        self.shared.dimensions
    }

    pub fn stride_bytes(&self) -> usize {
        self.shared.stride_bytes
    }
}

impl FrameReader {
    /// Claim the oldest unread frame, if there is one. Never blocks and
    /// never waits on the producer; [None] just means there's nothing new
    /// to show yet.
    pub fn acquire_read_slot(&self) -> Option<ReadSlot<'_>> {
        let mut control = self.shared.control.lock().expect(POISON_MSG);

        let index = control.read_cursor;
        if control.slots[index].state != SlotState::Ready {
            return None;
        }

        control.slots[index].state = SlotState::Reading;
        control.ready_count -= 1;
        let sequence = control.slots[index].sequence;

        // The unread count just dropped below capacity, so a full-ring
        // producer may be able to make progress once we release the slot.
        self.shared.writable.notify_one();
        drop(control);

        let pixels = self.shared.pixels[index].lock().expect(POISON_MSG);

        Some(ReadSlot {
            shared: &self.shared,
            index,
            sequence,
            pixels: Some(pixels),
        })
    }

    /// Idempotently shut the ring down, waking a blocked producer. See
    /// [FrameWriter::shutdown].
    pub fn shutdown(&self) {
        shutdown(&self.shared);
    }

    /// The number of published frames waiting to be read.
    pub fn unread_len(&self) -> usize {
        self.shared.control.lock().expect(POISON_MSG).ready_count
    }

    pub fn dimensions(&self) -> Dimensions {
        self.shared.dimensions
    }

    pub fn stride_bytes(&self) -> usize {
        self.shared.stride_bytes
    }
}

/// The consumer dropping its handle means no frame will ever be read again,
/// so a producer blocked on a full ring must be woken or it would hang
/// forever.
impl Drop for FrameReader {
    fn drop(&mut self) {
        shutdown(&self.shared);
    }
}

fn shutdown(shared: &RingShared) {
    let mut control = shared.control.lock().expect(POISON_MSG);
    if !control.shut_down {
        control.shut_down = true;
        shared.writable.notify_all();
    }
}

/// Exclusive mutable access to one slot's pixel buffer, returned by
/// [FrameWriter::acquire_write_slot].
///
/// Call [Self::publish] once the pixels hold a complete frame. Dropping the
/// guard without publishing aborts the write: the slot returns to reusable,
/// no sequence number is spent, and the consumer never sees it.
pub struct WriteSlot<'a> {
    shared: &'a RingShared,
    index: usize,
    pixels: Option<MutexGuard<'a, Box<[u8]>>>,
}

impl WriteSlot<'_> {
    /// The destination buffer for one full frame in the display format.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.pixels.as_mut().expect(GUARD_MSG)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.shared.dimensions
    }

    pub fn stride_bytes(&self) -> usize {
        self.shared.stride_bytes
    }

    /// Mark the frame complete and visible to the consumer, returning the
    /// sequence number it was assigned.
    ///
    /// The ring mutex is what makes the pixel contents written through
    /// [Self::pixels_mut] visible to the consumer before the slot can be
    /// observed as ready.
    pub fn publish(mut self) -> u64 {
        // Release the pixel lock before touching the ring lock; no path in
        // this module ever holds both at once.
        drop(self.pixels.take());

        let mut control = self.shared.control.lock().expect(POISON_MSG);
        debug_assert_eq!(control.slots[self.index].state, SlotState::Writing);

        let sequence = control.next_sequence;
        control.next_sequence += 1;
        control.slots[self.index].state = SlotState::Ready;
        control.slots[self.index].sequence = sequence;
        control.write_cursor = (self.index + 1) % control.slots.len();
        control.ready_count += 1;
        debug_assert!(control.ready_count < control.slots.len());

        sequence
    }
}

/// Dropping without [WriteSlot::publish] aborts the write.
impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        let Some(pixels) = self.pixels.take() else {
            // Already published.
            return;
        };
        drop(pixels);

        let mut control = self.shared.control.lock().expect(POISON_MSG);
        debug_assert_eq!(control.slots[self.index].state, SlotState::Writing);
        control.slots[self.index].state = SlotState::Empty;
    }
}

/// Shared read access to one published frame, returned by
/// [FrameReader::acquire_read_slot].
///
/// Dropping the guard releases the slot for reuse and advances the read
/// cursor; [Self::release] exists for when that deserves to be visible in
/// the calling code.
pub struct ReadSlot<'a> {
    shared: &'a RingShared,
    index: usize,
    sequence: u64,
    pixels: Option<MutexGuard<'a, Box<[u8]>>>,
}

impl ReadSlot<'_> {
    /// The published frame in the display format.
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_ref().expect(GUARD_MSG)
    }

    /// The monotonic display-order identifier this frame was published with.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn dimensions(&self) -> Dimensions {
        self.shared.dimensions
    }

    pub fn stride_bytes(&self) -> usize {
        self.shared.stride_bytes
    }

    /// Hand the slot back for reuse (same as dropping the guard).
    pub fn release(self) {}
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        drop(self.pixels.take());

        let mut control = self.shared.control.lock().expect(POISON_MSG);
        debug_assert_eq!(control.slots[self.index].state, SlotState::Reading);
        control.slots[self.index].state = SlotState::Empty;
        control.read_cursor = (self.index + 1) % control.slots.len();

        // A full-ring producer may have been waiting for this exact slot.
        self.shared.writable.notify_one();
    }
}

const POISON_MSG: &str = "Another thread panicked while holding a ring lock.";
const GUARD_MSG: &str = "The pixel guard should be present until publish/release.";
