//! Lock-free parameter snapshot publication
//!
//! Single-writer / single-reader triple buffer. The control thread writes a
//! new snapshot and publishes it; the audio thread picks it up at the next
//! block boundary without taking a lock. Slot ownership is tracked in one
//! packed atomic word: bits 0-1 write slot, bits 2-3 ready slot, bits 4-5
//! read slot, bit 6 "fresh" flag.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const FRESH: u32 = 1 << 6;

/// Triple-buffered cell holding `Arc<T>` snapshots
///
/// The writer only ever touches the write slot, the reader only the read
/// slot, and the ready slot is touched by neither; publish and acquire are
/// single CAS swaps of slot indices. Exactly one writer and one reader may
/// use the cell concurrently.
pub struct SnapshotCell<T> {
    slots: [UnsafeCell<Arc<T>>; 3],
    state: AtomicU32,
}

// Slot access is serialized through the packed atomic state; each slot has
// at most one owner at any time.
unsafe impl<T: Send + Sync> Send for SnapshotCell<T> {}
unsafe impl<T: Send + Sync> Sync for SnapshotCell<T> {}

impl<T> SnapshotCell<T> {
    /// Create a cell with an initial snapshot visible to the reader
    pub fn new(initial: T) -> Self {
        let initial = Arc::new(initial);
        Self {
            slots: [
                UnsafeCell::new(Arc::clone(&initial)),
                UnsafeCell::new(Arc::clone(&initial)),
                UnsafeCell::new(initial),
            ],
            // write=0, ready=1, read=2, nothing fresh
            state: AtomicU32::new(0b10_01_00),
        }
    }

    /// Publish a new snapshot (writer side)
    pub fn publish(&self, value: Arc<T>) {
        let state = self.state.load(Ordering::Acquire);
        let write_idx = (state & 0b11) as usize;
        // Only the writer may touch the write slot
        unsafe {
            *self.slots[write_idx].get() = value;
        }

        loop {
            let state = self.state.load(Ordering::Acquire);
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            // Swap write and ready, mark fresh
            let new_state = ready_idx | (write_idx << 2) | (read_idx << 4) | FRESH;

            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Read the latest published snapshot (reader side)
    pub fn read(&self) -> Arc<T> {
        // Claim the ready slot if a fresh snapshot is waiting
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & FRESH == 0 {
                break;
            }
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            // Swap ready and read, clear fresh
            let new_state = write_idx | (read_idx << 2) | (ready_idx << 4);

            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let state = self.state.load(Ordering::Acquire);
        let read_idx = ((state >> 4) & 0b11) as usize;
        // Only the reader may touch the read slot
        unsafe { Arc::clone(&*self.slots[read_idx].get()) }
    }

    /// Whether a snapshot has been published and not yet read
    pub fn has_fresh(&self) -> bool {
        self.state.load(Ordering::Acquire) & FRESH != 0
    }
}
