//! Slot structures and global state.
//!
//! Each thread owns one `ThreadSlot` publishing the epoch it is pinned in.
//! The global state holds the epoch counter, the slot table, the thread ID
//! allocator and the bag of nodes orphaned by exited threads.
//!
//! The slot table is a linked list of fixed-size chunks. A chunk is appended
//! with a CAS when a new thread ID falls past the last one, and chunks are
//! never freed, so any number of threads can be live at once and a slot
//! reference stays valid for the life of the process.

use crate::retired::Bag;
use crate::ttas::TTas;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use once_cell::race::OnceBox;
use portable_atomic::AtomicU64;

/// Slots per chunk of the slot table
pub(crate) const SLOTS_PER_CHUNK: usize = 64;

/// Try to advance the epoch and collect every `RETIRE_FREQ` retirements
pub(crate) const RETIRE_FREQ: usize = 64;

/// Low bit of a slot word: set while the owning thread is pinned
const PINNED: u64 = 1;

/// Slot word of a thread outside any critical section
const INACTIVE: u64 = 0;

/// Per-thread epoch publication, padded to avoid false sharing.
///
/// Holds `(epoch << 1) | PINNED` while pinned, `INACTIVE` otherwise.
#[repr(align(128))]
pub(crate) struct ThreadSlot {
    word: AtomicU64,
}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            word: AtomicU64::new(INACTIVE),
        }
    }

    #[inline]
    pub(crate) fn publish(&self, epoch: u64) {
        self.word.store((epoch << 1) | PINNED, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn clear(&self) {
        self.word.store(INACTIVE, Ordering::Release);
    }

    /// The epoch this slot is pinned in, if any.
    #[inline]
    pub(crate) fn pinned_epoch(&self) -> Option<u64> {
        let word = self.word.load(Ordering::SeqCst);
        (word & PINNED != 0).then_some(word >> 1)
    }
}

/// A run of `SLOTS_PER_CHUNK` slots and the link to the next run.
struct SlotChunk {
    slots: [ThreadSlot; SLOTS_PER_CHUNK],
    next: AtomicPtr<SlotChunk>,
}

impl SlotChunk {
    fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| ThreadSlot::new()),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    fn next(&self) -> Option<&'static SlotChunk> {
        // SAFETY: linked chunks are leaked and never freed.
        unsafe { self.next.load(Ordering::Acquire).as_ref() }
    }

    /// The next chunk, appending one if this is the last.
    fn next_or_grow(&self) -> &'static SlotChunk {
        if let Some(next) = self.next() {
            return next;
        }
        let fresh = Box::into_raw(Box::new(SlotChunk::new()));
        match self
            .next
            .compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug_log!("grew thread slot table");
                // SAFETY: just published, never freed.
                unsafe { &*fresh }
            }
            Err(existing) => {
                // SAFETY: `fresh` lost the race and was never published.
                unsafe { drop(Box::from_raw(fresh)) };
                // SAFETY: linked chunks are never freed.
                unsafe { &*existing }
            }
        }
    }
}

/// Global epoch state
pub(crate) struct EpochState {
    /// First chunk of the slot table
    chunks: &'static SlotChunk,
    epoch: AtomicU64,
    /// Thread ID allocator (next never-used ID)
    next_tid: AtomicUsize,
    /// Released thread IDs for recycling
    free_tids: TTas<Vec<usize>>,
    /// Retired nodes left behind by exited threads
    orphans: TTas<Bag>,
}

impl EpochState {
    fn new() -> Self {
        Self {
            chunks: Box::leak(Box::new(SlotChunk::new())),
            epoch: AtomicU64::new(0),
            next_tid: AtomicUsize::new(0),
            free_tids: TTas::new(Vec::new()),
            orphans: TTas::new(Bag::new()),
        }
    }

    /// The slot of `tid`, appending chunks up to it if needed.
    pub(crate) fn slot(&self, tid: usize) -> &'static ThreadSlot {
        let mut chunk = self.chunks;
        for _ in 0..tid / SLOTS_PER_CHUNK {
            chunk = chunk.next_or_grow();
        }
        &chunk.slots[tid % SLOTS_PER_CHUNK]
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Publish the current epoch in `tid`'s slot.
    ///
    /// Re-publishes until the published epoch is still current after the
    /// fence, so every pointer loaded afterwards is covered by the slot.
    pub(crate) fn enter(&self, slot: &ThreadSlot) {
        loop {
            let epoch = self.epoch();
            slot.publish(epoch);
            fence(Ordering::SeqCst);
            if self.epoch() == epoch {
                return;
            }
        }
    }

    /// Advance the global epoch if every pinned thread has observed it.
    ///
    /// Returns the epoch current after the attempt.
    pub(crate) fn try_advance(&self) -> u64 {
        let epoch = self.epoch();
        fence(Ordering::SeqCst);

        let mut chunk = Some(self.chunks);
        while let Some(current) = chunk {
            for slot in &current.slots {
                if let Some(pinned) = slot.pinned_epoch() {
                    if pinned != epoch {
                        return epoch;
                    }
                }
            }
            chunk = current.next();
        }

        match self
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                trace_log!(epoch = epoch + 1, "advanced global epoch");
                epoch + 1
            }
            Err(current) => current,
        }
    }

    /// Hand a bag over to whichever thread collects next.
    pub(crate) fn adopt_orphans(&self, bag: Bag) {
        if bag.is_empty() {
            return;
        }
        debug_log!(nodes = bag.len(), "orphaning retired nodes of exiting thread");
        self.orphans.lock().append(bag);
    }

    /// Free orphaned nodes that became safe, unless another thread is already at it.
    pub(crate) fn collect_orphans(&self, safe_epoch: u64) -> usize {
        match self.orphans.try_lock() {
            // SAFETY: callers pass an epoch at least two behind the global one.
            Some(mut orphans) if !orphans.is_empty() => unsafe { orphans.free_up_to(safe_epoch) },
            _ => 0,
        }
    }

    /// Allocate a thread ID
    pub(crate) fn alloc_tid(&self) -> usize {
        if let Some(tid) = self.free_tids.lock().pop() {
            return tid;
        }
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }

    /// Release a thread ID for recycling
    pub(crate) fn free_tid(&self, tid: usize) {
        self.slot(tid).clear();
        self.free_tids.lock().push(tid);
    }
}

static GLOBAL: OnceBox<EpochState> = OnceBox::new();

#[inline]
pub(crate) fn global() -> &'static EpochState {
    GLOBAL.get_or_init(|| Box::new(EpochState::new()))
}
