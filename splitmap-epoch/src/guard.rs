//! Guard and Handle for critical section management.
//!
//! - Pin: publish the current global epoch in the thread's slot (outermost
//!   pin only; nested pins share it).
//! - Retire: stamp the node with the global epoch and push it onto the
//!   thread-local bag.
//! - Collect: every `RETIRE_FREQ` retirements, try to advance the epoch and
//!   free every node stamped two or more epochs ago.

use crate::retired::{Bag, RetiredNode};
use crate::slot::{self, EpochState, ThreadSlot, RETIRE_FREQ};
use alloc::boxed::Box;
use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;

/// RAII guard representing an active critical section.
///
/// While a Guard exists, the thread's slot holds the epoch it pinned in and
/// no node retired after that point is freed. References obtained while the
/// guard is alive stay valid until it is dropped.
///
/// Nested `pin()` calls are cheap: only the outermost pin publishes an epoch,
/// and only dropping the outermost guard clears it.
pub struct Guard {
    // Guards are tied to the thread that created them.
    _marker: PhantomData<*mut ()>,
}

impl Guard {
    /// Force a reclamation attempt for the current thread.
    ///
    /// Tries to advance the global epoch and frees every retired node that has
    /// become safe, including nodes orphaned by exited threads.
    pub fn flush(&self) -> usize {
        HANDLE.with(|handle| handle.collect())
    }
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        HANDLE.with(|handle| handle.unpin());
    }
}

impl core::fmt::Debug for Guard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad("Guard { .. }")
    }
}

/// Thread-local handle: slot ownership, pin depth and the retired bag.
struct Handle {
    /// Thread ID (lazily allocated)
    tid: Cell<Option<usize>>,
    /// Slot of `tid`, cached to skip the chunk walk
    slot: Cell<Option<&'static ThreadSlot>>,
    /// Number of live Guard instances on this thread
    pin_count: Cell<usize>,
    /// Retirements since the last collection attempt
    retire_count: Cell<usize>,
    bag: UnsafeCell<Bag>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            tid: Cell::new(None),
            slot: Cell::new(None),
            pin_count: Cell::new(0),
            retire_count: Cell::new(0),
            bag: UnsafeCell::new(Bag::new()),
        }
    }

    #[inline]
    fn global(&self) -> &'static EpochState {
        slot::global()
    }

    #[inline]
    fn slot(&self) -> &'static ThreadSlot {
        match self.slot.get() {
            Some(slot) => slot,
            None => {
                let global = self.global();
                let tid = global.alloc_tid();
                let slot = global.slot(tid);
                self.tid.set(Some(tid));
                self.slot.set(Some(slot));
                slot
            }
        }
    }

    #[inline]
    fn pin(&self) -> Guard {
        let count = self.pin_count.get();
        if count == 0 {
            self.global().enter(self.slot());
        }
        self.pin_count.set(count + 1);
        Guard {
            _marker: PhantomData,
        }
    }

    #[inline]
    fn unpin(&self) {
        let count = self.pin_count.get();
        debug_assert!(count > 0, "Guard dropped with pin_count == 0");
        self.pin_count.set(count - 1);
        if count == 1 {
            if let Some(slot) = self.slot.get() {
                slot.clear();
            }
        }
    }

    /// # Safety
    ///
    /// See [`retire`].
    unsafe fn retire<T: 'static>(&self, ptr: *mut T) {
        unsafe fn destructor<T>(node: *mut RetiredNode) {
            // SAFETY: `node` is the header at offset 0 of a boxed `T`.
            unsafe { drop(Box::from_raw(node as *mut T)) };
        }

        let node = ptr as *mut RetiredNode;
        let epoch = self.global().epoch();
        // SAFETY: the caller retires `ptr` once; the bag is thread-local.
        unsafe {
            (*node).stamp(epoch, destructor::<T>);
            (*self.bag.get()).push(node);
        }

        let count = self.retire_count.get() + 1;
        self.retire_count.set(count);
        if count % RETIRE_FREQ == 0 {
            self.collect();
        }
    }

    /// Advance the epoch if possible and free what became safe.
    fn collect(&self) -> usize {
        let global = self.global();
        let epoch = global.try_advance();
        let Some(safe_epoch) = epoch.checked_sub(2) else {
            return 0;
        };

        // SAFETY: every thread pinned now entered at `safe_epoch + 1` or later,
        // after the nodes stamped at `safe_epoch` were unlinked.
        let freed = unsafe { (*self.bag.get()).free_up_to(safe_epoch) }
            + global.collect_orphans(safe_epoch);
        if freed > 0 {
            trace_log!(freed, epoch, "reclaimed retired nodes");
        }
        freed
    }

    fn retired_len(&self) -> usize {
        unsafe { (*self.bag.get()).len() }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let Some(tid) = self.tid.get() else {
            return;
        };
        let global = self.global();
        let bag = core::mem::replace(self.bag.get_mut(), Bag::new());
        global.adopt_orphans(bag);
        global.free_tid(tid);
        self.tid.set(None);
        self.slot.set(None);
    }
}

std::thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Enter a critical section.
///
/// Returns a `Guard` that represents the active critical section.
/// While the guard exists, nodes reachable when they were loaded are not
/// freed, even if they are unlinked and retired concurrently.
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|handle| handle.pin())
}

/// Retire a node for later reclamation.
///
/// The node is stamped with the current global epoch and freed once every
/// thread pinned at that epoch has left its critical section.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and point to a `#[repr(C)]` type
///   whose first field is a [`RetiredNode`].
/// - `ptr` must already be unreachable for threads that pin after this call.
/// - `ptr` must not be retired more than once, nor freed by other means.
#[inline]
pub unsafe fn retire<T: 'static>(ptr: *mut T) {
    // SAFETY: caller upholds the contract above.
    HANDLE.with(|handle| unsafe { handle.retire(ptr) })
}

/// Number of nodes retired by the current thread and not freed yet.
pub fn pending_retirements() -> usize {
    HANDLE.with(|handle| handle.retired_len())
}
