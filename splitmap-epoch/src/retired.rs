//! Retired node header and the intrusive bags that hold retired nodes.
//!
//! Every retirable allocation carries a [`RetiredNode`] as its first field.
//! Retirement threads the header onto a singly-linked bag, stamped with the
//! global epoch observed at retirement time, so no allocation is needed on
//! the retire path.

use core::cell::UnsafeCell;
use core::ptr;

/// Type-erased destructor, recorded on retirement.
pub(crate) type DestructorFn = unsafe fn(*mut RetiredNode);

/// Bookkeeping written exactly once, by the retiring thread.
struct RetireMeta {
    next: *mut RetiredNode,
    epoch: u64,
    destructor: Option<DestructorFn>,
}

/// Node header embedded in user's data structure.
///
/// Users must embed this as the first field of a `#[repr(C)]` node type to
/// enable retirement. Until the node is retired the header is never touched,
/// so concurrent readers of the surrounding node never race with it.
#[repr(C)]
pub struct RetiredNode {
    meta: UnsafeCell<RetireMeta>,
}

impl RetiredNode {
    /// Create an empty header.
    pub const fn new() -> Self {
        Self {
            meta: UnsafeCell::new(RetireMeta {
                next: ptr::null_mut(),
                epoch: 0,
                destructor: None,
            }),
        }
    }

    /// Stamp the header on retirement.
    ///
    /// # Safety
    ///
    /// Only the thread that retires the node may call this, once.
    #[inline]
    pub(crate) unsafe fn stamp(&self, epoch: u64, destructor: DestructorFn) {
        let meta = unsafe { &mut *self.meta.get() };
        meta.epoch = epoch;
        meta.destructor = Some(destructor);
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        unsafe { (*self.meta.get()).epoch }
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut RetiredNode {
        unsafe { (*self.meta.get()).next }
    }

    /// # Safety
    ///
    /// The caller must own the bag this node belongs to.
    #[inline]
    pub(crate) unsafe fn set_next(&self, next: *mut RetiredNode) {
        unsafe { (*self.meta.get()).next = next };
    }

    /// Run the recorded destructor, releasing the enclosing allocation.
    ///
    /// # Safety
    ///
    /// `node` must be retired, unreachable by every thread, and destroyed once.
    #[inline]
    pub(crate) unsafe fn destroy(node: *mut RetiredNode) {
        let destructor = unsafe { (*(*node).meta.get()).destructor };
        debug_assert!(destructor.is_some(), "destroying a node that was never retired");
        if let Some(d) = destructor {
            unsafe { d(node) };
        }
    }
}

impl Default for RetiredNode {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the header is written only by the retiring thread and read only by
// the thread that owns the bag it was pushed onto.
unsafe impl Send for RetiredNode {}
// SAFETY: see above; shared access never touches `meta` before retirement.
unsafe impl Sync for RetiredNode {}

/// Intrusive LIFO list of retired nodes.
pub(crate) struct Bag {
    head: *mut RetiredNode,
    len: usize,
}

// SAFETY: a bag exclusively owns the nodes linked into it.
unsafe impl Send for Bag {}

impl Bag {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// # Safety
    ///
    /// `node` must be stamped and owned by no other bag.
    #[inline]
    pub(crate) unsafe fn push(&mut self, node: *mut RetiredNode) {
        unsafe { (*node).set_next(self.head) };
        self.head = node;
        self.len += 1;
    }

    /// Move every node of `other` into `self`.
    pub(crate) fn append(&mut self, mut other: Bag) {
        while !other.head.is_null() {
            let node = other.head;
            other.head = unsafe { (*node).next() };
            // SAFETY: `node` was owned by `other`, which we consumed.
            unsafe { self.push(node) };
        }
    }

    /// Destroy every node stamped at or before `safe_epoch`.
    ///
    /// Returns the number of nodes freed.
    ///
    /// # Safety
    ///
    /// No thread may hold a reference to a node stamped at or before
    /// `safe_epoch`.
    pub(crate) unsafe fn free_up_to(&mut self, safe_epoch: u64) -> usize {
        let mut kept = Bag::new();
        let mut freed = 0;
        let mut curr = self.head;
        while !curr.is_null() {
            let node = unsafe { &*curr };
            let next = node.next();
            if node.epoch() <= safe_epoch {
                unsafe { RetiredNode::destroy(curr) };
                freed += 1;
            } else {
                unsafe { kept.push(curr) };
            }
            curr = next;
        }
        *self = kept;
        freed
    }
}
