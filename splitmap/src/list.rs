//! Lock-free sorted linked list (Harris/Michael style).
//!
//! Keys are kept in strictly ascending order without duplicates. Removal is
//! two-phase: the victim's `next` link is first marked (logical delete), then
//! the predecessor is swung past it (physical unlink). Every traversal helps
//! unlink marked nodes it walks over. The thread whose CAS unlinks a node
//! retires it to the epoch collector, so concurrent readers never touch
//! freed memory.
//!
//! Operations start from an *anchor*: the list head or the `next` link of a
//! node that is never removed (the bucket dummies of the map).

use crate::backoff::Backoff;
use crate::tagged::{AtomicTaggedPtr, TaggedPtr};
use core::fmt;
use core::sync::atomic::Ordering;
use splitmap_epoch::{retire, Guard, RetiredNode};

/// List node.
///
/// `#[repr(C)]` keeps the reclamation header at offset 0.
#[repr(C)]
pub struct Node {
    retired: RetiredNode,
    key: u32,
    value: u32,
    next: AtomicTaggedPtr<Node>,
}

impl Node {
    fn alloc(key: u32, value: u32) -> *mut Node {
        Box::into_raw(Box::new(Node {
            retired: RetiredNode::new(),
            key,
            value,
            next: AtomicTaggedPtr::null(),
        }))
    }

    /// The (already transformed) key.
    #[inline]
    pub fn key(&self) -> u32 {
        self.key
    }

    /// The stored value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// The outgoing link, usable as an anchor while this node is never removed.
    #[inline]
    pub fn link(&self) -> &AtomicTaggedPtr<Node> {
        &self.next
    }

    /// True once the node has been logically removed.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.next.load(Ordering::Acquire).is_marked()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Result of `find`: the link to CAS and the value it held.
struct Position<'g> {
    prev: &'g AtomicTaggedPtr<Node>,
    curr: TaggedPtr<Node>,
    found: bool,
}

impl<'g> Position<'g> {
    /// The node `curr` points at.
    ///
    /// # Safety
    ///
    /// `curr` must be non-null and loaded under the guard bounding `'g`.
    #[inline]
    unsafe fn node(&self) -> &'g Node {
        unsafe { &*self.curr.ptr() }
    }
}

/// Lock-free sorted list of `u32` keys to `u32` values.
pub struct SortedList {
    head: AtomicTaggedPtr<Node>,
}

impl SortedList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            head: AtomicTaggedPtr::null(),
        }
    }

    /// The head link, the anchor covering the whole list.
    #[inline]
    pub fn head(&self) -> &AtomicTaggedPtr<Node> {
        &self.head
    }

    /// True if no node is linked from the head.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Walk from `anchor` to the first node whose key is `>= key`.
    ///
    /// Marked nodes on the way are unlinked and retired. If a help-CAS loses,
    /// the predecessor snapshot is stale and the walk restarts from `anchor`.
    fn find<'g>(&self, anchor: &'g AtomicTaggedPtr<Node>, key: u32, _guard: &'g Guard) -> Position<'g> {
        let mut backoff = Backoff::new();

        'retry: loop {
            let mut prev = anchor;
            let mut curr = prev.load(Ordering::Acquire);
            assert!(!curr.is_marked(), "list anchor belongs to a removed node");

            loop {
                if curr.is_null() {
                    return Position {
                        prev,
                        curr,
                        found: false,
                    };
                }
                // SAFETY: `curr` was reachable after the guard was pinned.
                let node: &'g Node = unsafe { &*curr.ptr() };
                let next = node.next.load(Ordering::Acquire);

                if next.is_marked() {
                    let unlinked = curr.successor(next.ptr());
                    match prev.compare_exchange(curr, unlinked, Ordering::AcqRel, Ordering::Acquire) {
                        Ok(_) => {
                            // SAFETY: our CAS made the node unreachable; it is retired once.
                            unsafe { retire(curr.ptr()) };
                            curr = unlinked;
                            continue;
                        }
                        Err(_) => {
                            backoff.spin();
                            continue 'retry;
                        }
                    }
                }

                if node.key >= key {
                    return Position {
                        prev,
                        curr,
                        found: node.key == key,
                    };
                }
                prev = &node.next;
                curr = next;
            }
        }
    }

    /// Insert `key -> value` starting the search at `anchor`.
    ///
    /// Returns `Ok(new_node)` on success, or `Err(existing)` if a live node
    /// with `key` is already present; the list is left untouched then.
    pub fn insert<'g>(
        &self,
        anchor: &'g AtomicTaggedPtr<Node>,
        key: u32,
        value: u32,
        guard: &'g Guard,
    ) -> Result<&'g Node, &'g Node> {
        let new = Node::alloc(key, value);
        let mut backoff = Backoff::new();

        loop {
            let pos = self.find(anchor, key, guard);
            if pos.found {
                // SAFETY: `new` was never published.
                unsafe { drop(Box::from_raw(new)) };
                // SAFETY: `found` implies a non-null `curr`.
                return Err(unsafe { pos.node() });
            }

            // SAFETY: `new` is still private to this thread.
            let new_ref = unsafe { &*new };
            new_ref
                .next
                .store(TaggedPtr::pack(pos.curr.ptr(), false, 0), Ordering::Relaxed);

            match pos.prev.compare_exchange(
                pos.curr,
                pos.curr.successor(new),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // SAFETY: published nodes are only freed through retirement.
                Ok(_) => return Ok(new_ref),
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Remove `key`, starting the search at `anchor`.
    ///
    /// Returns false if no live node with `key` exists.
    pub fn remove(&self, anchor: &AtomicTaggedPtr<Node>, key: u32, guard: &Guard) -> bool {
        let mut backoff = Backoff::new();

        loop {
            let pos = self.find(anchor, key, guard);
            if !pos.found {
                return false;
            }
            // SAFETY: `found` implies a non-null `curr`.
            let node = unsafe { pos.node() };

            // Phase 1: logical delete.
            let next = node.next.load(Ordering::Acquire);
            if next.is_marked() {
                // Lost to a concurrent remover; the next `find` splices it out.
                backoff.spin();
                continue;
            }
            if node
                .next
                .compare_exchange(next, next.marked_successor(), Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                backoff.spin();
                continue;
            }

            // Phase 2: physical unlink, or leave it to the helping in `find`.
            match pos.prev.compare_exchange(
                pos.curr,
                pos.curr.successor(next.ptr()),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // SAFETY: our CAS made the node unreachable; it is retired once.
                Ok(_) => unsafe { retire(pos.curr.ptr()) },
                Err(_) => {
                    self.find(anchor, key, guard);
                }
            }
            return true;
        }
    }

    /// Look up `key`, starting the search at `anchor`.
    pub fn search(&self, anchor: &AtomicTaggedPtr<Node>, key: u32, guard: &Guard) -> Option<u32> {
        let pos = self.find(anchor, key, guard);
        // SAFETY: `found` implies a non-null `curr`.
        pos.found.then(|| unsafe { pos.node() }.value)
    }

    /// Iterate over the live nodes in key order.
    ///
    /// The iterator is weakly consistent: it reflects some interleaving of
    /// concurrent updates, never a torn node.
    pub fn iter<'g>(&'g self, _guard: &'g Guard) -> Iter<'g> {
        Iter {
            curr: self.head.load(Ordering::Acquire),
            _guard,
        }
    }
}

impl Default for SortedList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SortedList {
    fn drop(&mut self) {
        // Iterative teardown: `&mut self` rules out concurrent access, and
        // unlinked nodes already belong to the collector.
        let mut curr = self.head.load(Ordering::Relaxed).ptr();
        while !curr.is_null() {
            // SAFETY: every node still linked is owned by the list.
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.load(Ordering::Relaxed).ptr();
        }
    }
}

impl fmt::Debug for SortedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = splitmap_epoch::pin();
        f.debug_list()
            .entries(self.iter(&guard).map(|node| (node.key, node.value)))
            .finish()
    }
}

/// Iterator over the live nodes of a [`SortedList`].
pub struct Iter<'g> {
    curr: TaggedPtr<Node>,
    _guard: &'g Guard,
}

impl<'g> Iterator for Iter<'g> {
    type Item = &'g Node;

    fn next(&mut self) -> Option<&'g Node> {
        loop {
            if self.curr.is_null() {
                return None;
            }
            // SAFETY: reached from the head while the guard is pinned.
            let node: &'g Node = unsafe { &*self.curr.ptr() };
            let next = node.next.load(Ordering::Acquire);
            self.curr = next;
            if !next.is_marked() {
                return Some(node);
            }
        }
    }
}
