//! Bucket directory: a fixed-depth tree of pages mapping bucket index to the
//! dummy node that begins the bucket.
//!
//! A bucket index is split into `level_count` digits of `SLOT_BITS` bits,
//! most significant first. Each digit selects a slot in one page; interior
//! slots point to child pages, leaf slots to bucket nodes. Pages are
//! allocated on first use and every slot is written at most once, by a CAS
//! against null, so the directory grows without locks and without moving
//! anything a reader may hold.

use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Bytes per page, one memory page.
const PAGE_SIZE: usize = 4096;

/// Slots per page.
pub const SLOT_FANOUT: usize = PAGE_SIZE / size_of::<usize>();

const SLOT_BITS: u32 = SLOT_FANOUT.trailing_zeros();
const SLOT_MASK: usize = SLOT_FANOUT - 1;

/// One directory page. Slots hold either child pages or leaf entries,
/// depending on the page's depth.
#[repr(C, align(4096))]
struct Page {
    slots: [AtomicPtr<()>; SLOT_FANOUT],
}

impl Page {
    fn new_boxed() -> Box<Page> {
        Box::new(Page {
            slots: core::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
        })
    }
}

/// Write-once leaf slot of a [`BucketDirectory`].
pub struct BucketSlot<'a, T> {
    slot: &'a AtomicPtr<()>,
    _marker: PhantomData<*mut T>,
}

impl<'a, T> BucketSlot<'a, T> {
    /// The installed entry, or null.
    #[inline]
    pub fn load(&self) -> *mut T {
        self.slot.load(Ordering::Acquire) as *mut T
    }

    /// Install `entry` if the slot is still empty.
    ///
    /// On failure returns the entry installed by someone else.
    #[inline]
    pub fn install(&self, entry: *mut T) -> Result<(), *mut T> {
        self.slot
            .compare_exchange(
                ptr::null_mut(),
                entry as *mut (),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|existing| existing as *mut T)
    }
}

/// Lazily allocated, fixed-depth page tree indexed by bucket number.
///
/// The directory does not own the leaf entries, only its pages.
pub struct BucketDirectory<T> {
    root: Box<Page>,
    level_count: u32,
    _marker: PhantomData<*mut T>,
}

// SAFETY: pages are only mutated through atomics; leaf entries are shared
// raw pointers whose lifetime is managed by the owner of the directory.
unsafe impl<T: Send + Sync> Send for BucketDirectory<T> {}
unsafe impl<T: Send + Sync> Sync for BucketDirectory<T> {}

impl<T> BucketDirectory<T> {
    /// Creates a directory deep enough to address every index `< max_buckets`.
    pub fn new(max_buckets: u64) -> Self {
        let mut level_count = 1;
        let mut capacity = SLOT_FANOUT as u64;
        while capacity < max_buckets {
            level_count += 1;
            capacity = capacity.saturating_mul(SLOT_FANOUT as u64);
        }
        Self {
            root: Page::new_boxed(),
            level_count,
            _marker: PhantomData,
        }
    }

    /// Number of page levels between the root and the leaf slots (inclusive).
    #[inline]
    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Number of addressable bucket indices.
    pub fn capacity(&self) -> u64 {
        (SLOT_FANOUT as u64).saturating_pow(self.level_count)
    }

    /// Locate the leaf slot of `index`.
    ///
    /// Missing pages on the way are allocated and installed when
    /// `create_if_missing` is set; otherwise the first missing page yields
    /// `None`. A page that loses the install race is discarded.
    pub fn get_slot(&self, index: u32, create_if_missing: bool) -> Option<BucketSlot<'_, T>> {
        self.walk(index, create_if_missing).map(|slot| BucketSlot {
            slot,
            _marker: PhantomData,
        })
    }

    /// Locate the leaf slot of `index`, allocating missing pages.
    pub fn slot_or_create(&self, index: u32) -> BucketSlot<'_, T> {
        match self.walk(index, true) {
            Some(slot) => BucketSlot {
                slot,
                _marker: PhantomData,
            },
            None => unreachable!("page creation never stops a walk"),
        }
    }

    fn walk(&self, index: u32, create_if_missing: bool) -> Option<&AtomicPtr<()>> {
        assert!(
            (index as u64) < self.capacity(),
            "bucket index {index} exceeds directory capacity {}",
            self.capacity()
        );

        let mut page: &Page = &self.root;
        for level in (1..self.level_count).rev() {
            let digit = Self::digit(index, level);
            let slot = &page.slots[digit];
            let mut child = slot.load(Ordering::Acquire) as *mut Page;

            if child.is_null() {
                if !create_if_missing {
                    return None;
                }
                let fresh = Box::into_raw(Page::new_boxed());
                child = match slot.compare_exchange(
                    ptr::null_mut(),
                    fresh as *mut (),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => fresh,
                    Err(existing) => {
                        // SAFETY: `fresh` lost the race and was never published.
                        unsafe { drop(Box::from_raw(fresh)) };
                        existing as *mut Page
                    }
                };
            }
            // SAFETY: installed pages live until the directory is dropped.
            page = unsafe { &*child };
        }

        Some(&page.slots[Self::digit(index, 0)])
    }

    #[inline]
    fn digit(index: u32, level: u32) -> usize {
        let shift = level * SLOT_BITS;
        if shift >= u32::BITS {
            0
        } else {
            (index as usize >> shift) & SLOT_MASK
        }
    }
}

impl<T> Drop for BucketDirectory<T> {
    /// Frees every page below the root with an explicit stack.
    fn drop(&mut self) {
        let mut stack: Vec<(*mut Page, u32)> = Vec::new();
        let root: *mut Page = &mut *self.root;
        stack.push((root, self.level_count));

        while let Some((page, depth)) = stack.pop() {
            // Leaf pages hold entries, not pages.
            if depth > 1 {
                // SAFETY: `&mut self` rules out concurrent access.
                for slot in unsafe { &(*page).slots } {
                    let child = slot.load(Ordering::Relaxed) as *mut Page;
                    if !child.is_null() {
                        stack.push((child, depth - 1));
                    }
                }
            }
            if page != root {
                // SAFETY: each child page is reachable from exactly one slot.
                unsafe { drop(Box::from_raw(page)) };
            }
        }
    }
}
