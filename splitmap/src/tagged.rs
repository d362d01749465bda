//! Tagged pointers: a pointer, a deletion mark and an ABA tag in one word.
//!
//! Bit layout of the packed `u64`:
//!
//! ```text
//!  63            48  47                                    1   0
//! +----------------+----------------------------------------+---+
//! |      tag       |                address                 | M |
//! +----------------+----------------------------------------+---+
//! ```
//!
//! - bits 0..48: the address. Canonical user-space addresses with 48-bit
//!   virtual addressing (x86-64, AArch64) fit, as does every 32-bit address.
//!   Pointees are at least 2-byte aligned, which frees bit 0.
//! - bit 0 (`M`): "logically deleted" mark of the node owning the link.
//! - bits 48..64: 16-bit tag, bumped on every successful link mutation.
//!
//! Equality and compare-and-swap operate on the whole word, so a changed tag
//! or mark fails a CAS exactly like a changed address would.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;

const TAG_SHIFT: u32 = 48;
const MARK_BIT: u64 = 1;
const ADDR_MASK: u64 = ((1 << TAG_SHIFT) - 1) & !MARK_BIT;

/// A packed `(pointer, mark, tag)` triple.
pub struct TaggedPtr<T> {
    word: u64,
    _marker: PhantomData<*mut T>,
}

impl<T> TaggedPtr<T> {
    /// The null pointer, unmarked, with tag 0.
    #[inline]
    pub const fn null() -> Self {
        Self::from_raw(0)
    }

    /// Pack a pointer, a mark and a tag into one word.
    ///
    /// The address must fit in 48 bits and be at least 2-byte aligned.
    #[inline]
    pub fn pack(ptr: *mut T, mark: bool, tag: u16) -> Self {
        let addr = ptr as usize as u64;
        debug_assert!(
            addr & !ADDR_MASK == 0,
            "address {addr:#x} is misaligned or wider than {TAG_SHIFT} bits"
        );
        Self::from_raw((addr & ADDR_MASK) | (mark as u64) | ((tag as u64) << TAG_SHIFT))
    }

    /// Split the word back into its parts.
    #[inline]
    pub fn unpack(self) -> (*mut T, bool, u16) {
        (self.ptr(), self.is_marked(), self.tag())
    }

    /// Reinterpret a raw packed word.
    #[inline]
    pub const fn from_raw(word: u64) -> Self {
        Self {
            word,
            _marker: PhantomData,
        }
    }

    /// The raw packed word.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.word
    }

    /// The address with mark and tag stripped.
    #[inline]
    pub fn ptr(self) -> *mut T {
        (self.word & ADDR_MASK) as usize as *mut T
    }

    /// True if the address part is null, whatever the mark and tag.
    #[inline]
    pub fn is_null(self) -> bool {
        self.word & ADDR_MASK == 0
    }

    /// True if the owning node is logically deleted.
    #[inline]
    pub fn is_marked(self) -> bool {
        self.word & MARK_BIT != 0
    }

    /// The 16-bit ABA tag.
    #[inline]
    pub fn tag(self) -> u16 {
        (self.word >> TAG_SHIFT) as u16
    }

    /// `self` with the mark set.
    #[inline]
    pub fn with_mark(self) -> Self {
        Self::from_raw(self.word | MARK_BIT)
    }

    /// `self` with the mark cleared.
    #[inline]
    pub fn without_mark(self) -> Self {
        Self::from_raw(self.word & !MARK_BIT)
    }

    /// `self` with the tag replaced.
    #[inline]
    pub fn with_tag(self, tag: u16) -> Self {
        Self::from_raw((self.word & (ADDR_MASK | MARK_BIT)) | ((tag as u64) << TAG_SHIFT))
    }

    /// The value a link holding `self` should be replaced with to point at
    /// `ptr`: unmarked, with the tag advanced by one (wrapping).
    #[inline]
    pub fn successor(self, ptr: *mut T) -> Self {
        Self::pack(ptr, false, self.tag().wrapping_add(1))
    }

    /// `self` with the mark set and the tag advanced by one (wrapping).
    #[inline]
    pub fn marked_successor(self) -> Self {
        self.with_mark().with_tag(self.tag().wrapping_add(1))
    }
}

impl<T> Clone for TaggedPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> Default for TaggedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for TaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPtr")
            .field("ptr", &self.ptr())
            .field("mark", &self.is_marked())
            .field("tag", &self.tag())
            .finish()
    }
}

/// An atomic link holding a [`TaggedPtr`].
pub struct AtomicTaggedPtr<T> {
    word: AtomicU64,
    _marker: PhantomData<*mut T>,
}

// SAFETY: the cell only stores an address; ownership of the pointee is
// managed by the structure the link belongs to.
unsafe impl<T: Send + Sync> Send for AtomicTaggedPtr<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicTaggedPtr<T> {}

impl<T> AtomicTaggedPtr<T> {
    /// Create a link holding `value`.
    #[inline]
    pub fn new(value: TaggedPtr<T>) -> Self {
        Self {
            word: AtomicU64::new(value.raw()),
            _marker: PhantomData,
        }
    }

    /// Create a null link.
    #[inline]
    pub fn null() -> Self {
        Self::new(TaggedPtr::null())
    }

    /// Load the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> TaggedPtr<T> {
        TaggedPtr::from_raw(self.word.load(order))
    }

    /// Overwrite the link unconditionally.
    #[inline]
    pub fn store(&self, value: TaggedPtr<T>, order: Ordering) {
        self.word.store(value.raw(), order);
    }

    /// Replace `current` with `new` if the whole word still equals `current`.
    ///
    /// On failure returns the value actually found.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        self.word
            .compare_exchange(current.raw(), new.raw(), success, failure)
            .map(TaggedPtr::from_raw)
            .map_err(TaggedPtr::from_raw)
    }
}

impl<T> Default for AtomicTaggedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicTaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}
