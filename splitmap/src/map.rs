//! Split-ordered hash map (Shalev & Shavit, "Split-Ordered Lists: Lock-Free
//! Extensible Hash Tables").
//!
//! Every entry lives in one [`SortedList`], ordered by the bit-reversed key.
//! Buckets are dummy nodes inside that same list: bucket `b` starts at the
//! dummy keyed `reverse_bits(b)`, and regular entries are keyed
//! `reverse_bits(k) | 1`. Reversal turns the low bits that pick a bucket into
//! the high bits that order the list, so all entries of a bucket sit right
//! after its dummy, and splitting bucket `b` into `b` and `b + n` only needs a
//! new dummy in the middle of `b`'s run. Doubling the bucket count therefore
//! moves nothing.
//!
//! The [`BucketDirectory`] maps bucket numbers to dummies. Buckets are
//! materialized lazily, parents first: a bucket that was never split still
//! holds the entries of all its unsplit descendants.

use crate::config::{Config, ConfigError};
use crate::directory::BucketDirectory;
use crate::list::{Node, SortedList};
use core::fmt;
use core::sync::atomic::Ordering;
use portable_atomic::{AtomicI64, AtomicU32};
use splitmap_epoch::{pin, Guard};

/// Keys must be below this bound.
///
/// The top bit is reserved: with it, two keys differing only in bit 31 would
/// share a regular key.
pub const KEY_LIMIT: u32 = 1 << 31;

/// List key of a regular entry.
#[inline]
fn regular_key(key: u32) -> u32 {
    key.reverse_bits() | 1
}

/// List key of the dummy node starting bucket `index`.
#[inline]
fn dummy_key(index: u32) -> u32 {
    index.reverse_bits()
}

/// The bucket `index` was split from: `index` with its highest set bit cleared.
#[inline]
fn parent_bucket(index: u32) -> u32 {
    debug_assert!(index != 0, "bucket 0 has no parent");
    index & !(1 << (u32::BITS - 1 - index.leading_zeros()))
}

/// Lock-free concurrent map from `u32` keys to `u32` values that grows its
/// bucket count without rehashing.
///
/// # Examples
///
/// ```
/// use splitmap::SplitOrderedMap;
///
/// let map = SplitOrderedMap::new(1 << 16, 4);
/// assert!(map.put(7, 70));
/// assert!(!map.put(7, 71));
/// assert_eq!(map.get(7), Some(70));
/// assert!(map.remove(7));
/// assert_eq!(map.get(7), None);
/// ```
pub struct SplitOrderedMap {
    list: SortedList,
    buckets: BucketDirectory<Node>,
    /// Live regular entries. Signed: a remove may decrement before the
    /// insert it undoes has incremented.
    size: AtomicI64,
    /// Current logical bucket count, a power of two
    bucket_count: AtomicU32,
    expected_max_entries: u64,
    load_factor: u64,
    max_bucket_count: u32,
}

impl SplitOrderedMap {
    /// Creates a map sized for `expected_max_entries` entries that doubles its
    /// bucket count whenever the average bucket holds more than `load_factor`
    /// entries.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < expected_max_entries < 2^31` and
    /// `0 < load_factor <= expected_max_entries`.
    pub fn new(expected_max_entries: u64, load_factor: u64) -> Self {
        match Self::with_config(Config::new(expected_max_entries, load_factor)) {
            Ok(map) => map,
            Err(err) => panic!("invalid split-ordered map parameters: {err}"),
        }
    }

    /// Creates a map from a validated [`Config`].
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_bucket_count = config.max_bucket_count();

        let map = Self {
            list: SortedList::new(),
            buckets: BucketDirectory::new(max_bucket_count as u64),
            size: AtomicI64::new(0),
            bucket_count: AtomicU32::new(1),
            expected_max_entries: config.expected_max_entries,
            load_factor: config.load_factor,
            max_bucket_count,
        };

        // Bucket 0 is the root every other bucket descends from.
        let guard = pin();
        let root = match map.list.insert(map.list.head(), dummy_key(0), 0, &guard) {
            Ok(node) | Err(node) => node as *const Node as *mut Node,
        };
        let _ = map.buckets.slot_or_create(0).install(root);
        drop(guard);

        debug_log!(
            expected_max_entries = config.expected_max_entries,
            load_factor = config.load_factor,
            max_bucket_count,
            levels = map.buckets.level_count(),
            "created split-ordered map"
        );
        Ok(map)
    }

    /// Insert `key -> value`.
    ///
    /// Returns false, without touching the stored value, if `key` is present.
    pub fn put(&self, key: u32, value: u32) -> bool {
        debug_assert!(key < KEY_LIMIT, "key {key:#x} is in the reserved range");
        self.maybe_grow();

        let guard = pin();
        let bucket = self.ensure_bucket(self.bucket_index(key), &guard);
        match self.list.insert(bucket.link(), regular_key(key), value, &guard) {
            Ok(_) => {
                self.size.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Look up the value stored for `key`.
    pub fn get(&self, key: u32) -> Option<u32> {
        debug_assert!(key < KEY_LIMIT, "key {key:#x} is in the reserved range");
        let guard = pin();
        let bucket = self.nearest_bucket(self.bucket_index(key));
        self.list.search(bucket.link(), regular_key(key), &guard)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`. Returns false if it was absent.
    pub fn remove(&self, key: u32) -> bool {
        debug_assert!(key < KEY_LIMIT, "key {key:#x} is in the reserved range");
        let guard = pin();
        let bucket = self.nearest_bucket(self.bucket_index(key));
        let removed = self.list.remove(bucket.link(), regular_key(key), &guard);
        if removed {
            self.size.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries.
    ///
    /// Note: This is an approximate count in concurrent scenarios.
    pub fn len(&self) -> u32 {
        self.size.load(Ordering::Relaxed).clamp(0, u32::MAX as i64) as u32
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current logical bucket count.
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count.load(Ordering::Acquire)
    }

    /// Average entries per bucket that triggers doubling.
    pub fn load_factor(&self) -> u64 {
        self.load_factor
    }

    /// Bucket count the map stops growing at.
    pub fn max_bucket_count(&self) -> u32 {
        self.max_bucket_count
    }

    /// Entry count the map was sized for.
    pub fn expected_max_entries(&self) -> u64 {
        self.expected_max_entries
    }

    #[inline]
    fn bucket_index(&self, key: u32) -> u32 {
        key & (self.bucket_count() - 1)
    }

    /// Double the bucket count if the load factor is exceeded and the
    /// directory still has room. Losing the CAS means someone else doubled.
    fn maybe_grow(&self) {
        let count = self.bucket_count();
        let size = self.len() as u64;
        if size / count as u64 > self.load_factor && count < self.max_bucket_count {
            if self
                .bucket_count
                .compare_exchange(count, count << 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                debug_log!(size, bucket_count = count << 1, "doubled bucket count");
            }
        }
    }

    /// The dummy of bucket `index`, if materialized.
    #[inline]
    fn bucket(&self, index: u32) -> Option<&Node> {
        let slot = self.buckets.get_slot(index, false)?;
        // SAFETY: installed dummies are never removed and live as long as the map.
        unsafe { slot.load().as_ref() }
    }

    /// The dummy of `index` or of its closest materialized ancestor.
    fn nearest_bucket(&self, mut index: u32) -> &Node {
        loop {
            if let Some(node) = self.bucket(index) {
                return node;
            }
            index = parent_bucket(index);
        }
    }

    /// The dummy of bucket `index`, materializing it and any missing
    /// ancestors, top-down.
    fn ensure_bucket(&self, index: u32, guard: &Guard) -> &Node {
        if let Some(node) = self.bucket(index) {
            return node;
        }

        let mut missing = Vec::with_capacity(u32::BITS as usize);
        missing.push(index);
        let mut parent = parent_bucket(index);
        let mut anchor = loop {
            if let Some(node) = self.bucket(parent) {
                break node;
            }
            missing.push(parent);
            parent = parent_bucket(parent);
        };

        for &index in missing.iter().rev() {
            anchor = self.materialize(index, anchor, guard);
        }
        anchor
    }

    /// Insert the dummy of `index` after its parent's dummy (or adopt the one
    /// a concurrent caller inserted) and publish it in the directory.
    fn materialize(&self, index: u32, parent: &Node, guard: &Guard) -> &Node {
        let dummy = match self.list.insert(parent.link(), dummy_key(index), 0, guard) {
            Ok(node) | Err(node) => node as *const Node as *mut Node,
        };
        let installed = match self.buckets.slot_or_create(index).install(dummy) {
            Ok(()) => {
                trace_log!(index, "materialized bucket");
                dummy
            }
            Err(existing) => existing,
        };
        // SAFETY: installed dummies are never removed and live as long as the map.
        unsafe { &*installed }
    }
}

impl Default for SplitOrderedMap {
    fn default() -> Self {
        let config = Config::default();
        Self::new(config.expected_max_entries, config.load_factor)
    }
}

impl fmt::Debug for SplitOrderedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitOrderedMap")
            .field("len", &self.len())
            .field("bucket_count", &self.bucket_count())
            .field("max_bucket_count", &self.max_bucket_count)
            .field("load_factor", &self.load_factor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_clears_highest_set_bit() {
        assert_eq!(parent_bucket(1), 0);
        assert_eq!(parent_bucket(2), 0);
        assert_eq!(parent_bucket(3), 1);
        assert_eq!(parent_bucket(6), 2);
        assert_eq!(parent_bucket(7), 3);
        assert_eq!(parent_bucket(0x8000_0000), 0);
        assert_eq!(parent_bucket(0x8000_0001), 1);
    }

    #[test]
    fn dummy_keys_sort_before_their_bucket() {
        for bucket_bits in 1..8u32 {
            let mask = (1u32 << bucket_bits) - 1;
            for key in 0..512u32 {
                let bucket = key & mask;
                assert!(dummy_key(bucket) < regular_key(key));
                // The parent dummy precedes the child dummy as well.
                if bucket != 0 {
                    assert!(dummy_key(parent_bucket(bucket)) < dummy_key(bucket));
                }
            }
        }
    }

    #[test]
    fn regular_and_dummy_keys_never_collide() {
        for n in 0..4096u32 {
            assert_eq!(regular_key(n) & 1, 1);
            assert_eq!(dummy_key(n) & 1, 0);
        }
        assert_ne!(regular_key(0), regular_key(1));
    }

    #[test]
    fn list_stays_split_ordered() {
        let map = SplitOrderedMap::new(1 << 12, 2);
        for key in (0..600).rev() {
            assert!(map.put(key, key));
        }
        assert!(map.bucket_count() > 1);

        let guard = pin();
        let keys: Vec<u32> = map.list.iter(&guard).map(Node::key).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "list out of order");

        // Every regular entry follows the dummy of the bucket it maps to
        // (or of the nearest materialized ancestor).
        let count = map.bucket_count();
        let mut current_dummy = None;
        for node in map.list.iter(&guard) {
            if node.key() & 1 == 0 {
                current_dummy = Some(node.key());
                continue;
            }
            let key = (node.key() & !1).reverse_bits();
            let expected = map.nearest_bucket(key & (count - 1)).key();
            assert!(current_dummy.is_some());
            assert!(current_dummy.unwrap() >= expected);
            assert!(current_dummy.unwrap() <= dummy_key(key & (count - 1)));
        }
    }

    #[test]
    fn buckets_materialize_lazily_with_ancestors() {
        let map = SplitOrderedMap::new(1 << 12, 1);
        // Force growth to 8 buckets without touching buckets 3, 5, 7.
        for key in [0, 2, 4, 6, 8, 10, 12, 14, 16, 18] {
            map.put(key, 0);
        }
        assert!(map.bucket_count() >= 8);
        assert!(map.bucket(7).is_none());
        assert!(map.bucket(3).is_none());

        let guard = pin();
        let bucket = map.ensure_bucket(7, &guard);
        assert_eq!(bucket.key(), dummy_key(7));
        assert!(map.bucket(3).is_some());
        assert!(map.bucket(1).is_some());
        assert!(core::ptr::eq(map.ensure_bucket(7, &guard), bucket));
    }

    #[test]
    fn growth_stops_at_max_bucket_count() {
        let map = SplitOrderedMap::new(64, 4);
        assert_eq!(map.max_bucket_count(), 16);
        for key in 0..1000 {
            map.put(key, key);
        }
        assert_eq!(map.bucket_count(), 16);
        assert_eq!(map.len(), 1000);
        for key in 0..1000 {
            assert_eq!(map.get(key), Some(key));
        }
    }
}
