//! Lock-free split-ordered hash map
//!
//! This crate provides a lock-free concurrent map from `u32` keys to `u32`
//! values built on a single sorted linked list, following Shalev & Shavit's
//! split-ordered lists. Growing the table doubles a bucket counter and never
//! moves an entry.
//!
//! # Features
//!
//! - **Lock-Free**: insert, lookup and removal never block
//! - **Incremental Resizing**: buckets are split lazily, on first use
//! - **Safe Memory Reclamation**: removed nodes are freed through `splitmap-epoch`
//! - **ABA Protection**: every link carries a deletion mark and a 16-bit tag
//!
//! # Example
//!
//! ```rust
//! use splitmap::SplitOrderedMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(SplitOrderedMap::new(1 << 16, 4));
//!
//! let handles: Vec<_> = (0..4u32)
//!     .map(|t| {
//!         let map = map.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 map.put(t * 100 + i, i);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(map.len(), 400);
//! assert_eq!(map.get(205), Some(5));
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod backoff;
mod config;
mod directory;
mod list;
mod map;
mod tagged;

pub use config::{Config, ConfigError, MAX_EXPECTED_ENTRIES};
pub use directory::{BucketDirectory, BucketSlot, SLOT_FANOUT};
pub use list::{Iter, Node, SortedList};
pub use map::{SplitOrderedMap, KEY_LIMIT};
pub use tagged::{AtomicTaggedPtr, TaggedPtr};
