//! Epoch-based memory reclamation for the splitmap lock-free structures.
//!
//! Lock-free lists unlink nodes while other threads may still be walking
//! through them. Freeing such a node immediately is a use-after-free, and
//! reusing its address turns a stale compare-and-swap into an ABA bug.
//! This crate defers the free: unlinked nodes are *retired*, and a retired
//! node is released only after every thread that could have reached it has
//! left its critical section.
//!
//! # Key Features
//!
//! - **Cheap Reads**: pinning publishes one word per outermost critical section
//! - **Intrusive Retirement**: no allocation on the retire path
//! - **Per-Thread Slots**: a fixed slot table, thread IDs are recycled
//! - **Batch Collection**: epoch advancement is amortized over retirements
//!
//! # Example
//!
//! ```rust
//! use splitmap_epoch::{pin, retire, RetiredNode};
//!
//! #[repr(C)]
//! struct Node {
//!     retired: RetiredNode,
//!     value: u64,
//! }
//!
//! let node = Box::into_raw(Box::new(Node { retired: RetiredNode::new(), value: 7 }));
//!
//! let guard = pin();
//! // ... unlink `node` from a shared structure ...
//! unsafe { retire(node) };
//! drop(guard);
//! ```

#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod macros;

mod guard;
mod retired;
mod slot;
mod ttas;

pub use guard::{pending_retirements, pin, retire, Guard};
pub use retired::RetiredNode;
