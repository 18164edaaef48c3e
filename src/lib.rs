//! Weir: core primitives for lock-free FIFO queues.
//!
//! This crate provides the three building blocks the queue family in
//! `weir-queue` is assembled from:
//!
//! - [`TagPtr`] / [`AtomicTagPtr`]: a pointer packed together with a version
//!   counter into a single 64-bit word, so that a wide compare-and-swap can
//!   tell a recycled pointer apart from the original and the ABA problem
//!   cannot bite.
//! - [`Pool`] and its implementations ([`LockedPool`], [`CasPool`],
//!   [`ExpressPool`], [`TaggedPool`]): free-list allocators that recycle
//!   fixed-type cells without touching the process allocator on the hot
//!   path.
//! - [`Quiescence`]: a consumer-counting reclamation protocol that defers
//!   freeing a detached node until no concurrent consumer can still hold a
//!   pointer to it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::Ordering;
//! use weir::AtomicTagPtr;
//!
//! let node = Box::into_raw(Box::new(7u32));
//! let slot = AtomicTagPtr::new(node);
//!
//! let current = slot.load(Ordering::Acquire);
//! assert_eq!(current.as_ptr(), node);
//!
//! // Every successful exchange bumps the version counter.
//! slot.compare_exchange(current, node, Ordering::AcqRel, Ordering::Acquire)
//!     .unwrap();
//! assert!(slot.load(Ordering::Acquire).tag() > current.tag());
//!
//! unsafe { drop(Box::from_raw(node)) };
//! ```

#![warn(missing_docs)]

mod pool;
mod reclaim;
mod tagged;

pub use pool::{CasPool, ExpressPool, LockedPool, Pool, TaggedPool};
pub use reclaim::Quiescence;
pub use tagged::{AtomicTagPtr, TagPtr};
