//! Unbounded linked-list queues over a recycling node pool.
//!
//! Every variant keeps a pool-allocated sentinel at the front: `head` always
//! points at a node whose payload is dead, and the element returned by a pop
//! lives in `head.next`. Detached front nodes go back to the pool, never to
//! the process allocator.

pub mod locked;
pub mod mpmc;
pub mod mpsc;
pub mod spmc;
pub mod spsc;
