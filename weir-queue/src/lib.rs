//! A family of concurrent FIFO queues built on the `weir` primitives.
//!
//! Every variant delivers FIFO order per producer; what differs is the
//! producer/consumer cardinality it tolerates and how it stores elements:
//!
//! - [`list`]: unbounded linked-list queues over a recycling node pool —
//!   a mutex-guarded oracle plus lock-free SPSC, MPSC, SPMC and
//!   Michael-Scott MPMC variants.
//! - [`ring`]: bounded 256-slot ring buffers — SPSC, SPMC, a ticket-ordered
//!   MPMC and a wait-free MPMC with per-slot commit flags.
//! - [`blocking`]: a mutex/condvar wrapper with a `quit` protocol for
//!   consumers that prefer sleeping over spinning.
//!
//! Cardinality-restricted variants are constructed as a `(Producer,
//! Consumer)` pair; the side that tolerates multiple threads is the `Clone`
//! half. Unrestricted variants are plain shared objects, typically used
//! through an `Arc`.
//!
//! ## Usage
//!
//! ```rust
//! let (p, c) = weir_queue::ring::spsc::queue::<u32>();
//!
//! assert!(p.push(1).is_ok());
//! assert!(p.push(2).is_ok());
//! assert_eq!(c.pop(), Some(1));
//! assert_eq!(c.pop(), Some(2));
//! assert_eq!(c.pop(), None);
//! ```

pub mod blocking;
pub mod list;
pub mod ring;
pub mod utils;
