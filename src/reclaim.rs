//! Quiescence-based reclamation for detached queue nodes.
//!
//! Consumers that may dereference nodes another consumer can concurrently
//! detach bracket their critical section with [`enter`](Quiescence::enter)
//! and [`exit`](Quiescence::exit). A detached node is freed immediately only
//! when the exiting consumer is the last one in flight; otherwise it is
//! parked on a pending list and released at the next quiescent moment.
//!
//! This collapses the whole reclamation cost into the instant the in-flight
//! counter drops to zero: while any consumer is inside the bracket, no node
//! it could have observed leaves the pending list, so neither use-after-free
//! nor free-list ABA can occur under it.

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::{Cell, Pool};
use crate::tagged::AtomicTagPtr;

/// A shared in-flight counter plus a pending-free list for nodes of type `T`.
///
/// One `Quiescence` guards one queue. The pending list threads through the
/// nodes' own pool cells, so parking a node allocates nothing.
///
/// The counter operations are sequentially consistent on purpose: the safety
/// argument below leans on a single total order over "consumer entered",
/// "node detached" and "counter observed at one".
pub struct Quiescence<T> {
    refs: AtomicUsize,
    pending: AtomicTagPtr<Cell<T>>,
}

unsafe impl<T: Send> Send for Quiescence<T> {}
unsafe impl<T: Send> Sync for Quiescence<T> {}

impl<T> Quiescence<T> {
    /// Creates a quiescence tracker with no consumer in flight.
    pub fn new() -> Self {
        Self {
            refs: AtomicUsize::new(0),
            pending: AtomicTagPtr::null(),
        }
    }

    /// Registers the calling consumer as in flight.
    ///
    /// Must be paired with exactly one [`exit`](Quiescence::exit). Pointers
    /// into the guarded structure may only be dereferenced between the two.
    #[inline]
    pub fn enter(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    /// Deregisters the calling consumer and hands over the node it detached,
    /// or null if it detached nothing.
    ///
    /// The node is freed into `pool` right away when this consumer was
    /// provably the last one in flight; otherwise it is parked on the
    /// pending list and freed at a later quiescent moment.
    ///
    /// # Safety
    ///
    /// - The caller must have called [`enter`](Quiescence::enter) and not
    ///   yet exited.
    /// - `node`, when non-null, must have been allocated from `pool`,
    ///   detached after the matching `enter` (unreachable to consumers that
    ///   register from now on), and its payload already moved out.
    /// - All `exit` calls for one tracker must pass the same pool.
    pub unsafe fn exit<P: Pool<T>>(&self, node: *mut T, pool: &P) {
        if node.is_null() {
            self.refs.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        let cell = Cell::from_payload(node);

        if self.refs.load(Ordering::SeqCst) > 1 {
            // Another consumer is in flight and may hold this node: park it.
            self.defer(cell);
            self.refs.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        // We appear to be the last consumer: claim the pending chain before
        // stepping out.
        let taken = self.pending.swap(ptr::null_mut(), Ordering::AcqRel).as_ptr();

        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            // The counter moved one -> zero. Any consumer that registered
            // after our load would have made it at least two, so nobody can
            // still hold a parked node. Free everything.
            let mut curr = taken;
            while !curr.is_null() {
                let next = (*curr).link().load(Ordering::Relaxed);
                pool.free(curr as *mut T);
                curr = next;
            }
            pool.free(node);
        } else {
            // A consumer slipped in between the load and the decrement. It
            // registered after our node was detached, so that one node is
            // still safe to free; the claimed chain is not, give it back.
            if !taken.is_null() {
                self.relink(taken);
            }
            pool.free(node);
        }
    }

    /// Frees every node still parked on the pending list.
    ///
    /// # Safety
    ///
    /// No consumer may be in flight, and `pool` must be the pool the parked
    /// nodes were allocated from. Intended for the owning queue's `Drop`.
    pub unsafe fn drain<P: Pool<T>>(&self, pool: &P) {
        let mut curr = self.pending.swap(ptr::null_mut(), Ordering::Relaxed).as_ptr();
        while !curr.is_null() {
            let next = (*curr).link().load(Ordering::Relaxed);
            pool.free(curr as *mut T);
            curr = next;
        }
    }

    /// Pushes a single cell onto the pending list.
    unsafe fn defer(&self, cell: *mut Cell<T>) {
        let mut curr = self.pending.load(Ordering::Relaxed);
        loop {
            (*cell).link().store(curr.as_ptr(), Ordering::Relaxed);
            match self
                .pending
                .compare_exchange_weak(curr, cell, Ordering::Release, Ordering::Relaxed)
            {
                Ok(()) => return,
                Err(observed) => curr = observed,
            }
        }
    }

    /// Pushes a previously claimed chain back, re-linking its tail onto
    /// whatever accumulated in the meantime.
    unsafe fn relink(&self, chain: *mut Cell<T>) {
        let mut tail = chain;
        loop {
            let next = (*tail).link().load(Ordering::Relaxed);
            if next.is_null() {
                break;
            }
            tail = next;
        }
        let mut curr = self.pending.load(Ordering::Relaxed);
        loop {
            (*tail).link().store(curr.as_ptr(), Ordering::Relaxed);
            match self
                .pending
                .compare_exchange_weak(curr, chain, Ordering::Release, Ordering::Relaxed)
            {
                Ok(()) => return,
                Err(observed) => curr = observed,
            }
        }
    }
}

impl<T> Default for Quiescence<T> {
    fn default() -> Self {
        Self::new()
    }
}
