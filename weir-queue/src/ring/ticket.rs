use std::mem;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;

use crossbeam_utils::Backoff;

use crate::ring::{slot_index, Slots, CAPACITY};
use crate::utils::CacheAligned;

/// A bounded MPMC ring queue with ticket-ordered publication.
///
/// A third index, the commit index `ct`, runs ahead of the write index:
/// producers compare-and-swap `ct` to reserve a slot (their ticket), write
/// the slot, then spin until the write index reaches their ticket and push
/// it one further. The spin is the "lock" — it serialises publication in
/// ticket order, so consumers never observe a slot that an earlier ticket
/// has not published yet.
///
/// Consumers pop exactly as in the SPMC ring.
pub struct Queue<T> {
    rd: CacheAligned<AtomicU16>,
    wt: CacheAligned<AtomicU16>,
    ct: CacheAligned<AtomicU16>,
    slots: Slots<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates an empty queue.
    pub fn new() -> Queue<T> {
        Queue {
            rd: CacheAligned::new(AtomicU16::new(0)),
            wt: CacheAligned::new(AtomicU16::new(0)),
            ct: CacheAligned::new(AtomicU16::new(0)),
            slots: Slots::new(),
        }
    }

    /// Pushes an element, or hands it back if the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let mut cur = self.ct.load(Ordering::Relaxed);
        let ticket = loop {
            let nxt = cur.wrapping_add(1);
            if slot_index(nxt) == slot_index(self.rd.load(Ordering::Acquire)) {
                return Err(value);
            }
            match self
                .ct
                .compare_exchange_weak(cur, nxt, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break cur,
                Err(observed) => {
                    cur = observed;
                    backoff.spin();
                }
            }
        };

        // SAFETY: the ticket reserves this slot exclusively; the full check
        // above kept it clear of the read index.
        unsafe { self.slots.write(slot_index(ticket), value) };

        // Publish in ticket order: wt may only move from our ticket to the
        // next, so we wait our turn.
        let nxt = ticket.wrapping_add(1);
        while self
            .wt
            .compare_exchange_weak(ticket, nxt, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
        }
        Ok(())
    }

    /// Pops the element at the front of the ring.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let rd = self.rd.load(Ordering::Relaxed);
            if slot_index(rd) == slot_index(self.wt.load(Ordering::Acquire)) {
                return None;
            }
            // SAFETY: speculative copy; ownership is settled by the CAS and
            // the duplicate forgotten on a lost race.
            let value = unsafe { self.slots.read(slot_index(rd)) };
            match self.rd.compare_exchange_weak(
                rd,
                rd.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(value),
                Err(_) => {
                    mem::forget(value);
                    backoff.spin();
                }
            }
        }
    }

    /// Returns `true` if the ring looks empty. Best effort.
    pub fn is_empty(&self) -> bool {
        let rd = self.rd.load(Ordering::Relaxed);
        slot_index(rd) == slot_index(self.wt.load(Ordering::Acquire))
    }

    /// Returns `true` if the ring looks full. Best effort.
    pub fn is_full(&self) -> bool {
        let ct = self.ct.load(Ordering::Relaxed);
        slot_index(ct.wrapping_add(1)) == slot_index(self.rd.load(Ordering::Acquire))
    }

    /// Returns the number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// No-op; this variant has no cancellation protocol.
    pub fn quit(&self) {}
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut rd = self.rd.load(Ordering::Relaxed);
        let wt = self.wt.load(Ordering::Relaxed);
        while rd != wt {
            // SAFETY: slots between the indices hold live values.
            unsafe { self.slots.drop_in_place(slot_index(rd)) };
            rd = rd.wrapping_add(1);
        }
    }
}
