use std::array;
use std::mem;
use std::sync::atomic::{fence, AtomicBool, AtomicU16, AtomicU64, Ordering};

use crossbeam_utils::Backoff;

use crate::ring::{slot_index, Slots, CAPACITY};
use crate::utils::CacheAligned;

/// Commit-flag sentinel: the slot carries no unpublished ticket.
const INVALID: u64 = u64::MAX;

/// A bounded MPMC ring queue with wait-free producers.
///
/// Where the ticket ring makes a producer wait for every earlier ticket to
/// publish, this variant decouples writing from publication. Each slot
/// carries a commit flag: a producer writes its slot, stamps the flag with
/// its ticket, and then runs the help loop — any thread that finds the slot
/// at the current write index stamped clears the flag and advances the
/// index, on whoever's behalf. A producer therefore finishes after a bounded
/// number of steps, modulo the length of the help cycle it joins.
///
/// Consumers pop as in the SPMC ring, with one extra case: when the ring
/// looks empty but the front slot is stamped, the consumer advances the
/// write index itself instead of reporting empty.
///
/// This variant also honours [`quit`](Queue::quit): once set, every pop
/// returns `None`.
pub struct Queue<T> {
    rd: CacheAligned<AtomicU16>,
    wt: CacheAligned<AtomicU16>,
    ct: CacheAligned<AtomicU16>,
    quit: AtomicBool,
    flags: [AtomicU64; CAPACITY],
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
            quit: AtomicBool::new(false),
            flags: array::from_fn(|_| AtomicU64::new(INVALID)),
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
                .compare_exchange_weak(cur, nxt, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break cur,
                Err(observed) => {
                    cur = observed;
                    backoff.spin();
                }
            }
        };

        // SAFETY: the ticket reserves this slot exclusively.
        unsafe { self.slots.write(slot_index(ticket), value) };
        self.flags[slot_index(ticket)].store(ticket as u64, Ordering::Release);

        self.help_publish();
        Ok(())
    }

    /// Advances the write index over every stamped slot, clearing flags as
    /// it goes. Returns as soon as the front slot is not stamped with the
    /// current write index — either unpublished or already helped.
    fn help_publish(&self) {
        loop {
            let wt = self.wt.load(Ordering::Acquire);
            // Ordering anchor: the flag must be read against a write index
            // that is not older than any flag-clear we are racing with.
            fence(Ordering::SeqCst);
            let flag = &self.flags[slot_index(wt)];
            if flag.load(Ordering::Acquire) != wt as u64 {
                return;
            }
            if flag
                .compare_exchange(wt as u64, INVALID, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.wt.store(wt.wrapping_add(1), Ordering::Release);
            }
        }
    }

    /// Pops the element at the front of the ring.
    ///
    /// Returns `None` when the ring is empty or [`quit`](Queue::quit) was
    /// called.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            if self.quit.load(Ordering::Relaxed) {
                return None;
            }
            let rd = self.rd.load(Ordering::Relaxed);
            let wt = self.wt.load(Ordering::Acquire);
            if slot_index(rd) == slot_index(wt) {
                // The producer may have stamped the front slot without the
                // help loop having advanced wt yet; finish its publication
                // rather than reporting empty.
                let flag = &self.flags[slot_index(wt)];
                if flag.load(Ordering::Acquire) == wt as u64 {
                    if flag
                        .compare_exchange(wt as u64, INVALID, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                    {
                        self.wt.store(wt.wrapping_add(1), Ordering::Release);
                    }
                    continue;
                }
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

    /// Makes every pending and future [`pop`](Queue::pop) return `None`.
    /// Idempotent. Producers may keep pushing, but nothing drains the ring
    /// afterwards.
    pub fn quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut rd = self.rd.load(Ordering::Relaxed);
        let mut wt = self.wt.load(Ordering::Relaxed);
        loop {
            while rd != wt {
                // SAFETY: slots between the indices hold live values.
                unsafe { self.slots.drop_in_place(slot_index(rd)) };
                rd = rd.wrapping_add(1);
            }
            // Slots stamped but never published still hold values.
            if self.flags[slot_index(wt)].load(Ordering::Relaxed) == wt as u64 {
                wt = wt.wrapping_add(1);
            } else {
                break;
            }
        }
    }
}
