use std::cell::Cell;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;

use crate::ring::{slot_index, Slots, CAPACITY};
use crate::utils::CacheAligned;

struct Inner<T> {
    rd: CacheAligned<AtomicU16>,
    wt: CacheAligned<AtomicU16>,
    slots: Slots<T>,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Drop for Inner<T> {
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

/// Creates a bounded single-producer multi-consumer ring queue.
///
/// The producer side matches the SPSC ring; consumers contend by
/// compare-and-swapping the read index forward. A consumer that loses the
/// race forgets its speculative copy of the slot and retries.
pub fn queue<T>() -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner {
        rd: CacheAligned::new(AtomicU16::new(0)),
        wt: CacheAligned::new(AtomicU16::new(0)),
        slots: Slots::new(),
    });
    (
        Producer {
            inner: inner.clone(),
            _marker: PhantomData,
        },
        Consumer {
            inner,
            _marker: PhantomData,
        },
    )
}

/// The producing half of an SPMC ring queue.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Pushes an element, or hands it back if the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let inner = &*self.inner;
        let wt = inner.wt.load(Ordering::Relaxed);
        if slot_index(wt.wrapping_add(1)) == slot_index(inner.rd.load(Ordering::Acquire)) {
            return Err(value);
        }
        // SAFETY: the full check pairs with the consumers' release on `rd`,
        // so the slot is vacated; only this producer writes.
        unsafe { inner.slots.write(slot_index(wt), value) };
        inner.wt.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Returns `true` if the ring looks full. Best effort.
    pub fn is_full(&self) -> bool {
        let inner = &*self.inner;
        let wt = inner.wt.load(Ordering::Relaxed);
        slot_index(wt.wrapping_add(1)) == slot_index(inner.rd.load(Ordering::Acquire))
    }

    /// Returns the number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        CAPACITY
    }
}

/// A consuming handle of an SPMC ring queue. Clone one per consumer.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Consumer {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Consumer<T> {
    /// Pops the element at the front of the ring.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;
        let backoff = Backoff::new();
        loop {
            let rd = inner.rd.load(Ordering::Relaxed);
            if slot_index(rd) == slot_index(inner.wt.load(Ordering::Acquire)) {
                return None;
            }
            // SAFETY: speculative copy; ownership is settled by the CAS and
            // the duplicate forgotten on a lost race.
            let value = unsafe { inner.slots.read(slot_index(rd)) };
            match inner.rd.compare_exchange_weak(
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
        let inner = &*self.inner;
        let rd = inner.rd.load(Ordering::Relaxed);
        slot_index(rd) == slot_index(inner.wt.load(Ordering::Acquire))
    }

    /// Returns the number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        CAPACITY
    }
}
