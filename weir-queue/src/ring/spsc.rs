use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

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

/// Creates a bounded single-producer single-consumer ring queue.
///
/// 256 slots, one held in reserve. The producer owns the write index, the
/// consumer the read index; neither ever spins.
///
/// # Examples
///
/// ```rust
/// let (p, c) = weir_queue::ring::spsc::queue();
///
/// assert!(p.push(1).is_ok());
/// assert_eq!(c.pop(), Some(1));
/// assert_eq!(c.pop(), None);
/// ```
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

/// The producing half of an SPSC ring queue.
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
        // SAFETY: the full check guarantees the slot is vacated, and only
        // this producer writes.
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

/// The consuming half of an SPSC ring queue.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Pops the element at the front of the ring.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;
        let rd = inner.rd.load(Ordering::Relaxed);
        if slot_index(rd) == slot_index(inner.wt.load(Ordering::Acquire)) {
            return None;
        }
        // SAFETY: the empty check guarantees a live value, and only this
        // consumer reads.
        let value = unsafe { inner.slots.read(slot_index(rd)) };
        inner.rd.fetch_add(1, Ordering::Release);
        Some(value)
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
