//! Version-tagged atomic pointers.
//!
//! A [`TagPtr`] packs a raw pointer and a monotonically increasing version
//! counter into one 64-bit word. On 64-bit targets the pointer occupies the
//! low 48 bits and the counter the high 16; on 32-bit targets the split is
//! 32/32. [`AtomicTagPtr`] bumps the counter on every successful exchange,
//! so a compare-and-swap against a pointer that was reclaimed and reused in
//! the meantime fails on the stale counter. This is the ABA defence the
//! linked-list queues rely on.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(target_pointer_width = "64")]
const TAG_SHIFT: u32 = 48;
#[cfg(target_pointer_width = "32")]
const TAG_SHIFT: u32 = 32;

const PTR_MASK: u64 = (1u64 << TAG_SHIFT) - 1;
const TAG_UNIT: u64 = 1u64 << TAG_SHIFT;

/// A snapshot of an [`AtomicTagPtr`]: a pointer plus its version counter.
///
/// Equality compares the full word, counter included, which is what makes a
/// stale snapshot fail a later compare-and-swap. The counter value itself is
/// opaque; callers must not ascribe meaning to it beyond ordering.
pub struct TagPtr<T> {
    data: u64,
    _marker: PhantomData<*mut T>,
}

impl<T> TagPtr<T> {
    /// Returns a null snapshot with a zero counter.
    #[inline]
    pub fn null() -> Self {
        Self::from_word(0)
    }

    #[inline]
    pub(crate) fn from_word(data: u64) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Returns the pointer half, with the counter masked off.
    ///
    /// The address bits are preserved exactly as stored, so sentinel
    /// addresses compare directly against the original pointer.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        (self.data & PTR_MASK) as *mut T
    }

    /// Returns `true` if the pointer half is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.data & PTR_MASK == 0
    }

    /// Returns the version counter half.
    #[inline]
    pub fn tag(&self) -> u64 {
        self.data >> TAG_SHIFT
    }

    /// Returns the full packed word.
    #[inline]
    pub fn into_raw(self) -> u64 {
        self.data
    }

    /// The word that installing `ptr` over this snapshot would publish:
    /// `ptr` with this snapshot's counter plus one.
    #[inline]
    fn bumped(&self, ptr: *mut T) -> u64 {
        (ptr as u64 & PTR_MASK) | (self.data & !PTR_MASK).wrapping_add(TAG_UNIT)
    }
}

impl<T> Clone for TagPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TagPtr<T> {}

impl<T> PartialEq for TagPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T> Eq for TagPtr<T> {}

impl<T> fmt::Debug for TagPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagPtr({:p}, tag {})", self.as_ptr(), self.tag())
    }
}

/// A 64-bit atomic holding a pointer and a version counter side by side.
///
/// Every operation that installs a new pointer does so together with an
/// incremented counter, in a single atomic exchange. Two successful
/// exchanges that install the same pointer therefore always publish
/// different words.
///
/// # Examples
///
/// ```rust
/// use std::ptr;
/// use std::sync::atomic::Ordering;
/// use weir::AtomicTagPtr;
///
/// let slot: AtomicTagPtr<u32> = AtomicTagPtr::null();
/// let current = slot.load(Ordering::Acquire);
/// assert!(current.is_null());
///
/// let node = Box::into_raw(Box::new(1u32));
/// slot.compare_exchange(current, node, Ordering::AcqRel, Ordering::Acquire)
///     .unwrap();
/// assert_eq!(slot.load(Ordering::Acquire).as_ptr(), node);
///
/// unsafe { drop(Box::from_raw(node)) };
/// ```
pub struct AtomicTagPtr<T> {
    data: AtomicU64,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send> Send for AtomicTagPtr<T> {}
unsafe impl<T: Send> Sync for AtomicTagPtr<T> {}

impl<T> AtomicTagPtr<T> {
    /// Creates a tagged atomic holding `ptr` with a zero counter.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        Self {
            data: AtomicU64::new(ptr as u64 & PTR_MASK),
            _marker: PhantomData,
        }
    }

    /// Creates a null tagged atomic.
    #[inline]
    pub const fn null() -> Self {
        Self {
            data: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Loads the current word.
    #[inline]
    pub fn load(&self, order: Ordering) -> TagPtr<T> {
        TagPtr::from_word(self.data.load(order))
    }

    /// Installs `new` with an incremented counter if the current word still
    /// equals `current`.
    ///
    /// On failure the observed word is returned so the caller can refresh
    /// its snapshot and retry.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TagPtr<T>,
        new: *mut T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<(), TagPtr<T>> {
        match self
            .data
            .compare_exchange(current.data, current.bumped(new), success, failure)
        {
            Ok(_) => Ok(()),
            Err(observed) => Err(TagPtr::from_word(observed)),
        }
    }

    /// Weak form of [`compare_exchange`](Self::compare_exchange); may fail
    /// spuriously, which is cheaper inside retry loops.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TagPtr<T>,
        new: *mut T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<(), TagPtr<T>> {
        match self
            .data
            .compare_exchange_weak(current.data, current.bumped(new), success, failure)
        {
            Ok(_) => Ok(()),
            Err(observed) => Err(TagPtr::from_word(observed)),
        }
    }

    /// Publishes `ptr` with an incremented counter, retrying until the
    /// exchange succeeds.
    #[inline]
    pub fn store(&self, ptr: *mut T, order: Ordering) {
        let mut current = self.load(Ordering::Relaxed);
        loop {
            match self.compare_exchange_weak(current, ptr, order, Ordering::Relaxed) {
                Ok(()) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Exchanges the word for `ptr` (counter incremented) and returns the
    /// previous snapshot.
    #[inline]
    pub fn swap(&self, ptr: *mut T, order: Ordering) -> TagPtr<T> {
        let mut current = self.load(Ordering::Relaxed);
        loop {
            match self.compare_exchange_weak(current, ptr, order, Ordering::Relaxed) {
                Ok(()) => return current,
                Err(observed) => current = observed,
            }
        }
    }
}

impl<T> Default for AtomicTagPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicTagPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}
