//! Free-list node pools.
//!
//! A pool hands out cells of a fixed payload type and takes them back when
//! the caller is done, keeping returned cells on an intrusive free list
//! instead of releasing them to the process allocator. The heap is touched
//! only when the free list is empty, and cells are deallocated only when the
//! pool itself is dropped.
//!
//! The free list threads through the cells themselves: each [`Cell`] carries
//! the payload storage and a link word. The link is meaningful only while
//! the cell sits on a free list, the payload only while the cell is handed
//! out; the two never carry live data at the same time.
//!
//! Four implementations cover the synchronisation spectrum:
//!
//! | variant        | free-list head            |
//! |----------------|---------------------------|
//! | [`LockedPool`]  | mutex                     |
//! | [`CasPool`]     | raw pointer CAS           |
//! | [`ExpressPool`] | express slot + raw CAS    |
//! | [`TaggedPool`]  | express slot + tagged CAS |
//!
//! The express slot absorbs a single free/alloc pair without touching the
//! stack, which is the common rhythm of a queue recycling one node per
//! operation. The tagged head additionally versions the stack pointer, so a
//! cell that is popped, reused and pushed again cannot satisfy a stale
//! compare-and-swap.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

use crossbeam_utils::Backoff;

use crate::tagged::AtomicTagPtr;

/// A pooled cell: payload storage first (so a cell pointer converts to a
/// payload pointer and back), then the free-list link.
#[repr(C)]
pub(crate) struct Cell<T> {
    slot: UnsafeCell<MaybeUninit<T>>,
    link: AtomicPtr<Cell<T>>,
}

impl<T> Cell<T> {
    /// Heap-allocates a fresh cell holding `value`.
    fn boxed(value: T) -> *mut Cell<T> {
        Box::into_raw(Box::new(Cell {
            slot: UnsafeCell::new(MaybeUninit::new(value)),
            link: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    /// Writes `value` into a recycled cell and returns the payload pointer.
    ///
    /// # Safety
    ///
    /// `cell` must have come off a free list: allocated by this module and
    /// currently holding no live payload.
    unsafe fn install(cell: *mut Cell<T>, value: T) -> *mut T {
        (*cell).slot.get().write(MaybeUninit::new(value));
        cell as *mut T
    }

    /// Recovers the cell pointer from a payload pointer handed out by
    /// [`install`](Self::install) or [`boxed`](Self::boxed).
    ///
    /// # Safety
    ///
    /// `payload` must originate from this module; the cast relies on the
    /// payload storage being the first field of a `#[repr(C)]` cell.
    #[inline]
    pub(crate) unsafe fn from_payload(payload: *mut T) -> *mut Cell<T> {
        payload as *mut Cell<T>
    }

    #[inline]
    pub(crate) fn link(&self) -> &AtomicPtr<Cell<T>> {
        &self.link
    }

    /// Deallocates every cell on the chain starting at `head`, following the
    /// link words. Payloads are not dropped; cells on a free list hold none.
    ///
    /// # Safety
    ///
    /// The chain must be exclusively owned by the caller.
    unsafe fn release_chain(head: *mut Cell<T>) {
        let mut curr = head;
        while !curr.is_null() {
            let next = (*curr).link.load(Ordering::Relaxed);
            drop(Box::from_raw(curr));
            curr = next;
        }
    }
}

/// A recycling allocator for cells of type `T`.
///
/// # Contract
///
/// - [`alloc`](Pool::alloc) returns a pointer to a cell holding `value`,
///   recycled from the free list when possible and freshly heap-allocated
///   otherwise. It does not fail.
/// - [`free`](Pool::free) returns the cell to the pool. Nothing is handed
///   back to the process allocator before the pool is dropped.
/// - [`is_empty`](Pool::is_empty) is a best-effort view of the free list.
pub trait Pool<T> {
    /// Takes a cell from the pool (or the heap) and moves `value` into it.
    fn alloc(&self, value: T) -> *mut T;

    /// Returns a cell to the pool.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Pool::alloc) on this pool
    /// and not freed since, and the payload must already have been moved out
    /// or dropped in place; the pool will not run its destructor.
    unsafe fn free(&self, ptr: *mut T);

    /// Returns `true` if the free list currently appears empty.
    fn is_empty(&self) -> bool;
}

/// The simplest pool: a mutex around the free-list head.
pub struct LockedPool<T> {
    head: Mutex<*mut Cell<T>>,
}

unsafe impl<T: Send> Send for LockedPool<T> {}
unsafe impl<T: Send> Sync for LockedPool<T> {}

impl<T> LockedPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            head: Mutex::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for LockedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> for LockedPool<T> {
    fn alloc(&self, value: T) -> *mut T {
        let mut head = self.head.lock().unwrap();
        let curr = *head;
        if curr.is_null() {
            drop(head);
            return Cell::boxed(value) as *mut T;
        }
        // SAFETY: cells on the free list stay allocated until the pool drops.
        unsafe {
            *head = (*curr).link.load(Ordering::Relaxed);
            drop(head);
            Cell::install(curr, value)
        }
    }

    unsafe fn free(&self, ptr: *mut T) {
        let cell = Cell::from_payload(ptr);
        let mut head = self.head.lock().unwrap();
        (*cell).link.store(*head, Ordering::Relaxed);
        *head = cell;
    }

    fn is_empty(&self) -> bool {
        self.head.lock().unwrap().is_null()
    }
}

impl<T> Drop for LockedPool<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut().unwrap();
        // SAFETY: `&mut self` gives exclusive ownership of the chain.
        unsafe { Cell::release_chain(head) };
    }
}

/// A lock-free pool built on a compare-and-swap stack over a raw pointer.
///
/// Popping the stack carries a narrow ABA window when several threads
/// allocate concurrently; all cells are of one type and size, so the window
/// cannot misinterpret memory, only mis-thread the list. [`TaggedPool`]
/// closes the window outright.
pub struct CasPool<T> {
    head: AtomicPtr<Cell<T>>,
}

unsafe impl<T: Send> Send for CasPool<T> {}
unsafe impl<T: Send> Sync for CasPool<T> {}

impl<T> CasPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for CasPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> for CasPool<T> {
    fn alloc(&self, value: T) -> *mut T {
        let backoff = Backoff::new();
        let mut curr = self.head.load(Ordering::Acquire);
        loop {
            if curr.is_null() {
                return Cell::boxed(value) as *mut T;
            }
            // SAFETY: cells are never deallocated while the pool is alive.
            let next = unsafe { (*curr).link.load(Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(curr, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => return unsafe { Cell::install(curr, value) },
                Err(observed) => {
                    curr = observed;
                    backoff.spin();
                }
            }
        }
    }

    unsafe fn free(&self, ptr: *mut T) {
        let cell = Cell::from_payload(ptr);
        let mut curr = self.head.load(Ordering::Relaxed);
        loop {
            (*cell).link.store(curr, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(curr, cell, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => curr = observed,
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for CasPool<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        // SAFETY: `&mut self` gives exclusive ownership of the chain.
        unsafe { Cell::release_chain(head) };
    }
}

/// A two-slot pool: an atomic "express" slot in front of a raw CAS stack.
///
/// Freeing parks the cell in the express slot when it is vacant; allocating
/// exchanges the slot with null first and only falls back to the stack when
/// the slot was empty. A queue that frees one node per pop and allocates one
/// per push mostly bounces off the express slot and never contends on the
/// stack.
pub struct ExpressPool<T> {
    express: AtomicPtr<Cell<T>>,
    head: AtomicPtr<Cell<T>>,
}

unsafe impl<T: Send> Send for ExpressPool<T> {}
unsafe impl<T: Send> Sync for ExpressPool<T> {}

impl<T> ExpressPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            express: AtomicPtr::new(ptr::null_mut()),
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for ExpressPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> for ExpressPool<T> {
    fn alloc(&self, value: T) -> *mut T {
        let cell = self.express.swap(ptr::null_mut(), Ordering::Relaxed);
        if !cell.is_null() {
            // SAFETY: the swap took sole ownership of the parked cell.
            return unsafe { Cell::install(cell, value) };
        }
        let backoff = Backoff::new();
        let mut curr = self.head.load(Ordering::Acquire);
        loop {
            if curr.is_null() {
                return Cell::boxed(value) as *mut T;
            }
            // SAFETY: cells are never deallocated while the pool is alive.
            let next = unsafe { (*curr).link.load(Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(curr, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => return unsafe { Cell::install(curr, value) },
                Err(observed) => {
                    curr = observed;
                    backoff.spin();
                }
            }
        }
    }

    unsafe fn free(&self, ptr: *mut T) {
        let cell = Cell::from_payload(ptr);
        // Park in the express slot; whatever was displaced overflows onto
        // the stack.
        let displaced = self.express.swap(cell, Ordering::Relaxed);
        if displaced.is_null() {
            return;
        }
        let mut curr = self.head.load(Ordering::Relaxed);
        loop {
            (*displaced).link.store(curr, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(curr, displaced, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => curr = observed,
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for ExpressPool<T> {
    fn drop(&mut self) {
        let express = *self.express.get_mut();
        if !express.is_null() {
            // SAFETY: a parked cell holds no payload and nothing links to it.
            unsafe { drop(Box::from_raw(express)) };
        }
        let head = *self.head.get_mut();
        // SAFETY: `&mut self` gives exclusive ownership of the chain.
        unsafe { Cell::release_chain(head) };
    }
}

/// An [`ExpressPool`] whose stack head is a version-tagged pointer.
///
/// The tag makes every push and pop of the free stack bump a counter, so a
/// stale head snapshot can never win a compare-and-swap no matter how the
/// cells were recycled in between. This is the pool for queues whose
/// allocation side runs under full multi-producer contention.
pub struct TaggedPool<T> {
    express: AtomicPtr<Cell<T>>,
    head: AtomicTagPtr<Cell<T>>,
}

unsafe impl<T: Send> Send for TaggedPool<T> {}
unsafe impl<T: Send> Sync for TaggedPool<T> {}

impl<T> TaggedPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            express: AtomicPtr::new(ptr::null_mut()),
            head: AtomicTagPtr::null(),
        }
    }
}

impl<T> Default for TaggedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> for TaggedPool<T> {
    fn alloc(&self, value: T) -> *mut T {
        let cell = self.express.swap(ptr::null_mut(), Ordering::Relaxed);
        if !cell.is_null() {
            // SAFETY: the swap took sole ownership of the parked cell.
            return unsafe { Cell::install(cell, value) };
        }
        let backoff = Backoff::new();
        let mut curr = self.head.load(Ordering::Acquire);
        loop {
            if curr.is_null() {
                return Cell::boxed(value) as *mut T;
            }
            // SAFETY: cells are never deallocated while the pool is alive.
            let next = unsafe { (*curr.as_ptr()).link.load(Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(curr, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(()) => return unsafe { Cell::install(curr.as_ptr(), value) },
                Err(observed) => {
                    curr = observed;
                    backoff.spin();
                }
            }
        }
    }

    unsafe fn free(&self, ptr: *mut T) {
        let cell = Cell::from_payload(ptr);
        let displaced = self.express.swap(cell, Ordering::Relaxed);
        if displaced.is_null() {
            return;
        }
        let mut curr = self.head.load(Ordering::Relaxed);
        loop {
            (*displaced).link.store(curr.as_ptr(), Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(curr, displaced, Ordering::Release, Ordering::Relaxed)
            {
                Ok(()) => return,
                Err(observed) => curr = observed,
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for TaggedPool<T> {
    fn drop(&mut self) {
        let express = *self.express.get_mut();
        if !express.is_null() {
            // SAFETY: a parked cell holds no payload and nothing links to it.
            unsafe { drop(Box::from_raw(express)) };
        }
        let head = self.head.load(Ordering::Relaxed).as_ptr();
        // SAFETY: `&mut self` gives exclusive ownership of the chain.
        unsafe { Cell::release_chain(head) };
    }
}
