use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use weir::{ExpressPool, Pool};

use crate::utils::CacheAligned;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Node<T> {
        Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn with(value: T) -> Node<T> {
        Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }
    }
}

struct Inner<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    pool: ExpressPool<Node<T>>,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new() -> Inner<T> {
        let pool = ExpressPool::new();
        let sentinel = pool.alloc(Node::sentinel());
        Inner {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            pool,
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        unsafe {
            // The front node's payload is dead (sentinel or already popped);
            // everything behind it is live and must be dropped.
            let mut node = self.head.load(Ordering::Relaxed);
            let mut next = (*node).next.load(Ordering::Relaxed);
            self.pool.free(node);
            while !next.is_null() {
                node = next;
                next = (*node).next.load(Ordering::Relaxed);
                ptr::drop_in_place((*(*node).value.get()).as_mut_ptr());
                self.pool.free(node);
            }
        }
    }
}

/// Creates an unbounded single-producer single-consumer linked queue.
///
/// Only the producer touches `tail`, only the consumer touches `head`; the
/// sentinel node keeps `head` dereferenceable at all times. Both handles are
/// `Send` but neither is `Clone`: the cardinality lives in the types.
///
/// # Examples
///
/// ```rust
/// let (p, c) = weir_queue::list::spsc::queue();
///
/// p.push(1);
/// p.push(2);
/// assert_eq!(c.pop(), Some(1));
/// assert_eq!(c.pop(), Some(2));
/// assert_eq!(c.pop(), None);
/// ```
pub fn queue<T>() -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner::new());
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

/// The producing half of an SPSC linked queue.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Pushes an element onto the back of the queue. Never fails.
    pub fn push(&self, value: T) {
        let node = self.inner.pool.alloc(Node::with(value));
        let tail = self.inner.tail.load(Ordering::Relaxed);
        // Both stores are publications: the link hands the payload to the
        // consumer, the tail store to whoever holds the producer side next.
        unsafe { (*tail).next.store(node, Ordering::Release) };
        self.inner.tail.store(node, Ordering::Release);
    }
}

/// The consuming half of an SPSC linked queue.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Pops the element at the front of the queue.
    pub fn pop(&self) -> Option<T> {
        let head = self.inner.head.load(Ordering::Relaxed);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        // `next` becomes the new front; its payload moves out and the old
        // front goes back to the pool.
        let value = unsafe { (*(*next).value.get()).assume_init_read() };
        self.inner.head.store(next, Ordering::Relaxed);
        unsafe { self.inner.pool.free(head) };
        Some(value)
    }

    /// Returns `true` if the queue looks empty. Best effort.
    pub fn is_empty(&self) -> bool {
        let head = self.inner.head.load(Ordering::Relaxed);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}
