use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use weir::{CasPool, Pool};

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
    pool: CasPool<Node<T>>,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new() -> Inner<T> {
        let pool = CasPool::new();
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

/// Creates an unbounded multi-producer single-consumer linked queue.
///
/// Producers claim their predecessor with a single atomic exchange on `tail`
/// and then link themselves in. The exchange totally orders producers, but a
/// producer stalled between the exchange and the link leaves a transient
/// hole: the consumer sees the chain end early and reports empty until the
/// link lands. Lock-free, not wait-free.
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

/// A producing handle of an MPSC linked queue. Clone one per producer.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Producer {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Producer<T> {
    /// Pushes an element onto the back of the queue. Never fails.
    pub fn push(&self, value: T) {
        let node = self.inner.pool.alloc(Node::with(value));
        let prev = self.inner.tail.swap(node, Ordering::AcqRel);
        // `prev` cannot have been reclaimed: the consumer only frees nodes
        // it has moved past, and it cannot move past `prev` before this
        // store makes `prev.next` non-null.
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }
}

/// The consuming half of an MPSC linked queue.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<Cell<()>>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Pops the element at the front of the queue.
    ///
    /// Returns `None` when the queue is empty or when the front link is a
    /// hole left by a producer that has exchanged but not yet linked.
    pub fn pop(&self) -> Option<T> {
        let head = self.inner.head.load(Ordering::Relaxed);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
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
