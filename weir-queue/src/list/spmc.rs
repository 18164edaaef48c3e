use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;
use weir::{CasPool, Pool, Quiescence};

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
    reclaim: Quiescence<Node<T>>,
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
            reclaim: Quiescence::new(),
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        unsafe {
            // Nodes parked by late consumers go back to the pool first.
            self.reclaim.drain(&self.pool);
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

/// Creates an unbounded single-producer multi-consumer linked queue.
///
/// The producer side works exactly like the SPSC variant; consumers contend
/// on `head` with a compare-and-swap loop. Because one consumer may detach a
/// node another consumer is still reading, every pop runs inside a
/// [`Quiescence`] bracket and detached nodes are only recycled at quiescent
/// moments.
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

/// The producing half of an SPMC linked queue.
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
        unsafe { (*tail).next.store(node, Ordering::Release) };
        self.inner.tail.store(node, Ordering::Release);
    }
}

/// A consuming handle of an SPMC linked queue. Clone one per consumer.
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
    /// Pops the element at the front of the queue.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;
        inner.reclaim.enter();

        let backoff = Backoff::new();
        let mut detached: *mut Node<T> = ptr::null_mut();
        let mut result = None;
        let mut head = inner.head.load(Ordering::SeqCst);
        loop {
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                break;
            }
            // Read before the swing; a lost race forgets the bit copy
            // before anyone could observe it twice.
            let value = unsafe { (*(*next).value.get()).assume_init_read() };
            match inner
                .head
                .compare_exchange_weak(head, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    detached = head;
                    result = Some(value);
                    break;
                }
                Err(observed) => {
                    mem::forget(value);
                    head = observed;
                    backoff.spin();
                }
            }
        }

        // SAFETY: `detached` was unlinked inside this bracket and its
        // payload moved out; the queue owns a single pool.
        unsafe { inner.reclaim.exit(detached, &inner.pool) };
        result
    }

    /// Returns `true` if the queue looks empty. Best effort.
    pub fn is_empty(&self) -> bool {
        let inner = &*self.inner;
        inner.reclaim.enter();
        let head = inner.head.load(Ordering::SeqCst);
        let empty = unsafe { (*head).next.load(Ordering::Acquire).is_null() };
        // SAFETY: nothing was detached.
        unsafe { inner.reclaim.exit(ptr::null_mut(), &inner.pool) };
        empty
    }
}
