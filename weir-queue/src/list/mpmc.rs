use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use weir::{AtomicTagPtr, Pool, Quiescence, TaggedPool};

use crate::utils::CacheAligned;

struct Node<T> {
    next: AtomicTagPtr<Node<T>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Node<T> {
        Node {
            next: AtomicTagPtr::null(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn with(value: T) -> Node<T> {
        Node {
            next: AtomicTagPtr::null(),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }
    }
}

/// An unbounded multi-producer multi-consumer linked queue.
///
/// The classic two-lock-free-endpoints algorithm: producers race a
/// compare-and-swap on `tail.next`, consumers race one on `head`, and both
/// sides help a lagging `tail` along so a stalled thread never blocks the
/// rest. Head, tail and every link are version-tagged pointers — a node
/// recycled through the pool carries a bumped counter, so a stale snapshot
/// can never win a compare-and-swap it should lose.
///
/// Consumers additionally run under a [`Quiescence`] bracket; see the
/// module-level notes on reclamation.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use weir_queue::list::mpmc::Queue;
///
/// let q = Arc::new(Queue::new());
/// let producer = {
///     let q = q.clone();
///     thread::spawn(move || {
///         for i in 0..100 {
///             q.push(i);
///         }
///     })
/// };
/// producer.join().unwrap();
///
/// let mut sum = 0;
/// while let Some(v) = q.pop() {
///     sum += v;
/// }
/// assert_eq!(sum, 4950);
/// ```
pub struct Queue<T> {
    head: CacheAligned<AtomicTagPtr<Node<T>>>,
    tail: CacheAligned<AtomicTagPtr<Node<T>>>,
    pool: TaggedPool<Node<T>>,
    reclaim: Quiescence<Node<T>>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates an empty queue.
    pub fn new() -> Queue<T> {
        let pool = TaggedPool::new();
        let sentinel = pool.alloc(Node::sentinel());
        Queue {
            head: CacheAligned::new(AtomicTagPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicTagPtr::new(sentinel)),
            pool,
            reclaim: Quiescence::new(),
        }
    }

    /// Pushes an element onto the back of the queue. Never fails.
    pub fn push(&self, value: T) {
        let node = self.pool.alloc(Node::with(value));
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*tail.as_ptr()).next.load(Ordering::Acquire) };
            // Act only on a snapshot that is still current, tag included.
            if tail == self.tail.load(Ordering::Relaxed) {
                if next.is_null() {
                    match unsafe {
                        (*tail.as_ptr()).next.compare_exchange_weak(
                            next,
                            node,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        )
                    } {
                        Ok(()) => {
                            // Swing tail onto the new node; losing this race
                            // just means someone helped us.
                            let _ = self.tail.compare_exchange(
                                tail,
                                node,
                                Ordering::Release,
                                Ordering::Relaxed,
                            );
                            return;
                        }
                        Err(_) => backoff.spin(),
                    }
                } else {
                    // Tail lags behind the last node: help it along.
                    let _ = self.tail.compare_exchange_weak(
                        tail,
                        next.as_ptr(),
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                }
            }
            tail = self.tail.load(Ordering::Relaxed);
        }
    }

    /// Pops the element at the front of the queue.
    pub fn pop(&self) -> Option<T> {
        self.reclaim.enter();

        let backoff = Backoff::new();
        let mut detached: *mut Node<T> = ptr::null_mut();
        let mut result = None;
        let mut head = self.head.load(Ordering::SeqCst);
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            let next = unsafe { (*head.as_ptr()).next.load(Ordering::Acquire) };
            if head == self.head.load(Ordering::Relaxed) {
                if head.as_ptr() == tail.as_ptr() {
                    if next.is_null() {
                        break;
                    }
                    // A producer linked its node but has not swung tail yet;
                    // helping is mandatory or a stalled producer wedges
                    // every consumer.
                    let _ = self.tail.compare_exchange_weak(
                        tail,
                        next.as_ptr(),
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                } else {
                    // Tail was sampled after head, so a tail strictly ahead
                    // means `next` was already linked: non-null here.
                    let value =
                        unsafe { (*(*next.as_ptr()).value.get()).assume_init_read() };
                    match self.head.compare_exchange_weak(
                        head,
                        next.as_ptr(),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    ) {
                        Ok(()) => {
                            detached = head.as_ptr();
                            result = Some(value);
                            break;
                        }
                        Err(_) => {
                            mem::forget(value);
                            backoff.spin();
                        }
                    }
                }
            }
            head = self.head.load(Ordering::SeqCst);
            tail = self.tail.load(Ordering::Acquire);
        }

        // SAFETY: `detached` was unlinked inside this bracket and its
        // payload moved out; the queue owns a single pool.
        unsafe { self.reclaim.exit(detached, &self.pool) };
        result
    }

    /// Returns `true` if the queue looks empty. Best effort.
    pub fn is_empty(&self) -> bool {
        self.reclaim.enter();
        let head = self.head.load(Ordering::SeqCst);
        let empty = unsafe { (*head.as_ptr()).next.load(Ordering::Acquire).is_null() };
        // SAFETY: nothing was detached.
        unsafe { self.reclaim.exit(ptr::null_mut(), &self.pool) };
        empty
    }

    /// No-op; this variant has no cancellation protocol. Terminate
    /// consumers with a sentinel element or use the blocking wrapper.
    pub fn quit(&self) {}
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        unsafe {
            self.reclaim.drain(&self.pool);
            let mut node = self.head.load(Ordering::Relaxed).as_ptr();
            let mut next = (*node).next.load(Ordering::Relaxed).as_ptr();
            self.pool.free(node);
            while !next.is_null() {
                node = next;
                next = (*node).next.load(Ordering::Relaxed).as_ptr();
                ptr::drop_in_place((*(*node).value.get()).as_mut_ptr());
                self.pool.free(node);
            }
        }
    }
}
