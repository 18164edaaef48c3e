//! A mutex/condvar queue for consumers that prefer sleeping over spinning.
//!
//! The lock-free variants report emptiness and let the caller decide how to
//! wait. This wrapper takes the opposite stance: `pop` parks the thread on a
//! condition variable until an element or a [`quit`](Queue::quit) arrives.
//! Under the lock sits a plain single-threaded linked queue with its own
//! free list — the mutex provides all the synchronisation.

use std::mem::MaybeUninit;
use std::ptr;
use std::sync::{Condvar, Mutex};

struct Node<T> {
    next: *mut Node<T>,
    value: MaybeUninit<T>,
}

/// The unsynchronised core: a singly linked queue plus a free list reusing
/// popped nodes. Only ever touched with the wrapper's mutex held.
struct RawQueue<T> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    free: *mut Node<T>,
}

impl<T> RawQueue<T> {
    fn new() -> RawQueue<T> {
        RawQueue {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            free: ptr::null_mut(),
        }
    }

    fn acquire(&mut self, value: T) -> *mut Node<T> {
        if self.free.is_null() {
            return Box::into_raw(Box::new(Node {
                next: ptr::null_mut(),
                value: MaybeUninit::new(value),
            }));
        }
        let node = self.free;
        unsafe {
            self.free = (*node).next;
            (*node).next = ptr::null_mut();
            (*node).value.write(value);
        }
        node
    }

    fn push(&mut self, value: T) {
        let node = self.acquire(value);
        if self.tail.is_null() {
            self.head = node;
            self.tail = node;
        } else {
            unsafe { (*self.tail).next = node };
            self.tail = node;
        }
    }

    fn pop(&mut self) -> Option<T> {
        if self.head.is_null() {
            return None;
        }
        let node = self.head;
        unsafe {
            self.head = (*node).next;
            if self.tail == node {
                self.tail = ptr::null_mut();
            }
            let value = (*node).value.assume_init_read();
            (*node).next = self.free;
            self.free = node;
            Some(value)
        }
    }

    fn is_empty(&self) -> bool {
        self.head.is_null()
    }
}

impl<T> Drop for RawQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let mut curr = self.free;
        while !curr.is_null() {
            unsafe {
                let next = (*curr).next;
                drop(Box::from_raw(curr));
                curr = next;
            }
        }
    }
}

struct State<T> {
    queue: RawQueue<T>,
    quit: bool,
}

/// An unbounded MPMC queue with blocking pops and a quit protocol.
///
/// `pop` parks on the condition variable while the queue is empty and
/// retries under the lock on every wake-up, so a wake-up consumed by a
/// faster consumer never strands a waiter. [`quit`](Queue::quit)
/// short-circuits: pending, in-flight and future pops return `None` without
/// waiting, even when elements remain — cancellation does not drain.
///
/// # Examples
///
/// ```rust
/// use weir_queue::blocking::Queue;
///
/// let q = Queue::new();
/// q.push(1);
/// q.push(2);
/// assert_eq!(q.pop(), Some(1));
/// assert_eq!(q.pop(), Some(2));
///
/// // Cancellation makes the remainder unreachable.
/// q.push(3);
/// q.quit();
/// assert_eq!(q.pop(), None);
/// ```
pub struct Queue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates an empty queue.
    pub fn new() -> Queue<T> {
        Queue {
            state: Mutex::new(State {
                queue: RawQueue::new(),
                quit: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Pushes an element and wakes one waiting consumer. Never fails; pushes
    /// after [`quit`](Queue::quit) are accepted but may never be observed.
    pub fn push(&self, value: T) {
        {
            let mut state = self.state.lock().unwrap();
            state.queue.push(value);
        }
        self.ready.notify_one();
    }

    /// Pops the element at the front, blocking while the queue is empty.
    ///
    /// Returns `None` as soon as [`quit`](Queue::quit) has been called,
    /// without waiting and without draining whatever is still queued. The
    /// retry-under-the-lock loop tolerates a wake-up consumed by a faster
    /// consumer: the loser simply waits again.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        while !state.quit {
            if let Some(value) = state.queue.pop() {
                return Some(value);
            }
            state = self.ready.wait(state).unwrap();
        }
        None
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().queue.is_empty()
    }

    /// Wakes every waiting consumer and makes every pending and future pop
    /// return `None`. Idempotent; does not drain the queue.
    pub fn quit(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.quit = true;
        }
        self.ready.notify_all();
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        self.quit();
    }
}
