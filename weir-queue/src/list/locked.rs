use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Mutex;

use weir::{LockedPool, Pool};

struct Node<T> {
    next: *mut Node<T>,
    value: MaybeUninit<T>,
}

struct State<T> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
}

/// An unbounded MPMC queue guarded by a single mutex.
///
/// The slowest and simplest member of the family; it serves as the
/// correctness oracle the lock-free variants are measured against.
pub struct Queue<T> {
    state: Mutex<State<T>>,
    pool: LockedPool<Node<T>>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates an empty queue.
    pub fn new() -> Queue<T> {
        Queue {
            state: Mutex::new(State {
                head: ptr::null_mut(),
                tail: ptr::null_mut(),
            }),
            pool: LockedPool::new(),
        }
    }

    /// Pushes an element onto the back of the queue. Never fails.
    pub fn push(&self, value: T) {
        let node = self.pool.alloc(Node {
            next: ptr::null_mut(),
            value: MaybeUninit::new(value),
        });
        let mut state = self.state.lock().unwrap();
        if state.tail.is_null() {
            state.head = node;
            state.tail = node;
        } else {
            unsafe { (*state.tail).next = node };
            state.tail = node;
        }
    }

    /// Pops the element at the front of the queue.
    pub fn pop(&self) -> Option<T> {
        let node;
        let value;
        {
            let mut state = self.state.lock().unwrap();
            if state.head.is_null() {
                return None;
            }
            node = state.head;
            unsafe {
                state.head = (*node).next;
                if state.tail == node {
                    state.tail = ptr::null_mut();
                }
                value = (*node).value.assume_init_read();
            }
        }
        unsafe { self.pool.free(node) };
        Some(value)
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().head.is_null()
    }

    /// No-op; this variant has no cancellation protocol.
    pub fn quit(&self) {}
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
