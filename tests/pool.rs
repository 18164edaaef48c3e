//! Pool fuzzing: interleaved alloc/free traffic must never hand the same
//! cell to two owners or corrupt a payload in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use rand::Rng;
use weir::{CasPool, ExpressPool, LockedPool, Pool, TaggedPool};

fn recycles_without_heap_traffic<P: Pool<u64>>(pool: &P) {
    let a = pool.alloc(1);
    unsafe {
        assert_eq!(*a, 1);
        pool.free(a);
    }
    // The freed cell comes straight back.
    let b = pool.alloc(2);
    assert_eq!(b, a);
    unsafe {
        assert_eq!(*b, 2);
        pool.free(b);
    }
}

#[test]
fn locked_pool_recycles() {
    recycles_without_heap_traffic(&LockedPool::new());
}

#[test]
fn cas_pool_recycles() {
    recycles_without_heap_traffic(&CasPool::new());
}

#[test]
fn express_pool_recycles() {
    recycles_without_heap_traffic(&ExpressPool::new());
}

#[test]
fn tagged_pool_recycles() {
    recycles_without_heap_traffic(&TaggedPool::new());
}

#[test]
fn express_slot_hides_a_single_cell() {
    let pool = ExpressPool::new();
    let a = pool.alloc(1);
    let b = pool.alloc(2);
    unsafe { pool.free(a) };
    // One parked cell lives in the express slot, not on the stack.
    assert!(pool.is_empty());
    unsafe { pool.free(b) };
    // The second free displaces the first onto the stack.
    assert!(!pool.is_empty());
}

/// Each thread keeps a small working set, stamping every cell it holds and
/// checking the stamp right before releasing it. A double handout shows up
/// as a clobbered stamp.
fn hammer<P>(pool: P, threads: usize, ops_per_thread: usize)
where
    P: Pool<u64> + Send + Sync + 'static,
{
    let pool = Arc::new(pool);
    let mut handles = vec![];

    for t in 0..threads {
        let pool = pool.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut held: Vec<(usize, u64)> = Vec::with_capacity(8);
            for i in 0..ops_per_thread {
                if held.len() < 8 && (rng.gen_ratio(2, 3) || held.is_empty()) {
                    let stamp = (t * ops_per_thread + i) as u64;
                    let ptr = pool.alloc(stamp);
                    unsafe { assert_eq!(*ptr, stamp) };
                    held.push((ptr as usize, stamp));
                } else {
                    let at = rng.gen_range(0..held.len());
                    let (ptr, stamp) = held.swap_remove(at);
                    let ptr = ptr as *mut u64;
                    unsafe {
                        assert_eq!(*ptr, stamp);
                        pool.free(ptr);
                    }
                }
            }
            for (ptr, stamp) in held {
                let ptr = ptr as *mut u64;
                unsafe {
                    assert_eq!(*ptr, stamp);
                    pool.free(ptr);
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn locked_pool_fuzz() {
    hammer(LockedPool::new(), 8, 125_000);
}

#[test]
#[cfg_attr(miri, ignore)]
fn tagged_pool_fuzz() {
    hammer(TaggedPool::new(), 8, 125_000);
}

/// Pipeline fuzz for the raw-CAS pools: one allocating thread feeding
/// freeing threads, the concurrency envelope their queues use them under
/// (a single thread popping the free stack at a time).
fn pipeline<P>(pool: P, freers: usize, cycles: usize)
where
    P: Pool<u64> + Send + Sync + 'static,
{
    let pool = Arc::new(pool);
    let done = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];
    let mut senders = vec![];

    for _ in 0..freers {
        let (tx, rx) = mpsc::channel::<usize>();
        senders.push(tx);
        let pool = pool.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || {
            for ptr in rx {
                let ptr = ptr as *mut u64;
                unsafe {
                    assert_eq!(*ptr, ptr as u64);
                    pool.free(ptr);
                }
                done.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for i in 0..cycles {
        let ptr = pool.alloc(0);
        unsafe { *ptr = ptr as u64 };
        senders[i % freers].send(ptr as usize).unwrap();
    }
    drop(senders);

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(done.load(Ordering::Relaxed), cycles);
}

#[test]
#[cfg_attr(miri, ignore)]
fn cas_pool_pipeline_fuzz() {
    pipeline(CasPool::new(), 4, 500_000);
}

#[test]
#[cfg_attr(miri, ignore)]
fn express_pool_pipeline_fuzz() {
    pipeline(ExpressPool::new(), 1, 500_000);
}
