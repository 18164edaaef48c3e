use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rand::Rng;
use weir_queue::list::mpmc::Queue;

#[test]
fn single_thread_fifo() {
    let q = Queue::new();
    assert!(q.is_empty());
    assert_eq!(q.pop(), None);

    for i in 0..1_000 {
        q.push(i);
    }
    assert!(!q.is_empty());
    for i in 0..1_000 {
        assert_eq!(q.pop(), Some(i));
    }
    assert_eq!(q.pop(), None);
    assert!(q.is_empty());
}

#[test]
fn drops_undelivered_elements() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;
    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }
    }

    let q = Queue::new();
    for _ in 0..100 {
        q.push(Tracked);
    }
    for _ in 0..40 {
        drop(q.pop());
    }
    drop(q);
    assert_eq!(DROPS.load(Ordering::Relaxed), 100);
}

/// The driver protocol: every producer pushes its range and then a `-1`
/// sentinel; consumers count sentinels through a shared atomic and the one
/// that sees the last calls `quit`. The grand total of non-sentinel values
/// must match the closed form.
#[test]
#[cfg_attr(miri, ignore)]
fn sentinel_driver_sums_to_closed_form() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const RANGE: i64 = 25_000;

    let q = Arc::new(Queue::new());
    let sentinels = Arc::new(AtomicUsize::new(0));
    let mut producers = vec![];
    let mut consumers = vec![];

    for _ in 0..PRODUCERS {
        let q = q.clone();
        producers.push(thread::spawn(move || {
            for i in 0..RANGE {
                q.push(i);
            }
            q.push(-1);
        }));
    }

    for _ in 0..CONSUMERS {
        let q = q.clone();
        let sentinels = sentinels.clone();
        consumers.push(thread::spawn(move || {
            let mut sum: u64 = 0;
            loop {
                match q.pop() {
                    Some(-1) => {
                        if sentinels.fetch_add(1, Ordering::SeqCst) + 1 == PRODUCERS {
                            q.quit();
                        }
                    }
                    Some(v) => sum += v as u64,
                    None => {
                        if sentinels.load(Ordering::SeqCst) == PRODUCERS {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }
            sum
        }));
    }

    for h in producers {
        h.join().unwrap();
    }
    let total: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();

    let per_producer = (RANGE as u64) * (RANGE as u64 - 1) / 2;
    assert_eq!(total, PRODUCERS as u64 * per_producer);
}

#[test]
#[cfg_attr(miri, ignore)]
fn mixed_churn_leaves_queue_empty() {
    const THREADS: usize = 8;
    const OPS: usize = 10_000;

    let q = Arc::new(Queue::new());
    let balance = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for t in 0..THREADS {
        let q = q.clone();
        let balance = balance.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for i in 0..OPS {
                match rng.gen_range(0..3) {
                    0 => {
                        q.push((t * OPS + i) as u64);
                        balance.fetch_add(1, Ordering::Relaxed);
                    }
                    1 => {
                        if q.pop().is_some() {
                            balance.fetch_sub(1, Ordering::Relaxed);
                        }
                    }
                    _ => {
                        q.push((t * OPS + i) as u64);
                        balance.fetch_add(1, Ordering::Relaxed);
                        if q.pop().is_some() {
                            balance.fetch_sub(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let mut drained = 0;
    while q.pop().is_some() {
        drained += 1;
    }
    assert_eq!(drained, balance.load(Ordering::Relaxed));
    assert!(q.is_empty());
}
