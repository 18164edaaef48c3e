//! The classic producer/consumer sum driver: P producers each push a range
//! of integers followed by a `-1` sentinel, C consumers sum what they pop
//! and count sentinels, and the grand total is checked against the closed
//! form.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use weir_queue::list::mpmc::Queue;

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const RANGE: i64 = 100_000;

fn main() {
    let q = Arc::new(Queue::new());
    let sentinels = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..RANGE {
                    q.push(i);
                }
                q.push(-1);
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let q = q.clone();
            let sentinels = sentinels.clone();
            thread::spawn(move || {
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
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let total: u64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
    let elapsed = start.elapsed();

    let expected = PRODUCERS as u64 * (RANGE as u64) * (RANGE as u64 - 1) / 2;
    assert_eq!(total, expected);
    println!(
        "{} producers x {} values -> {} consumers: sum {} in {:?}",
        PRODUCERS, RANGE, CONSUMERS, total, elapsed
    );
}
