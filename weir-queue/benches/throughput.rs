//! Cross-variant throughput: one producer streaming a range of integers to
//! one consumer, measured per variant.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use weir_queue::{blocking, list, ring};

const STREAM: u64 = 10_000;

fn bench_list_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");
    group.throughput(Throughput::Elements(STREAM));

    group.bench_function(BenchmarkId::from_parameter("locked"), |b| {
        b.iter(|| {
            let q = Arc::new(list::locked::Queue::new());
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..STREAM {
                        q.push(i);
                    }
                })
            };
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = q.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::from_parameter("spsc"), |b| {
        b.iter(|| {
            let (p, c) = list::spsc::queue();
            let producer = thread::spawn(move || {
                for i in 0..STREAM {
                    p.push(i);
                }
            });
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = c.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::from_parameter("mpmc"), |b| {
        b.iter(|| {
            let q = Arc::new(list::mpmc::Queue::new());
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..STREAM {
                        q.push(i);
                    }
                })
            };
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = q.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::from_parameter("blocking"), |b| {
        b.iter(|| {
            let q = Arc::new(blocking::Queue::new());
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..STREAM {
                        q.push(i);
                    }
                })
            };
            for _ in 0..STREAM {
                black_box(q.pop());
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_ring_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(STREAM));

    group.bench_function(BenchmarkId::from_parameter("spsc"), |b| {
        b.iter(|| {
            let (p, c) = ring::spsc::queue();
            let producer = thread::spawn(move || {
                for i in 0..STREAM {
                    let mut v = i;
                    while let Err(back) = p.push(v) {
                        v = back;
                        thread::yield_now();
                    }
                }
            });
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = c.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::from_parameter("ticket"), |b| {
        b.iter(|| {
            let q = Arc::new(ring::ticket::Queue::new());
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..STREAM {
                        let mut v = i;
                        while let Err(back) = q.push(v) {
                            v = back;
                            thread::yield_now();
                        }
                    }
                })
            };
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = q.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::from_parameter("wait_free"), |b| {
        b.iter(|| {
            let q = Arc::new(ring::wait_free::Queue::new());
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..STREAM {
                        let mut v = i;
                        while let Err(back) = q.push(v) {
                            v = back;
                            thread::yield_now();
                        }
                    }
                })
            };
            let mut seen = 0;
            while seen < STREAM {
                if let Some(v) = q.pop() {
                    black_box(v);
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_list_variants, bench_ring_variants);
criterion_main!(benches);
