use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use weir::AtomicTagPtr;

#[test]
fn tag_increases_on_every_successful_exchange() {
    let node = Box::into_raw(Box::new(0u64));
    let slot = AtomicTagPtr::new(node);

    let mut last = slot.load(Ordering::Acquire);
    assert_eq!(last.tag(), 0);
    assert_eq!(last.as_ptr(), node);

    // Re-installing the same pointer over and over must still produce a
    // strictly increasing counter.
    for _ in 0..100 {
        slot.compare_exchange(last, node, Ordering::AcqRel, Ordering::Acquire)
            .unwrap();
        let now = slot.load(Ordering::Acquire);
        assert_eq!(now.as_ptr(), node);
        assert!(now.tag() > last.tag());
        last = now;
    }

    unsafe { drop(Box::from_raw(node)) };
}

#[test]
fn stale_snapshot_loses() {
    let a = Box::into_raw(Box::new(1u64));
    let b = Box::into_raw(Box::new(2u64));
    let slot = AtomicTagPtr::new(a);

    let stale = slot.load(Ordering::Acquire);

    // A -> B -> A: the word now holds the same pointer with a higher tag.
    slot.store(b, Ordering::Release);
    slot.store(a, Ordering::Release);

    let err = slot
        .compare_exchange(stale, b, Ordering::AcqRel, Ordering::Acquire)
        .unwrap_err();
    assert_eq!(err.as_ptr(), a);
    assert_eq!(err.tag(), 2);

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
fn swap_returns_previous_snapshot() {
    let a = Box::into_raw(Box::new(1u64));
    let b = Box::into_raw(Box::new(2u64));
    let slot = AtomicTagPtr::new(a);

    let prev = slot.swap(b, Ordering::AcqRel);
    assert_eq!(prev.as_ptr(), a);
    assert_eq!(prev.tag(), 0);

    let now = slot.load(Ordering::Acquire);
    assert_eq!(now.as_ptr(), b);
    assert_eq!(now.tag(), 1);

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
fn null_pointer_representation() {
    let slot: AtomicTagPtr<u64> = AtomicTagPtr::null();
    let snap = slot.load(Ordering::Acquire);
    assert!(snap.is_null());
    assert_eq!(snap.tag(), 0);

    // Tagging does not make a null pointer look non-null.
    slot.store(std::ptr::null_mut(), Ordering::Release);
    let snap = slot.load(Ordering::Acquire);
    assert!(snap.is_null());
    assert_eq!(snap.tag(), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_stores_bump_exactly_once_each() {
    const THREADS: usize = 4;
    const STORES: usize = 10_000;

    let node = Box::into_raw(Box::new(0u64)) as usize;
    let slot = Arc::new(AtomicTagPtr::new(node as *mut u64));
    let mut handles = vec![];

    for _ in 0..THREADS {
        let slot = slot.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..STORES {
                slot.store(node as *mut u64, Ordering::Release);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Every store publishes exactly one increment, no matter how the
    // underlying CAS loops interleaved.
    let snap = slot.load(Ordering::Acquire);
    assert_eq!(snap.tag(), (THREADS * STORES) as u64);
    assert_eq!(snap.as_ptr() as usize, node);

    unsafe { drop(Box::from_raw(node as *mut u64)) };
}
