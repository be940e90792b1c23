use herald::{Current, is_announced, registered_slots};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

struct Counted {
    value: usize,
    drops: Arc<AtomicUsize>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(value: usize, drops: &Arc<AtomicUsize>) -> Box<Counted> {
    Box::new(Counted {
        value,
        drops: drops.clone(),
    })
}

#[test]
fn test_reclaim_frees_unannounced_version() {
    let drops = Arc::new(AtomicUsize::new(0));
    let cell = Current::from_box(counted(0, &drops));

    let retired = cell.swap(counted(1, &drops));
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    retired.reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    drop(cell);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reclaim_waits_for_reader() {
    let drops = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(Current::from_box(counted(0, &drops)));
    let announced = Arc::new(Barrier::new(2));
    let release = Arc::new(AtomicBool::new(false));

    let reader = {
        let cell = cell.clone();
        let announced = announced.clone();
        let release = release.clone();
        thread::spawn(move || {
            let snapshot = cell.announce();
            announced.wait();
            while !release.load(Ordering::Acquire) {
                thread::yield_now();
            }
            // The old version must still be intact here.
            snapshot.value
        })
    };

    announced.wait();
    let retired = cell.swap(counted(1, &drops));
    assert!(retired.is_announced());

    let retired = match retired.try_reclaim() {
        Ok(()) => panic!("reclaimed a version a reader still announces"),
        Err(retired) => retired,
    };

    let reclaimer = {
        let drops = drops.clone();
        thread::spawn(move || {
            retired.reclaim();
            drops.load(Ordering::SeqCst)
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert_eq!(drops.load(Ordering::SeqCst), 0, "freed while announced");

    release.store(true, Ordering::Release);
    assert_eq!(reader.join().unwrap(), 0);
    assert_eq!(reclaimer.join().unwrap(), 1);
    assert_eq!(cell.announce().value, 1);
}

#[test]
fn test_announcement_cleared_after_guard() {
    let cell = Current::new(42u64);
    let addr = {
        let snapshot = cell.announce();
        let addr = &*snapshot as *const u64;
        assert!(is_announced(addr));
        addr
    };
    assert!(!is_announced(addr));
}

#[test]
fn test_nested_announcements() {
    let outer = Current::new(1u32);
    let inner = Current::new(2u32);

    let a = outer.announce();
    let b = inner.announce();
    assert!(is_announced(&*a as *const u32));
    assert!(is_announced(&*b as *const u32));

    let pa = &*a as *const u32;
    drop(b);
    // Dropping the nested snapshot must not clear the outer one.
    assert!(is_announced(pa));
    drop(a);
    assert!(!is_announced(pa));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_swaps_and_reads() {
    let drops = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(Current::from_box(counted(0, &drops)));
    let stop = Arc::new(AtomicBool::new(false));
    const SWAPS: usize = 500;

    let mut readers = Vec::new();
    for _ in 0..4 {
        let cell = cell.clone();
        let stop = stop.clone();
        readers.push(thread::spawn(move || {
            let mut last = 0;
            while !stop.load(Ordering::Acquire) {
                let snapshot = cell.announce();
                // Versions only move forward.
                assert!(snapshot.value >= last);
                last = snapshot.value;
            }
        }));
    }

    for i in 1..=SWAPS {
        cell.swap(counted(i, &drops)).reclaim();
    }
    stop.store(true, Ordering::Release);

    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), SWAPS);
    assert_eq!(cell.announce().value, SWAPS);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_exited_threads_recycle_slots() {
    let _ = env_logger::builder().is_test(true).try_init();
    let cell = Arc::new(Current::new(0u8));

    for _ in 0..400 {
        let cell = cell.clone();
        thread::spawn(move || {
            let _ = *cell.announce();
        })
        .join()
        .unwrap();
    }

    assert!(registered_slots() < 400);
}
