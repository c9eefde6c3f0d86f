use kernel_sync::SpinLock;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let lock = SpinLock::named("kmem", Vec::<u64>::new());
    lock.lock().push(0x1000);
    assert!(!lock.is_locked());

    let mut free = lock.lock();
    free.push(0x2000);
    assert_eq!(free.pop(), Some(0x2000));
    assert_eq!(free.len(), 1);
}

#[test]
fn name_and_state_show_up_in_debug() {
    let lock = SpinLock::named("time", 7_u64);
    assert_eq!(lock.name(), "time");

    let held = lock.lock();
    assert!(lock.is_locked());
    let shown = format!("{lock:?}");
    assert!(shown.contains("time") && shown.contains("locked: true"));
    drop(held);

    assert!(!lock.is_locked());
    assert_eq!(lock.into_inner(), 7);
}

#[test]
fn unnamed_locks_get_a_default_name() {
    assert_eq!(SpinLock::new(()).name(), "spinlock");
}

#[test]
fn try_lock_fails_only_while_held() {
    let lock = SpinLock::new(1u8);

    let held = lock.try_lock().unwrap();
    assert!(lock.try_lock().is_none());
    assert_eq!(*held, 1);

    drop(held);
    assert!(lock.try_lock().is_some());
}

#[test]
fn get_mut_bypasses_the_lock() {
    let mut lock = SpinLock::named("kmem", [0u32; 4]);
    lock.get_mut()[2] = 3;
    assert!(!lock.is_locked());
    assert_eq!(lock.with_lock(|shares| shares[2]), 3);
}

#[test]
fn critical_sections_never_overlap() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 5_000;

    let lock = SpinLock::named("kmem", 0usize);
    let inside = AtomicUsize::new(0);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ROUNDS {
                    lock.with_lock(|count| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders");
                        *count += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            });
        }
    });

    assert_eq!(*lock.lock(), THREADS * ROUNDS);
}

#[test]
fn panicking_holder_still_unlocks() {
    let lock = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        lock.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());

    assert_eq!(lock.with_lock(|v| *v), 123);
}
