mod common;

use common::{settle, wait_for};
use kestrel::{
    KernelError,
    thread::{Current, ThreadBuilder, ThreadState, get_state_by_tid},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

#[test]
fn exit_codes() {
    let ok = ThreadBuilder::new("ok").spawn(|| {});
    assert_eq!(ok.join(), 0);

    let boom = ThreadBuilder::new("boom").spawn(|| panic!("boom"));
    assert_eq!(boom.join(), -1);
}

#[test]
fn exited_thread_leaves_the_table() {
    let th = ThreadBuilder::new("short").spawn(|| {});
    let tid = th.tid;
    th.join();
    assert_eq!(get_state_by_tid(tid), Err(KernelError::InvalidArgument));
}

#[test]
fn adopted_host_thread_leaves_the_table() {
    let host = std::thread::spawn(|| {
        let tid = Current::get_tid();
        assert_eq!(get_state_by_tid(tid), Ok(ThreadState::Running));
        tid
    });
    let tid = host.join().unwrap();
    assert_eq!(get_state_by_tid(tid), Err(KernelError::InvalidArgument));
}

#[test]
fn spawn_as_parked_waits_for_unpark() {
    let ran = Arc::new(AtomicBool::new(false));
    let builder = ThreadBuilder::new("lazy");
    let tid = builder.get_tid();
    let handle = {
        let ran = ran.clone();
        builder.spawn_as_parked(move || ran.store(true, Ordering::SeqCst))
    };
    assert_eq!(handle.tid(), tid);
    assert_eq!(handle.name(), "lazy");
    settle();
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(get_state_by_tid(tid), Ok(ThreadState::Parked));

    handle.unpark();
    wait_for("the thread to run", || ran.load(Ordering::SeqCst));
}

#[test]
fn current_tid_matches_handle() {
    let seen = Arc::new(AtomicU64::new(u64::MAX));
    let th = {
        let seen = seen.clone();
        ThreadBuilder::new("tid").spawn(move || seen.store(Current::get_tid(), Ordering::SeqCst))
    };
    let tid = th.tid;
    th.join();
    assert_eq!(seen.load(Ordering::SeqCst), tid);
    assert_ne!(Current::get_tid(), tid);
    assert_eq!(Current::get().tid, Current::get_tid());
}

#[test]
fn running_thread_state() {
    let me = Current::get();
    assert_eq!(me.state(), ThreadState::Running);
    assert_eq!(get_state_by_tid(me.tid), Ok(ThreadState::Running));
}

#[test]
fn park_and_unpark() {
    let handle_slot = Arc::new(std::sync::Mutex::new(None));
    let parked = {
        let slot = handle_slot.clone();
        ThreadBuilder::new("parkee").spawn(move || {
            Current::park_with(|handle| *slot.lock().unwrap() = Some(handle));
        })
    };
    wait_for("the handle", || handle_slot.lock().unwrap().is_some());
    let handle = handle_slot.lock().unwrap().take();
    if let Some(handle) = handle {
        handle.unpark();
    }
    assert_eq!(parked.join(), 0);
}

#[test]
fn parking_with_a_spinlock_held_panics() {
    let th = ThreadBuilder::new("bad").spawn(|| {
        let lock = kestrel::spinlock::SpinLock::new(());
        let guard = lock.lock();
        Current::park_with(|handle| handle.unpark());
        guard.unlock();
    });
    assert_eq!(th.join(), -1);
}
