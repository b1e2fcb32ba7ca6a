#![allow(dead_code)]

use kestrel::thread::{ThreadState, get_state_by_tid};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Spins until `cond` holds, failing the test after a generous timeout.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < TIMEOUT, "Timed out waiting for {what}.");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Waits until thread `tid` is parked.
pub fn wait_parked(tid: u64) {
    wait_for(&format!("thread {tid} to park"), || {
        get_state_by_tid(tid) == Ok(ThreadState::Parked)
    });
}

/// Gives other threads a chance to run before checking that they did not
/// make progress.
pub fn settle() {
    std::thread::sleep(Duration::from_millis(50));
}
