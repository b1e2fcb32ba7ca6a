//! Condition variable built directly on the scheduler.
//!
//! [`Condition2`] does the same job as the semaphore-based
//! [`Condition`](super::Condition) but parks its sleepers on a
//! [`ThreadQueue`] of its own. The hard part is `sleep`: the sleeper must be
//! in the queue before it gives up the lock, otherwise a `wake` issued in
//! between would find nobody to wake and the sleeper would block forever.
//!
//! Wake ups follow Mesa semantics. A woken thread is only made ready; it
//! competes for the lock like everybody else and must re-check its condition
//! once it holds the lock again.
//!
//! ```
//! use kestrel::sync::{Condition2, Lock};
//! use std::sync::Arc;
//!
//! let lock = Arc::new(Lock::new());
//! let cond = Condition2::new(lock.clone());
//!
//! lock.acquire();
//! cond.wake(); // No sleeper: nothing happens.
//! assert!(lock.is_held_by_current_thread());
//! lock.release();
//! ```
use super::Lock;
use crate::{
    interrupt::InterruptGuard,
    spinlock::SpinLock,
    thread::{
        Current,
        scheduler::{ThreadQueue, scheduler},
    },
};
use std::sync::Arc;

/// A Mesa-style condition variable bound to one [`Lock`].
pub struct Condition2 {
    lock: Arc<Lock>,
    waiters: SpinLock<Box<dyn ThreadQueue>>,
}

impl Condition2 {
    /// Creates a condition variable whose sleepers are ordered by the
    /// kernel scheduler.
    pub fn new(lock: Arc<Lock>) -> Self {
        Self::with_queue(lock, scheduler().new_thread_queue(false))
    }

    /// Creates a condition variable whose sleepers are kept in `queue`.
    pub fn with_queue(lock: Arc<Lock>, queue: Box<dyn ThreadQueue>) -> Self {
        Self {
            lock,
            waiters: SpinLock::new(queue),
        }
    }

    /// The lock this condition variable is bound to.
    pub fn lock(&self) -> &Arc<Lock> {
        &self.lock
    }

    /// Atomically releases the lock and parks the current thread until
    /// another thread wakes it, then re-acquires the lock.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn sleep(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition2::sleep: the lock is not held by the current thread."
        );
        Current::park_with(|th| {
            let _mask = InterruptGuard::new();
            let mut waiters = self.waiters.lock();
            waiters.wait_for_access(th);
            waiters.unlock();
            self.lock.release();
        });
        self.lock.acquire();
    }

    /// Readies at most one thread sleeping on this condition variable.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition2::wake: the lock is not held by the current thread."
        );
        let mut waiters = self.waiters.lock();
        let next = waiters.next_thread();
        waiters.unlock();

        if let Some(th) = next {
            th.unpark();
        }
    }

    /// Readies every thread sleeping on this condition variable and returns
    /// how many there were.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake_all(&self) -> usize {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition2::wake_all: the lock is not held by the current thread."
        );
        let _mask = InterruptGuard::new();
        let mut waiters = self.waiters.lock();
        let mut woken = 0;
        while let Some(th) = waiters.next_thread() {
            th.unpark();
            woken += 1;
        }
        waiters.unlock();
        woken
    }

    /// Number of threads currently sleeping on this condition variable.
    pub fn sleepers(&self) -> usize {
        let waiters = self.waiters.lock();
        let len = waiters.len();
        waiters.unlock();
        len
    }
}
