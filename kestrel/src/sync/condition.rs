//! Semaphore-based condition variable.
//!
//! Every sleeper gets a private zero-permit [`Semaphore`]. `sleep` queues it,
//! drops the lock and waits on it; `wake` signals the oldest one. Because a
//! semaphore remembers a signal that arrives before the wait, releasing the
//! lock before blocking can not lose a wake up.
use super::{Lock, Semaphore};
use crate::spinlock::SpinLock;
use std::{collections::VecDeque, sync::Arc};

/// A Mesa-style condition variable bound to one [`Lock`], built from
/// semaphores.
pub struct Condition {
    lock: Arc<Lock>,
    waiters: SpinLock<VecDeque<Arc<Semaphore<()>>>>,
}

impl Condition {
    /// Creates a condition variable bound to `lock`.
    pub fn new(lock: Arc<Lock>) -> Self {
        Self {
            lock,
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    /// Releases the lock, waits to be woken, then re-acquires the lock.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn sleep(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition::sleep: the lock is not held by the current thread."
        );
        let waiter = Arc::new(Semaphore::new(0, ()));
        let mut waiters = self.waiters.lock();
        waiters.push_back(waiter.clone());
        waiters.unlock();

        self.lock.release();
        waiter.wait().consume();
        self.lock.acquire();
    }

    /// Wakes the oldest sleeper, if any.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition::wake: the lock is not held by the current thread."
        );
        let mut waiters = self.waiters.lock();
        let next = waiters.pop_front();
        waiters.unlock();

        if let Some(waiter) = next {
            waiter.signal();
        }
    }

    /// Wakes every sleeper and returns how many there were.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake_all(&self) -> usize {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition::wake_all: the lock is not held by the current thread."
        );
        let mut waiters = self.waiters.lock();
        let all = core::mem::take(&mut *waiters);
        waiters.unlock();

        let woken = all.len();
        for waiter in all {
            waiter.signal();
        }
        woken
    }
}
