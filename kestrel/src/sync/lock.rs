//! Sleeping mutual exclusion.
use crate::{
    spinlock::{SpinLock, WouldBlock},
    thread::{
        Current,
        scheduler::{ThreadQueue, scheduler},
    },
};

/// A non-reentrant lock that parks its waiters instead of spinning.
///
/// Unlike a [`SpinLock`], a [`Lock`] may be held across blocking operations,
/// and it knows which thread owns it. On release the lock is handed directly
/// to the next waiter chosen by the scheduler's queue, so a thread arriving
/// late can not barge in front of the queue.
///
/// # Examples
///
/// ```
/// use kestrel::sync::Lock;
///
/// let lock = Lock::new();
/// lock.acquire();
/// assert!(lock.is_held_by_current_thread());
/// lock.release();
/// ```
pub struct Lock {
    inner: SpinLock<LockInner>,
}

struct LockInner {
    holder: Option<u64>,
    waiters: Box<dyn ThreadQueue>,
}

impl Lock {
    /// Creates a new lock in an unlocked state ready for use.
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new(LockInner {
                holder: None,
                waiters: scheduler().new_thread_queue(true),
            }),
        }
    }

    /// Acquires the lock, parking the current thread until it is available.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock.
    pub fn acquire(&self) {
        let tid = Current::get_tid();
        let mut inner = self.inner.lock();
        assert_ne!(
            inner.holder,
            Some(tid),
            "Lock::acquire: thread {tid} already holds the lock."
        );
        if inner.holder.is_none() {
            inner.holder = Some(tid);
            inner.unlock();
            return;
        }
        Current::park_with(move |th| {
            inner.waiters.wait_for_access(th);
            inner.unlock();
        });
        // The releasing thread made us the holder before unparking us.
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if any thread, including the current one, holds
    /// the lock.
    pub fn try_acquire(&self) -> Result<(), WouldBlock> {
        let tid = Current::get_tid();
        let mut inner = self.inner.lock();
        let result = if inner.holder.is_none() {
            inner.holder = Some(tid);
            Ok(())
        } else {
            Err(WouldBlock)
        };
        inner.unlock();
        result
    }

    /// Releases the lock, handing it to the next waiter if there is one.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn release(&self) {
        let tid = Current::get_tid();
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.holder,
            Some(tid),
            "Lock::release: thread {tid} does not hold the lock."
        );
        let next = inner.waiters.next_thread();
        inner.holder = next.as_ref().map(|th| th.tid());
        inner.unlock();

        if let Some(th) = next {
            th.unpark();
        }
    }

    /// Returns true if the current thread holds this lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let tid = Current::get_tid();
        let inner = self.inner.lock();
        let held = inner.holder == Some(tid);
        inner.unlock();
        held
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
