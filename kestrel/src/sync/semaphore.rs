//! # Semaphore.
//!
//! A **semaphore** regulates concurrent access to a finite set of resources.
//! It maintains a count of available "permits"; each permit grants a thread
//! the right to access the resource the semaphore is combined with.
//!
//! Threads acquire a permit with [`Semaphore::wait`] and give it back either
//! explicitly with [`Semaphore::signal`] or implicitly by dropping the
//! [`SemaphorePermits`] guard. A semaphore created with zero permits works
//! as an event: [`signal`] before [`wait`] is remembered.
//!
//! ```
//! use kestrel::sync::Semaphore;
//!
//! let sema = Semaphore::new(2, "pool");
//! let a = sema.wait();
//! let b = sema.wait();
//! assert_eq!(*a, "pool");
//! assert_eq!(sema.permits(), 0);
//! drop(a);
//! assert_eq!(sema.permits(), 1);
//! b.consume();
//! assert_eq!(sema.permits(), 1);
//! ```
//!
//! [`wait`]: Semaphore::wait
//! [`signal`]: Semaphore::signal
use crate::{
    spinlock::SpinLock,
    thread::{
        Current,
        scheduler::{ThreadQueue, scheduler},
    },
};
use core::ops::Deref;

/// Counting semaphore.
///
/// A semaphore maintains a set of permits and resource. A semaphore differs
/// from a lock in that it can allow more than one concurrent caller to access
/// the shared resource at a time.
pub struct Semaphore<T> {
    resource: T,
    inner: SpinLock<SemaphoreInner>,
}

struct SemaphoreInner {
    permits: usize,
    waiters: Box<dyn ThreadQueue>,
}

impl<T> Semaphore<T> {
    /// Creates a new semaphore initialized with `permits` permits, guarding
    /// `resource`.
    pub fn new(permits: usize, resource: T) -> Self {
        Self {
            resource,
            inner: SpinLock::new(SemaphoreInner {
                permits,
                waiters: scheduler().new_thread_queue(false),
            }),
        }
    }

    /// Waits until a permit becomes available and then acquires it.
    ///
    /// The returned [`SemaphorePermits`] releases the permit when dropped.
    pub fn wait(&self) -> SemaphorePermits<'_, T> {
        let mut inner = self.inner.lock();
        if inner.permits > 0 {
            inner.permits -= 1;
            inner.unlock();
        } else {
            // `signal` passes its permit straight to the thread it wakes.
            Current::park_with(move |th| {
                inner.waiters.wait_for_access(th);
                inner.unlock();
            });
        }
        SemaphorePermits { sema: self }
    }

    /// Releases a permit back to the semaphore, waking one waiter if any.
    pub fn signal(&self) {
        let mut inner = self.inner.lock();
        match inner.waiters.next_thread() {
            Some(th) => {
                inner.unlock();
                th.unpark();
            }
            None => {
                inner.permits += 1;
                inner.unlock();
            }
        }
    }

    /// Number of permits currently available.
    pub fn permits(&self) -> usize {
        let inner = self.inner.lock();
        let permits = inner.permits;
        inner.unlock();
        permits
    }
}

/// An RAII implementation of a "scoped semaphore". When this structure
/// is dropped (falls out of scope), the semaphore will be signaled.
///
/// The data protected by the semaphore can be accessed through this guard via
/// its [`Deref`] implementations.
///
/// This structure is created by the [`wait`] method on [`Semaphore`].
///
/// [`wait`]: Semaphore::wait
pub struct SemaphorePermits<'a, T> {
    sema: &'a Semaphore<T>,
}

impl<T> SemaphorePermits<'_, T> {
    /// Keeps the permit instead of returning it to the semaphore.
    pub fn consume(self) {
        core::mem::forget(self);
    }
}

impl<T> Deref for SemaphorePermits<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.sema.resource
    }
}

impl<T> Drop for SemaphorePermits<'_, T> {
    fn drop(&mut self) {
        self.sema.signal()
    }
}
