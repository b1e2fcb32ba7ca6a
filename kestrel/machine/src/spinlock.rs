//! Interrupt-masking spin lock.
//!
//! On a uniprocessor, masking interrupts is enough to make a short sequence
//! atomic: nothing can preempt the holder. Kestrel runs its execution
//! contexts on several host threads, so a [`SpinLock`] pairs the mask with an
//! atomic flag that the other contexts poll. Every kernel structure touched
//! from an interrupt handler lives behind one of these.

use crate::interrupt::InterruptGuard;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    panic::Location,
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::Backoff;

/// The lock could not be acquired at this time because the operation would
/// otherwise block.
#[derive(Debug, PartialEq, Eq)]
pub struct WouldBlock;

/// A mutual exclusion primitive for short critical sections.
///
/// The data can only be reached through the guard returned by [`lock`] or
/// [`try_lock`]. The guard keeps interrupts of the holding context masked
/// and must be released explicitly with [`SpinLockGuard::unlock`].
///
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```
/// use machine::spinlock::SpinLock;
///
/// let counter = SpinLock::new(0);
/// let mut guard = counter.lock();
/// *guard += 1;
/// // the lock must be "explicitly" unlocked before `guard` goes out of scope.
/// guard.unlock();
/// ```
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    #[inline]
    pub const fn new(t: T) -> SpinLock<T> {
        SpinLock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(t),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires the spinlock, spinning until it is available.
    ///
    /// Interrupts of the current context stay masked until the returned guard
    /// is unlocked. Locking a spinlock the current context already holds never
    /// returns.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let backoff = Backoff::new();
        let guard = loop {
            let guard = InterruptGuard::new();
            if !self.locked.swap(true, Ordering::Acquire) {
                break guard;
            }
            // Let pending interrupts of this context in while we wait.
            drop(guard);
            backoff.snooze();
        };

        SpinLockGuard {
            caller: Location::caller(),
            lock: self,
            guard: Some(guard),
        }
    }

    /// Attempts to acquire this lock without spinning.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if another context holds the lock.
    #[track_caller]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        let guard = InterruptGuard::new();
        if !self.locked.swap(true, Ordering::Acquire) {
            Ok(SpinLockGuard {
                caller: Location::caller(),
                lock: self,
                guard: Some(guard),
            })
        } else {
            Err(WouldBlock)
        }
    }

    /// Returns true if some context currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> SpinLock<T> {
        SpinLock::new(Default::default())
    }
}

/// A "scoped lock" of a spinlock.
///
/// Dropping the guard without [`unlock`] is a bug and panics, naming the
/// place the lock was taken. The only exception is unwinding: a guard
/// dropped by a panic releases the lock quietly so that the first panic
/// is the one reported.
///
/// [`unlock`]: Self::unlock
pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
    caller: &'static Location<'static>,
    lock: &'a SpinLock<T>,
    guard: Option<InterruptGuard>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> SpinLockGuard<'_, T> {
    /// Releases the underlying [`SpinLock`] and restores the interrupt state.
    pub fn unlock(mut self) {
        self.release();
        core::mem::forget(self);
    }

    fn release(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.guard.take();
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.release();
            return;
        }
        panic!(
            "`.unlock()` must be explicitly called before dropping SpinLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}
