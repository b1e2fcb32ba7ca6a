//! Interrupt masking.
//!
//! Each host thread running kernel code is one execution context with its own
//! interrupt flag. Masking is nested: the flag is only restored when the
//! outermost [`InterruptGuard`] goes away, and it is restored to whatever it
//! was before that outermost guard was taken.
#[cfg(doc)]
use crate::spinlock::SpinLockGuard;
use core::{cell::Cell, marker::PhantomData};

thread_local! {
    static CONTEXT: InterruptGuardInner = const { InterruptGuardInner::new() };
}

struct InterruptGuardInner {
    enabled: Cell<bool>,
    initial_state: Cell<bool>,
    cnt: Cell<isize>,
}

impl InterruptGuardInner {
    const fn new() -> Self {
        Self {
            enabled: Cell::new(true),
            initial_state: Cell::new(true),
            cnt: Cell::new(0),
        }
    }

    fn save_nested_interrupt_state(&self, state: InterruptState) {
        let cnt = self.cnt.get();
        if cnt == 0 {
            self.initial_state.set(state == InterruptState::On);
        }
        self.cnt.set(cnt + 1);
    }

    fn load_nested_interrupt_state(&self) {
        let prev = self.cnt.get();
        assert!(prev > 0, "Mismatched InterruptGuard drop calls: {prev}");
        self.cnt.set(prev - 1);

        if prev == 1 && self.initial_state.get() {
            self.enabled.set(true);
        }
    }

    fn decrement_count(&self) {
        let prev = self.cnt.get();
        assert!(prev > 0, "Mismatched InterruptGuard drop calls: {prev}");
        self.cnt.set(prev - 1);
    }
}

/// Enumeration representing the interrupt state.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the interrupt state of the current execution context.
    pub fn current() -> Self {
        if CONTEXT.with(|ctx| ctx.enabled.get()) {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Unmasks interrupts of the current execution context.
    ///
    /// # Safety
    /// Enabling interrupts underneath a live [`InterruptGuard`] breaks the
    /// atomicity the guard holder relies on.
    pub unsafe fn enable() {
        CONTEXT.with(|ctx| ctx.enabled.set(true));
    }

    /// Masks interrupts of the current execution context.
    ///
    /// # Safety
    /// The caller is responsible for enabling them again; prefer
    /// [`InterruptGuard`].
    pub unsafe fn disable() {
        CONTEXT.with(|ctx| ctx.enabled.set(false));
    }
}

/// An RAII-based guard for managing interrupt disabling.
///
/// When an `InterruptGuard` is created, interrupts are disabled. When it is
/// dropped, the interrupt state is restored to what it was before the guard was
/// created.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - A guard belongs to the execution context that created it and can not be
///   sent to another thread.
/// - Blocking the current thread while a guard (or a [`SpinLockGuard`]) is
///   alive is a kernel bug.
///
/// This structure is created using [`InterruptGuard::new`].
pub struct InterruptGuard {
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    ///
    /// # Example
    /// ```rust
    /// use machine::interrupt::{InterruptGuard, InterruptState};
    ///
    /// let guard = InterruptGuard::new();
    /// assert_eq!(InterruptState::current(), InterruptState::Off);
    /// drop(guard);
    /// assert_eq!(InterruptState::current(), InterruptState::On);
    /// ```
    pub fn new() -> Self {
        let state = InterruptState::current();
        unsafe { InterruptState::disable() };
        CONTEXT.with(|ctx| ctx.save_nested_interrupt_state(state));

        Self {
            _not_send: PhantomData,
        }
    }

    /// Forgets the guard without restoring the interrupt state.
    pub fn consume(self) {
        CONTEXT.with(|ctx| ctx.decrement_count());
        core::mem::forget(self);
    }

    /// Returns true if the current execution context holds any guard.
    pub fn is_guarded() -> bool {
        CONTEXT.with(|ctx| ctx.cnt.get() > 0)
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        CONTEXT.with(|ctx| ctx.load_nested_interrupt_state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_guards_restore_on_outermost_drop() {
        assert_eq!(InterruptState::current(), InterruptState::On);
        let outer = InterruptGuard::new();
        let inner = InterruptGuard::new();
        assert!(InterruptGuard::is_guarded());
        drop(inner);
        assert_eq!(InterruptState::current(), InterruptState::Off);
        drop(outer);
        assert_eq!(InterruptState::current(), InterruptState::On);
        assert!(!InterruptGuard::is_guarded());
    }

    #[test]
    fn guard_taken_while_masked_keeps_mask() {
        unsafe { InterruptState::disable() };
        let guard = InterruptGuard::new();
        drop(guard);
        assert_eq!(InterruptState::current(), InterruptState::Off);
        unsafe { InterruptState::enable() };
    }

    #[test]
    fn contexts_are_per_thread() {
        let _guard = InterruptGuard::new();
        std::thread::spawn(|| {
            assert_eq!(InterruptState::current(), InterruptState::On);
            assert!(!InterruptGuard::is_guarded());
        })
        .join()
        .unwrap();
    }
}
