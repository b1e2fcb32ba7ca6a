//! # Synchronization Primitives.
//!
//! The [`SpinLock`] is enough for the short critical sections inside the
//! kernel, but it busy-waits and must never be held across a block. The
//! primitives in this module put waiting threads to sleep instead:
//!
//! | Primitive      | Blocks Thread? | Typical Use Case                                  |
//! |----------------|----------------|---------------------------------------------------|
//! | [`SpinLock`]   | No (busy wait) | Short, uncontended critical sections in the kernel |
//! | [`Lock`]       | Yes            | Exclusive access held across blocking operations   |
//! | [`Condition2`] | Yes            | Waiting for a condition protected by a [`Lock`]    |
//! | [`Condition`]  | Yes            | Same contract, built from semaphores               |
//! | [`Semaphore`]  | Yes            | Limiting access to a bounded resource, events      |
//!
//! [`SpinLock`]: crate::spinlock::SpinLock

pub mod condition;
pub mod condition2;
pub mod lock;
pub mod semaphore;

pub use condition::Condition;
pub use condition2::Condition2;
pub use lock::Lock;
pub use semaphore::{Semaphore, SemaphorePermits};
