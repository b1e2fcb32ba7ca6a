//! Thread scheduler
//!
//! Every kernel thread runs on its own host thread, so the scheduler here
//! does not pick what runs next on a processor. Its job is policy: it hands
//! out the [`ThreadQueue`]s that every blocking primitive parks its waiters
//! on, and thereby decides which waiter a wake up goes to.
use super::{ParkHandle, Thread, ThreadState};
use crate::KernelError;
use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
};

/// An ordered collection of parked threads.
///
/// A blocking primitive pushes the [`ParkHandle`] of a thread that is about
/// to park with [`wait_for_access`] and pops the one to wake with
/// [`next_thread`]. The queue is always accessed under the primitive's own
/// spin lock.
///
/// [`wait_for_access`]: ThreadQueue::wait_for_access
/// [`next_thread`]: ThreadQueue::next_thread
pub trait ThreadQueue: Send {
    /// Enqueue a parked thread that waits for access.
    fn wait_for_access(&mut self, th: ParkHandle);

    /// Dequeue the thread that should be woken next, if any.
    fn next_thread(&mut self) -> Option<ParkHandle>;

    /// Number of waiting threads.
    fn len(&self) -> usize;

    /// Returns true if no thread is waiting.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A trait for a thread scheduler.
///
/// This trait can be implemented by different types of schedulers, such as
/// FIFO or priority-based schedulers. Each implementation decides the order
/// in which blocked threads are woken by providing its own [`ThreadQueue`].
pub trait Scheduler: Send + Sync {
    /// Create a new wait queue.
    ///
    /// `transfer_priority` is set for queues guarding a resource with an
    /// owner (such as a lock), where a priority scheduler may donate the
    /// waiters' priority to the owner.
    fn new_thread_queue(&self, transfer_priority: bool) -> Box<dyn ThreadQueue>;
}

/// A First-in-first-out scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fifo;

impl Scheduler for Fifo {
    fn new_thread_queue(&self, _transfer_priority: bool) -> Box<dyn ThreadQueue> {
        Box::new(FifoQueue::default())
    }
}

/// Wait queue of the [`Fifo`] scheduler.
#[derive(Debug, Default)]
pub struct FifoQueue {
    waiters: VecDeque<ParkHandle>,
}

impl ThreadQueue for FifoQueue {
    fn wait_for_access(&mut self, th: ParkHandle) {
        self.waiters.push_back(th);
    }

    fn next_thread(&mut self) -> Option<ParkHandle> {
        self.waiters.pop_front()
    }

    fn len(&self) -> usize {
        self.waiters.len()
    }
}

static FIFO: Fifo = Fifo;
static SCHEDULER: OnceLock<Box<dyn Scheduler>> = OnceLock::new();

/// Set the scheduler of the kernel.
pub(crate) fn set_scheduler(scheduler: Box<dyn Scheduler>) -> Result<(), KernelError> {
    SCHEDULER.set(scheduler).map_err(|_| KernelError::Busy)
}

/// Get the reference of the kernel scheduler.
pub fn scheduler() -> &'static dyn Scheduler {
    match SCHEDULER.get() {
        Some(sched) => sched.as_ref(),
        None => &FIFO,
    }
}

impl dyn Scheduler {
    /// Park a thread `th` and return its [`ParkHandle`].
    ///
    /// Returns `None` if the thread is already parked.
    pub(crate) fn park_thread(&self, th: &Arc<Thread>) -> Option<ParkHandle> {
        let mut state = th.state.lock();
        if matches!(*state, ThreadState::Parked) {
            state.unlock();
            return None;
        }
        *state = ThreadState::Parked;
        state.unlock();
        Some(ParkHandle::new_for(th.clone()))
    }
}
