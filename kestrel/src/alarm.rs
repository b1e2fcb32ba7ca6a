//! Timer-driven deferred wake ups.
//!
//! A thread that calls [`Alarm::wait_until`] is parked on a queue ordered by
//! its wake up tick. The hardware timer calls [`Alarm::timer_interrupt`]
//! every interval; the handler readies every thread whose tick has arrived
//! and then yields, which makes the timer interrupt the kernel's preemption
//! point.
//!
//! Nobody polls: a sleeping thread costs nothing until the interrupt that
//! wakes it.
use crate::{
    spinlock::SpinLock,
    thread::{Current, ParkHandle},
    timer::HardwareTimer,
};
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    sync::Arc,
};

/// A parked thread and the tick it waits for.
struct WaitRecord {
    deadline: u64,
    /// Ties on `deadline` are broken by arrival order.
    arrival: u64,
    thread: ParkHandle,
}

impl PartialEq for WaitRecord {
    fn eq(&self, other: &Self) -> bool {
        (self.deadline, self.arrival) == (other.deadline, other.arrival)
    }
}

impl Eq for WaitRecord {}

impl PartialOrd for WaitRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WaitRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.arrival).cmp(&(other.deadline, other.arrival))
    }
}

#[derive(Default)]
struct WaitQueue {
    records: BinaryHeap<Reverse<WaitRecord>>,
    arrivals: u64,
}

/// Suspends threads until a given tick.
pub struct Alarm {
    timer: Arc<dyn HardwareTimer>,
    queue: SpinLock<WaitQueue>,
}

impl Alarm {
    /// Creates an alarm over `timer` and installs [`timer_interrupt`] as its
    /// interrupt handler.
    ///
    /// [`timer_interrupt`]: Self::timer_interrupt
    pub fn new(timer: Arc<dyn HardwareTimer>) -> Arc<Self> {
        let alarm = Arc::new(Self {
            timer: timer.clone(),
            queue: SpinLock::new(WaitQueue::default()),
        });
        let weak = Arc::downgrade(&alarm);
        timer.set_interrupt_handler(Arc::new(move || {
            if let Some(alarm) = weak.upgrade() {
                alarm.timer_interrupt();
            }
        }));
        alarm
    }

    /// Puts the current thread to sleep for at least `ticks` ticks.
    ///
    /// The thread is readied by the first timer interrupt at which the
    /// current time is at or past `now + ticks`. With `ticks == 0` that is
    /// the next timer interrupt.
    pub fn wait_until(&self, ticks: u64) {
        let tid = Current::get_tid();
        let mut queue = self.queue.lock();
        let deadline = self.timer.time().saturating_add(ticks);
        let arrival = queue.arrivals;
        queue.arrivals += 1;
        log::trace!("Alarm: thread {tid} waits until tick {deadline}.");
        Current::park_with(move |thread| {
            queue.records.push(Reverse(WaitRecord {
                deadline,
                arrival,
                thread,
            }));
            queue.unlock();
        });
    }

    /// The timer interrupt handler.
    ///
    /// Readies every waiting thread whose tick has arrived, in tick order,
    /// then yields the current thread, whether or not anything was due. May
    /// be called with interrupts already masked.
    pub fn timer_interrupt(&self) {
        let now = self.timer.time();
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while queue
            .records
            .peek()
            .is_some_and(|Reverse(record)| record.deadline <= now)
        {
            if let Some(Reverse(record)) = queue.records.pop() {
                due.push(record);
            }
        }
        queue.unlock();

        for record in due {
            log::debug!(
                "Alarm: tick {now} wakes thread {} (due at {}).",
                record.thread.tid(),
                record.deadline
            );
            record.thread.unpark();
        }
        Current::yield_now();
    }

    /// Number of threads currently waiting.
    pub fn pending(&self) -> usize {
        let queue = self.queue.lock();
        let len = queue.records.len();
        queue.unlock();
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(deadline: u64, arrival: u64) -> Reverse<WaitRecord> {
        let thread = ParkHandle::new_for(Current::get());
        Reverse(WaitRecord {
            deadline,
            arrival,
            thread,
        })
    }

    #[test]
    fn equal_deadlines_pop_in_arrival_order() {
        let mut records = BinaryHeap::new();
        for (deadline, arrival) in [(7, 3), (5, 4), (7, 0), (7, 2), (5, 1), (7, 1)] {
            records.push(record(deadline, arrival));
        }
        let popped = std::iter::from_fn(|| records.pop())
            .map(|Reverse(r)| (r.deadline, r.arrival))
            .collect::<Vec<_>>();
        assert_eq!(
            popped,
            vec![(5, 1), (5, 4), (7, 0), (7, 1), (7, 2), (7, 3)]
        );
    }
}
