//! Programmable interval timer.
//!
//! The machine keeps a monotonically increasing tick counter and raises a
//! timer interrupt every [`Timer::interval`] ticks. Time only moves when
//! somebody moves it: tests call [`Timer::advance`] and friends to get fully
//! deterministic interrupt sequences, while a booted kernel can hand the job
//! to a background [`Ticker`].
use crate::{interrupt::InterruptGuard, spinlock::SpinLock};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::{sync::Arc, thread::JoinHandle, time::Duration};

/// Ticks between two timer interrupts unless configured otherwise.
pub const DEFAULT_INTERVAL: u64 = 500;

/// An interrupt handler registered with a [`HardwareTimer`].
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// The view of the timer device the kernel programs against.
pub trait HardwareTimer: Send + Sync {
    /// Current time, in ticks since the machine started.
    fn time(&self) -> u64;

    /// Installs `handler` as the timer interrupt handler, replacing any
    /// previous one.
    fn set_interrupt_handler(&self, handler: Handler);
}

/// The simulated timer device.
pub struct Timer {
    now: AtomicU64,
    interval: u64,
    next_fire: SpinLock<u64>,
    handler: SpinLock<Option<Handler>>,
}

impl Timer {
    /// Creates a timer at tick 0 that interrupts every `interval` ticks.
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    pub fn new(interval: u64) -> Self {
        assert!(interval > 0, "Timer interval must be positive.");
        Self {
            now: AtomicU64::new(0),
            interval,
            next_fire: SpinLock::new(interval),
            handler: SpinLock::new(None),
        }
    }

    /// Ticks between two interrupts.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Moves time forward by `ticks`, firing every interrupt on the way.
    pub fn advance(&self, ticks: u64) {
        self.advance_to(self.time().saturating_add(ticks));
    }

    /// Moves time forward to `target`, firing one interrupt at each interval
    /// boundary that is passed. Moving backwards is ignored.
    ///
    /// The handler observes [`time`] equal to the boundary it fires for.
    ///
    /// [`time`]: HardwareTimer::time
    pub fn advance_to(&self, target: u64) {
        loop {
            let mut next = self.next_fire.lock();
            if *next > target {
                next.unlock();
                break;
            }
            let fire_at = *next;
            *next += self.interval;
            self.now.fetch_max(fire_at, Ordering::SeqCst);
            next.unlock();
            self.fire();
        }
        self.now.fetch_max(target, Ordering::SeqCst);
    }

    /// Raises a timer interrupt right now without moving time.
    pub fn interrupt(&self) {
        self.fire();
    }

    fn fire(&self) {
        let guard = self.handler.lock();
        let handler = Option::clone(&guard);
        guard.unlock();

        if let Some(handler) = handler {
            let _mask = InterruptGuard::new();
            handler();
        }
    }

    /// Spawns a host thread that advances the timer by one interval every
    /// `period` of wall-clock time, until the returned [`Ticker`] is stopped
    /// or dropped.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> Ticker {
        let stop = Arc::new(AtomicBool::new(false));
        let timer = self.clone();
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("ticker".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    std::thread::sleep(period);
                    timer.advance(timer.interval);
                }
            })
            .ok();
        if handle.is_none() {
            log::warn!("Failed to spawn the timer ticker; time stands still.");
        }
        Ticker { stop, handle }
    }
}

impl HardwareTimer for Timer {
    fn time(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn set_interrupt_handler(&self, handler: Handler) {
        let mut guard = self.handler.lock();
        *guard = Some(handler);
        guard.unlock();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Background driver of a [`Timer`], created by [`Timer::spawn_ticker`].
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Stops the ticker and waits for its thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptState;
    use std::sync::Mutex;

    fn recording(timer: &Timer) -> Arc<Mutex<Vec<u64>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = fired.clone();
        timer.set_interrupt_handler(Arc::new(move || {
            log.lock().unwrap().push(InterruptState::current() as u64);
        }));
        fired
    }

    #[test]
    fn fires_once_per_boundary() {
        let timer = Timer::new(10);
        let fired = recording(&timer);
        timer.advance(9);
        assert!(fired.lock().unwrap().is_empty());
        timer.advance(1);
        assert_eq!(fired.lock().unwrap().len(), 1);
        timer.advance_to(45);
        assert_eq!(fired.lock().unwrap().len(), 4);
        assert_eq!(timer.time(), 45);
    }

    #[test]
    fn handler_sees_boundary_time_with_interrupts_masked() {
        let timer = Arc::new(Timer::new(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (t, s) = (Arc::downgrade(&timer), seen.clone());
        timer.set_interrupt_handler(Arc::new(move || {
            let now = t.upgrade().map(|t| t.time()).unwrap_or_default();
            s.lock()
                .unwrap()
                .push((now, InterruptState::current() == InterruptState::Off));
        }));
        timer.advance_to(30);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(10, true), (20, true), (30, true)]
        );
    }

    #[test]
    fn going_backwards_is_ignored() {
        let timer = Timer::new(10);
        let fired = recording(&timer);
        timer.advance_to(25);
        timer.advance_to(5);
        assert_eq!(timer.time(), 25);
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[test]
    fn explicit_interrupt_keeps_time() {
        let timer = Timer::new(10);
        let fired = recording(&timer);
        timer.interrupt();
        assert_eq!(timer.time(), 0);
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn ticker_moves_time() {
        let timer = Arc::new(Timer::new(10));
        let ticker = timer.spawn_ticker(Duration::from_millis(1));
        let start = std::time::Instant::now();
        while timer.time() < 30 && start.elapsed() < Duration::from_secs(10) {
            std::thread::sleep(Duration::from_millis(1));
        }
        ticker.stop();
        assert!(timer.time() >= 30);
    }
}
