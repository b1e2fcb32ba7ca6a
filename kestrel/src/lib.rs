//! # Kestrel: a small teaching kernel
//!
//! Kestrel is a kernel whose interesting part is its thread synchronization
//! layer. Kernel threads run on host threads; what the kernel owns is their
//! state, how they block and how they get woken up again.
//!
//! ## Layers
//!
//! The kernel is built bottom-up on the simulated [`machine`]:
//!
//! 1. [`interrupt`] masking and the [`SpinLock`], the smallest atomic regions.
//! 2. [`thread`]: kernel threads, parking through [`ParkHandle`]s, and the
//!    [`Scheduler`] that decides the order of every wait queue.
//! 3. [`sync`]: the sleeping [`Lock`], the condition variables
//!    ([`Condition2`] and the semaphore-based [`Condition`]) and the
//!    [`Semaphore`].
//! 4. [`alarm`]: timer-driven deferred wake ups.
//! 5. [`communicator`]: a synchronous rendezvous between speakers and
//!    listeners, built only from a [`Lock`] and two [`Condition2`]s.
//!
//! ## Booting
//!
//! ```no_run
//! use kestrel::SystemConfigurationBuilder;
//!
//! let kernel = SystemConfigurationBuilder::new()
//!     .cmdline("log=info interval=100")
//!     .and_then(|conf| conf.boot())
//!     .expect("boot failed");
//! kernel.alarm().wait_until(1000);
//! ```
//!
//! [`SpinLock`]: spinlock::SpinLock
//! [`ParkHandle`]: thread::ParkHandle
//! [`Scheduler`]: thread::scheduler::Scheduler
//! [`Lock`]: sync::Lock
//! [`Condition2`]: sync::Condition2
//! [`Condition`]: sync::Condition
//! [`Semaphore`]: sync::Semaphore

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod alarm;
pub mod communicator;
pub mod sync;
pub mod thread;

pub use machine::{interrupt, spinlock, timer};

use alarm::Alarm;
use log::LevelFilter;
use machine::timer::{DEFAULT_INTERVAL, Ticker, Timer};
use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thread::scheduler::Scheduler;

/// Enum representing errors that can occur during a kernel operation.
///
/// The synchronization core never returns these; they are reserved for the
/// edges of the kernel where a caller can reasonably recover: boot
/// configuration, thread creation and thread lookups.
#[derive(Debug, Eq, PartialEq)]
pub enum KernelError {
    /// Resource temporarily unavailable. (EAGAIN)
    TryAgain,
    /// Device or resource busy. (EBUSY)
    Busy,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
}

/// A builder for system configuration settings.
///
/// The [`SystemConfigurationBuilder`] collects everything the kernel needs to
/// know before it comes up: the scheduling policy, the timer interval, the
/// log level and whether time should move on its own. Nothing takes effect
/// until [`boot`] is called.
///
/// [`boot`]: Self::boot
pub struct SystemConfigurationBuilder {
    scheduler: Option<Box<dyn Scheduler>>,
    interval: u64,
    log_level: LevelFilter,
    tick_period: Option<Duration>,
}

impl Default for SystemConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemConfigurationBuilder {
    /// Creates a configuration with the FIFO scheduler, the default timer
    /// interval and the log level chosen at build time.
    pub fn new() -> Self {
        Self {
            scheduler: None,
            interval: DEFAULT_INTERVAL,
            log_level: machine::logger::default_level(),
            tick_period: None,
        }
    }

    /// Sets the system-wide scheduler.
    ///
    /// The scheduler decides the order of every wait queue created after
    /// boot. Without one, the kernel falls back to [`Fifo`].
    ///
    /// [`Fifo`]: thread::scheduler::Fifo
    pub fn set_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Sets the number of ticks between two timer interrupts.
    pub fn timer_interval(mut self, ticks: u64) -> Self {
        self.interval = ticks;
        self
    }

    /// Sets the maximum level of the kernel log.
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Lets a host thread advance the timer by one interval every `period`.
    ///
    /// Without it, time only moves through [`Kernel::timer`].
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = Some(period);
        self
    }

    /// Applies a kernel command line.
    ///
    /// The command line is a list of space-separated `key=value` options:
    ///
    /// - `log=<off|error|warn|info|debug|trace>`
    /// - `interval=<ticks>`
    /// - `tick_ms=<milliseconds>`
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidArgument`] on an unknown key, a missing
    /// `=` or a value that does not parse.
    pub fn cmdline(mut self, cmdline: &str) -> Result<Self, KernelError> {
        for option in cmdline.split_whitespace() {
            let Some((key, value)) = option.split_once('=') else {
                log::warn!("Command line: malformed option `{option}`.");
                return Err(KernelError::InvalidArgument);
            };
            match key {
                "log" => {
                    self.log_level = value.parse().map_err(|_| KernelError::InvalidArgument)?
                }
                "interval" => {
                    self.interval = value.parse().map_err(|_| KernelError::InvalidArgument)?
                }
                "tick_ms" => {
                    let ms = value.parse().map_err(|_| KernelError::InvalidArgument)?;
                    self.tick_period = Some(Duration::from_millis(ms));
                }
                _ => {
                    log::warn!("Command line: unknown option `{key}`.");
                    return Err(KernelError::InvalidArgument);
                }
            }
        }
        Ok(self)
    }

    /// Brings the kernel up.
    ///
    /// Installs the logger and the scheduler, creates the timer and the
    /// [`Alarm`] singleton and, if requested, starts the ticker. The kernel
    /// can only be booted once per process.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidArgument`] if the timer interval is zero.
    /// - [`KernelError::Busy`] if the kernel is already booted or a scheduler
    ///   was already installed.
    pub fn boot(self) -> Result<&'static Kernel, KernelError> {
        let Self {
            scheduler,
            interval,
            log_level,
            tick_period,
        } = self;
        if interval == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if BOOTED.swap(true, Ordering::SeqCst) {
            return Err(KernelError::Busy);
        }

        machine::logger::init(log_level);
        log::info!("Kestrel: booting.");
        if let Some(scheduler) = scheduler {
            log::info!("Scheduler: install custom scheduler.");
            thread::scheduler::set_scheduler(scheduler)?;
        }

        log::info!("Timer: interrupt every {interval} ticks.");
        let timer = Arc::new(Timer::new(interval));
        log::info!("Alarm: register timer interrupt handler.");
        let alarm = Alarm::new(timer.clone());
        let ticker = tick_period.map(|period| {
            log::info!("Timer: tick every {period:?}.");
            timer.spawn_ticker(period)
        });

        let kernel = KERNEL.get_or_init(|| Kernel {
            timer,
            alarm,
            _ticker: ticker,
        });
        log::info!("Kestrel: ready.");
        Ok(kernel)
    }
}

static BOOTED: AtomicBool = AtomicBool::new(false);
static KERNEL: OnceLock<Kernel> = OnceLock::new();

/// The booted kernel.
pub struct Kernel {
    timer: Arc<Timer>,
    alarm: Arc<Alarm>,
    _ticker: Option<Ticker>,
}

impl Kernel {
    /// The hardware timer driving the kernel.
    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// The kernel-wide [`Alarm`].
    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }
}

/// Returns the booted kernel, if any.
pub fn kernel() -> Option<&'static Kernel> {
    KERNEL.get()
}

/// Returns the kernel-wide [`Alarm`], if the kernel is booted.
pub fn alarm() -> Option<&'static Alarm> {
    kernel().map(Kernel::alarm)
}
