//! Thread abstraction.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads, each with a
//! kernel-visible [`ThreadState`]. Every kernel thread is backed by one host
//! thread; the kernel does not switch stacks itself. What the kernel does own
//! is blocking: a thread gives up the processor with [`Current::park_with`]
//! and only comes back once somebody calls [`ParkHandle::unpark`] on the
//! handle it handed out.
//!
//! Parking is token based. An unpark that races ahead of the physical block
//! is remembered, so the classic "woken before it went to sleep" window does
//! not lose the wake up.
//!
//! Host threads that were not created by [`ThreadBuilder`] (the boot thread,
//! test harness threads) are adopted as kernel threads the first time they
//! touch this module.
pub mod scheduler;

use crate::{KernelError, spinlock::SpinLock};
use crossbeam_utils::sync::{Parker, Unparker};
use machine::interrupt::InterruptGuard;
use std::{
    cell::OnceCell,
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is exited with exitcode.
    Exited(i32),
    /// Thread is parked.
    Parked,
}

static THREAD_STATE_TABLE: SpinLock<BTreeMap<u64, Arc<SpinLock<ThreadState>>>> =
    SpinLock::new(BTreeMap::new());

/// Get specified thread's [`ThreadState`] by TID (Thread ID).
///
/// # Errors
///
/// Returns [`KernelError::InvalidArgument`] if no live thread has `tid`.
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let tst = THREAD_STATE_TABLE.lock();

    let Some(state) = tst.get(&tid) else {
        tst.unlock();
        return Err(KernelError::InvalidArgument);
    };

    let ts_lock = state.lock();
    let result = *ts_lock;

    ts_lock.unlock();
    tst.unlock();

    Ok(result)
}

/// An thread abstraction.
pub struct Thread {
    /// Thread id
    pub tid: u64,
    /// Thread name
    pub name: String,
    pub(crate) state: Arc<SpinLock<ThreadState>>,
    unparker: Unparker,
}

impl Thread {
    fn new(name: String, initial: ThreadState) -> (Arc<Self>, Parker) {
        static TID: AtomicU64 = AtomicU64::new(0);
        let tid = TID.fetch_add(1, Ordering::SeqCst);

        let state = Arc::new(SpinLock::new(initial));
        let mut tst = THREAD_STATE_TABLE.lock();
        tst.insert(tid, state.clone());
        tst.unlock();

        let parker = Parker::new();
        let th = Arc::new(Self {
            tid,
            name,
            state,
            unparker: parker.unparker().clone(),
        });
        (th, parker)
    }

    /// Current state of the thread.
    pub fn state(&self) -> ThreadState {
        let guard = self.state.lock();
        let state = *guard;
        guard.unlock();
        state
    }

    fn set_state(&self, state: ThreadState) {
        let mut guard = self.state.lock();
        *guard = state;
        guard.unlock();
    }

    fn retire(&self, exit_code: i32) {
        self.set_state(ThreadState::Exited(exit_code));
        let mut tst = THREAD_STATE_TABLE.lock();
        tst.remove(&self.tid);
        tst.unlock();
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .finish()
    }
}

struct Local {
    th: Arc<Thread>,
    parker: Parker,
}

impl Drop for Local {
    // Adopted host threads never pass through `thread_start`; they leave the
    // state table when their thread-local storage is torn down.
    fn drop(&mut self) {
        if !matches!(self.th.state(), ThreadState::Exited(_)) {
            self.th.retire(0);
        }
    }
}

thread_local! {
    static LOCAL: OnceCell<Local> = const { OnceCell::new() };
}

fn with_local<R>(f: impl FnOnce(&Local) -> R) -> R {
    LOCAL.with(|local| {
        f(local.get_or_init(|| {
            let name = std::thread::current()
                .name()
                .unwrap_or("<adopted>")
                .to_owned();
            let (th, parker) = Thread::new(name, ThreadState::Running);
            log::trace!("Thread {}: adopted host thread.", th.tid);
            Local { th, parker }
        }))
    })
}

/// Run a function `f` with current thread as an argument.
#[inline]
pub fn with_current<R>(f: impl FnOnce(&Arc<Thread>) -> R) -> R {
    with_local(|local| f(&local.th))
}

/// Blocks the current host thread until its kernel thread leaves
/// [`ThreadState::Parked`].
fn block_while_parked() {
    with_local(|local| {
        while local.th.state() == ThreadState::Parked {
            local.parker.park();
        }
        local.th.set_state(ThreadState::Running);
    })
}

/// A handle that represent the parked thread.
///
/// Exactly one handle exists per park; consuming it with [`unpark`] is the
/// only way to make the thread runnable again.
///
/// [`unpark`]: ParkHandle::unpark
#[derive(Debug)]
pub struct ParkHandle {
    pub(crate) th: Arc<Thread>,
}

impl ParkHandle {
    pub(crate) fn new_for(th: Arc<Thread>) -> Self {
        Self { th }
    }

    /// Thread id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.th.tid
    }

    /// Name of the parked thread.
    pub fn name(&self) -> &str {
        &self.th.name
    }

    /// Consume the handle and unpark the underlying thread.
    pub fn unpark(self) {
        self.th.set_state(ThreadState::Runnable);
        self.th.unparker.unpark();
    }
}

/// The opaque structure indicating the running thread.
pub struct Current {
    _p: (),
}

impl Current {
    /// Run a function `f` with [`ParkHandle`] for current thread, and then park
    /// the current thread.
    ///
    /// `f` typically publishes the handle in a wait queue and releases the
    /// spin lock protecting that queue. The thread stays parked until the
    /// handle is unparked, which may already have happened by the time `f`
    /// returns.
    ///
    /// # Panics
    ///
    /// Panics if any interrupt-masking guard is still alive once `f`
    /// returned: parking while holding a spin lock would block the contexts
    /// spinning on it forever.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        let handle = with_current(|th| scheduler::scheduler().park_thread(th));
        let Some(handle) = handle else {
            panic!("Try to park a thread that is already parked.");
        };
        f(handle);
        assert!(
            !InterruptGuard::is_guarded(),
            "Try to park a thread while holding a lock."
        );
        block_while_parked();
    }

    /// Yields the processor to another runnable thread.
    pub fn yield_now() {
        std::thread::yield_now();
    }

    /// Get the current thread's id.
    pub fn get_tid() -> u64 {
        with_current(|th| th.tid)
    }

    /// Get the current thread.
    pub fn get() -> Arc<Thread> {
        with_current(Arc::clone)
    }
}

/// A handle to join thread.
pub struct JoinHandle {
    /// Thread id of this handle.
    pub tid: u64,
    inner: std::thread::JoinHandle<i32>,
}

impl JoinHandle {
    /// Join this handle and returns exit code.
    ///
    /// A thread whose function panicked exits with `-1`.
    pub fn join(self) -> i32 {
        self.inner.join().unwrap_or(-1)
    }

    /// Returns true if the thread has finished running.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    th: Arc<Thread>,
    parker: Parker,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        let (th, parker) = Thread::new(String::from(name), ThreadState::Runnable);
        Self { th, parker }
    }

    /// Get the thread id of this thread.
    pub fn get_tid(&self) -> u64 {
        self.th.tid
    }

    /// Spawn the thread.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses to create another thread. Use
    /// [`try_spawn`] to handle that case.
    ///
    /// [`try_spawn`]: Self::try_spawn
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        let name = self.th.name.clone();
        self.try_spawn(thread_fn)
            .unwrap_or_else(|e| panic!("Failed to spawn thread `{name}`: {e:?}"))
    }

    /// Spawn the thread, reporting failure instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::TryAgain`] if the host could not create the
    /// thread.
    pub fn try_spawn<F: FnOnce() + Send + 'static>(
        self,
        thread_fn: F,
    ) -> Result<JoinHandle, KernelError> {
        self.launch(thread_fn).map(|(_, handle)| handle)
    }

    /// Spawn the thread as a parked state.
    ///
    /// The thread does not start running `thread_fn` before the returned
    /// handle is unparked.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses to create another thread.
    pub fn spawn_as_parked<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> ParkHandle {
        self.th.set_state(ThreadState::Parked);
        let name = self.th.name.clone();
        match self.launch(thread_fn) {
            Ok((th, _detached)) => ParkHandle::new_for(th),
            Err(e) => panic!("Failed to spawn thread `{name}`: {e:?}"),
        }
    }

    fn launch<F: FnOnce() + Send + 'static>(
        self,
        thread_fn: F,
    ) -> Result<(Arc<Thread>, JoinHandle), KernelError> {
        let Self { th, parker } = self;
        let tid = th.tid;
        let local = Local {
            th: th.clone(),
            parker,
        };

        let spawned = std::thread::Builder::new()
            .name(th.name.clone())
            .spawn(move || thread_start(local, thread_fn));

        match spawned {
            Ok(inner) => {
                log::trace!("Thread {tid}: spawned `{}`.", th.name);
                Ok((th, JoinHandle { tid, inner }))
            }
            Err(e) => {
                log::warn!("Thread {tid}: host refused to spawn `{}`: {e}", th.name);
                th.retire(-1);
                Err(KernelError::TryAgain)
            }
        }
    }
}

/// The very beginning of the thread.
fn thread_start<F: FnOnce()>(local: Local, thread_fn: F) -> i32 {
    let th = local.th.clone();
    LOCAL.with(|cell| {
        // A freshly created host thread has no kernel identity yet.
        let _ = cell.set(local);
    });
    block_while_parked();

    let exit_code = match std::panic::catch_unwind(AssertUnwindSafe(thread_fn)) {
        Ok(()) => 0,
        Err(_) => {
            log::error!("Thread {}: `{}` panicked.", th.tid, th.name);
            -1
        }
    };
    th.retire(exit_code);
    exit_code
}
