//! Synchronous rendezvous between speakers and listeners.
//!
//! A [`Communicator`] pairs every [`speak`] with exactly one [`listen`]. A
//! speaker blocks until some listener is there to take its word; a listener
//! blocks until a word has been produced for it. Any number of speakers and
//! listeners may arrive in any order: each word is delivered once, and no
//! word is lost.
//!
//! The words pass through a one-slot mailbox. A speaker may only fill it
//! while a listener is waiting and nobody else's word is still in it, so a
//! word in the mailbox is always claimed by one of the listeners that are
//! already inside.
//!
//! ```
//! use kestrel::{communicator::Communicator, thread::ThreadBuilder};
//! use std::sync::Arc;
//!
//! let comm = Arc::new(Communicator::new());
//! let speaker = {
//!     let comm = comm.clone();
//!     ThreadBuilder::new("speaker").spawn(move || comm.speak(70))
//! };
//! assert_eq!(comm.listen(), 70);
//! assert_eq!(speaker.join(), 0);
//! ```
//!
//! [`speak`]: Communicator::speak
//! [`listen`]: Communicator::listen
use crate::sync::{Condition2, Lock};
use core::cell::UnsafeCell;
use std::sync::Arc;

struct Rendezvous<T> {
    mailbox: Option<T>,
    /// Speakers between entry and deposit.
    speaking: usize,
    /// Listeners that have not taken a word yet.
    listening: usize,
}

/// A rendezvous channel transferring values of type `T`, `i32` words by
/// default.
pub struct Communicator<T = i32> {
    lock: Arc<Lock>,
    speakers: Condition2,
    listeners: Condition2,
    rendezvous: UnsafeCell<Rendezvous<T>>,
}

// The rendezvous state is only touched while `lock` is held.
unsafe impl<T: Send> Send for Communicator<T> {}
unsafe impl<T: Send> Sync for Communicator<T> {}

impl<T> Communicator<T> {
    /// Creates a communicator with a fresh lock.
    pub fn new() -> Self {
        Self::with_lock(Arc::new(Lock::new()))
    }

    /// Creates a communicator serialized by `lock`.
    ///
    /// `lock` must not be held by the caller of [`speak`] or [`listen`].
    ///
    /// [`speak`]: Self::speak
    /// [`listen`]: Self::listen
    pub fn with_lock(lock: Arc<Lock>) -> Self {
        Self {
            speakers: Condition2::new(lock.clone()),
            listeners: Condition2::new(lock.clone()),
            lock,
            rendezvous: UnsafeCell::new(Rendezvous {
                mailbox: None,
                speaking: 0,
                listening: 0,
            }),
        }
    }

    fn with_rendezvous<R>(&self, f: impl FnOnce(&mut Rendezvous<T>) -> R) -> R {
        debug_assert!(self.lock.is_held_by_current_thread());
        f(unsafe { &mut *self.rendezvous.get() })
    }

    /// Transfers `word` to exactly one listener.
    ///
    /// Blocks until a listener is waiting and the mailbox is free, then
    /// deposits the word for that listener and returns.
    pub fn speak(&self, word: T) {
        self.lock.acquire();
        self.with_rendezvous(|r| r.speaking += 1);
        while self.with_rendezvous(|r| r.listening == 0 || r.mailbox.is_some()) {
            self.speakers.sleep();
        }
        self.with_rendezvous(|r| {
            r.mailbox = Some(word);
            r.speaking -= 1;
        });
        log::trace!("Communicator: word deposited.");
        self.listeners.wake();
        self.lock.release();
    }

    /// Waits for a speaker and returns the word it transferred.
    pub fn listen(&self) -> T {
        self.lock.acquire();
        self.speakers.wake();
        self.with_rendezvous(|r| r.listening += 1);
        while self.with_rendezvous(|r| r.mailbox.is_none()) {
            self.listeners.sleep();
        }
        let word = self.with_rendezvous(|r| {
            r.listening -= 1;
            r.mailbox.take()
        });
        log::trace!("Communicator: word claimed.");
        // The mailbox is free again.
        self.speakers.wake();
        self.lock.release();

        let Some(word) = word else {
            unreachable!("the mailbox was emptied while the lock was held");
        };
        word
    }

    /// Number of speakers waiting for a listener.
    pub fn waiting_speakers(&self) -> usize {
        self.lock.acquire();
        let speaking = self.with_rendezvous(|r| r.speaking);
        self.lock.release();
        speaking
    }

    /// Number of listeners waiting for a word.
    pub fn waiting_listeners(&self) -> usize {
        self.lock.acquire();
        let listening = self.with_rendezvous(|r| r.listening);
        self.lock.release();
        listening
    }
}

impl<T> Default for Communicator<T> {
    fn default() -> Self {
        Self::new()
    }
}
