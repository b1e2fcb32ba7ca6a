//! The simulated machine underneath Kestrel.
//!
//! This crate plays the part of the hardware: it owns the interrupt flag of
//! every execution context, the interrupt-masking [`SpinLock`], the
//! programmable [`Timer`] that drives preemption and the kernel console
//! [`logger`]. Nothing here knows about threads or scheduling; the kernel
//! builds those on top.
//!
//! [`SpinLock`]: spinlock::SpinLock
//! [`Timer`]: timer::Timer

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod interrupt;
pub mod logger;
pub mod spinlock;
pub mod timer;
