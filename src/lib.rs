//! Concurrency core of a small UNIX-like kernel: the round-robin per-CPU
//! scheduler, the predicate-based blocking mechanism, and the
//! signal-delivery state machine.
//!
//! The crate is hardware-independent: everything a real CPU or a kernel
//! subsystem must provide is consumed through the collaborator traits in
//! [`arch`] and [`platform`], so the same code links into a freestanding
//! kernel image and runs under the host test suite against an in-memory
//! platform double.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod platform;
pub mod sched;
pub mod signal;
pub mod task;

pub use error::{Interrupted, KernelError, KernelResult, WaitResult};
pub use sched::{BlockDescriptor, FdSet, KernelScheduler};
