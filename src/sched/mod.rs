//! Scheduling: per-CPU round-robin selection and the generic blocking
//! mechanism built on it.

mod block;
pub(crate) mod scheduler;

pub use block::{BlockDescriptor, FdSet};
pub use scheduler::{KernelScheduler, Processor, BOOTSTRAP_CPU, KERNEL_PID};
