//! Error taxonomy of the concurrency core.
//!
//! Only [`Interrupted`] ever crosses the blocking boundary back into kernel
//! callers; everything else is either a recoverable [`KernelError`] returned
//! from management operations or a programming error enforced by assertion.

use core::fmt;

/// Recoverable errors returned by scheduler and signal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No task matched the requested pid, process group, or task id.
    NoSuchProcess,
    /// Signal number outside `1..NSIG`, or an attempt to manage a signal
    /// whose disposition is fixed (`SIGKILL`, `SIGSTOP`).
    InvalidSignal,
    /// Handler disposition without a usable signal restorer.
    InvalidDisposition,
    /// The memory collaborator could not provide a kernel stack.
    OutOfMemory,
    /// Alternate-stack descriptor too small or otherwise unusable.
    InvalidStack,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::NoSuchProcess => "no such process",
            KernelError::InvalidSignal => "invalid signal number",
            KernelError::InvalidDisposition => "handler disposition without restorer",
            KernelError::OutOfMemory => "kernel stack allocation failed",
            KernelError::InvalidStack => "unusable alternate stack",
        };
        f.write_str(msg)
    }
}

/// Result alias used throughout the core.
pub type KernelResult<T> = Result<T, KernelError>;

/// Marker for a wait that ended through signal delivery instead of its
/// predicate becoming true.
///
/// A blocking system call that observes this outcome reports "interrupted
/// system call"; [`Interrupted::RESULT_CODE`] is that status as it appears in
/// the result register of a saved context, where the syscall-restart logic
/// looks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl Interrupted {
    /// Errno value of an interrupted system call.
    pub const ERRNO: u64 = 4;

    /// `-ERRNO` as stamped into the result register of an interrupted
    /// context.
    pub const RESULT_CODE: u64 = Self::ERRNO.wrapping_neg();
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted system call")
    }
}

/// Outcome handed to a task resuming from `block_current_task`.
pub type WaitResult = Result<(), Interrupted>;
