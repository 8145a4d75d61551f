//! The process: address-space and signal-disposition owner.

use alloc::vec::Vec;
use spin::Mutex;

use crate::config::NSIG;
use crate::error::{KernelError, KernelResult};
use crate::signal::{
    AltStack, SigActionFlags, SigSet, SignalDisposition, SignalHandler, Signo, is_valid_signal,
};
use crate::task::task::{Pgid, Pid, TaskId};

/// Mutable process state, guarded by the per-process lock.
pub struct ProcessInner {
    /// Per-signal delivery route, indexed by signal number. Slot 0 is
    /// never used.
    pub dispositions: [SignalDisposition; NSIG as usize],

    /// Alternate stack for `ONSTACK` handlers; disabled until installed.
    pub alt_stack: AltStack,

    /// Tasks belonging to this process, in creation order. The first entry
    /// is the delivery target for process-directed signals.
    pub tasks: Vec<TaskId>,
}

/// A group of tasks sharing an address space and signal dispositions.
///
/// The handle is shared (`Arc`): the process registry, the task table
/// entries, and in-flight signal sends all hold references. Mutable state
/// sits behind [`Process::inner`].
pub struct Process {
    pub pid: Pid,
    pub parent: Pid,
    pub pgid: Pgid,
    /// Controlling-terminal id; 0 when detached.
    pub terminal: u32,
    inner: Mutex<ProcessInner>,
}

impl Process {
    pub fn new(pid: Pid, parent: Pid, pgid: Pgid) -> Process {
        Process {
            pid,
            parent,
            pgid,
            terminal: 0,
            inner: Mutex::new(ProcessInner {
                dispositions: [SignalDisposition::default(); NSIG as usize],
                alt_stack: AltStack::disabled(),
                tasks: Vec::new(),
            }),
        }
    }

    /// Locks and returns the mutable process state.
    ///
    /// Lock ordering: acquire after the process registry, before the task
    /// table and any ready-queue lock.
    pub fn inner(&self) -> spin::MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    /// Current disposition of `signo`.
    pub fn disposition(&self, signo: Signo) -> KernelResult<SignalDisposition> {
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        Ok(self.inner.lock().dispositions[signo as usize])
    }

    /// Installs a disposition for `signo`.
    ///
    /// `SIGKILL`/`SIGSTOP` and numbers outside `1..NSIG` are rejected with
    /// `InvalidSignal`; a custom handler without a valid restorer is
    /// rejected with `InvalidDisposition`, since handler dispatch has no
    /// return path without one.
    pub fn set_disposition(&self, signo: Signo, disposition: SignalDisposition) -> KernelResult<()> {
        if !is_valid_signal(signo) || SigSet::UNMASKABLE.contains(signo) {
            return Err(KernelError::InvalidSignal);
        }
        if matches!(disposition.handler, SignalHandler::Handler(_))
            && !disposition.flags.contains(SigActionFlags::RESTORER)
        {
            return Err(KernelError::InvalidDisposition);
        }
        self.inner.lock().dispositions[signo as usize] = disposition;
        Ok(())
    }

    /// Installs the alternate signal stack after validating it.
    pub fn set_alt_stack(&self, stack: AltStack) -> KernelResult<()> {
        stack.validate()?;
        self.inner.lock().alt_stack = stack;
        Ok(())
    }

    /// The delivery target for process-directed signals, if any task is
    /// left.
    pub fn first_task(&self) -> Option<TaskId> {
        self.inner.lock().tasks.first().copied()
    }
}
