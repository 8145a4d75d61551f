//! The schedulable task and its state machine.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::arch::{FpuImage, SavedContext, StackRegion};
use crate::error::WaitResult;
use crate::sched::BlockDescriptor;
use crate::signal::{QueuedSignal, SigSet, SignalFrame, Signo};
use crate::task::process::Process;

/// Task identity; an index into the scheduler's task table. Ids are reused
/// only after the task has been reaped.
pub type TaskId = usize;

/// Process identity.
pub type Pid = u32;

/// Process-group identity.
pub type Pgid = u32;

/// Scheduling state of one task.
///
/// `RunningInterruptible` and `RunningUninterruptible` are the about-to-run
/// sub-states of `Running`: a freshly selected task passes through one of
/// them while the signal machine decides whether to redirect it, and is
/// marked `Running` only once it is actually handed to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection; on exactly one processor's ready queue.
    Ready,

    /// Currently executing on a processor.
    Running,

    /// Selected to run; pending signals may still be dispatched into it.
    RunningInterruptible,

    /// Selected to run with the signal check suppressed for exactly one
    /// pass. Entered only by the signal-forced unblock path, so the
    /// interrupted system call can unwind with its "interrupted" status
    /// before a handler is dispatched. Never survives a return to user mode.
    RunningUninterruptible,

    /// Parked with a [`BlockDescriptor`]; not on any ready queue.
    Waiting,

    /// Stopped by a stop signal; invisible to selection until continued.
    Stopped,

    /// Terminal. The task is never scheduled again, only reaped.
    Exiting,
}

/// One schedulable thread of execution within a [`Process`].
pub struct Task {
    /// Table slot of this task.
    pub id: TaskId,

    /// Owning process; shared with the process registry and the process's
    /// own task list.
    pub process: Arc<Process>,

    /// Scheduling state; every transition happens with interrupts disabled.
    pub state: TaskState,

    /// Timer ticks left in the current quantum; reset on every selection.
    pub remaining_ticks: u32,

    /// Present exactly while the task is `Waiting`.
    pub blocking: Option<BlockDescriptor>,

    /// Whether the last saved context was captured in kernel mode. Decides
    /// which context counts as "interrupted" for handler dispatch.
    pub in_kernel: bool,

    /// Signals currently blocked from delivery.
    pub signal_mask: SigSet,

    /// Signals posted but not yet delivered.
    pub pending: SigSet,

    /// Queued-payload signal entries, FIFO per signal number.
    pub queued: VecDeque<QueuedSignal>,

    /// True while parked inside `sigsuspend` with a temporary mask.
    pub in_sigsuspend: bool,

    /// Mask to reinstate when a `sigsuspend` park is unwound; meaningful
    /// only while `in_sigsuspend` is set.
    pub saved_signal_mask: SigSet,

    /// The task's own saved register snapshot.
    pub context: SavedContext,

    /// The user-mode context at the point of interruption, kept separately
    /// while the task executes in kernel mode on that context's behalf.
    pub user_context: Option<SavedContext>,

    /// Floating-point register image saved alongside the context.
    pub fpu: FpuImage,

    /// False once the saved context has been invalidated (task exiting);
    /// an invalid context must never be resumed.
    pub context_valid: bool,

    /// Outcome of the most recent wait, written when the task leaves
    /// `Waiting` and consumed by the resumed caller.
    pub wait_result: Option<WaitResult>,

    /// Signal frames placed for this task, most recent last. Handler
    /// dispatch pushes, `signal_return` pops.
    pub frames: Vec<SignalFrame>,

    /// Kernel stack obtained from the memory collaborator at creation.
    pub kernel_stack: StackRegion,

    /// Marks a processor's idle fallback task; never queued, never signaled.
    pub is_idle: bool,
}

impl Task {
    /// Builds a task in the `Ready` state with an empty signal slate.
    ///
    /// The id is provisional; the task table overwrites it on insertion.
    pub fn new(process: Arc<Process>, context: SavedContext, kernel_stack: StackRegion) -> Task {
        Task {
            id: 0,
            process,
            state: TaskState::Ready,
            remaining_ticks: 0,
            blocking: None,
            in_kernel: !context.is_user_mode(),
            signal_mask: SigSet::empty(),
            pending: SigSet::empty(),
            queued: VecDeque::new(),
            in_sigsuspend: false,
            saved_signal_mask: SigSet::empty(),
            context,
            user_context: None,
            fpu: FpuImage::initial(),
            context_valid: true,
            wait_result: None,
            frames: Vec::new(),
            kernel_stack,
            is_idle: false,
        }
    }

    /// Lowest-numbered pending signal not blocked by the current mask.
    ///
    /// Deterministic for a given pending/mask pair: ascending numeric order
    /// is the defined delivery order.
    pub fn next_deliverable_signal(&self) -> Option<Signo> {
        self.pending.subtract(self.signal_mask).first_set()
    }

    /// Posts `signo` to this task's pending set.
    pub fn post_signal(&mut self, signo: Signo) {
        self.pending.add(signo);
    }

    /// Consumes one instance of `signo`: removes the oldest matching queued
    /// entry (FIFO per number) and returns its payload, clearing the pending
    /// bit once no queued entry of that number remains.
    pub fn consume_signal(&mut self, signo: Signo) -> Option<crate::signal::SigInfo> {
        let payload = self
            .queued
            .iter()
            .position(|q| q.signo == signo)
            .and_then(|pos| self.queued.remove(pos))
            .map(|q| q.info);
        if !self.queued.iter().any(|q| q.signo == signo) {
            self.pending.remove(signo);
        }
        payload
    }

    /// The context handler dispatch must treat as interrupted: the user-mode
    /// context when the task is in kernel mode on its behalf, otherwise the
    /// task's own saved context.
    pub fn interrupted_context(&self) -> &SavedContext {
        if self.in_kernel {
            self.user_context.as_ref().unwrap_or(&self.context)
        } else {
            &self.context
        }
    }

    /// Mutable access to the interrupted context (see
    /// [`Task::interrupted_context`]).
    pub fn interrupted_context_mut(&mut self) -> &mut SavedContext {
        if self.in_kernel {
            self.user_context.as_mut().unwrap_or(&mut self.context)
        } else {
            &mut self.context
        }
    }

    /// True when the task may be handed to the hardware.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self.state,
            TaskState::RunningInterruptible | TaskState::RunningUninterruptible
        )
    }
}
