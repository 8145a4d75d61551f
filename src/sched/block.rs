//! Generic blocking mechanism.
//!
//! Any subsystem parks the current task with a [`BlockDescriptor`]; the
//! scheduler polls the descriptor's predicate at every reschedule attempt
//! and unparks the task when the predicate holds — or earlier, when an
//! unblocked signal arrives. No subsystem talks to the scheduler directly,
//! and no wakeup can be lost, because the scheduler itself re-evaluates the
//! predicate rather than waiting for an external wake call.

use alloc::vec::Vec;

use log::trace;

use crate::arch::{CpuId, IrqGuard};
use crate::error::{Interrupted, WaitResult};
use crate::platform::{ClockId, Platform, ResourceId, SocketId, WaitTarget};
use crate::sched::scheduler::{remove_from_ready_queues, KernelScheduler};
use crate::signal::SigSet;
use crate::task::{Pid, TaskId, TaskState};

/// Fixed-size descriptor set for `select`-style waits; bit `fd` marks
/// interest in resource `fd`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FdSet(u64);

impl FdSet {
    /// Largest representable descriptor number plus one.
    pub const CAPACITY: u32 = 64;

    pub const fn empty() -> FdSet {
        FdSet(0)
    }

    pub fn set(&mut self, fd: u32) {
        debug_assert!(fd < FdSet::CAPACITY, "fd {} outside FdSet capacity", fd);
        self.0 |= 1 << fd;
    }

    pub const fn contains(self, fd: u32) -> bool {
        fd < FdSet::CAPACITY && self.0 & (1 << fd) != 0
    }

    /// Descriptors set below `nfds`, ascending.
    pub fn iter_up_to(self, nfds: u32) -> impl Iterator<Item = u32> {
        (0..nfds.min(FdSet::CAPACITY)).filter(move |&fd| self.contains(fd))
    }
}

/// What must hold before a parked task may resume.
///
/// Exactly one variant is active per blocked task. Every predicate is
/// read-only over the platform, so the scheduler can poll it repeatedly
/// and cheaply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDescriptor {
    /// Park until `clock` reaches `deadline`.
    Sleep { clock: ClockId, deadline: u64 },

    /// Park until a read of `resource` would not block.
    UntilReadable { resource: ResourceId },

    /// Park until a write to `resource` would not block.
    UntilWritable { resource: ResourceId },

    /// Readable, or the monotonic deadline — whichever comes first.
    UntilReadableOrTimeout { resource: ResourceId, deadline: u64 },

    /// Park until the socket's connect handshake completes.
    UntilConnected { socket: SocketId },

    /// Socket readable, or the monotonic deadline.
    UntilReadableWithTimeout { socket: SocketId, deadline: u64 },

    /// Park until any watched descriptor becomes ready.
    Select {
        read: FdSet,
        write: FdSet,
        except: FdSet,
        nfds: u32,
    },

    /// `Select`, satisfied unconditionally once the deadline is reached.
    /// The deadline check is OR'ed with readiness at every poll.
    SelectTimeout {
        read: FdSet,
        write: FdSet,
        except: FdSet,
        nfds: u32,
        deadline: u64,
    },

    /// Park until a child-state notification matching `target` is queued
    /// for `parent`.
    ///
    /// The predicate counts notifications without claiming one, so a woken
    /// waiter can lose the notification to a competitor and must retry its
    /// wait.
    WaitPid { parent: Pid, target: WaitTarget },

    /// Never satisfied; the park ends only through signal delivery.
    /// Carries `sigsuspend`.
    SignalWait,
}

impl BlockDescriptor {
    /// Polls the predicate. Read-only against the platform; idempotent once
    /// true for the deadline-bearing variants.
    pub fn should_unblock<P: Platform>(&self, platform: &P) -> bool {
        match *self {
            BlockDescriptor::Sleep { clock, deadline } => platform.now(clock) >= deadline,
            BlockDescriptor::UntilReadable { resource } => platform.is_readable(resource),
            BlockDescriptor::UntilWritable { resource } => platform.is_writable(resource),
            BlockDescriptor::UntilReadableOrTimeout { resource, deadline } => {
                platform.is_readable(resource) || platform.now(ClockId::Monotonic) >= deadline
            }
            BlockDescriptor::UntilConnected { socket } => platform.is_connected(socket),
            BlockDescriptor::UntilReadableWithTimeout { socket, deadline } => {
                platform.is_readable(socket) || platform.now(ClockId::Monotonic) >= deadline
            }
            BlockDescriptor::Select {
                read,
                write,
                except,
                nfds,
            } => any_fd_ready(platform, read, write, except, nfds),
            BlockDescriptor::SelectTimeout {
                read,
                write,
                except,
                nfds,
                deadline,
            } => {
                any_fd_ready(platform, read, write, except, nfds)
                    || platform.now(ClockId::Monotonic) >= deadline
            }
            BlockDescriptor::WaitPid { parent, target } => {
                platform.notification_count_for(parent, target) > 0
            }
            BlockDescriptor::SignalWait => false,
        }
    }
}

/// Satisfied as soon as any one watched bit is ready.
fn any_fd_ready<P: Platform>(platform: &P, read: FdSet, write: FdSet, except: FdSet, nfds: u32) -> bool {
    read.iter_up_to(nfds).any(|fd| platform.is_readable(fd))
        || write.iter_up_to(nfds).any(|fd| platform.is_writable(fd))
        || except.iter_up_to(nfds).any(|fd| platform.is_exceptional(fd))
}

impl KernelScheduler {
    /// Parks the task running on `cpu` until `descriptor`'s predicate holds
    /// or a signal forces the wait open.
    ///
    /// The caller must already have interrupts disabled and must not hold a
    /// lock the predicate needs. The caller regains a runnable task only by
    /// rescheduling; on resumption it learns the outcome through
    /// [`KernelScheduler::take_wait_result`].
    pub fn block_current_task<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        descriptor: BlockDescriptor,
    ) {
        debug_assert!(
            !platform.interrupts_enabled(),
            "block_current_task requires interrupts disabled"
        );
        self.park_current(cpu, descriptor);
    }

    /// Consumes the recorded outcome of the task's most recent wait.
    pub fn take_wait_result(&mut self, task: TaskId) -> Option<WaitResult> {
        self.tasks.lock().get_mut(task).and_then(|t| t.wait_result.take())
    }

    /// Atomically swaps in a temporary signal mask and parks until a signal
    /// is delivered. Handler dispatch restores the pre-suspend mask through
    /// the frame's saved mask.
    pub fn sigsuspend<P: Platform>(&mut self, platform: &mut P, cpu: CpuId, mask: SigSet) {
        let _hw = IrqGuard::new(platform);
        let tid = self.processors[cpu]
            .current_task
            .expect("sigsuspend with no current task");
        {
            let mut tasks = self.tasks.lock();
            let task = tasks.get_mut(tid).expect("current task missing from table");
            task.saved_signal_mask = task.signal_mask;
            task.signal_mask = mask.without_unmaskable();
            task.in_sigsuspend = true;
        }
        self.park_current(cpu, BlockDescriptor::SignalWait);
    }

    fn park_current(&mut self, cpu: CpuId, descriptor: BlockDescriptor) {
        let tid = self.processors[cpu]
            .current_task
            .take()
            .expect("blocking call with no current task");
        {
            let mut tasks = self.tasks.lock();
            let task = tasks.get_mut(tid).expect("current task missing from table");
            debug_assert!(!task.is_idle, "the idle task must never block");
            task.blocking = Some(descriptor);
            task.state = TaskState::Waiting;
            task.wait_result = None;
            // The task parks inside a system call; its saved user context
            // is the one a signal handler would interrupt.
            task.in_kernel = true;
        }
        remove_from_ready_queues(&self.processors, tid);
        trace!(target: "sched", "task {} parked on {:?}", tid, descriptor);
    }

    /// One poll pass over every `Waiting` task, run at each reschedule
    /// attempt. A deliverable signal always wins over the predicate.
    ///
    /// Precondition: interrupts disabled.
    pub(crate) fn wake_waiting_tasks<P: Platform>(&mut self, platform: &mut P, cpu: CpuId) {
        enum Wake {
            Predicate,
            Signal,
        }

        let waiting: Vec<TaskId> = {
            let tasks = self.tasks.lock();
            tasks
                .ids()
                .filter(|&tid| {
                    tasks
                        .get(tid)
                        .map(|t| t.state == TaskState::Waiting)
                        .unwrap_or(false)
                })
                .collect()
        };

        for tid in waiting {
            let wake = {
                let tasks = self.tasks.lock();
                let Some(task) = tasks.get(tid) else { continue };
                if task.state != TaskState::Waiting {
                    continue;
                }
                if task.next_deliverable_signal().is_some() {
                    Some(Wake::Signal)
                } else {
                    match &task.blocking {
                        Some(descriptor) if descriptor.should_unblock(&*platform) => {
                            Some(Wake::Predicate)
                        }
                        Some(_) => None,
                        // Waiting without a descriptor is a state-machine
                        // violation; recover by unparking.
                        None => Some(Wake::Predicate),
                    }
                }
            };

            match wake {
                Some(Wake::Signal) => {
                    {
                        let mut tasks = self.tasks.lock();
                        let task = tasks.get_mut(tid).expect("waiting task vanished");
                        task.blocking = None;
                        task.wait_result = Some(Err(Interrupted));
                        // The interrupted system call unwinds with this
                        // status; syscall-restart looks for it later.
                        task.interrupted_context_mut().result = Interrupted::RESULT_CODE;
                        // One signal-check-free pass so the aborted call can
                        // unwind before a handler is dispatched.
                        task.state = TaskState::RunningUninterruptible;
                    }
                    trace!(target: "sched", "task {} wait interrupted by signal", tid);
                    self.place(platform, Some(cpu), tid);
                }
                Some(Wake::Predicate) => {
                    {
                        let mut tasks = self.tasks.lock();
                        let task = tasks.get_mut(tid).expect("waiting task vanished");
                        task.blocking = None;
                        task.wait_result = Some(Ok(()));
                        task.in_kernel = false;
                        task.state = TaskState::Ready;
                    }
                    trace!(target: "sched", "task {} wait satisfied", tid);
                    self.place(platform, Some(cpu), tid);
                }
                None => {}
            }
        }
    }
}
