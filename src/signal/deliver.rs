//! Signal delivery engine.
//!
//! `deliver` decides, for one task and one signal, whether the signal is
//! ignored, routed into a custom handler, or resolved by its default
//! action. It is re-entrant: `run_next` calls it for a task about to run,
//! and the send helpers call it synchronously when the sender targets
//! itself. Precondition throughout: interrupts are disabled for the whole
//! call.

use alloc::sync::Arc;

use log::{debug, trace};

use crate::arch::{CpuId, IrqGuard, SavedContext, DEFAULT_CONTEXT_FLAGS, USER_MODE_BITS};
use crate::config::SYSCALL_INSN_LEN;
use crate::error::{Interrupted, KernelError, KernelResult};
use crate::platform::{ChildEvent, ChildEventKind, Platform};
use crate::sched::scheduler::{remove_from_ready_queues, KernelScheduler, KERNEL_PID};
use crate::signal::frame::SignalFrame;
use crate::signal::types::{
    default_action, is_valid_signal, AltStack, DefaultAction, MaskHow, QueuedSignal,
    SigActionFlags, SigInfo, SigSet, SignalDisposition, SignalHandler, Signo, SIGCONT, SIGKILL,
};
use crate::task::{Pgid, Pid, Process, TaskId, TaskState};

impl KernelScheduler {
    /// Lowest-numbered pending signal of `task` not blocked by its mask.
    pub fn task_get_next_sig(&self, task: TaskId) -> Option<Signo> {
        self.tasks.lock().get(task).and_then(|t| t.next_deliverable_signal())
    }

    /// Installs a disposition for `signo` in process `pid`.
    pub fn set_signal_disposition(
        &self,
        pid: Pid,
        signo: Signo,
        disposition: SignalDisposition,
    ) -> KernelResult<()> {
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        process.set_disposition(signo, disposition)
    }

    /// Reads back the disposition of `signo` in process `pid`.
    pub fn signal_disposition(&self, pid: Pid, signo: Signo) -> KernelResult<SignalDisposition> {
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        process.disposition(signo)
    }

    /// Adjusts a task's signal mask, returning the previous mask.
    /// `SIGKILL`/`SIGSTOP` bits are silently dropped from any block request.
    pub fn set_signal_mask(
        &mut self,
        task: TaskId,
        how: MaskHow,
        set: SigSet,
    ) -> KernelResult<SigSet> {
        let mut tasks = self.tasks.lock();
        let t = tasks.get_mut(task).ok_or(KernelError::NoSuchProcess)?;
        let previous = t.signal_mask;
        t.signal_mask = match how {
            MaskHow::Block => previous.union(set.without_unmaskable()),
            MaskHow::Unblock => previous.subtract(set),
            MaskHow::Set => set.without_unmaskable(),
        };
        Ok(previous)
    }

    /// Installs the alternate signal stack for `ONSTACK` handlers.
    pub fn set_alt_signal_stack(&self, pid: Pid, stack: AltStack) -> KernelResult<()> {
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        process.set_alt_stack(stack)
    }

    /// Posts `signo` to one task and delivers it immediately when unmasked.
    /// The self-signal path: the effect is visible before the call returns.
    pub fn task_do_sig<P: Platform>(
        &mut self,
        platform: &mut P,
        task: TaskId,
        signo: Signo,
    ) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        let masked = {
            let mut tasks = self.tasks.lock();
            let t = tasks.get_mut(task).ok_or(KernelError::NoSuchProcess)?;
            // The idle tasks must stay runnable; they are not signal
            // targets.
            if t.is_idle {
                return Err(KernelError::NoSuchProcess);
            }
            t.post_signal(signo);
            t.signal_mask.contains(signo)
        };
        if !masked {
            self.deliver(&mut *hw, task, signo);
        }
        Ok(())
    }

    /// Sends `signo` to one specific task of process `tgid`.
    pub fn signal_task<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        tgid: Pid,
        tid: TaskId,
        signo: Signo,
    ) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        if tgid == KERNEL_PID {
            return Err(KernelError::NoSuchProcess);
        }
        let process = self.process(tgid).ok_or(KernelError::NoSuchProcess)?;
        if !process.inner().tasks.contains(&tid) {
            return Err(KernelError::NoSuchProcess);
        }
        self.post_signal_to(&mut *hw, cpu, tid, signo, None);
        Ok(())
    }

    /// Sends `signo` to process `pid`; the first task in its task list is
    /// the delivery target.
    pub fn signal_process<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        pid: Pid,
        signo: Signo,
    ) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        // The kernel process owns only the idle tasks; it is never a
        // signal target.
        if pid == KERNEL_PID {
            return Err(KernelError::NoSuchProcess);
        }
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        let target = process.first_task().ok_or(KernelError::NoSuchProcess)?;
        self.post_signal_to(&mut *hw, cpu, target, signo, None);
        Ok(())
    }

    /// Sends `signo` to every process of group `pgid`.
    pub fn signal_process_group<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        pgid: Pgid,
        signo: Signo,
    ) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        let targets: alloc::vec::Vec<TaskId> = {
            let processes = self.processes.lock();
            processes
                .iter()
                .filter(|p| p.pgid == pgid && p.pid != KERNEL_PID)
                .filter_map(|p| p.first_task())
                .collect()
        };
        if targets.is_empty() {
            return Err(KernelError::NoSuchProcess);
        }
        for target in targets {
            self.post_signal_to(&mut *hw, cpu, target, signo, None);
        }
        Ok(())
    }

    /// Sends `signo` with a queued payload to process `pid`. Payloads of
    /// the same number are delivered in FIFO send order.
    pub fn queue_signal_process<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        pid: Pid,
        signo: Signo,
        payload: SigInfo,
    ) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        if !is_valid_signal(signo) {
            return Err(KernelError::InvalidSignal);
        }
        if pid == KERNEL_PID {
            return Err(KernelError::NoSuchProcess);
        }
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        let target = process.first_task().ok_or(KernelError::NoSuchProcess)?;
        self.post_signal_to(&mut *hw, cpu, target, signo, Some(payload));
        Ok(())
    }

    /// Common send path: posts the signal, then decides whether delivery
    /// must happen synchronously rather than at the target's next
    /// selection.
    fn post_signal_to<P: Platform>(
        &mut self,
        platform: &mut P,
        cpu: CpuId,
        tid: TaskId,
        signo: Signo,
        payload: Option<SigInfo>,
    ) {
        let (state, masked, process) = {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(tid) else { return };
            if let Some(info) = payload {
                task.queued.push_back(QueuedSignal { signo, info });
            }
            task.post_signal(signo);
            (task.state, task.signal_mask.contains(signo), task.process.clone())
        };
        trace!(target: "signal", "signal {} posted to task {}", signo, tid);

        // Stopped tasks are invisible to selection, so the signals that can
        // affect them act at send time: SIGKILL always, SIGCONT by resuming
        // the task regardless of its disposition and even when its bit is
        // blocked. Everything else stays pending.
        if state == TaskState::Stopped {
            if signo == SIGKILL {
                self.deliver(platform, tid, signo);
            } else if signo == SIGCONT {
                self.resume_stopped(platform, tid, signo, &process);
            }
            return;
        }

        if masked {
            return;
        }

        // A sender targeting itself observes the effect before the send
        // returns.
        if self.processors.get(cpu).and_then(|p| p.current_task) == Some(tid) {
            self.deliver(platform, tid, signo);
        }
    }

    /// SIGCONT semantics for a stopped target: resume it, notify the
    /// parent, and leave the signal pending only when a custom handler
    /// still has to run.
    fn resume_stopped<P: Platform>(
        &mut self,
        platform: &mut P,
        tid: TaskId,
        signo: Signo,
        process: &Arc<Process>,
    ) {
        let handler = process
            .disposition(signo)
            .map(|d| d.handler)
            .unwrap_or(SignalHandler::Default);
        {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(tid) else { return };
            if task.state != TaskState::Stopped {
                return;
            }
            task.state = TaskState::Ready;
            if !matches!(handler, SignalHandler::Handler(_)) {
                task.consume_signal(signo);
            }
        }
        self.place(platform, None, tid);
        platform.enqueue_notification(
            process.parent,
            ChildEvent {
                pid: process.pid,
                pgid: process.pgid,
                kind: ChildEventKind::Continued,
            },
        );
        debug!(target: "signal", "signal {} continues task {} (pid {})", signo, tid, process.pid);
    }

    /// Delivers one signal to one task: ignore, custom handler, or default
    /// action. Re-entrant; interrupts must be disabled for the duration.
    pub(crate) fn deliver<P: Platform>(&mut self, platform: &mut P, tid: TaskId, signo: Signo) {
        debug_assert!(
            !platform.interrupts_enabled(),
            "deliver requires interrupts disabled"
        );
        assert!(is_valid_signal(signo), "deliver of invalid signal {}", signo);

        let process = match self.tasks.lock().get(tid) {
            Some(task) => task.process.clone(),
            // Reaped between post and delivery; nothing to do.
            None => return,
        };
        let disposition = process.inner().dispositions[signo as usize];

        match disposition.handler {
            SignalHandler::Ignore => {
                if let Some(task) = self.tasks.lock().get_mut(tid) {
                    task.consume_signal(signo);
                }
                trace!(target: "signal", "signal {} ignored by pid {}", signo, process.pid);
            }
            SignalHandler::Handler(entry) => {
                self.dispatch_handler(platform, tid, signo, entry, disposition, &process)
            }
            SignalHandler::Default => {
                self.apply_default_action(platform, tid, signo, &process)
            }
        }
    }

    /// Resolves a signal with no handler installed through the fixed
    /// default-action table.
    fn apply_default_action<P: Platform>(
        &mut self,
        platform: &mut P,
        tid: TaskId,
        signo: Signo,
        process: &Arc<Process>,
    ) {
        match default_action(signo) {
            DefaultAction::Ignore => {
                if let Some(task) = self.tasks.lock().get_mut(tid) {
                    task.consume_signal(signo);
                }
            }
            action @ (DefaultAction::Terminate | DefaultAction::TerminateAndDump) => {
                // Idempotent on an already-exiting task.
                let already = self
                    .tasks
                    .lock()
                    .get(tid)
                    .map(|t| t.state == TaskState::Exiting)
                    .unwrap_or(true);
                if already {
                    return;
                }
                if action == DefaultAction::TerminateAndDump {
                    platform.dump_stack_trace(tid);
                }
                {
                    let mut tasks = self.tasks.lock();
                    let task = tasks.get_mut(tid).expect("delivery target vanished");
                    task.consume_signal(signo);
                    task.state = TaskState::Exiting;
                    // A stale context must never be resumed.
                    task.context_valid = false;
                    task.blocking = None;
                }
                self.detach_everywhere(tid);
                platform.enqueue_notification(
                    process.parent,
                    ChildEvent {
                        pid: process.pid,
                        pgid: process.pgid,
                        kind: ChildEventKind::Interrupted(signo),
                    },
                );
                debug!(
                    target: "signal",
                    "signal {} terminates task {} (pid {})",
                    signo, tid, process.pid
                );
            }
            DefaultAction::Stop => {
                let already = {
                    let mut tasks = self.tasks.lock();
                    let Some(task) = tasks.get_mut(tid) else { return };
                    if task.state == TaskState::Stopped {
                        true
                    } else {
                        task.consume_signal(signo);
                        task.state = TaskState::Stopped;
                        false
                    }
                };
                if already {
                    return;
                }
                self.detach_everywhere(tid);
                platform.enqueue_notification(
                    process.parent,
                    ChildEvent {
                        pid: process.pid,
                        pgid: process.pgid,
                        kind: ChildEventKind::Stopped(signo),
                    },
                );
                debug!(target: "signal", "signal {} stops task {} (pid {})", signo, tid, process.pid);
            }
            DefaultAction::Continue => {
                let resumed = {
                    let mut tasks = self.tasks.lock();
                    let Some(task) = tasks.get_mut(tid) else { return };
                    task.consume_signal(signo);
                    match task.state {
                        TaskState::Ready => None,
                        state => {
                            task.state = TaskState::Ready;
                            Some(state)
                        }
                    }
                };
                match resumed {
                    // A stopped task is on no queue; requeue it.
                    Some(TaskState::Stopped) => {
                        self.place(platform, None, tid);
                        platform.enqueue_notification(
                            process.parent,
                            ChildEvent {
                                pid: process.pid,
                                pgid: process.pgid,
                                kind: ChildEventKind::Continued,
                            },
                        );
                    }
                    // Running sub-states keep their queue slot; the demotion
                    // to Ready just sends them through selection again.
                    Some(_) => {}
                    None => {}
                }
            }
            // `default_action` asserts the signal number is valid, and the
            // table covers every valid number.
            DefaultAction::Invalid => unreachable!("default action for validated signal"),
        }
    }

    /// Removes a task from every scheduling structure: ready queues and any
    /// processor's current-task slot.
    fn detach_everywhere(&mut self, tid: TaskId) {
        remove_from_ready_queues(&self.processors, tid);
        for processor in self.processors.iter_mut() {
            if processor.current_task == Some(tid) {
                processor.current_task = None;
            }
        }
    }

    /// Redirects a task into a custom handler. The dispositions `Ignore`
    /// and `Default` must never reach this path.
    fn dispatch_handler<P: Platform>(
        &mut self,
        platform: &mut P,
        tid: TaskId,
        signo: Signo,
        entry: u64,
        disposition: SignalDisposition,
        process: &Arc<Process>,
    ) {
        debug_assert!(
            matches!(disposition.handler, SignalHandler::Handler(_)),
            "handler dispatch without a custom handler"
        );

        let alt_stack = process.inner().alt_stack;

        let frame = {
            let mut tasks = self.tasks.lock();
            let task = tasks.get_mut(tid).expect("dispatch target vanished");

            // Save location: the stack active in the interrupted context,
            // redirected onto the alternate stack when requested and not
            // already there.
            let mut interrupted = *task.interrupted_context();
            let mut base_sp = interrupted.stack_pointer;
            if disposition.flags.contains(SigActionFlags::ONSTACK)
                && alt_stack.enabled()
                && !alt_stack.contains(base_sp)
            {
                base_sp = alt_stack.top();
            }

            // Consume the signal; a queued payload wins over a synthesized
            // "sent by kill" record.
            let queued_payload = task.consume_signal(signo);
            let siginfo = if disposition.flags.contains(SigActionFlags::SIGINFO) {
                Some(queued_payload.unwrap_or_else(|| SigInfo::for_kill(signo, 0)))
            } else {
                None
            };

            // Kernel-mode bookkeeping before the interrupted context is
            // frozen into the frame.
            let was_sigsuspend = task.in_sigsuspend;
            if task.in_kernel {
                if task.in_sigsuspend {
                    task.in_sigsuspend = false;
                    task.in_kernel = false;
                } else if disposition.flags.contains(SigActionFlags::RESTART)
                    && interrupted.result == Interrupted::RESULT_CODE
                {
                    // Re-arm the interrupted system call: back up over the
                    // entry instruction and restore the call number the
                    // result clobbered.
                    interrupted.instruction_pointer -= SYSCALL_INSN_LEN;
                    interrupted.result = interrupted.syscall_number;
                }
                // Otherwise the result register keeps the interrupted
                // status for the caller to see.
            }

            let saved_mask = if was_sigsuspend {
                task.saved_signal_mask
            } else {
                task.signal_mask
            };

            match SignalFrame::build(
                base_sp,
                interrupted,
                task.fpu,
                siginfo,
                disposition.restorer,
                saved_mask,
            ) {
                Some(frame) => {
                    // Point the live context into the handler, on the
                    // trampoline stack, with the conventional argument
                    // triple.
                    task.context = SavedContext {
                        instruction_pointer: entry,
                        stack_pointer: frame.handler_sp(),
                        flags: DEFAULT_CONTEXT_FLAGS,
                        mode_bits: USER_MODE_BITS,
                        args: [signo as u64, frame.siginfo_pointer(), frame.context_pointer()],
                        ..SavedContext::default()
                    };
                    task.in_kernel = false;
                    task.context_valid = true;

                    // Handler mask: the configured set, plus the delivered
                    // signal itself unless NODEFER asked otherwise.
                    let mut mask = disposition.mask;
                    if !disposition.flags.contains(SigActionFlags::NODEFER) {
                        mask.add(signo);
                    }
                    task.signal_mask = mask.without_unmaskable();

                    // Another pending signal may still be considered before
                    // the task actually runs.
                    task.state = TaskState::RunningInterruptible;

                    task.frames.push(frame.clone());
                    Some(frame)
                }
                None => {
                    // No room below the interrupted stack pointer for a
                    // handler frame; the task cannot take the signal and
                    // is terminated instead.
                    task.state = TaskState::Exiting;
                    task.context_valid = false;
                    task.blocking = None;
                    None
                }
            }
        };

        let Some(frame) = frame else {
            self.detach_everywhere(tid);
            platform.enqueue_notification(
                process.parent,
                ChildEvent {
                    pid: process.pid,
                    pgid: process.pgid,
                    kind: ChildEventKind::Interrupted(signo),
                },
            );
            debug!(
                target: "signal",
                "signal {} kills task {} (pid {}): no room for a handler frame",
                signo, tid, process.pid
            );
            return;
        };

        if disposition.flags.contains(SigActionFlags::RESETHAND) {
            process.inner().dispositions[signo as usize] = SignalDisposition::default();
        }

        platform.place_signal_frame(tid, &frame);
        debug!(
            target: "signal",
            "signal {} handler {:#x} dispatched to task {}",
            signo, entry, tid
        );
    }

    /// The restorer-invoked unwind: pops the most recent signal frame and
    /// restores mask, context, and floating-point image verbatim.
    pub fn signal_return<P: Platform>(&mut self, platform: &mut P, task: TaskId) {
        let _hw = IrqGuard::new(platform);
        let mut tasks = self.tasks.lock();
        let t = tasks.get_mut(task).expect("signal_return for unknown task");
        let frame = t.frames.pop().expect("signal_return without a placed frame");
        t.signal_mask = frame.saved_mask.without_unmaskable();
        t.context = frame.saved_context;
        t.fpu = frame.fpu_image;
        t.context_valid = true;
        t.in_kernel = !frame.saved_context.is_user_mode();
        trace!(target: "signal", "task {} returned from handler", task);
    }
}
