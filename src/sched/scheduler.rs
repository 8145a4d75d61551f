//! Per-CPU round-robin scheduler.
//!
//! One [`KernelScheduler`] owns the processor set, the process registry, and
//! the task table; nothing lives in globals. Selection is strict round-robin
//! over a per-processor ready queue with the idle task as fallback, so a
//! reschedule always has something to run.
//!
//! The crate is a decision engine: `run_next` performs selection, the
//! pre-run signal check, and the `Running` marking, then returns the chosen
//! task id; the diverging wrapper [`KernelScheduler::reschedule`] hands that
//! id to `HardwareOps::run`, which does not return.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};
use spin::Mutex;

use crate::arch::{CpuId, FpuImage, IrqGuard, SavedContext, StackRegion};
use crate::config::TIME_QUANTUM_TICKS;
use crate::error::{KernelError, KernelResult};
use crate::platform::{ChildEvent, ChildEventKind, Platform};
use crate::signal::SigSet;
use crate::task::{Pgid, Pid, Process, Task, TaskId, TaskState, TaskTable};

/// The processor that boots the kernel; it can never be disabled, which
/// guarantees placement always finds a target.
pub const BOOTSTRAP_CPU: CpuId = 0;

/// Pid of the kernel process owning the idle tasks.
pub const KERNEL_PID: Pid = 0;

/// Per-CPU scheduling context.
pub struct Processor {
    /// Ready tasks owned by this processor. Cross-CPU placement transfers
    /// membership under this lock.
    pub(crate) ready_queue: Mutex<VecDeque<TaskId>>,

    /// Task presently executing on this CPU.
    pub(crate) current_task: Option<TaskId>,

    /// Fallback task selected when the ready queue is empty. Never queued.
    pub(crate) idle_task: TaskId,

    /// Reentrant suppression counter for tick preemption.
    pub(crate) preemption_disabled: u32,

    /// True while the idle task is the last selection; a wakeup aimed at an
    /// idle remote processor needs an IPI to take effect promptly.
    pub(crate) sched_idle: bool,

    /// Placement eligibility; disabled processors are skipped.
    pub(crate) enabled: bool,

    /// Timer ticks observed by this processor, for diagnostics.
    pub(crate) tick_count: u64,
}

/// Removes `tid` from every ready queue it appears on.
///
/// Queue locks are taken one at a time; a task is on at most one queue, so
/// at most one retain does any work.
pub(crate) fn remove_from_ready_queues(processors: &[Processor], tid: TaskId) {
    for processor in processors {
        processor.ready_queue.lock().retain(|&queued| queued != tid);
    }
}

/// The concurrency core: processors, processes, and tasks under one owner.
pub struct KernelScheduler {
    /// Registry of live processes. Lock ordering: this lock first, then a
    /// process's inner lock, then the task table, then ready-queue locks.
    pub(crate) processes: Mutex<Vec<Arc<Process>>>,

    /// Slot table of all live tasks.
    pub(crate) tasks: Mutex<TaskTable>,

    pub(crate) processors: Vec<Processor>,

    /// Round-robin cursor for cross-CPU placement.
    placement_cursor: usize,

    next_pid: Pid,
}

impl KernelScheduler {
    /// Builds the processor set, the kernel process (pid 0), and one idle
    /// task per processor, each with a kernel stack from the memory
    /// collaborator.
    ///
    /// The idle contexts start with a zero entry address; the embedding
    /// kernel stores the real idle loop via
    /// [`KernelScheduler::save_task_context`] before starting the first
    /// processor.
    pub fn new<P: Platform>(platform: &mut P, cpu_count: usize) -> KernelResult<KernelScheduler> {
        assert!(cpu_count >= 1, "at least the bootstrap processor is required");

        let kernel_process = Arc::new(Process::new(KERNEL_PID, KERNEL_PID, 0));
        let mut scheduler = KernelScheduler {
            processes: Mutex::new(Vec::new()),
            tasks: Mutex::new(TaskTable::new()),
            processors: Vec::new(),
            placement_cursor: 0,
            next_pid: 1,
        };
        scheduler.processes.lock().push(kernel_process.clone());

        for _cpu in 0..cpu_count {
            let stack = platform
                .allocate_kernel_stack()
                .ok_or(KernelError::OutOfMemory)?;
            let context = SavedContext::kernel_entry(0, stack.top());
            let mut idle = Task::new(kernel_process.clone(), context, stack);
            idle.is_idle = true;
            let tid = scheduler.tasks.lock().insert(idle)?;
            kernel_process.inner().tasks.push(tid);
            scheduler.processors.push(Processor {
                ready_queue: Mutex::new(VecDeque::new()),
                current_task: None,
                idle_task: tid,
                preemption_disabled: 0,
                sched_idle: false,
                enabled: true,
                tick_count: 0,
            });
        }
        Ok(scheduler)
    }

    pub fn cpu_count(&self) -> usize {
        self.processors.len()
    }

    /// Creates a process and its first task with an initial user-mode
    /// context, then schedules it.
    pub fn spawn_process<P: Platform>(
        &mut self,
        platform: &mut P,
        entry: u64,
        parent: Pid,
        pgid: Pgid,
    ) -> KernelResult<Pid> {
        let mut hw = IrqGuard::new(platform);
        let stack = hw.allocate_kernel_stack().ok_or(KernelError::OutOfMemory)?;
        let pid = self.next_pid;
        let process = Arc::new(Process::new(pid, parent, pgid));
        let context = SavedContext::user_entry(entry, stack.top());
        let task = Task::new(process.clone(), context, stack);
        let tid = match self.tasks.lock().insert(task) {
            Ok(tid) => tid,
            Err(err) => {
                hw.release_kernel_stack(stack);
                return Err(err);
            }
        };
        self.next_pid += 1;
        process.inner().tasks.push(tid);
        self.processes.lock().push(process);
        debug!(target: "task", "spawned pid {} (task {}) entry {:#x}", pid, tid, entry);
        self.place(&mut *hw, None, tid);
        Ok(pid)
    }

    /// Adds a task to an existing process and schedules it.
    pub fn spawn_thread<P: Platform>(
        &mut self,
        platform: &mut P,
        pid: Pid,
        entry: u64,
    ) -> KernelResult<TaskId> {
        let mut hw = IrqGuard::new(platform);
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;
        let stack = hw.allocate_kernel_stack().ok_or(KernelError::OutOfMemory)?;
        let context = SavedContext::user_entry(entry, stack.top());
        let task = Task::new(process.clone(), context, stack);
        let tid = match self.tasks.lock().insert(task) {
            Ok(tid) => tid,
            Err(err) => {
                hw.release_kernel_stack(stack);
                return Err(err);
            }
        };
        process.inner().tasks.push(tid);
        debug!(target: "task", "spawned task {} in pid {} entry {:#x}", tid, pid, entry);
        self.place(&mut *hw, None, tid);
        Ok(tid)
    }

    /// Normal exit of the task running on `cpu`. The caller must reschedule
    /// afterwards; the task is never selected again.
    pub fn exit_current<P: Platform>(&mut self, platform: &mut P, cpu: CpuId, code: i32) {
        let mut hw = IrqGuard::new(platform);
        let tid = self.processors[cpu]
            .current_task
            .take()
            .expect("exit_current with no current task");
        remove_from_ready_queues(&self.processors, tid);
        let (pid, parent, pgid) = {
            let mut tasks = self.tasks.lock();
            let task = tasks.get_mut(tid).expect("current task missing from table");
            debug_assert!(!task.is_idle, "the idle task must never exit");
            task.state = TaskState::Exiting;
            task.context_valid = false;
            task.blocking = None;
            (task.process.pid, task.process.parent, task.process.pgid)
        };
        hw.enqueue_notification(
            parent,
            ChildEvent {
                pid,
                pgid,
                kind: ChildEventKind::Exited(code),
            },
        );
        debug!(target: "task", "task {} (pid {}) exited with code {}", tid, pid, code);
    }

    /// Parent acknowledgment: destroys the process's `Exiting` tasks,
    /// returns their kernel stacks, and drops the process once no task is
    /// left.
    pub fn reap<P: Platform>(&mut self, platform: &mut P, pid: Pid) -> KernelResult<()> {
        let mut hw = IrqGuard::new(platform);
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess)?;

        let mut inner = process.inner();
        let mut survivors = Vec::new();
        let mut reclaimed: Vec<StackRegion> = Vec::new();
        {
            let mut tasks = self.tasks.lock();
            for &tid in inner.tasks.iter() {
                let exiting = tasks
                    .get(tid)
                    .map(|t| t.state == TaskState::Exiting)
                    .unwrap_or(false);
                if exiting {
                    if let Some(task) = tasks.remove(tid) {
                        reclaimed.push(task.kernel_stack);
                    }
                } else {
                    survivors.push(tid);
                }
            }
        }
        inner.tasks = survivors;
        let empty = inner.tasks.is_empty();
        drop(inner);

        for stack in reclaimed {
            hw.release_kernel_stack(stack);
        }
        if empty {
            self.processes.lock().retain(|p| p.pid != pid);
            debug!(target: "task", "reaped pid {}", pid);
        }
        Ok(())
    }

    /// Voluntary yield: demotes the current task to `Ready`. It stays on the
    /// ready queue, so it will be considered again after its queue peers.
    pub fn yield_current<P: Platform>(&mut self, platform: &mut P, cpu: CpuId) {
        let _hw = IrqGuard::new(platform);
        if let Some(tid) = self.processors[cpu].current_task {
            let mut tasks = self.tasks.lock();
            if let Some(task) = tasks.get_mut(tid) {
                if task.state == TaskState::Running {
                    task.state = TaskState::Ready;
                }
            }
        }
    }

    /// Timer-tick accounting: burns one tick of the current task's quantum.
    /// Called from the timer interrupt, where interrupts are already
    /// disabled.
    pub fn timer_tick(&mut self, cpu: CpuId) {
        self.processors[cpu].tick_count += 1;
        if let Some(tid) = self.processors[cpu].current_task {
            let mut tasks = self.tasks.lock();
            if let Some(task) = tasks.get_mut(tid) {
                task.remaining_ticks = task.remaining_ticks.saturating_sub(1);
            }
        }
    }

    /// The only source of involuntary preemption: reschedules when the
    /// current quantum is exhausted and preemption is not suppressed.
    /// Returns the newly chosen task, or `None` when no preemption was due.
    pub fn maybe_yield<P: Platform>(&mut self, platform: &mut P, cpu: CpuId) -> Option<TaskId> {
        if self.processors[cpu].preemption_disabled > 0 {
            return None;
        }
        let expired = match self.processors[cpu].current_task {
            Some(tid) => self
                .tasks
                .lock()
                .get(tid)
                .map(|t| t.remaining_ticks == 0)
                .unwrap_or(true),
            None => true,
        };
        if !expired {
            return None;
        }
        Some(self.run_next(platform, cpu))
    }

    pub fn preempt_disable(&mut self, cpu: CpuId) {
        self.processors[cpu].preemption_disabled += 1;
    }

    pub fn preempt_enable(&mut self, cpu: CpuId) {
        let processor = &mut self.processors[cpu];
        assert!(
            processor.preemption_disabled > 0,
            "preempt_enable without matching preempt_disable"
        );
        processor.preemption_disabled -= 1;
    }

    /// Marks a processor (in)eligible for task placement. The bootstrap
    /// processor stays enabled so placement always terminates.
    pub fn set_processor_enabled(&mut self, cpu: CpuId, enabled: bool) {
        assert!(
            enabled || cpu != BOOTSTRAP_CPU,
            "the bootstrap processor cannot be disabled"
        );
        self.processors[cpu].enabled = enabled;
    }

    /// Queues a `Ready` task for execution, placing it round-robin over the
    /// enabled processors. `caller` is the processor the call executes on;
    /// a remote idle target is poked with an IPI so it reschedules promptly.
    pub fn add_task<P: Platform>(&mut self, platform: &mut P, caller: CpuId, task: TaskId) {
        let mut hw = IrqGuard::new(platform);
        self.place(&mut *hw, Some(caller), task);
    }

    /// Placement core; `caller == None` for contexts with no processor
    /// identity (spawn paths).
    pub(crate) fn place<P: Platform>(
        &mut self,
        platform: &mut P,
        caller: Option<CpuId>,
        task: TaskId,
    ) {
        let count = self.processors.len();
        let mut target = self.placement_cursor % count;
        // The bootstrap processor is always enabled, so this terminates.
        while !self.processors[target].enabled {
            target = (target + 1) % count;
        }
        self.placement_cursor = target + 1;

        self.processors[target].ready_queue.lock().push_back(task);
        trace!(target: "sched", "task {} placed on cpu {}", task, target);

        if self.processors[target].sched_idle && caller != Some(target) {
            platform.send_reschedule_ipi(target);
            trace!(target: "sched", "reschedule ipi to idle cpu {}", target);
        }
    }

    /// The reschedule entry point: selects the next task for `cpu`, gives
    /// the signal machine its pre-run check, and marks the selection
    /// `Running`. Returns the resumption decision; pair with
    /// [`KernelScheduler::reschedule`] to actually transfer control.
    pub fn run_next<P: Platform>(&mut self, platform: &mut P, cpu: CpuId) -> TaskId {
        let mut hw = IrqGuard::new(platform);

        // The previously running task loses the CPU but keeps its queue
        // slot; round-robin will come back to it. A self-directed handler
        // dispatch moves the current task back into the pre-run signal
        // window, so that state demotes too.
        if let Some(prev) = self.processors[cpu].current_task.take() {
            let mut tasks = self.tasks.lock();
            if let Some(task) = tasks.get_mut(prev) {
                if matches!(
                    task.state,
                    TaskState::Running | TaskState::RunningInterruptible
                ) {
                    task.state = TaskState::Ready;
                }
            }
        }

        // Poll every parked task once per reschedule attempt; this is what
        // makes lost wakeups impossible.
        self.wake_waiting_tasks(&mut *hw, cpu);

        let chosen = loop {
            // Step 1: rotate the ready queue head to the tail and take it,
            // or fall back to the idle task.
            let popped = {
                let mut queue = self.processors[cpu].ready_queue.lock();
                let head = queue.pop_front();
                if let Some(tid) = head {
                    queue.push_back(tid);
                }
                head
            };
            let tid = match popped {
                Some(tid) => {
                    self.processors[cpu].sched_idle = false;
                    tid
                }
                None => {
                    self.processors[cpu].sched_idle = true;
                    self.processors[cpu].idle_task
                }
            };

            // Step 2: fresh quantum, then open the signal window unless the
            // signal-forced unblock path already claimed a check-free pass.
            {
                let mut tasks = self.tasks.lock();
                let task = tasks.get_mut(tid).expect("selected task missing from table");
                task.remaining_ticks = TIME_QUANTUM_TICKS;
                match task.state {
                    TaskState::Ready => task.state = TaskState::RunningInterruptible,
                    // Already inside the signal window: redirected into a
                    // handler while still queued, or holding the one
                    // check-free pass from a signal-forced unblock.
                    TaskState::RunningInterruptible | TaskState::RunningUninterruptible => {}
                    state => debug_assert!(
                        false,
                        "task {} selected in unschedulable state {:?}",
                        tid, state
                    ),
                }
            }

            // Step 3: drain deliverable signals in ascending order. Each
            // delivery may redirect the context or change the state.
            loop {
                let deliverable = {
                    let tasks = self.tasks.lock();
                    match tasks.get(tid) {
                        Some(task) if task.state == TaskState::RunningInterruptible => {
                            task.next_deliverable_signal()
                        }
                        _ => None,
                    }
                };
                match deliverable {
                    Some(signo) => self.deliver(&mut *hw, tid, signo),
                    None => break,
                }
            }

            // Step 4: delivery may have stopped, parked, or killed the
            // candidate; if so it has already left the queue, pick again.
            let runnable = self
                .tasks
                .lock()
                .get(tid)
                .map(Task::is_runnable)
                .unwrap_or(false);
            if runnable {
                break tid;
            }
        };

        // Step 5: the resumption decision.
        {
            let mut tasks = self.tasks.lock();
            let task = tasks.get_mut(chosen).expect("chosen task missing from table");
            debug_assert!(task.context_valid, "resuming task {} with invalid context", chosen);
            task.state = TaskState::Running;
        }
        self.processors[cpu].current_task = Some(chosen);
        trace!(target: "sched", "cpu {} runs task {}", cpu, chosen);
        chosen
    }

    /// Selects the next task and transfers control to it. Does not return.
    pub fn reschedule<P: Platform>(&mut self, platform: &mut P, cpu: CpuId) -> ! {
        let chosen = self.run_next(platform, cpu);
        platform.run(chosen)
    }

    // Introspection used by the embedding kernel's syscall layer and by the
    // test suite. All read-only except the context/FPU stores, which the
    // architecture layer uses to park trap state on the task.

    pub fn current_task(&self, cpu: CpuId) -> Option<TaskId> {
        self.processors[cpu].current_task
    }

    pub fn idle_task(&self, cpu: CpuId) -> TaskId {
        self.processors[cpu].idle_task
    }

    pub fn sched_idle(&self, cpu: CpuId) -> bool {
        self.processors[cpu].sched_idle
    }

    pub fn processor_enabled(&self, cpu: CpuId) -> bool {
        self.processors[cpu].enabled
    }

    pub fn tick_count(&self, cpu: CpuId) -> u64 {
        self.processors[cpu].tick_count
    }

    /// Snapshot of a processor's ready queue, front first.
    pub fn ready_tasks(&self, cpu: CpuId) -> Vec<TaskId> {
        self.processors[cpu].ready_queue.lock().iter().copied().collect()
    }

    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        self.tasks.lock().get(task).map(|t| t.state)
    }

    pub fn remaining_ticks(&self, task: TaskId) -> Option<u32> {
        self.tasks.lock().get(task).map(|t| t.remaining_ticks)
    }

    pub fn task_context(&self, task: TaskId) -> Option<SavedContext> {
        self.tasks.lock().get(task).map(|t| t.context)
    }

    /// Stores the context captured at trap time on the task. The mode bits
    /// decide whether the task now counts as executing in kernel mode.
    pub fn save_task_context(&mut self, task: TaskId, context: SavedContext) {
        let mut tasks = self.tasks.lock();
        if let Some(t) = tasks.get_mut(task) {
            t.in_kernel = !context.is_user_mode();
            t.context = context;
            t.context_valid = true;
        }
    }

    pub fn task_fpu(&self, task: TaskId) -> Option<FpuImage> {
        self.tasks.lock().get(task).map(|t| t.fpu)
    }

    pub fn save_task_fpu(&mut self, task: TaskId, image: FpuImage) {
        if let Some(t) = self.tasks.lock().get_mut(task) {
            t.fpu = image;
        }
    }

    pub fn task_signal_mask(&self, task: TaskId) -> Option<SigSet> {
        self.tasks.lock().get(task).map(|t| t.signal_mask)
    }

    pub fn pending_signals(&self, task: TaskId) -> Option<SigSet> {
        self.tasks.lock().get(task).map(|t| t.pending)
    }

    /// Number of signal frames currently placed for the task.
    pub fn frame_depth(&self, task: TaskId) -> usize {
        self.tasks.lock().get(task).map(|t| t.frames.len()).unwrap_or(0)
    }

    pub fn pid_of_task(&self, task: TaskId) -> Option<Pid> {
        self.tasks.lock().get(task).map(|t| t.process.pid)
    }

    /// Looks up a live process by pid.
    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.lock().iter().find(|p| p.pid == pid).cloned()
    }
}
