//! In-memory platform double driving the concurrency core in tests.
//!
//! Records everything the core asks the outside world to do (placed signal
//! frames, IPIs, child notifications, stack traces, stack hand-outs) and
//! lets tests script readiness and clock state.

#![allow(dead_code)]

use std::collections::BTreeSet;

use vireo_kernel::arch::{AddressSpaceId, CpuId, HardwareOps, SavedContext, StackRegion};
use vireo_kernel::config::KERNEL_STACK_SIZE;
use vireo_kernel::platform::{
    ChildEvent, ChildEvents, Clock, ClockId, IoReadiness, ResourceId, SocketId, StackProvider,
    WaitTarget,
};
use vireo_kernel::signal::SignalFrame;
use vireo_kernel::task::{Pid, TaskId};

pub struct TestPlatform {
    /// Interrupt-delivery state. Starts disabled, as on a booting CPU, so
    /// blocking-path preconditions hold without ceremony.
    pub interrupts: bool,
    pub monotonic: u64,
    pub realtime: u64,
    pub readable: BTreeSet<ResourceId>,
    pub writable: BTreeSet<ResourceId>,
    pub exceptional: BTreeSet<ResourceId>,
    pub connected: BTreeSet<SocketId>,
    /// Child notifications as enqueued: (parent, event).
    pub notifications: Vec<(Pid, ChildEvent)>,
    pub placed_frames: Vec<(TaskId, SignalFrame)>,
    pub ipis: Vec<CpuId>,
    pub stack_traces: Vec<TaskId>,
    pub released_stacks: Vec<StackRegion>,
    next_stack_base: u64,
}

impl TestPlatform {
    pub fn new() -> TestPlatform {
        TestPlatform {
            interrupts: false,
            monotonic: 0,
            realtime: 1_000_000,
            readable: BTreeSet::new(),
            writable: BTreeSet::new(),
            exceptional: BTreeSet::new(),
            connected: BTreeSet::new(),
            notifications: Vec::new(),
            placed_frames: Vec::new(),
            ipis: Vec::new(),
            stack_traces: Vec::new(),
            released_stacks: Vec::new(),
            next_stack_base: 0x0100_0000,
        }
    }

    /// Moves both clocks forward.
    pub fn advance(&mut self, ticks: u64) {
        self.monotonic += ticks;
        self.realtime += ticks;
    }

    /// Events enqueued for `parent`, in send order.
    pub fn events_for(&self, parent: Pid) -> Vec<ChildEvent> {
        self.notifications
            .iter()
            .filter(|(p, _)| *p == parent)
            .map(|(_, e)| *e)
            .collect()
    }
}

impl HardwareOps for TestPlatform {
    fn save_context(&mut self, _ctx: &mut SavedContext) {}

    fn restore_context(&mut self, _ctx: &SavedContext) {}

    fn switch_address_space(&mut self, _space: AddressSpaceId) {}

    fn run(&mut self, task: TaskId) -> ! {
        panic!("TestPlatform::run({}) called; tests drive run_next directly", task);
    }

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    fn place_signal_frame(&mut self, task: TaskId, frame: &SignalFrame) {
        self.placed_frames.push((task, frame.clone()));
    }

    fn send_reschedule_ipi(&mut self, cpu: CpuId) {
        self.ipis.push(cpu);
    }

    fn dump_stack_trace(&mut self, task: TaskId) {
        self.stack_traces.push(task);
    }
}

impl Clock for TestPlatform {
    fn now(&self, clock: ClockId) -> u64 {
        match clock {
            ClockId::Monotonic => self.monotonic,
            ClockId::Realtime => self.realtime,
        }
    }
}

impl IoReadiness for TestPlatform {
    fn is_readable(&self, resource: ResourceId) -> bool {
        self.readable.contains(&resource)
    }

    fn is_writable(&self, resource: ResourceId) -> bool {
        self.writable.contains(&resource)
    }

    fn is_exceptional(&self, resource: ResourceId) -> bool {
        self.exceptional.contains(&resource)
    }

    fn is_connected(&self, socket: SocketId) -> bool {
        self.connected.contains(&socket)
    }
}

impl ChildEvents for TestPlatform {
    fn enqueue_notification(&mut self, parent: Pid, event: ChildEvent) {
        self.notifications.push((parent, event));
    }

    fn notification_count_for(&self, parent: Pid, target: WaitTarget) -> usize {
        self.notifications
            .iter()
            .filter(|(p, event)| {
                *p == parent
                    && match target {
                        WaitTarget::AnyChild => true,
                        WaitTarget::Child(pid) => event.pid == pid,
                        WaitTarget::Group(pgid) => event.pgid == pgid,
                    }
            })
            .count()
    }
}

/// Builds a scheduler over a fresh platform double.
pub fn boot(cpus: usize) -> (TestPlatform, vireo_kernel::KernelScheduler) {
    let mut platform = TestPlatform::new();
    let scheduler = vireo_kernel::KernelScheduler::new(&mut platform, cpus)
        .expect("scheduler construction must succeed with stacks available");
    (platform, scheduler)
}

/// Spawns a process with parent pid 0 and returns its pid and first task.
pub fn spawn(
    platform: &mut TestPlatform,
    scheduler: &mut vireo_kernel::KernelScheduler,
    entry: u64,
    pgid: u32,
) -> (Pid, TaskId) {
    let pid = scheduler
        .spawn_process(platform, entry, 0, pgid)
        .expect("spawn must succeed with stacks available");
    let tid = scheduler
        .process(pid)
        .expect("spawned process must be registered")
        .first_task()
        .expect("spawned process must own a task");
    (pid, tid)
}

impl StackProvider for TestPlatform {
    fn allocate_kernel_stack(&mut self) -> Option<StackRegion> {
        let region = StackRegion {
            base: self.next_stack_base,
            size: KERNEL_STACK_SIZE,
        };
        // Guard page between consecutive stacks.
        self.next_stack_base += KERNEL_STACK_SIZE + 0x1000;
        Some(region)
    }

    fn release_kernel_stack(&mut self, region: StackRegion) {
        self.released_stacks.push(region);
    }
}
