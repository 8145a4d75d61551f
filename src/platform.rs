//! Interfaces the core consumes from subsystems outside its scope.
//!
//! The scheduler and signal machine are generic over one [`Platform`] bound;
//! predicates only ever take `&P` (polling must stay read-only), mutating
//! paths take `&mut P`. The kernel proper implements these traits over its
//! real subsystems, the test suite over an in-memory double.

use crate::arch::{HardwareOps, StackRegion};
use crate::task::{Pgid, Pid};

/// Clock selector for deadline-bearing waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockId {
    /// Monotonic tick count since boot; never steps.
    Monotonic,
    /// Wall-clock time; may step when adjusted.
    Realtime,
}

/// Handle of an open I/O resource, opaque to the core.
pub type ResourceId = u32;

/// Handle of a socket-like resource with a connect phase.
pub type SocketId = u32;

/// Time source consumed by every deadline predicate.
pub trait Clock {
    /// Current time of `clock` in timer ticks.
    fn now(&self, clock: ClockId) -> u64;
}

/// Readiness queries answered by the filesystem layer.
pub trait IoReadiness {
    /// True when a read of `resource` would not block.
    fn is_readable(&self, resource: ResourceId) -> bool;

    /// True when a write to `resource` would not block.
    fn is_writable(&self, resource: ResourceId) -> bool;

    /// True when `resource` has an exceptional condition pending.
    fn is_exceptional(&self, resource: ResourceId) -> bool;

    /// True once `socket` has completed its connect handshake.
    fn is_connected(&self, socket: SocketId) -> bool;
}

/// What a child-state notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildEventKind {
    /// Normal exit carrying the status code.
    Exited(i32),
    /// Terminated by the given signal before completing.
    Interrupted(u8),
    /// Stopped by the given signal.
    Stopped(u8),
    /// Resumed by a continue signal.
    Continued,
}

/// One queued child-state notification, observed by `WaitPid` waiters.
///
/// Carries the child's process group so group-selective waiters can be
/// matched without a process-table lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildEvent {
    pub pid: Pid,
    pub pgid: Pgid,
    pub kind: ChildEventKind,
}

/// Selector for which children a waiter cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitTarget {
    /// Any child of the waiting process.
    AnyChild,
    /// Exactly the child with this pid.
    Child(Pid),
    /// Any child inside this process group.
    Group(Pgid),
}

impl WaitTarget {
    /// Decodes the conventional `waitpid` pid argument.
    ///
    /// `-1` selects any child, `< -1` the process group `-arg`, `> 0` one
    /// specific child, and `0` the caller's own process group.
    pub fn from_pid_arg(arg: i64, caller_pgid: Pgid) -> WaitTarget {
        if arg == -1 {
            WaitTarget::AnyChild
        } else if arg < -1 {
            WaitTarget::Group((-arg) as Pgid)
        } else if arg == 0 {
            WaitTarget::Group(caller_pgid)
        } else {
            WaitTarget::Child(arg as Pid)
        }
    }
}

/// Child-notification queue maintained by the process-lifecycle layer.
pub trait ChildEvents {
    /// Appends `event` to `parent`'s notification queue.
    fn enqueue_notification(&mut self, parent: Pid, event: ChildEvent);

    /// Count of notifications queued for `parent` that match `target`.
    ///
    /// This is a count, not a claim: a waiter woken on a nonzero count can
    /// still lose the notification to a competing waiter and must retry.
    fn notification_count_for(&self, parent: Pid, target: WaitTarget) -> usize;
}

/// Kernel-stack provider backed by the memory collaborator.
pub trait StackProvider {
    /// Hands out a fresh kernel stack for a new task, or `None` when memory
    /// is exhausted.
    fn allocate_kernel_stack(&mut self) -> Option<StackRegion>;

    /// Returns a stack obtained from [`StackProvider::allocate_kernel_stack`]
    /// once its task has been reaped.
    fn release_kernel_stack(&mut self, region: StackRegion);
}

/// Everything the core needs from its surroundings, as one bound.
pub trait Platform: HardwareOps + Clock + IoReadiness + ChildEvents + StackProvider {}

impl<T: HardwareOps + Clock + IoReadiness + ChildEvents + StackProvider> Platform for T {}
