//! The hardware collaborator trait and the interrupt bracket built on it.
//!
//! Everything the core needs from a real CPU goes through [`HardwareOps`];
//! nothing else in the crate contains architecture knowledge. Tests drive the
//! core with an in-memory implementation, the kernel proper with one backed
//! by trap frames and inline assembly.

use core::ops::{Deref, DerefMut};

use crate::arch::context::{AddressSpaceId, CpuId, SavedContext};
use crate::signal::SignalFrame;
use crate::task::TaskId;

/// Operations the architecture layer provides to the concurrency core.
pub trait HardwareOps {
    /// Captures the live register state of the executing CPU into `ctx`.
    fn save_context(&mut self, ctx: &mut SavedContext);

    /// Stages `ctx` as the register state the current CPU returns into.
    fn restore_context(&mut self, ctx: &SavedContext);

    /// Makes `space` the active address space on the executing CPU.
    fn switch_address_space(&mut self, space: AddressSpaceId);

    /// Resumes `task`'s saved context. Does not return: the CPU leaves
    /// kernel scheduling code and continues inside the task.
    fn run(&mut self, task: TaskId) -> !;

    /// Masks interrupt delivery on the executing CPU.
    fn disable_interrupts(&mut self);

    /// Unmasks interrupt delivery on the executing CPU.
    fn enable_interrupts(&mut self);

    /// True when the executing CPU currently accepts interrupts.
    fn interrupts_enabled(&self) -> bool;

    /// Writes a fully built signal frame into the task's stack memory at the
    /// addresses the frame prescribes.
    fn place_signal_frame(&mut self, task: TaskId, frame: &SignalFrame);

    /// Pokes `cpu` with an inter-processor interrupt so it reschedules
    /// promptly instead of waiting for its next timer tick.
    fn send_reschedule_ipi(&mut self, cpu: CpuId);

    /// Emits a diagnostic stack trace for `task` (dump-requesting fatal
    /// signals). Best effort; must not fail.
    fn dump_stack_trace(&mut self, task: TaskId);
}

/// RAII interrupt-disable bracket.
///
/// Records whether delivery was enabled on entry and restores exactly that
/// state on drop, so brackets nest correctly: only the outermost one
/// re-enables delivery.
///
/// Derefs to the wrapped collaborator, so hardware (and platform) calls stay
/// available inside the bracket.
pub struct IrqGuard<'a, H: HardwareOps + ?Sized> {
    hw: &'a mut H,
    was_enabled: bool,
}

impl<'a, H: HardwareOps + ?Sized> IrqGuard<'a, H> {
    /// Disables interrupt delivery and remembers the prior state.
    pub fn new(hw: &'a mut H) -> Self {
        let was_enabled = hw.interrupts_enabled();
        hw.disable_interrupts();
        IrqGuard { hw, was_enabled }
    }
}

impl<H: HardwareOps + ?Sized> Drop for IrqGuard<'_, H> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.hw.enable_interrupts();
        }
    }
}

impl<H: HardwareOps + ?Sized> Deref for IrqGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.hw
    }
}

impl<H: HardwareOps + ?Sized> DerefMut for IrqGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.hw
    }
}
