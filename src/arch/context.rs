//! Context value types shared between the core and the architecture layer.
//!
//! The core never touches a real trap frame. It operates on [`SavedContext`],
//! a named-field record the architecture layer fills at interrupt or syscall
//! entry and consumes on the return path. Only the named fields are ever
//! inspected or written by the core; `general` travels verbatim.

use crate::config::FPU_IMAGE_SIZE;

/// Processor index within the scheduler's processor set.
pub type CpuId = usize;

/// Address-space identity (page-table root handle on most targets).
pub type AddressSpaceId = u64;

/// Flags value for a freshly built context: interrupt delivery enabled plus
/// the always-set reserved bit.
pub const DEFAULT_CONTEXT_FLAGS: u64 = (1 << 9) | (1 << 1);

/// Privilege bits of a user-mode context.
pub const USER_MODE_BITS: u64 = 0b11;

/// Privilege bits of a kernel-mode context.
pub const KERNEL_MODE_BITS: u64 = 0b00;

/// Count of opaque general-purpose slots carried in a saved context.
pub const GENERAL_REG_COUNT: usize = 12;

/// Snapshot of one task's CPU state.
///
/// Layout contract:
/// - The architecture layer owns the mapping between this record and its
///   real trap-frame layout and must keep it stable.
/// - The core reads/writes only the named fields; `general` is saved and
///   restored byte-for-byte.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavedContext {
    /// Instruction pointer this context resumes at.
    pub instruction_pointer: u64,
    /// Stack pointer active in this context.
    pub stack_pointer: u64,
    /// Processor flags word, restored verbatim on resume.
    pub flags: u64,
    /// Privilege/segment bits; distinguishes user from kernel contexts.
    pub mode_bits: u64,
    /// Return-value register; carries syscall results back to the caller.
    pub result: u64,
    /// System-call number captured at syscall entry. The return-value
    /// register is clobbered by the result, so restart logic re-arms the
    /// call from this field.
    pub syscall_number: u64,
    /// First three argument registers of the calling convention.
    pub args: [u64; 3],
    /// Remaining register file, opaque to the core.
    pub general: [u64; GENERAL_REG_COUNT],
}

impl SavedContext {
    /// Builds the initial context of a task entering user mode at `entry`.
    pub fn user_entry(entry: u64, stack_top: u64) -> Self {
        SavedContext {
            instruction_pointer: entry,
            stack_pointer: stack_top,
            flags: DEFAULT_CONTEXT_FLAGS,
            mode_bits: USER_MODE_BITS,
            ..SavedContext::default()
        }
    }

    /// Builds the initial context of a kernel-mode task (idle, kernel worker).
    pub fn kernel_entry(entry: u64, stack_top: u64) -> Self {
        SavedContext {
            instruction_pointer: entry,
            stack_pointer: stack_top,
            flags: DEFAULT_CONTEXT_FLAGS,
            mode_bits: KERNEL_MODE_BITS,
            ..SavedContext::default()
        }
    }

    /// True when this context was captured in user mode.
    pub fn is_user_mode(&self) -> bool {
        self.mode_bits & USER_MODE_BITS != 0
    }
}

/// Floating-point/SIMD register image, copied verbatim around handler
/// dispatch.
///
/// The hardware save instruction mandates 16-byte alignment; keep the
/// `repr` attribute in sync with [`crate::config::STACK_ALIGNMENT`].
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FpuImage(pub [u8; FPU_IMAGE_SIZE]);

impl FpuImage {
    /// Image of a freshly initialised FPU; the template new tasks start from.
    pub const fn initial() -> Self {
        FpuImage([0u8; FPU_IMAGE_SIZE])
    }
}

impl Default for FpuImage {
    fn default() -> Self {
        FpuImage::initial()
    }
}

/// Contiguous stack area owned by one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackRegion {
    /// Lowest address of the region.
    pub base: u64,
    /// Region length in bytes.
    pub size: u64,
}

impl StackRegion {
    /// One-past-the-end address; initial stack pointers start here.
    pub fn top(&self) -> u64 {
        self.base + self.size
    }

    /// True when `addr` lies inside the region.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.top()
    }
}
