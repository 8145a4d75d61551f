//! Tuning and ABI constants shared across the concurrency core.
//!
//! Everything here is a contract with either the architecture layer (frame
//! geometry, syscall entry width) or with userland (signal numbering, stack
//! minima). Integration tests pin these values; change them deliberately.

/// Timer ticks a task may consume before `maybe_yield` preempts it.
pub const TIME_QUANTUM_TICKS: u32 = 5;

/// Exclusive upper bound of valid signal numbers; valid signals are `1..NSIG`.
pub const NSIG: u8 = 32;

/// Required alignment for every save area carved out of a task stack.
pub const STACK_ALIGNMENT: u64 = 16;

/// Bytes left untouched below an interrupted stack pointer before any save
/// area is placed. Leaf functions may keep live data there.
pub const RED_ZONE_SIZE: u64 = 128;

/// Width in bytes of the system-call-entry instruction. Syscall restart
/// rewinds the saved instruction pointer by exactly this amount.
pub const SYSCALL_INSN_LEN: u64 = 2;

/// Size of the floating-point register image saved around handler dispatch.
pub const FPU_IMAGE_SIZE: usize = 512;

/// Size of the saved general-register record as placed on a signal frame.
pub const CONTEXT_RECORD_SIZE: u64 = 256;

/// Size of the siginfo record as placed on a signal frame.
pub const SIGINFO_RECORD_SIZE: u64 = 48;

/// Smallest alternate signal stack a process may install.
pub const MIN_ALT_STACK_SIZE: u64 = 2048;

/// Suggested alternate signal stack size for ordinary handlers.
pub const DEFAULT_ALT_STACK_SIZE: u64 = 8192;

/// Kernel stack size requested from the memory collaborator per task.
pub const KERNEL_STACK_SIZE: u64 = 64 * 1024;
