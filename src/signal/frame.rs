//! Signal frame construction.
//!
//! Handler dispatch replaces a task's live context. Everything needed to
//! come back afterwards — the interrupted context, the floating-point image,
//! an optional siginfo record, and the trampoline that routes the handler's
//! return into the signal restorer — is assembled here as one value. The
//! hardware collaborator materializes it into task memory at the prescribed
//! addresses; the authoritative copy stays on the task so `signal_return`
//! can restore from it verbatim.

use crate::arch::{FpuImage, SavedContext};
use crate::config::{
    CONTEXT_RECORD_SIZE, FPU_IMAGE_SIZE, RED_ZONE_SIZE, SIGINFO_RECORD_SIZE, STACK_ALIGNMENT,
};
use crate::signal::types::{SigInfo, SigSet};

const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// One placed signal frame.
///
/// Layout invariants, from high addresses to low:
/// - `base_sp` is the interrupted stack pointer after any alternate-stack
///   redirection; the first `RED_ZONE_SIZE` bytes below it stay untouched.
/// - `context_addr` and `fpu_addr` are `STACK_ALIGNMENT`-aligned save areas
///   for `saved_context` and `fpu_image`, context above FPU.
/// - `siginfo_addr` (present only for `SIGINFO` handlers) is an aligned save
///   area below the FPU image.
/// - `trampoline_sp` is the aligned stack pointer the handler starts on: the
///   restorer's return address sits at `trampoline_sp`, the mask word to
///   reinstate at `trampoline_sp + 8`. The handler's return therefore pops
///   straight into the restorer, which finds the saved mask at its own stack
///   pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalFrame {
    pub base_sp: u64,
    pub saved_context: SavedContext,
    pub fpu_image: FpuImage,
    pub siginfo: Option<SigInfo>,
    /// Address the handler returns into (the signal restorer).
    pub return_address: u64,
    /// Mask to reinstate when the restorer unwinds this frame.
    pub saved_mask: SigSet,
    pub context_addr: u64,
    pub fpu_addr: u64,
    /// Valid only when `siginfo` is present.
    pub siginfo_addr: u64,
    pub trampoline_sp: u64,
}

impl SignalFrame {
    /// Carves the save areas below `base_sp` and binds the values to them.
    ///
    /// Returns `None` when `base_sp` is too small to hold the frame; the
    /// stack pointer of the interrupted context is user-controlled, so the
    /// subtraction chain must not wrap. Halts on arithmetic that would
    /// produce an unaligned save area; an unaligned area cannot be restored
    /// from and indicates a corrupted stack pointer.
    pub fn build(
        base_sp: u64,
        saved_context: SavedContext,
        fpu_image: FpuImage,
        siginfo: Option<SigInfo>,
        return_address: u64,
        saved_mask: SigSet,
    ) -> Option<SignalFrame> {
        // Step 1: skip the red zone the interrupted code may still use.
        let mut sp = base_sp.checked_sub(RED_ZONE_SIZE)?;

        // Step 2: context record, then the FPU image directly below it.
        sp = align_down(sp.checked_sub(CONTEXT_RECORD_SIZE)?, STACK_ALIGNMENT);
        let context_addr = sp;
        sp = align_down(sp.checked_sub(FPU_IMAGE_SIZE as u64)?, STACK_ALIGNMENT);
        let fpu_addr = sp;

        // Step 3: siginfo record, only when the handler asked for one.
        let mut siginfo_addr = 0;
        if siginfo.is_some() {
            sp = align_down(sp.checked_sub(SIGINFO_RECORD_SIZE)?, STACK_ALIGNMENT);
            siginfo_addr = sp;
        }

        // Step 4: trampoline frame. Return address at the final stack
        // pointer, mask word in the slot above it.
        let trampoline_sp = align_down(sp.checked_sub(2 * 8)?, STACK_ALIGNMENT);

        assert!(
            context_addr % STACK_ALIGNMENT == 0
                && fpu_addr % STACK_ALIGNMENT == 0
                && trampoline_sp % STACK_ALIGNMENT == 0,
            "signal frame save area misaligned below sp {:#x}",
            base_sp
        );

        Some(SignalFrame {
            base_sp,
            saved_context,
            fpu_image,
            siginfo,
            return_address,
            saved_mask,
            context_addr,
            fpu_addr,
            siginfo_addr,
            trampoline_sp,
        })
    }

    /// Stack pointer the handler starts executing on.
    pub fn handler_sp(&self) -> u64 {
        self.trampoline_sp
    }

    /// Address of the mask word inside the trampoline.
    pub fn mask_slot(&self) -> u64 {
        self.trampoline_sp + 8
    }

    /// Address of the placed siginfo record, or 0 for plain handlers.
    ///
    /// Passed to the handler as its second argument either way; plain
    /// handlers ignore it.
    pub fn siginfo_pointer(&self) -> u64 {
        if self.siginfo.is_some() {
            self.siginfo_addr
        } else {
            0
        }
    }

    /// Address of the placed context record, the handler's third argument.
    pub fn context_pointer(&self) -> u64 {
        self.context_addr
    }
}
