//! Hardware abstraction boundary.
//!
//! Value types the architecture layer exchanges with the core, plus the
//! [`HardwareOps`] collaborator trait everything hardware-shaped goes
//! through.

mod context;
mod ops;

pub use context::{
    AddressSpaceId, CpuId, FpuImage, SavedContext, StackRegion, DEFAULT_CONTEXT_FLAGS,
    GENERAL_REG_COUNT, KERNEL_MODE_BITS, USER_MODE_BITS,
};
pub use ops::{HardwareOps, IrqGuard};
