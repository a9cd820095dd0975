//! The error taxonomy of spec.md §7, plus two construction-time variants
//! the reference implementation didn't need because it silently ignored
//! the cases they cover (spec.md §9, bugs #4-#5).

use thiserror::Error;
use vm_alloc::SwapError;

/// Every way a [`crate::VmSystem`] operation can fail.
///
/// On any `Err` return, the instance is left in its pre-call state: a frame
/// taken from the free list for a step that later failed is returned to the
/// free list, and a swap slot reserved for an eviction that didn't complete
/// is released (spec.md §7).
#[derive(Debug, Error)]
pub enum Error {
    /// The virtual address, address space, or page-table entry does not
    /// exist.
    #[error("no such virtual address, address space, or page-table entry")]
    BadAddr,
    /// The entry exists but the requested access mode or privilege level is
    /// denied.
    #[error("access denied by page permissions")]
    BadPerm,
    /// A mapping already exists where one was being created.
    #[error("a mapping already exists for this address")]
    Duplicate,
    /// No physical frame or swap slot could be made available, even after
    /// attempting eviction.
    #[error("out of physical memory and swap")]
    OutOfMemory,
    /// A swap read or write returned a short count or an OS error.
    #[error("swap I/O failed: {0}")]
    IoError(#[from] std::io::Error),
    /// `num_phys_pages` or `num_swap_pages` fell outside the contractual
    /// range (spec.md §6).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// `size_of::<Instance>()` would not fit in one physical frame
    /// (spec.md §9, bug #5). Kept as a reachable error rather than a panic
    /// even though the fixed 512-entry ASID table can never trigger it
    /// today; see the compile-time assertion in `instance`.
    #[error("instance metadata does not fit in one physical frame")]
    MetadataTooLarge,
}

impl From<SwapError> for Error {
    fn from(e: SwapError) -> Self {
        match e {
            SwapError::NoFreeSlot => Self::OutOfMemory,
            SwapError::Io(io) => Self::IoError(io),
        }
    }
}
