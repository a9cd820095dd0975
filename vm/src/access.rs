//! The access-type enum `translate` is checked against (spec.md §6,
//! mirroring `examples/original_source/cpen212vm.h`'s `access_type_t`).

/// The kind of access being attempted in a call to [`crate::VmSystem::translate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Access {
    /// Instruction fetch.
    Exec,
    /// Data read.
    Read,
    /// Data write.
    Write,
}
