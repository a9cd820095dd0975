//! # Two-Level Page Table Entries and Walker
//!
//! This crate owns the parts of the virtual-memory subsystem that only need
//! to know about bit layouts and the shape of the table tree (spec.md
//! components C1 and C5): the L1/L2 entry encodings, the permission flags
//! requested at `map_page` time, and the [`walk`] function that follows a
//! top-level table address down to an L2 entry, optionally materializing
//! the L2 table along the way.
//!
//! It deliberately knows nothing about *where frames come from* — that is
//! the [`FrameAlloc`] trait, implemented elsewhere (`vm-alloc`), and nothing
//! about address spaces, eviction, or swap, which live in the top-level `vm`
//! crate where both the walker and the allocator are already in scope.

#![forbid(unsafe_code)]

mod pte;
mod walker;

pub use pte::{L1Entry, L2Entry, PagePerm};
pub use walker::{walk, Walk, WalkError};

use vm_addresses::PhysAddr;

/// A minimal physical-frame source the walker can call on to materialize a
/// missing L2 table when asked to `map_page`.
///
/// Implemented by `vm_alloc::FrameAllocator`; kept here (rather than in
/// `vm-alloc`) so this crate has no dependency on the allocator crate, the
/// same inversion the teacher crate uses between `kernel-vmem::FrameAlloc`
/// and `kernel-alloc::BitmapFrameAlloc`.
pub trait FrameAlloc {
    /// Allocates one zeroed 4096-byte frame, returning its physical address.
    ///
    /// Returns `None` on exhaustion; the caller decides whether that maps to
    /// `OutOfMemory` or triggers eviction before retrying.
    fn alloc_zeroed_frame(&mut self, physmem: &mut [u8]) -> Option<PhysAddr>;
}
