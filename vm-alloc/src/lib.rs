//! # Frame Allocation and Swap I/O
//!
//! This crate owns the two pieces of the virtual-memory subsystem that
//! manage raw storage rather than page-table structure: the intrusive
//! free-list frame allocator ([`FreeListAllocator`]) and the swap-slot
//! bitmap plus file I/O ([`SwapManager`]).
//!
//! [`FreeListAllocator`] implements `vm_pagetable::FrameAlloc`, the same
//! inversion the teacher crate uses between `kernel_vmem::FrameAlloc` and
//! `kernel_alloc::BitmapFrameAlloc` — the walker crate defines the trait,
//! this crate provides an implementation, and the top-level `vm` crate is
//! the only place both are in scope together with the eviction policy that
//! needs them.

#![forbid(unsafe_code)]

mod frame_alloc;
mod swap;

pub use frame_alloc::FreeListAllocator;
pub use swap::{SwapBackend, SwapError, SwapManager};
