//! # Two-Level Virtual Memory
//!
//! A software model of a virtual-memory subsystem over a caller-owned
//! physical memory region: two-level page tables, a free-list frame
//! allocator, an optional file-backed swap area, and an address-space
//! registry of up to 512 simultaneously active spaces.
//!
//! This crate (C4, C6, C7 of the component breakdown) is the only place the
//! page-table walker ([`vm_pagetable`]) and the frame/swap allocators
//! ([`vm_alloc`]) are both in scope, because the eviction policy needs to
//! drive both at once: pick a victim PTE by walking active address spaces,
//! write its frame to a fresh swap slot, then free the frame.
//!
//! ```
//! use vm::{Access, VmSystem};
//! use vm_pagetable::PagePerm;
//!
//! let mut physmem = vec![0u8; 4096 * 8];
//! let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
//!
//! let pt = vm.new_addr_space(0).unwrap();
//! let va = 0x0040_3000u32.into();
//! vm.map_page(pt, va, PagePerm::READ | PagePerm::WRITE | PagePerm::USER)
//!     .unwrap();
//!
//! let pa = vm.translate(pt, 0x0040_3ABCu32.into(), Access::Read, true).unwrap();
//! assert_eq!(pa.as_u32() & 0xFFF, 0xABC);
//! ```

#![forbid(unsafe_code)]

mod access;
mod config;
mod error;
mod eviction;
mod instance;
mod system;

pub use access::Access;
pub use error::Error;
pub use system::VmSystem;

pub use vm_addresses::{PhysAddr, VirtAddr};
pub use vm_pagetable::PagePerm;
