//! Page-table entry bit layout (spec.md §3, §4.1).
//!
//! Both table levels share one 32-bit word shape. L1 entries only ever use
//! the `present` bit and the address field; L2 entries use every bit. We
//! model them as two distinct `bitfield_struct` types rather than one, so
//! that accidentally calling `.readable()` on an L1 entry is a compile
//! error instead of a silently meaningless read.

use bitfield_struct::bitfield;
use vm_addresses::PhysAddr;

bitflags::bitflags! {
    /// The permission bits requested by `map_page` / checked by `translate`.
    ///
    /// These are the logical, caller-facing flags; [`L2Entry`] stores the
    /// same four bits packed into the raw PTE word.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct PagePerm: u8 {
        /// Readable by the requested privilege level.
        const READ  = 0b0001;
        /// Writable by the requested privilege level.
        const WRITE = 0b0010;
        /// Executable (instruction fetch allowed).
        const EXEC  = 0b0100;
        /// Accessible from user-level (CPL=3 equivalent) code.
        const USER  = 0b1000;
    }
}

/// Top-level (L1) page-table entry.
///
/// Only `present` and the physical address of the referenced L2 table are
/// meaningful; L1 entries are never swapped (spec.md §3).
#[bitfield(u32)]
pub struct L1Entry {
    /// Set if this entry names a live L2 table.
    pub present: bool,
    #[bits(11)]
    __unused: u16,
    /// Bits 12–31: page-aligned physical address of the L2 table.
    #[bits(20)]
    addr_bits: u32,
}

impl L1Entry {
    /// Builds a present L1 entry pointing at the page-aligned `addr`.
    ///
    /// Returns `None` if `addr` is not page-aligned — the spec requires PTE
    /// encoding to refuse misaligned addresses rather than silently
    /// truncating them (spec.md §4.1).
    #[must_use]
    pub fn mapped(addr: PhysAddr) -> Option<Self> {
        if !addr.is_page_aligned() {
            return None;
        }
        Some(Self::new().with_present(true).with_addr_bits(addr.as_u32() >> 12))
    }

    #[must_use]
    pub const fn table_addr(self) -> PhysAddr {
        PhysAddr::new(self.addr_bits() << 12)
    }
}

/// Second-level (L2) page-table entry.
///
/// When `present`, `phys_or_slot` holds bits 12–31 of the data frame's
/// physical address. When `allocated && !present`, it holds the swap slot
/// index the frame was evicted to.
#[bitfield(u32)]
pub struct L2Entry {
    pub present: bool,
    pub allocated: bool,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    #[bits(6)]
    __unused: u16,
    #[bits(20)]
    phys_or_slot: u32,
}

impl L2Entry {
    /// Builds a present, allocated data-page entry with the given permission
    /// bits, refusing non-page-aligned physical addresses (spec.md §4.1,
    /// the corrected encoding from spec.md §9 bug #1).
    #[must_use]
    pub fn mapped(addr: PhysAddr, perm: PagePerm) -> Option<Self> {
        if !addr.is_page_aligned() {
            return None;
        }
        Some(
            Self::new()
                .with_present(true)
                .with_allocated(true)
                .with_readable(perm.contains(PagePerm::READ))
                .with_writable(perm.contains(PagePerm::WRITE))
                .with_executable(perm.contains(PagePerm::EXEC))
                .with_user(perm.contains(PagePerm::USER))
                .with_phys_or_slot(addr.as_u32() >> 12),
        )
    }

    /// Rewrites a present entry as swapped-out, preserving its permission
    /// bits and clearing `present` (spec.md §4.4).
    #[must_use]
    pub fn with_swapped_out(self, slot: u32) -> Self {
        debug_assert!(slot < (1 << 20), "swap slot does not fit in the PTE's 20-bit field");
        self.with_present(false).with_phys_or_slot(slot & 0xF_FFFF)
    }

    /// Rewrites a swapped-out entry as present again at the given frame,
    /// preserving its permission bits (spec.md §4.6, swap-in on translate).
    #[must_use]
    pub fn with_swapped_in(self, addr: PhysAddr) -> Self {
        self.with_present(true).with_phys_or_slot(addr.as_u32() >> 12)
    }

    /// The data frame's physical address, meaningful only when `present()`.
    #[must_use]
    pub const fn frame_addr(self) -> PhysAddr {
        PhysAddr::new(self.phys_or_slot() << 12)
    }

    /// The swap slot index, meaningful only when `allocated() && !present()`.
    #[must_use]
    pub const fn swap_slot(self) -> u32 {
        self.phys_or_slot()
    }

    #[must_use]
    pub const fn perm(self) -> PagePerm {
        let mut bits = 0u8;
        if self.readable() {
            bits |= PagePerm::READ.bits();
        }
        if self.writable() {
            bits |= PagePerm::WRITE.bits();
        }
        if self.executable() {
            bits |= PagePerm::EXEC.bits();
        }
        if self.user() {
            bits |= PagePerm::USER.bits();
        }
        PagePerm::from_bits_truncate(bits)
    }
}
