use crate::pte::{L1Entry, L2Entry};
use crate::FrameAlloc;
use log::{trace, warn};
use vm_addresses::{read_u32, write_u32, PhysAddr, VirtAddr};

/// Failure modes of [`walk`], distinct from the public `vm::Error` so this
/// crate has no dependency on the top-level error taxonomy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WalkError {
    /// The L1 entry was absent and `materialize` was `false`.
    NoMapping,
    /// `materialize` was `true` but no frame was available for the L2 table.
    OutOfMemory,
}

/// The outcome of a successful walk: the location of the L2 entry within
/// physmem and its currently decoded value.
///
/// Callers write back through [`write_u32`] at `l2_entry_addr` after
/// modifying `entry` — the walker never assumes it owns the entry beyond
/// the point of return, matching spec.md's model of PTE mutation as a
/// caller-driven, single step per API call.
#[derive(Copy, Clone, Debug)]
pub struct Walk {
    /// Where the L1 entry for this virtual address lives.
    pub l1_entry_addr: PhysAddr,
    /// The L2 table this walk resolved to, whether pre-existing or freshly
    /// materialized.
    pub l2_table_addr: PhysAddr,
    pub l2_entry_addr: PhysAddr,
    pub entry: L2Entry,
    /// `true` if this call allocated a brand-new L2 table because the L1
    /// entry was previously absent. A caller that fails a later step of the
    /// same operation must undo this: free `l2_table_addr` and clear the
    /// word at `l1_entry_addr` to restore the pre-call state (spec.md §7).
    pub table_materialized: bool,
}

/// Walks `pt_root` (an L1 table's physical address) down to the L2 entry for
/// virtual address `v`.
///
/// If the L1 entry is absent and `materialize` is `true`, a fresh, zeroed L2
/// table is allocated via `alloc` and linked in; otherwise an absent L1
/// entry is reported as [`WalkError::NoMapping`] (spec.md §4.5).
pub fn walk(
    physmem: &mut [u8],
    pt_root: PhysAddr,
    v: VirtAddr,
    materialize: bool,
    alloc: &mut impl FrameAlloc,
) -> Result<Walk, WalkError> {
    let l1_word = PhysAddr::new(pt_root.as_u32() + v.l1_index() * 4);
    let l1 = L1Entry::from_bits(read_u32(physmem, l1_word));

    let (l2_table, table_materialized) = if l1.present() {
        (l1.table_addr(), false)
    } else {
        if !materialize {
            trace!("walk: no L1 mapping for {v}");
            return Err(WalkError::NoMapping);
        }
        let frame = alloc.alloc_zeroed_frame(physmem).ok_or_else(|| {
            warn!("walk: out of frames materializing an L2 table for {v}");
            WalkError::OutOfMemory
        })?;
        let new_l1 = L1Entry::mapped(frame).expect("frame allocator returns page-aligned frames");
        write_u32(physmem, l1_word, new_l1.into_bits());
        trace!("walk: materialized L2 table at {frame} for {v}");
        (frame, true)
    };

    let l2_word = PhysAddr::new(l2_table.as_u32() + v.l2_index() * 4);
    let entry = L2Entry::from_bits(read_u32(physmem, l2_word));
    trace!("walk: {v} resolves to l2 entry at {l2_word}");
    Ok(Walk {
        l1_entry_addr: l1_word,
        l2_table_addr: l2_table,
        l2_entry_addr: l2_word,
        entry,
        table_materialized,
    })
}
