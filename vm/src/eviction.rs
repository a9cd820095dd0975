//! First-fit eviction policy (spec.md §4.4, C4).
//!
//! Invoked only when the free list is exhausted during a map or swap-in.
//! The victim is chosen deterministically — ascending asid, then ascending
//! L1 index, then ascending L2 index, the first present DATA PTE found —
//! so the policy is reproducible in tests (spec.md S5) without needing
//! accessed/dirty bits a clock or LRU policy would require (a non-goal,
//! spec.md §1).
//!
//! An eviction is a real, committed side effect: it writes a victim's frame
//! to swap and frees it. [`ensure_free_frames`] is what a caller actually
//! wants — "make at least `needed` frames available" — and it either
//! commits a whole run of evictions or, if one of them can't complete,
//! undoes every eviction it performed in this call before returning, so a
//! caller that itself still fails afterward (e.g. the frame reserved for an
//! L2 table came back, but the data frame the same `map_page` call also
//! needs does not) can simply propagate the error: no page is left
//! collaterally swapped out for an operation that didn't go through
//! (spec.md §7).

use crate::error::Error;
use crate::instance::AsidTable;
use vm_addresses::{read_u32, write_u32, PhysAddr, ENTRIES_PER_TABLE, PAGE_SIZE};
use vm_alloc::{FreeListAllocator, SwapManager};
use vm_pagetable::{L1Entry, L2Entry};

struct Victim {
    l2_entry_addr: PhysAddr,
    entry: L2Entry,
    frame: PhysAddr,
}

/// A single committed eviction, enough to undo it: where its PTE lives,
/// what it looked like before eviction, which frame it held, and which swap
/// slot now holds its data.
pub(crate) struct Eviction {
    l2_entry_addr: PhysAddr,
    restore_entry: L2Entry,
    frame: PhysAddr,
    slot: u32,
}

/// Scans all active address spaces for the first present, allocated L2
/// entry. The entry that `map_page`/`translate` are themselves in the
/// middle of rewriting is never a candidate: it is not yet `present` at the
/// point eviction runs (spec.md §4.4, parenthetical).
fn find_victim(physmem: &[u8], asid_table: &AsidTable) -> Option<Victim> {
    for (_asid, l1_root) in asid_table.iter_active() {
        for l1_idx in 0..ENTRIES_PER_TABLE {
            let l1_word = PhysAddr::new(l1_root.as_u32() + l1_idx * 4);
            let l1 = L1Entry::from_bits(read_u32(physmem, l1_word));
            if !l1.present() {
                continue;
            }
            let l2_table = l1.table_addr();
            for l2_idx in 0..ENTRIES_PER_TABLE {
                let l2_word = PhysAddr::new(l2_table.as_u32() + l2_idx * 4);
                let entry = L2Entry::from_bits(read_u32(physmem, l2_word));
                if entry.present() && entry.allocated() {
                    return Some(Victim {
                        l2_entry_addr: l2_word,
                        entry,
                        frame: entry.frame_addr(),
                    });
                }
            }
        }
    }
    None
}

/// Evicts one victim DATA frame to swap, freeing it for reuse.
///
/// On success, the victim's PTE is rewritten to `{present: false, allocated:
/// true, phys: slot}` with its permission bits preserved, and its frame is
/// back on the free list. If no victim exists or no swap slot is free, fails
/// with [`Error::OutOfMemory`] and nothing is mutated. If the swap write
/// fails, fails with [`Error::IoError`], the reserved slot is released, and
/// no PTE is rewritten (spec.md §4.4). Either way, a failed call has no
/// observable effect.
fn evict_one(
    physmem: &mut [u8],
    asid_table: &AsidTable,
    frame_alloc: &mut FreeListAllocator,
    swap: &mut SwapManager,
) -> Result<Eviction, Error> {
    let victim = find_victim(physmem, asid_table).ok_or(Error::OutOfMemory)?;
    let slot = swap.alloc_slot()?;

    let start = victim.frame.as_u32() as usize;
    let src = &physmem[start..start + PAGE_SIZE as usize];
    if let Err(e) = swap.write_slot(slot, src) {
        swap.release_slot(slot);
        return Err(e.into());
    }

    let rewritten = victim.entry.with_swapped_out(slot);
    write_u32(physmem, victim.l2_entry_addr, rewritten.into_bits());
    frame_alloc.free_frame(physmem, victim.frame);
    log::warn!(
        "eviction: wrote frame {} to swap slot {slot}, pte at {}",
        victim.frame,
        victim.l2_entry_addr
    );
    Ok(Eviction {
        l2_entry_addr: victim.l2_entry_addr,
        restore_entry: victim.entry,
        frame: victim.frame,
        slot,
    })
}

/// Reverses one eviction produced by [`evict_one`] / [`ensure_free_frames`].
///
/// Only valid to call when `ev.frame` is still the current free-list head —
/// true immediately after the eviction that produced it, provided nothing
/// else has taken frames off the list in between (the only way callers in
/// this crate use it). Reads the victim's page back from its swap slot
/// (the frame's own bytes were overwritten by the free-list link once
/// freed) and restores its original, present PTE.
pub(crate) fn undo_eviction(
    physmem: &mut [u8],
    frame_alloc: &mut FreeListAllocator,
    swap: &mut SwapManager,
    ev: Eviction,
) {
    let frame = frame_alloc
        .alloc_frame(physmem)
        .expect("the frame this eviction just freed must still be the free-list head");
    debug_assert_eq!(
        frame, ev.frame,
        "free list was touched between eviction and rollback"
    );

    let start = frame.as_u32() as usize;
    if let Err(e) = swap.read_slot(ev.slot, &mut physmem[start..start + PAGE_SIZE as usize]) {
        log::error!(
            "rollback: failed to restore page evicted to slot {} at pte {}: {e:?}",
            ev.slot,
            ev.l2_entry_addr
        );
        frame_alloc.free_frame(physmem, frame);
        return;
    }
    write_u32(physmem, ev.l2_entry_addr, ev.restore_entry.into_bits());
    swap.release_slot(ev.slot);
    log::warn!(
        "rollback: restored page at pte {} from swap slot {}",
        ev.l2_entry_addr,
        ev.slot
    );
}

/// Makes sure at least `needed` frames are on the free list, evicting
/// victims one at a time if the free list alone doesn't have enough.
///
/// Either every eviction this call performs commits together, returned as
/// `Ok` so a caller whose *own* next step can still fail (`translate`'s
/// swap-in read) can undo them too if it has to, or, if a later eviction in
/// this call can't complete, every eviction already performed in this call
/// is undone before returning `Err` — the free list and every PTE touched
/// end up exactly as they were before this call, as if eviction had never
/// been attempted (spec.md §7).
pub(crate) fn ensure_free_frames(
    physmem: &mut [u8],
    asid_table: &AsidTable,
    frame_alloc: &mut FreeListAllocator,
    swap: &mut SwapManager,
    needed: u32,
) -> Result<Vec<Eviction>, Error> {
    let mut performed = Vec::new();
    while frame_alloc.free_count() < needed {
        match evict_one(physmem, asid_table, frame_alloc, swap) {
            Ok(ev) => performed.push(ev),
            Err(e) => {
                for ev in performed.into_iter().rev() {
                    undo_eviction(physmem, frame_alloc, swap, ev);
                }
                return Err(e);
            }
        }
    }
    Ok(performed)
}
