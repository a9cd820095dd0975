//! The public API (spec.md C7) and the glue that composes C2–C6 to
//! implement it: [`VmSystem`].

use crate::access::Access;
use crate::config::VmConfig;
use crate::error::Error;
use crate::eviction;
use crate::instance::{AsidTable, ASID_COUNT};
use vm_addresses::{
    read_u32, write_u32, zero_frame, PhysAddr, VirtAddr, ENTRIES_PER_TABLE, PAGE_SIZE,
};
use vm_alloc::{FreeListAllocator, SwapBackend, SwapManager};
use vm_pagetable::{walk, FrameAlloc, L1Entry, L2Entry, PagePerm, WalkError};

/// A live virtual-memory instance over a caller-owned physmem region.
///
/// Mirrors the handle `vm_init` returns in spec.md §6, except the handle
/// *is* the borrow of `physmem` rather than an opaque pointer into it: a
/// `VmSystem<'p>` exclusively owns the `&'p mut [u8]` for as long as it
/// lives, matching the "exclusively owned between init and the caller's
/// discard of it" language in spec.md §5.
pub struct VmSystem<'p> {
    physmem: &'p mut [u8],
    num_phys_pages: u32,
    frame_alloc: FreeListAllocator,
    swap: SwapManager,
    asid_table: AsidTable,
}

/// A [`FrameAlloc`] that never allocates, used for walks that must not
/// materialize an L2 table (`unmap_page`, `translate`, and `map_page`'s own
/// read-only peek at the existing mapping). `walk`'s own `materialize` flag
/// guarantees this is never actually called.
struct NeverAlloc;

impl FrameAlloc for NeverAlloc {
    fn alloc_zeroed_frame(&mut self, _physmem: &mut [u8]) -> Option<PhysAddr> {
        None
    }
}

/// Allocates one zeroed frame, falling back to eviction (spec.md §4.4) when
/// the free list is exhausted.
///
/// Takes its collaborators as separate borrows rather than `&mut VmSystem`
/// so callers can still touch `physmem` (or other `VmSystem` fields) around
/// the call without the whole instance appearing borrowed. Safe to call
/// whenever nothing else in the same operation can still fail afterward:
/// [`eviction::ensure_free_frames`] already leaves no collateral eviction
/// behind if it itself fails, and once it succeeds, taking the frame it
/// reserved cannot fail.
fn alloc_or_evict(
    physmem: &mut [u8],
    asid_table: &AsidTable,
    frame_alloc: &mut FreeListAllocator,
    swap: &mut SwapManager,
) -> Result<PhysAddr, Error> {
    eviction::ensure_free_frames(physmem, asid_table, frame_alloc, swap, 1)?;
    let frame = frame_alloc
        .alloc_frame(physmem)
        .expect("ensure_free_frames guarantees at least one free frame");
    zero_frame(physmem, frame);
    Ok(frame)
}

/// `true` if every word of the `ENTRIES_PER_TABLE`-entry table at `table`
/// is zero (spec.md §4.6, "entirely zero" collapse condition).
fn table_is_empty(physmem: &[u8], table: PhysAddr) -> bool {
    (0..ENTRIES_PER_TABLE).all(|i| read_u32(physmem, PhysAddr::new(table.as_u32() + i * 4)) == 0)
}

impl<'p> VmSystem<'p> {
    /// Initializes a VM instance over `physmem` (spec.md `vm_init`).
    ///
    /// Validates `num_phys_pages`/`num_swap_pages` against spec.md §6's
    /// contractual ranges and that `physmem` is large enough before
    /// mutating a single byte; only after that does it thread the free
    /// list over frames `[1, num_phys_pages)` and zero the ASID table.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the page counts are out of
    /// range or `physmem` is too small for `num_phys_pages`.
    pub fn init(
        physmem: &'p mut [u8],
        num_phys_pages: u32,
        swap: Option<Box<dyn SwapBackend>>,
        num_swap_pages: u32,
    ) -> Result<Self, Error> {
        let has_swap = swap.is_some();
        let cfg = VmConfig::validate(num_phys_pages, num_swap_pages, has_swap)?;

        let required = cfg.num_phys_pages as usize * PAGE_SIZE as usize;
        if physmem.len() < required {
            return Err(Error::InvalidConfig(
                "physmem is smaller than 4096 * num_phys_pages",
            ));
        }

        log::debug!(
            "vm init: {} phys pages, {} swap pages (swap {})",
            cfg.num_phys_pages,
            cfg.num_swap_pages,
            if has_swap { "enabled" } else { "disabled" }
        );

        let frame_alloc = FreeListAllocator::init(physmem, cfg.num_phys_pages);
        let swap_mgr = SwapManager::new(swap, cfg.num_swap_pages);

        Ok(Self {
            physmem,
            num_phys_pages: cfg.num_phys_pages,
            frame_alloc,
            swap: swap_mgr,
            asid_table: AsidTable::new(),
        })
    }

    /// Total number of physical frames managed by this instance, including
    /// the reserved metadata frame (frame 0).
    #[must_use]
    pub const fn num_phys_pages(&self) -> u32 {
        self.num_phys_pages
    }

    /// Number of frames currently on the free list. Exposed for the
    /// quantified invariants in spec.md §8 (tests, not production logic,
    /// consume this).
    #[must_use]
    pub fn free_frame_count(&self) -> u32 {
        self.frame_alloc.free_count()
    }

    /// Creates a new address space for `asid` (spec.md `vm_new_addr_space`).
    ///
    /// # Errors
    /// [`Error::BadAddr`] if `asid >= 512`. [`Error::Duplicate`] if `asid`
    /// is already active. [`Error::OutOfMemory`] / [`Error::IoError`] if no
    /// frame can be made available for the new L1 table, even after
    /// attempting eviction (L1/L2 tables are never themselves evicted, so
    /// eviction only ever runs over DATA frames here).
    pub fn new_addr_space(&mut self, asid: u32) -> Result<PhysAddr, Error> {
        if asid as usize >= ASID_COUNT {
            return Err(Error::BadAddr);
        }
        if self.asid_table.is_active(asid) {
            return Err(Error::Duplicate);
        }

        let frame = alloc_or_evict(
            self.physmem,
            &self.asid_table,
            &mut self.frame_alloc,
            &mut self.swap,
        )?;

        self.asid_table.activate(asid, frame);
        log::debug!("asid {asid}: new address space, l1 table at {frame}");
        Ok(frame)
    }

    /// Entirely removes an address space (spec.md `vm_destroy_addr_space`).
    ///
    /// Walks every present L1 entry and, within it, every allocated L2
    /// entry, returning each DATA frame to the free list or each swapped
    /// slot to the swap manager, then frees the L2 and L1 table frames
    /// themselves and clears the ASID entry.
    ///
    /// # Errors
    /// [`Error::BadAddr`] if `asid >= 512` or `asid` is not active.
    pub fn destroy_addr_space(&mut self, asid: u32) -> Result<(), Error> {
        if asid as usize >= ASID_COUNT {
            return Err(Error::BadAddr);
        }
        let l1_root = self.asid_table.get(asid).ok_or(Error::BadAddr)?;

        for l1_idx in 0..ENTRIES_PER_TABLE {
            let l1_word = PhysAddr::new(l1_root.as_u32() + l1_idx * 4);
            let l1 = L1Entry::from_bits(read_u32(self.physmem, l1_word));
            if !l1.present() {
                continue;
            }
            let l2_table = l1.table_addr();
            for l2_idx in 0..ENTRIES_PER_TABLE {
                let l2_word = PhysAddr::new(l2_table.as_u32() + l2_idx * 4);
                let entry = L2Entry::from_bits(read_u32(self.physmem, l2_word));
                if !entry.allocated() {
                    continue;
                }
                if entry.present() {
                    self.frame_alloc.free_frame(self.physmem, entry.frame_addr());
                } else {
                    self.swap.release_slot(entry.swap_slot());
                }
            }
            self.frame_alloc.free_frame(self.physmem, l2_table);
        }
        self.frame_alloc.free_frame(self.physmem, l1_root);
        self.asid_table.deactivate(asid);
        log::debug!("asid {asid}: destroyed, l1 table {l1_root} reclaimed");
        Ok(())
    }

    /// Creates a mapping for the page containing `v` (spec.md `vm_map_page`).
    ///
    /// First peeks the existing mapping (if any) with a non-materializing
    /// walk, so the exact number of frames this call will need — one data
    /// frame, plus one more for a fresh L2 table if none exists yet — is
    /// known before anything is allocated or evicted. [`eviction`] then
    /// reserves that whole amount in one go: once it succeeds, the rest of
    /// this call (writing the L1/L2 entries) is infallible, so a collateral
    /// eviction it performed along the way is never left stranded by a
    /// later failure in the same call (spec.md §7).
    ///
    /// # Errors
    /// [`Error::Duplicate`] if the page is already mapped.
    /// [`Error::OutOfMemory`] / [`Error::IoError`] if the needed frames
    /// can't be made available.
    pub fn map_page(&mut self, pt: PhysAddr, v: VirtAddr, perm: PagePerm) -> Result<(), Error> {
        let mut never = NeverAlloc;
        let existing = match walk(self.physmem, pt, v, false, &mut never) {
            Ok(w) => Some(w),
            Err(WalkError::NoMapping) => None,
            Err(WalkError::OutOfMemory) => unreachable!("materialize=false never allocates"),
        };

        if let Some(w) = &existing {
            if w.entry.allocated() {
                return Err(Error::Duplicate);
            }
        }

        let needed = if existing.is_some() { 1 } else { 2 };
        eviction::ensure_free_frames(
            self.physmem,
            &self.asid_table,
            &mut self.frame_alloc,
            &mut self.swap,
            needed,
        )?;

        let l2_entry_addr = match existing {
            Some(w) => w.l2_entry_addr,
            None => {
                let l1_word = PhysAddr::new(pt.as_u32() + v.l1_index() * 4);
                let l2_table = self
                    .frame_alloc
                    .alloc_frame(self.physmem)
                    .expect("reservation guarantees a free frame for the L2 table");
                zero_frame(self.physmem, l2_table);
                let l1_entry =
                    L1Entry::mapped(l2_table).expect("frame allocator returns page-aligned frames");
                write_u32(self.physmem, l1_word, l1_entry.into_bits());
                PhysAddr::new(l2_table.as_u32() + v.l2_index() * 4)
            }
        };

        let frame = self
            .frame_alloc
            .alloc_frame(self.physmem)
            .expect("reservation guarantees a free frame for the data page");
        zero_frame(self.physmem, frame);
        let entry =
            L2Entry::mapped(frame, perm).expect("frame allocator returns page-aligned frames");
        write_u32(self.physmem, l2_entry_addr, entry.into_bits());
        log::trace!("mapped {v} -> {frame} with {perm:?}");
        Ok(())
    }

    /// Removes the mapping for the page containing `v`
    /// (spec.md `vm_unmap_page`).
    ///
    /// Frees the DATA frame (or releases the swap slot if evicted) and
    /// clears the PTE. If the containing L2 table is now entirely zero, it
    /// is freed and the L1 entry cleared; the L1 table itself is left
    /// allocated until `destroy_addr_space` (spec.md §9, bug #3 corrected).
    ///
    /// # Errors
    /// [`Error::BadAddr`] if either level is absent or the entry was never
    /// allocated.
    pub fn unmap_page(&mut self, pt: PhysAddr, v: VirtAddr) -> Result<(), Error> {
        let mut never = NeverAlloc;
        let w = match walk(self.physmem, pt, v, false, &mut never) {
            Ok(w) => w,
            Err(WalkError::NoMapping) => return Err(Error::BadAddr),
            Err(WalkError::OutOfMemory) => unreachable!("materialize=false never allocates"),
        };

        if !w.entry.allocated() {
            return Err(Error::BadAddr);
        }

        if w.entry.present() {
            self.frame_alloc.free_frame(self.physmem, w.entry.frame_addr());
        } else {
            self.swap.release_slot(w.entry.swap_slot());
        }
        write_u32(self.physmem, w.l2_entry_addr, 0);

        if table_is_empty(self.physmem, w.l2_table_addr) {
            self.frame_alloc.free_frame(self.physmem, w.l2_table_addr);
            write_u32(self.physmem, w.l1_entry_addr, 0);
            log::trace!("unmapped {v}, l2 table {} collapsed", w.l2_table_addr);
        } else {
            log::trace!("unmapped {v}");
        }
        Ok(())
    }

    /// Translates `v` through `pt`, checking access and privilege, and
    /// swapping the page in if it is currently evicted
    /// (spec.md `vm_translate`).
    ///
    /// Failure order matches spec.md §4.6: presence/allocation before
    /// permission, permission before swap-in I/O. Unlike `map_page`, the
    /// step that can fail after a frame is reserved — reading the target
    /// page back from its own swap slot — is genuinely unavoidable I/O, so
    /// on that failure this explicitly undoes any collateral eviction
    /// [`eviction::ensure_free_frames`] performed to free up the frame,
    /// rather than leaving an unrelated page stranded in swap (spec.md §7).
    ///
    /// # Errors
    /// [`Error::BadAddr`] if unmapped. [`Error::BadPerm`] if `user` is set
    /// and the user bit is clear, or the requested `access` bit is clear.
    /// [`Error::OutOfMemory`] / [`Error::IoError`] if a swap-in is required
    /// and cannot complete.
    pub fn translate(
        &mut self,
        pt: PhysAddr,
        v: VirtAddr,
        access: Access,
        user: bool,
    ) -> Result<PhysAddr, Error> {
        let mut never = NeverAlloc;
        let w = match walk(self.physmem, pt, v, false, &mut never) {
            Ok(w) => w,
            Err(WalkError::NoMapping) => return Err(Error::BadAddr),
            Err(WalkError::OutOfMemory) => unreachable!("materialize=false never allocates"),
        };

        if !w.entry.allocated() {
            return Err(Error::BadAddr);
        }
        if user && !w.entry.user() {
            return Err(Error::BadPerm);
        }
        let access_granted = match access {
            Access::Exec => w.entry.executable(),
            Access::Read => w.entry.readable(),
            Access::Write => w.entry.writable(),
        };
        if !access_granted {
            return Err(Error::BadPerm);
        }

        if w.entry.present() {
            return Ok(PhysAddr::new(w.entry.frame_addr().as_u32() | v.offset()));
        }

        // Swap-in (spec.md §4.6): the entry being swapped in is never itself
        // an eviction candidate, since eviction only ever picks a `present`
        // entry (spec.md §4.4).
        let slot = w.entry.swap_slot();
        let evicted = eviction::ensure_free_frames(
            self.physmem,
            &self.asid_table,
            &mut self.frame_alloc,
            &mut self.swap,
            1,
        )?;
        let frame = self
            .frame_alloc
            .alloc_frame(self.physmem)
            .expect("ensure_free_frames guarantees a free frame");

        let start = frame.as_u32() as usize;
        let dst = &mut self.physmem[start..start + PAGE_SIZE as usize];
        if let Err(e) = self.swap.read_slot(slot, dst) {
            self.frame_alloc.free_frame(self.physmem, frame);
            for ev in evicted.into_iter().rev() {
                eviction::undo_eviction(self.physmem, &mut self.frame_alloc, &mut self.swap, ev);
            }
            return Err(e.into());
        }
        self.swap.release_slot(slot);

        let new_entry = w.entry.with_swapped_in(frame);
        write_u32(self.physmem, w.l2_entry_addr, new_entry.into_bits());
        log::warn!("swap-in: {v} from slot {slot} into frame {frame}");
        Ok(PhysAddr::new(frame.as_u32() | v.offset()))
    }
}
