//! End-to-end scenarios S1–S6 from spec.md §8, plus the quantified
//! invariants that frame them.

use std::io::{Cursor, Read, Result as IoResult, Seek, SeekFrom, Write};

use vm::{Access, Error, PagePerm, VmSystem};

fn swap_backend(num_pages: u32) -> Box<dyn vm_alloc::SwapBackend> {
    Box::new(Cursor::new(vec![0u8; 4096 * num_pages as usize]))
}

/// A swap backend that writes normally but fails every read of one
/// particular slot, used to force a genuine, unavoidable I/O failure on the
/// page actually being swapped in while letting collateral evictions (and
/// their own rollback reads) succeed.
struct FailReadOfSlot {
    inner: Cursor<Vec<u8>>,
    fail_slot: u32,
}

impl Read for FailReadOfSlot {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.inner.position() / 4096 == u64::from(self.fail_slot) {
            return Err(std::io::Error::other("injected swap read failure"));
        }
        self.inner.read(buf)
    }
}

impl Write for FailReadOfSlot {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl Seek for FailReadOfSlot {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.inner.seek(pos)
    }
}

/// S1 — basic round-trip.
#[test]
fn s1_basic_round_trip() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();

    let pt = vm.new_addr_space(0).unwrap();
    assert_eq!(pt.as_u32(), 0x1000);

    let va = 0x0040_3000u32.into();
    vm.map_page(pt, va, PagePerm::READ | PagePerm::WRITE | PagePerm::USER)
        .unwrap();

    let pa = vm
        .translate(pt, 0x0040_3ABCu32.into(), Access::Read, true)
        .unwrap();
    assert_eq!(pa.as_u32() & 0xFFF, 0xABC);
    assert_eq!(pa.as_u32() & !0xFFF, pa.as_u32() - 0xABC);
}

/// S2 — permission denial: wrong access mode is denied; a kernel access
/// (`user=false`) is not blocked by a clear user bit, only by the
/// requested access bit itself.
#[test]
fn s2_permission_denial() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap();
    let va = 0x0040_3000u32.into();
    vm.map_page(pt, va, PagePerm::READ | PagePerm::WRITE | PagePerm::USER)
        .unwrap();

    let err = vm.translate(pt, va, Access::Exec, true).unwrap_err();
    assert!(matches!(err, Error::BadPerm));

    // kernel access with the READ bit set succeeds even though the page
    // was mapped with USER set — user only restricts *user* accesses.
    let ok = vm.translate(pt, va, Access::Read, false);
    assert!(ok.is_ok());
}

/// S3 — duplicate mapping.
#[test]
fn s3_duplicate_map_consumes_no_frame() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap();
    let va = 0x0040_3000u32.into();
    vm.map_page(pt, va, PagePerm::READ).unwrap();

    let free_before = vm.free_frame_count();
    let err = vm.map_page(pt, va, PagePerm::READ).unwrap_err();
    assert!(matches!(err, Error::Duplicate));
    assert_eq!(vm.free_frame_count(), free_before);
}

/// S4 — unmap collapses the L2 table once it is entirely empty.
#[test]
fn s4_unmap_collapses_table() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap();
    let free_after_new_addr_space = vm.free_frame_count();

    let va = 0x0040_3000u32.into();
    vm.map_page(pt, va, PagePerm::READ | PagePerm::WRITE | PagePerm::USER)
        .unwrap();

    vm.unmap_page(pt, va).unwrap();
    assert_eq!(vm.free_frame_count(), free_after_new_addr_space);

    let l1_word = vm_addresses::read_u32(&physmem, vm::PhysAddr::new(pt.as_u32() + 0x001 * 4));
    assert_eq!(l1_word, 0);
}

/// S5 — eviction under memory pressure, then swap-in on translate.
#[test]
fn s5_eviction_and_swap_in() {
    let mut physmem = vec![0u8; 4096 * 4];
    let mut vm = VmSystem::init(&mut physmem, 4, Some(swap_backend(4)), 4).unwrap();

    let pt = vm.new_addr_space(0).unwrap(); // 1 frame consumed (L1 table)

    // Maps 0x0 -> consumes an L2 table + a data frame (3 frames in use, 0 free).
    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();
    assert_eq!(vm.free_frame_count(), 0);

    // Mapping a second page with the same L1 index reuses the L2 table but
    // needs a fresh data frame -> triggers eviction of the first page.
    vm.map_page(pt, 0x0000_1000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();

    // Swap-in of the evicted first page via translate.
    let pa = vm
        .translate(pt, 0x0000_0ABCu32.into(), Access::Read, true)
        .unwrap();
    assert_eq!(pa.as_u32() & 0xFFF, 0xABC);

    // The second page (now evicted in turn to make room for the swap-in) is
    // still reachable, just swapped out until its own next translate.
    let pa2 = vm
        .translate(pt, 0x0000_1000u32.into(), Access::Read, true)
        .unwrap();
    assert_eq!(pa2.as_u32() & 0xFFF, 0);
}

/// S6 — destroy fully reclaims, a fresh `new_addr_space` for the same asid
/// returns the instance to its original accounting.
#[test]
fn s6_destroy_then_recreate_reclaims() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
    let free_at_start = vm.free_frame_count();

    let pt = vm.new_addr_space(0).unwrap();
    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ).unwrap();
    vm.map_page(pt, 0x0040_3000u32.into(), PagePerm::WRITE).unwrap();

    vm.destroy_addr_space(0).unwrap();
    assert_eq!(vm.free_frame_count(), free_at_start);

    let pt2 = vm.new_addr_space(0).unwrap();
    assert_eq!(vm.free_frame_count() + 1, free_at_start);
    let _ = pt2;
}

/// Invariant 1 (spec.md §8): free-list length plus frames reachable from
/// active ASIDs equals `num_phys_pages - 1`, checked across a sequence of
/// calls rather than just at one point in time.
#[test]
fn invariant_frame_accounting_holds_across_a_sequence() {
    let mut physmem = vec![0u8; 4096 * 16];
    let mut vm = VmSystem::init(&mut physmem, 16, None, 0).unwrap();
    let total = 16 - 1;
    assert_eq!(vm.free_frame_count(), total);

    let pt0 = vm.new_addr_space(0).unwrap();
    let pt1 = vm.new_addr_space(1).unwrap();
    vm.map_page(pt0, 0x0000_0000u32.into(), PagePerm::READ).unwrap();
    vm.map_page(pt1, 0x0000_0000u32.into(), PagePerm::READ).unwrap();
    vm.map_page(pt0, 0x0000_1000u32.into(), PagePerm::READ).unwrap();

    // 2 L1 tables + 2 L2 tables (distinct asids, L1 index 0 each time distinct
    // addr spaces) + 2 data frames for asid0, shares one L2 table across its
    // two mappings at l1 index 0 -> 1 L1 + 1 L2 + 2 data for asid0; 1 L1 + 1
    // L2 + 1 data for asid1 = 7 frames used.
    assert_eq!(vm.free_frame_count(), total - 7);

    vm.destroy_addr_space(0).unwrap();
    vm.destroy_addr_space(1).unwrap();
    assert_eq!(vm.free_frame_count(), total);
}

/// Invariant 4: no two active PTEs reference the same DATA frame, exercised
/// indirectly — mapping two distinct virtual pages never returns
/// `Duplicate` and always yields physical addresses that don't alias.
#[test]
fn invariant_distinct_mappings_get_distinct_frames() {
    let mut physmem = vec![0u8; 4096 * 8];
    let mut vm = VmSystem::init(&mut physmem, 8, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap();

    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();
    vm.map_page(pt, 0x0000_1000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();

    let pa0 = vm.translate(pt, 0x0000_0000u32.into(), Access::Read, true).unwrap();
    let pa1 = vm.translate(pt, 0x0000_1000u32.into(), Access::Read, true).unwrap();
    assert_ne!(pa0, pa1);
}

/// Invariant 5: after `destroy_addr_space`, no frame or swap slot remains
/// attributed to that asid; its swap slots are usable by a fresh asid.
#[test]
fn invariant_destroy_releases_swap_slots() {
    let mut physmem = vec![0u8; 4096 * 4];
    let mut vm = VmSystem::init(&mut physmem, 4, Some(swap_backend(2)), 2).unwrap();

    let pt = vm.new_addr_space(0).unwrap();
    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ).unwrap();
    vm.map_page(pt, 0x0000_1000u32.into(), PagePerm::READ).unwrap(); // evicts the first page to slot 0

    vm.destroy_addr_space(0).unwrap();

    // Both swap slots must be free again: a fresh address space can map two
    // pages and, under the same memory pressure, evict twice without
    // hitting OutOfMemory.
    let pt2 = vm.new_addr_space(0).unwrap();
    vm.map_page(pt2, 0x0000_0000u32.into(), PagePerm::READ).unwrap();
    vm.map_page(pt2, 0x0000_1000u32.into(), PagePerm::READ).unwrap();
    assert!(vm.map_page(pt2, 0x0000_2000u32.into(), PagePerm::READ).is_ok());
}

#[test]
fn bad_asid_range_rejected() {
    let mut physmem = vec![0u8; 4096 * 4];
    let mut vm = VmSystem::init(&mut physmem, 4, None, 0).unwrap();
    assert!(matches!(vm.new_addr_space(512), Err(Error::BadAddr)));
    assert!(matches!(vm.destroy_addr_space(512), Err(Error::BadAddr)));
}

#[test]
fn translate_unmapped_address_is_bad_addr() {
    let mut physmem = vec![0u8; 4096 * 4];
    let mut vm = VmSystem::init(&mut physmem, 4, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap();
    let err = vm
        .translate(pt, 0x1234_0000u32.into(), Access::Read, true)
        .unwrap_err();
    assert!(matches!(err, Error::BadAddr));
}

#[test]
fn out_of_memory_without_swap() {
    let mut physmem = vec![0u8; 4096 * 4]; // 3 free frames after init
    let mut vm = VmSystem::init(&mut physmem, 4, None, 0).unwrap();
    let pt = vm.new_addr_space(0).unwrap(); // 1 frame used, 2 free

    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ).unwrap(); // L2 + data, 2 frames used, 0 free
    let err = vm
        .map_page(pt, 0x0000_1000u32.into(), PagePerm::READ)
        .unwrap_err();
    assert!(matches!(err, Error::OutOfMemory));
}

#[test]
fn rejects_out_of_range_config() {
    let mut physmem = vec![0u8; 4096 * 4];
    assert!(matches!(
        VmSystem::init(&mut physmem, 3, None, 0),
        Err(Error::InvalidConfig(_))
    ));
}

/// Regression for spec.md §7: a `translate` swap-in whose own read fails
/// must not leave a page that was *collaterally* evicted to make room for
/// it stranded in swap — that eviction has to be undone too.
#[test]
fn translate_rollback_undoes_collateral_eviction_on_swap_in_failure() {
    let mut physmem = vec![0u8; 4096 * 4];
    let backend = FailReadOfSlot {
        inner: Cursor::new(vec![0u8; 4096 * 4]),
        fail_slot: 0,
    };
    let mut vm = VmSystem::init(&mut physmem, 4, Some(Box::new(backend)), 4).unwrap();

    let pt = vm.new_addr_space(0).unwrap();
    vm.map_page(pt, 0x0000_0000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();
    // No free frames left; this evicts the first page to slot 0.
    vm.map_page(pt, 0x0000_1000u32.into(), PagePerm::READ | PagePerm::USER)
        .unwrap();
    assert_eq!(vm.free_frame_count(), 0);

    // Swapping the first page back in needs a free frame, which requires
    // evicting the second page (to slot 1) as a side effect of the
    // reservation; the read of slot 0 for the page actually being
    // translated then fails.
    let err = vm
        .translate(pt, 0x0000_0ABCu32.into(), Access::Read, true)
        .unwrap_err();
    assert!(matches!(err, Error::IoError(_)));

    // No frame was leaked or left stranded by the failed attempt.
    assert_eq!(vm.free_frame_count(), 0);

    // The collaterally evicted second page is back, present, and usable —
    // not left swapped out with its slot unreclaimed.
    let pa = vm
        .translate(pt, 0x0000_1000u32.into(), Access::Read, true)
        .unwrap();
    assert_eq!(pa.as_u32() & 0xFFF, 0);
}
