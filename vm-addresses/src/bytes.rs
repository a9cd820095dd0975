//! Byte-level access into the caller-owned physmem buffer.
//!
//! spec.md §9 notes that the reference C implementation overlays typed
//! pointers directly onto physical memory, relying on weak aliasing rules.
//! Since `physmem` here is an ordinary Rust-owned `&mut [u8]` rather than a
//! raw mapped region, the same result is reached with plain slice indexing
//! and no `unsafe` — every PTE, free-list link, and metadata field is read
//! and written as a 4-byte little-endian word at a computed offset.

use crate::{PhysAddr, PAGE_SIZE};

/// Reads the 32-bit little-endian word at `addr`.
///
/// # Panics
/// Panics if `addr.as_u32() as usize + 4 > physmem.len()`, i.e. if the
/// caller asks for a word outside the physmem region — this is always a
/// programming error (an out-of-range physical address should never reach
/// this function), never a runtime condition callers recover from.
#[inline]
#[must_use]
pub fn read_u32(physmem: &[u8], addr: PhysAddr) -> u32 {
    let i = addr.as_u32() as usize;
    u32::from_le_bytes(physmem[i..i + 4].try_into().expect("slice is exactly 4 bytes"))
}

/// Writes `value` as a 32-bit little-endian word at `addr`.
///
/// # Panics
/// See [`read_u32`].
#[inline]
pub fn write_u32(physmem: &mut [u8], addr: PhysAddr, value: u32) {
    let i = addr.as_u32() as usize;
    physmem[i..i + 4].copy_from_slice(&value.to_le_bytes());
}

/// Zeroes the 4096-byte frame starting at the page-aligned `addr`.
///
/// # Panics
/// Panics if `addr` is not page-aligned or falls outside physmem.
pub fn zero_frame(physmem: &mut [u8], addr: PhysAddr) {
    debug_assert!(addr.is_page_aligned());
    let i = addr.as_u32() as usize;
    physmem[i..i + PAGE_SIZE as usize].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_roundtrip() {
        let mut mem = vec![0u8; 4096];
        write_u32(&mut mem, PhysAddr::new(8), 0xDEAD_BEEF);
        assert_eq!(read_u32(&mem, PhysAddr::new(8)), 0xDEAD_BEEF);
        // untouched neighbors stay zero
        assert_eq!(read_u32(&mem, PhysAddr::new(4)), 0);
    }

    #[test]
    fn zeroing_clears_whole_frame() {
        let mut mem = vec![0xFFu8; 4096 * 2];
        zero_frame(&mut mem, PhysAddr::new(4096));
        assert!(mem[4096..8192].iter().all(|&b| b == 0));
        assert!(mem[0..4096].iter().all(|&b| b == 0xFF));
    }
}
