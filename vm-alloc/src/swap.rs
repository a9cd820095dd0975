//! Swap-slot bitmap and swap-file I/O (spec.md §4.3).
//!
//! A swap slot is a 4096-byte region of the caller's swap file, addressed by
//! slot index rather than by byte offset — [`SwapManager`] multiplies by
//! [`vm_addresses::PAGE_SIZE`] itself so callers never have to.

use std::io::{self, Read, Seek, SeekFrom, Write};

use vm_addresses::PAGE_SIZE;

/// Anything the swap manager can read frames from and write frames to.
///
/// Blanket-implemented for every `Read + Write + Seek`, so `std::fs::File`
/// and, in tests, `std::io::Cursor<Vec<u8>>` both satisfy it without a
/// dedicated impl.
pub trait SwapBackend: Read + Write + Seek {}

impl<T: Read + Write + Seek> SwapBackend for T {}

/// Failure of a swap I/O operation or slot allocation.
#[derive(Debug)]
pub enum SwapError {
    /// No swap slot is free, or no swap backend was configured at all.
    NoFreeSlot,
    /// The underlying read/write/seek returned an OS error or a short count.
    Io(io::Error),
}

/// Bitmap-tracked allocator over the slots of an optional swap file, plus
/// the read/write operations that move whole frames to and from it
/// (spec.md §4.3).
///
/// If no backend was supplied at construction, every operation fails
/// immediately with [`SwapError::NoFreeSlot`] (spec.md §4.3, last sentence).
pub struct SwapManager {
    backend: Option<Box<dyn SwapBackend>>,
    bitmap: Vec<u64>,
    num_slots: u32,
}

impl SwapManager {
    /// Builds a manager over `num_slots` slots backed by `backend`.
    ///
    /// `num_slots` is `0` and `backend` is `None` when the instance was
    /// configured without swap support.
    #[must_use]
    pub fn new(backend: Option<Box<dyn SwapBackend>>, num_slots: u32) -> Self {
        let words = usize::try_from(num_slots).unwrap_or(0).div_ceil(64);
        Self {
            backend,
            bitmap: vec![0u64; words],
            num_slots,
        }
    }

    /// `true` if a swap backend is configured at all.
    #[must_use]
    pub const fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub const fn num_slots(&self) -> u32 {
        self.num_slots
    }

    fn is_set(&self, slot: u32) -> bool {
        let (word, bit) = (slot as usize / 64, slot % 64);
        (self.bitmap[word] & (1u64 << bit)) != 0
    }

    fn set(&mut self, slot: u32) {
        let (word, bit) = (slot as usize / 64, slot % 64);
        self.bitmap[word] |= 1u64 << bit;
    }

    fn clear(&mut self, slot: u32) {
        let (word, bit) = (slot as usize / 64, slot % 64);
        self.bitmap[word] &= !(1u64 << bit);
    }

    /// Returns the lowest-index free slot and marks it occupied.
    pub fn alloc_slot(&mut self) -> Result<u32, SwapError> {
        if self.backend.is_none() {
            return Err(SwapError::NoFreeSlot);
        }
        for word_idx in 0..self.bitmap.len() {
            if self.bitmap[word_idx] == u64::MAX {
                continue;
            }
            for bit in 0..64 {
                let slot = (word_idx * 64 + bit) as u32;
                if slot >= self.num_slots {
                    break;
                }
                if !self.is_set(slot) {
                    self.set(slot);
                    log::trace!("swap: allocated slot {slot}");
                    return Ok(slot);
                }
            }
        }
        Err(SwapError::NoFreeSlot)
    }

    /// Clears the occupied bit for `slot`.
    ///
    /// `slot` must currently be occupied; violating this is a programming
    /// error (mirrors `free_frame`'s contract in spec.md §4.2).
    pub fn release_slot(&mut self, slot: u32) {
        debug_assert!(self.is_set(slot), "releasing a slot that was never allocated");
        self.clear(slot);
        log::trace!("swap: released slot {slot}");
    }

    /// Writes `src` (exactly one 4096-byte frame) to `slot`.
    ///
    /// On any I/O failure the call is aborted with [`SwapError::Io`] and no
    /// instance state is assumed mutated by the caller (spec.md §4.3).
    pub fn write_slot(&mut self, slot: u32, src: &[u8]) -> Result<(), SwapError> {
        debug_assert_eq!(src.len(), PAGE_SIZE as usize);
        let backend = self.backend.as_mut().ok_or(SwapError::NoFreeSlot)?;
        backend
            .seek(SeekFrom::Start(u64::from(slot) * u64::from(PAGE_SIZE)))
            .map_err(SwapError::Io)?;
        backend.write_all(src).map_err(SwapError::Io)?;
        log::warn!("swap: wrote frame to slot {slot}");
        Ok(())
    }

    /// Reads `slot` into `dst` (exactly one 4096-byte frame).
    pub fn read_slot(&mut self, slot: u32, dst: &mut [u8]) -> Result<(), SwapError> {
        debug_assert_eq!(dst.len(), PAGE_SIZE as usize);
        let backend = self.backend.as_mut().ok_or(SwapError::NoFreeSlot)?;
        backend
            .seek(SeekFrom::Start(u64::from(slot) * u64::from(PAGE_SIZE)))
            .map_err(SwapError::Io)?;
        backend.read_exact(dst).map_err(SwapError::Io)?;
        log::warn!("swap: read frame from slot {slot}");
        Ok(())
    }
}
