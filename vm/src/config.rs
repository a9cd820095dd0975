//! Eager validation of `VmSystem::init`'s arguments (SPEC_FULL.md §4.9, A3).
//!
//! The reference implementation never validated these ranges: it silently
//! overwrote the caller's swap handle with `NULL` (spec.md §9, bug #4) and
//! never checked that metadata fit in frame 0 (bug #5). This crate checks
//! eagerly, before `VmSystem::init` mutates any byte of `physmem`, and
//! reports a normal `Error` rather than panicking or silently truncating.

use crate::error::Error;

const MIN_PHYS_PAGES: u32 = 4;
const MAX_PHYS_PAGES: u32 = 1_048_576;
const MIN_SWAP_PAGES: u32 = 2;
const MAX_SWAP_PAGES: u32 = 67_108_864;

/// A validated `(num_phys_pages, num_swap_pages)` pair, constructed only
/// through [`VmConfig::validate`].
pub(crate) struct VmConfig {
    pub(crate) num_phys_pages: u32,
    pub(crate) num_swap_pages: u32,
}

impl VmConfig {
    /// Checks `num_phys_pages` and, if `has_swap`, `num_swap_pages` against
    /// the ranges spec.md §6 guarantees the caller upholds.
    ///
    /// `num_swap_pages` is unconstrained (and unused) when `has_swap` is
    /// `false`, matching spec.md §6: "only relevant if swap is not null".
    pub(crate) fn validate(
        num_phys_pages: u32,
        num_swap_pages: u32,
        has_swap: bool,
    ) -> Result<Self, Error> {
        if !(MIN_PHYS_PAGES..=MAX_PHYS_PAGES).contains(&num_phys_pages) {
            return Err(Error::InvalidConfig(
                "num_phys_pages must be in 4..=1_048_576",
            ));
        }
        if has_swap && !(MIN_SWAP_PAGES..=MAX_SWAP_PAGES).contains(&num_swap_pages) {
            return Err(Error::InvalidConfig(
                "num_swap_pages must be in 2..=67_108_864 when swap is present",
            ));
        }
        Ok(Self {
            num_phys_pages,
            num_swap_pages: if has_swap { num_swap_pages } else { 0 },
        })
    }
}
