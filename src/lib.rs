//! Object-caching slab allocator
//!
//! This crate hands out fixed-size objects in O(1) by carving large,
//! self-aligned regions ("slabs") into equal slots. It features:
//! - A capacity planner choosing the smallest slab order for an object size
//! - Slab caches filing slabs on empty / partial / full lists
//! - Owner recovery of any object pointer by masking it down to its slab
//! - A buddy region provider handing out naturally aligned regions

#![no_std]

extern crate alloc;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

use core::fmt;

/// Base page size used when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// Largest order a region provider accepts (`PAGE_SIZE << MAX_ORDER` bytes).
pub const MAX_ORDER: usize = 10;

/// Default lower bound of objects a slab must hold.
pub const MIN_SLAB_OBJECTS: usize = 32;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid object size, order or page size.
    InvalidParam,
    /// No order up to [`MAX_ORDER`] can hold the required objects.
    ObjectTooLarge,
    /// No enough memory to allocate.
    NoMemory,
    /// The region provider returned a region not aligned to its own size.
    MisalignedRegion,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidParam => f.write_str("invalid allocation parameter"),
            AllocError::ObjectTooLarge => {
                write!(f, "object does not fit in a slab of order {}", MAX_ORDER)
            }
            AllocError::NoMemory => f.write_str("out of memory"),
            AllocError::MisalignedRegion => f.write_str("region is not aligned to its size"),
        }
    }
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Provider of power-of-two sized, naturally aligned memory regions.
///
/// A region of order `n` spans `PAGE_SIZE << n` bytes and its start address
/// is a multiple of that size. Slab caches rely on this to find the owning
/// slab of an object by masking the object address.
pub trait RegionProvider {
    /// Base page size the provider measures orders in.
    fn page_size(&self) -> usize;

    /// Allocate a region of the given order, `order` in `[0, MAX_ORDER]`.
    fn request_region(&mut self, order: usize) -> AllocResult<usize>;

    /// Return a region previously obtained with [`request_region`] at the
    /// same order. Releasing a region twice is undefined behaviour.
    ///
    /// [`request_region`]: RegionProvider::request_region
    fn release_region(&mut self, addr: usize, order: usize);
}

/// Size in bytes of a region of `order` pages of `page_size`.
#[inline]
pub const fn region_bytes(page_size: usize, order: usize) -> usize {
    page_size << order
}

#[inline]
pub const fn align_down(pos: usize, align: usize) -> usize {
    pos & !(align - 1)
}

#[inline]
pub const fn align_up(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
pub const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::RegionStats;
pub use buddy::BuddyRegionProvider;

pub mod slab;
pub use slab::{CacheStats, ObjectCache, SlabGeometry, SlabState};
