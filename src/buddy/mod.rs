//! Buddy region provider module
//!
//! This module provides the region provider slab caches draw from:
//! - Naturally aligned power-of-two regions up to `MAX_ORDER`
//! - Intrusive free lists per order with buddy coalescing
//! - Optional statistics and failure reporting

pub mod buddy_allocator;
pub mod free_area;
#[cfg(feature = "tracking")]
pub mod stats;

pub use buddy_allocator::BuddyRegionProvider;
#[cfg(feature = "tracking")]
pub use stats::RegionStats;
