//! Slab allocator implementation.
//!
//! This module implements an object cache for one fixed object size. Slabs
//! are naturally aligned regions holding a header and equal-size slots.

pub mod planner;
pub mod slab_cache;
pub mod slab_node;

// Re-export public types
pub use planner::SlabGeometry;
pub use slab_cache::{CacheStats, ObjectCache, SlabState};
pub use slab_node::{NODE_HEADER_SIZE, SLAB_HEADER_SIZE};
