//! Statistics and debugging for the buddy region provider
//!
//! Provides counters and failure reporting.

use crate::MAX_ORDER;

/// Buddy provider statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub total_pages: usize,
    pub free_pages: usize,
    pub used_pages: usize,
    /// Successful `request_region` calls.
    pub requests: usize,
    /// `release_region` calls that returned a region.
    pub releases: usize,
    pub free_blocks_by_order: [usize; MAX_ORDER + 1],
}

impl RegionStats {
    pub const fn new() -> Self {
        Self {
            total_pages: 0,
            free_pages: 0,
            used_pages: 0,
            requests: 0,
            releases: 0,
            free_blocks_by_order: [0; MAX_ORDER + 1],
        }
    }

    /// Regions handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.requests - self.releases
    }
}

/// Print the free block layout after a failed request.
#[allow(unused_variables)]
pub fn print_request_failure_stats(page_size: usize, stats: &RegionStats, order: usize) {
    #[cfg(feature = "log")]
    use log::error;
    error!("========================================");
    error!(
        "Request: order {} ({} KB)",
        order,
        (page_size << order) / 1024
    );
    error!(
        "  Total pages: {} ({} KB)",
        stats.total_pages,
        (stats.total_pages * page_size) / 1024
    );
    error!(
        "  Free pages: {} ({} KB)",
        stats.free_pages,
        (stats.free_pages * page_size) / 1024
    );
    error!("  Outstanding regions: {}", stats.outstanding());
    error!("  Free blocks by order:");
    for order in (0..=MAX_ORDER).rev() {
        let count = stats.free_blocks_by_order[order];
        if count > 0 {
            error!(
                "    Order {}: {} blocks ({} KB each)",
                order,
                count,
                (page_size << order) / 1024
            );
        }
    }
    error!("========================================");
}
