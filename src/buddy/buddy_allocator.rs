//! Buddy region provider
//!
//! Manages one contiguous memory range and hands out naturally aligned
//! regions of `PAGE_SIZE << order` bytes, `order` in `[0, MAX_ORDER]`.
//! A state byte per page, kept in pages reserved at the start of the range,
//! marks the first page of every free block with the block's order.

use crate::{AllocError, AllocResult, RegionProvider, DEFAULT_PAGE_SIZE, MAX_ORDER};

#[cfg(feature = "log")]
use log::{debug, error, warn};

#[cfg(feature = "tracking")]
use super::stats::{print_request_failure_stats, RegionStats};

use super::free_area::{FreeArea, FREE_LINK_SIZE};

/// State byte of a page that does not start a free block.
const NOT_FREE: u8 = u8::MAX;

pub struct BuddyRegionProvider<const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE> {
    base_addr: usize,
    end_addr: usize,
    /// Start of the page state map, one byte per managed page.
    state_map: usize,
    total_pages: usize,
    free_pages: usize,
    free_areas: [FreeArea; MAX_ORDER + 1],
    #[cfg(feature = "tracking")]
    requests: usize,
    #[cfg(feature = "tracking")]
    releases: usize,
}

impl<const PAGE_SIZE: usize> BuddyRegionProvider<PAGE_SIZE> {
    pub const fn new() -> Self {
        Self {
            base_addr: 0,
            end_addr: 0,
            state_map: 0,
            total_pages: 0,
            free_pages: 0,
            free_areas: [const { FreeArea::new() }; MAX_ORDER + 1],
            #[cfg(feature = "tracking")]
            requests: 0,
            #[cfg(feature = "tracking")]
            releases: 0,
        }
    }

    /// Take over `[start, start + size)`.
    ///
    /// The first pages hold the page state map; the rest is split greedily
    /// into the largest naturally aligned blocks that fit.
    pub fn init(&mut self, start: usize, size: usize) -> AllocResult {
        if self.total_pages != 0
            || !PAGE_SIZE.is_power_of_two()
            || PAGE_SIZE < FREE_LINK_SIZE
        {
            return Err(AllocError::InvalidParam);
        }

        let region_start = start
            .checked_add(PAGE_SIZE - 1)
            .map(|addr| crate::align_down(addr, PAGE_SIZE))
            .ok_or(AllocError::InvalidParam)?;
        let region_end = start
            .checked_add(size)
            .map(|end| crate::align_down(end, PAGE_SIZE))
            .ok_or(AllocError::InvalidParam)?;
        if region_start == 0 || region_end <= region_start {
            return Err(AllocError::InvalidParam);
        }

        let pages = (region_end - region_start) / PAGE_SIZE;
        let map_pages = (pages + PAGE_SIZE - 1) / PAGE_SIZE;
        if pages <= map_pages {
            return Err(AllocError::InvalidParam);
        }

        self.state_map = region_start;
        self.base_addr = region_start + map_pages * PAGE_SIZE;
        self.end_addr = region_end;
        self.total_pages = pages - map_pages;
        unsafe { core::ptr::write_bytes(self.state_map as *mut u8, NOT_FREE, self.total_pages) };

        let mut addr = self.base_addr;
        while addr < self.end_addr {
            let order = (0..=MAX_ORDER)
                .rev()
                .find(|&order| {
                    let bytes = PAGE_SIZE << order;
                    crate::is_aligned(addr, bytes) && addr + bytes <= self.end_addr
                })
                .unwrap_or(0);
            self.push_free(addr, order);
            addr += PAGE_SIZE << order;
        }
        self.free_pages = self.total_pages;

        debug!(
            "buddy provider: [{:#x}, {:#x}), {} pages, {} map pages",
            self.base_addr, self.end_addr, self.total_pages, map_pages
        );
        Ok(())
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn used_pages(&self) -> usize {
        self.total_pages - self.free_pages
    }

    pub fn available_pages(&self) -> usize {
        self.free_pages
    }

    /// Number of free blocks of exactly `order`.
    pub fn free_blocks(&self, order: usize) -> usize {
        self.free_areas.get(order).map_or(0, FreeArea::len)
    }

    #[cfg(feature = "tracking")]
    pub fn stats(&self) -> RegionStats {
        let mut stats = RegionStats {
            total_pages: self.total_pages,
            free_pages: self.free_pages,
            used_pages: self.used_pages(),
            requests: self.requests,
            releases: self.releases,
            ..RegionStats::new()
        };
        for (order, area) in self.free_areas.iter().enumerate() {
            stats.free_blocks_by_order[order] = area.len();
        }
        stats
    }

    fn addr_in_range(&self, addr: usize, order: usize) -> bool {
        addr >= self.base_addr
            && addr < self.end_addr
            && self.end_addr - addr >= PAGE_SIZE << order
    }

    fn state_byte(&self, addr: usize) -> *mut u8 {
        (self.state_map + (addr - self.base_addr) / PAGE_SIZE) as *mut u8
    }

    fn page_state(&self, addr: usize) -> u8 {
        unsafe { *self.state_byte(addr) }
    }

    fn set_page_state(&mut self, addr: usize, state: u8) {
        unsafe { *self.state_byte(addr) = state };
    }

    fn push_free(&mut self, addr: usize, order: usize) {
        unsafe { self.free_areas[order].push_front(addr) };
        self.set_page_state(addr, order as u8);
    }

    fn take_free(&mut self, addr: usize, order: usize) {
        unsafe { self.free_areas[order].remove(addr) };
        self.set_page_state(addr, NOT_FREE);
    }

    fn is_free_block(&self, addr: usize, order: usize) -> bool {
        self.addr_in_range(addr, order) && self.page_state(addr) == order as u8
    }

    /// Whether any free block of `order` or above covers `addr`.
    fn is_covered_by_free_block(&self, addr: usize, order: usize) -> bool {
        (order..=MAX_ORDER)
            .any(|o| self.is_free_block(crate::align_down(addr, PAGE_SIZE << o), o))
    }

    #[cfg(feature = "tracking")]
    fn print_request_failure_stats(&self, order: usize) {
        print_request_failure_stats(PAGE_SIZE, &self.stats(), order);
    }

    #[cfg(not(feature = "tracking"))]
    fn print_request_failure_stats(&self, _order: usize) {
        // No-op when tracking is disabled
    }
}

impl<const PAGE_SIZE: usize> RegionProvider for BuddyRegionProvider<PAGE_SIZE> {
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn request_region(&mut self, order: usize) -> AllocResult<usize> {
        if order > MAX_ORDER {
            return Err(AllocError::InvalidParam);
        }

        let Some(mut block_order) = (order..=MAX_ORDER).find(|&o| !self.free_areas[o].is_empty())
        else {
            warn!(
                "buddy provider: no free block of order {} or above ({} pages free)",
                order, self.free_pages
            );
            self.print_request_failure_stats(order);
            return Err(AllocError::NoMemory);
        };

        let Some(addr) = (unsafe { self.free_areas[block_order].pop_front() }) else {
            return Err(AllocError::NoMemory);
        };
        self.set_page_state(addr, NOT_FREE);

        // Split down to the requested order, freeing the upper halves
        while block_order > order {
            block_order -= 1;
            self.push_free(addr + (PAGE_SIZE << block_order), block_order);
        }

        self.free_pages -= 1 << order;
        #[cfg(feature = "tracking")]
        {
            self.requests += 1;
        }
        Ok(addr)
    }

    fn release_region(&mut self, addr: usize, order: usize) {
        if order > MAX_ORDER
            || !self.addr_in_range(addr, order)
            || !crate::is_aligned(addr, PAGE_SIZE << order)
        {
            error!(
                "buddy provider: invalid release of {:#x} at order {}, range [{:#x}, {:#x})",
                addr, order, self.base_addr, self.end_addr
            );
            return;
        }
        if self.is_covered_by_free_block(addr, order) {
            warn!("buddy provider: double release of {:#x} detected", addr);
            return;
        }

        let mut block = addr;
        let mut block_order = order;
        while block_order < MAX_ORDER {
            let buddy = block ^ (PAGE_SIZE << block_order);
            if !self.is_free_block(buddy, block_order) {
                break;
            }
            self.take_free(buddy, block_order);
            block = block.min(buddy);
            block_order += 1;
        }
        self.push_free(block, block_order);

        self.free_pages += 1 << order;
        #[cfg(feature = "tracking")]
        {
            self.releases += 1;
        }
    }
}

impl<const PAGE_SIZE: usize> Default for BuddyRegionProvider<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
