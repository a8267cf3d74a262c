//! Slab cache implementation for a single object size.
//!
//! This module implements ObjectCache which manages three lists (empty, partial, full)
//! of slab nodes. A slab's list is derived from its free count alone.

use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::{debug, error, info, warn};

use super::planner::SlabGeometry;
use super::slab_node::SlabNode;
use crate::{AllocError, AllocResult, RegionProvider, DEFAULT_PAGE_SIZE, MIN_SLAB_OBJECTS};

/// Doubly linked list of slabs, threaded through their headers.
struct SlabIntrusiveList {
    head: Option<usize>,
    len: usize,
}

impl SlabIntrusiveList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn front(&self) -> Option<usize> {
        self.head
    }

    pub fn push_front(&mut self, geometry: SlabGeometry, slab_base: usize) {
        let mut node = SlabNode::new(slab_base, geometry);
        node.set_prev(None);
        node.set_next(self.head);

        if let Some(head) = self.head {
            let mut head_node = SlabNode::new(head, geometry);
            head_node.set_prev(Some(slab_base));
        }

        self.head = Some(slab_base);
        self.len += 1;
    }

    pub fn pop_front(&mut self, geometry: SlabGeometry) -> Option<usize> {
        let head = self.head?;
        self.remove(geometry, head);
        Some(head)
    }

    pub fn remove(&mut self, geometry: SlabGeometry, slab_base: usize) {
        let mut node = SlabNode::new(slab_base, geometry);
        let prev = node.prev();
        let next = node.next();

        if let Some(prev_base) = prev {
            let mut prev_node = SlabNode::new(prev_base, geometry);
            prev_node.set_next(next);
        } else {
            self.head = next;
        }

        if let Some(next_base) = next {
            let mut next_node = SlabNode::new(next_base, geometry);
            next_node.set_prev(prev);
        }

        node.set_prev(None);
        node.set_next(None);
        self.len -= 1;
    }

    pub fn iter(&self, geometry: SlabGeometry) -> SlabListIter {
        SlabListIter {
            cursor: self.head,
            geometry,
        }
    }
}

struct SlabListIter {
    cursor: Option<usize>,
    geometry: SlabGeometry,
}

impl Iterator for SlabListIter {
    type Item = SlabNode;

    fn next(&mut self) -> Option<SlabNode> {
        let node = SlabNode::new(self.cursor?, self.geometry);
        self.cursor = node.next();
        Some(node)
    }
}

/// Lifecycle class of a slab, derived from its free count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    /// Every slot is free.
    Empty,
    /// Some slots are free.
    Partial,
    /// No slot is free.
    Full,
}

impl SlabState {
    pub fn classify(free_count: usize, slab_objects: usize) -> Self {
        if free_count == 0 {
            SlabState::Full
        } else if free_count == slab_objects {
            SlabState::Empty
        } else {
            SlabState::Partial
        }
    }
}

/// Snapshot of a cache's slab lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub empty_slabs: usize,
    pub partial_slabs: usize,
    pub full_slabs: usize,
    pub objects_in_use: usize,
    pub free_objects: usize,
}

impl CacheStats {
    pub fn total_slabs(&self) -> usize {
        self.empty_slabs + self.partial_slabs + self.full_slabs
    }
}

/// Cache of fixed-size objects.
///
/// Slabs are requested lazily from a [`RegionProvider`] and only handed back
/// by [`shrink`](Self::shrink) (empty slabs) or [`release`](Self::release)
/// (all slabs). The cache is single threaded; callers sharing it across
/// threads must provide their own mutual exclusion.
pub struct ObjectCache<const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE> {
    geometry: SlabGeometry,
    empty: SlabIntrusiveList,
    partial: SlabIntrusiveList,
    full: SlabIntrusiveList,
}

impl<const PAGE_SIZE: usize> ObjectCache<PAGE_SIZE> {
    /// Set up a cache for objects of `object_size` bytes.
    pub fn new(object_size: usize) -> AllocResult<Self> {
        Self::with_floor(object_size, MIN_SLAB_OBJECTS)
    }

    /// Set up a cache whose slabs hold at least `floor` objects.
    pub fn with_floor(object_size: usize, floor: usize) -> AllocResult<Self> {
        let geometry = SlabGeometry::plan_with_floor(object_size, floor, PAGE_SIZE)?;
        Ok(Self {
            geometry,
            empty: SlabIntrusiveList::new(),
            partial: SlabIntrusiveList::new(),
            full: SlabIntrusiveList::new(),
        })
    }

    pub fn geometry(&self) -> SlabGeometry {
        self.geometry
    }

    pub fn object_size(&self) -> usize {
        self.geometry.object_size()
    }

    pub fn slab_order(&self) -> usize {
        self.geometry.slab_order()
    }

    pub fn slab_objects(&self) -> usize {
        self.geometry.slab_objects()
    }

    fn list_mut(&mut self, state: SlabState) -> &mut SlabIntrusiveList {
        match state {
            SlabState::Empty => &mut self.empty,
            SlabState::Partial => &mut self.partial,
            SlabState::Full => &mut self.full,
        }
    }

    /// Move `node` from the list of `before` to the list matching its
    /// current free count, if the two differ.
    fn refile(&mut self, node: &SlabNode, before: SlabState) {
        let after = SlabState::classify(node.free_count(), self.slab_objects());
        if after == before {
            return;
        }
        let geometry = self.geometry;
        self.list_mut(before).remove(geometry, node.addr);
        self.list_mut(after).push_front(geometry, node.addr);
    }

    /// Allocate one object.
    ///
    /// Partial slabs are used first, then empty ones; a new slab is requested
    /// from `provider` only when neither exists. On error the cache is left
    /// unchanged.
    pub fn alloc(&mut self, provider: &mut dyn RegionProvider) -> AllocResult<NonNull<u8>> {
        // 1. Try to allocate from partial list
        let (slab_base, before) = if let Some(slab_base) = self.partial.front() {
            (slab_base, SlabState::Partial)
        // 2. Try to allocate from empty list
        } else if let Some(slab_base) = self.empty.front() {
            (slab_base, SlabState::Empty)
        // 3. Allocate a new slab from the provider
        } else {
            let slab_base = self.grow(provider)?;
            self.partial.push_front(self.geometry, slab_base);
            (slab_base, SlabState::Partial)
        };

        let mut node = SlabNode::new(slab_base, self.geometry);
        let Some(slot) = node.pop_slot() else {
            panic!(
                "slab {:#x} filed as {:?} has no free slot, list corruption detected",
                slab_base, before
            );
        };
        self.refile(&node, before);

        // SAFETY: slab bases are non-null, objects lie above them.
        Ok(unsafe { NonNull::new_unchecked(node.object_addr(slot) as *mut u8) })
    }

    /// Request and format a new slab. It is not on any list yet.
    fn grow(&mut self, provider: &mut dyn RegionProvider) -> AllocResult<usize> {
        let order = self.slab_order();
        if provider.page_size() != self.geometry.page_size() {
            error!(
                "slab cache: provider page size {:#x} differs from cache page size {:#x}",
                provider.page_size(),
                self.geometry.page_size()
            );
            return Err(AllocError::InvalidParam);
        }

        let slab_base = provider.request_region(order).map_err(|err| {
            warn!(
                "slab cache: provider failed for order {} (object_size {}): {:?}",
                order,
                self.object_size(),
                err
            );
            err
        })?;

        if slab_base == 0 {
            error!("slab cache: provider returned a null region of order {}", order);
            return Err(AllocError::NoMemory);
        }
        if !crate::is_aligned(slab_base, self.geometry.slab_bytes()) {
            error!(
                "slab cache: region {:#x} of order {} is not aligned to {:#x}",
                slab_base,
                order,
                self.geometry.slab_bytes()
            );
            provider.release_region(slab_base, order);
            return Err(AllocError::MisalignedRegion);
        }

        let mut node = SlabNode::new(slab_base, self.geometry);
        node.init_header();
        debug!(
            "slab cache: new slab {:#x}, order {}, {} objects of {} bytes",
            slab_base,
            order,
            self.slab_objects(),
            self.object_size()
        );
        Ok(slab_base)
    }

    /// Return an object to its slab.
    ///
    /// The owning slab is found by masking `ptr` down to the slab size. The
    /// slot becomes the next one handed out by that slab.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this cache
    /// and not freed since.
    pub unsafe fn dealloc(&mut self, ptr: NonNull<u8>) {
        let obj_addr = ptr.as_ptr() as usize;
        let mut node = SlabNode::containing(obj_addr, self.geometry);
        let slot = node.slot_index_from_object(obj_addr);
        debug_assert!(
            slot < self.slab_objects() && node.object_addr(slot) == obj_addr,
            "{:#x} is not an object of slab {:#x}",
            obj_addr,
            node.addr
        );

        let before = SlabState::classify(node.free_count(), self.slab_objects());
        node.push_slot(slot);
        self.refile(&node, before);
    }

    /// Return every empty slab to `provider`.
    pub fn shrink(&mut self, provider: &mut dyn RegionProvider) {
        let released = Self::release_list(&mut self.empty, self.geometry, provider);
        if released > 0 {
            debug!(
                "slab cache: shrink released {} slabs of order {}",
                released,
                self.slab_order()
            );
        }
    }

    /// Return every slab to `provider` and tear the cache down.
    ///
    /// Objects still allocated from this cache become dangling.
    pub fn release(mut self, provider: &mut dyn RegionProvider) {
        let geometry = self.geometry;
        let released = Self::release_list(&mut self.full, geometry, provider)
            + Self::release_list(&mut self.partial, geometry, provider)
            + Self::release_list(&mut self.empty, geometry, provider);
        info!(
            "slab cache: released {} slabs (object_size {})",
            released,
            geometry.object_size()
        );
    }

    fn release_list(
        list: &mut SlabIntrusiveList,
        geometry: SlabGeometry,
        provider: &mut dyn RegionProvider,
    ) -> usize {
        let mut released = 0;
        while let Some(slab_base) = list.pop_front(geometry) {
            provider.release_region(slab_base, geometry.slab_order());
            released += 1;
        }
        released
    }

    /// Count slabs and objects on every list.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            empty_slabs: self.empty.len(),
            partial_slabs: self.partial.len(),
            full_slabs: self.full.len(),
            ..CacheStats::default()
        };
        for list in [&self.empty, &self.partial, &self.full] {
            for node in list.iter(self.geometry) {
                stats.objects_in_use += node.in_use();
                stats.free_objects += node.free_count();
            }
        }
        stats
    }

    /// Check that every slab sits on the list matching its free count and
    /// that list links and lengths agree.
    pub fn validate(&self) -> bool {
        let lists = [
            (SlabState::Empty, &self.empty),
            (SlabState::Partial, &self.partial),
            (SlabState::Full, &self.full),
        ];
        for (state, list) in lists {
            let mut prev = None;
            let mut len = 0;
            for node in list.iter(self.geometry) {
                if node.prev() != prev
                    || SlabState::classify(node.free_count(), self.slab_objects()) != state
                {
                    return false;
                }
                prev = Some(node.addr);
                len += 1;
            }
            if len != list.len() {
                return false;
            }
        }
        true
    }
}

impl<const PAGE_SIZE: usize> Drop for ObjectCache<PAGE_SIZE> {
    fn drop(&mut self) {
        let outstanding = self.empty.len() + self.partial.len() + self.full.len();
        if outstanding > 0 {
            warn!(
                "slab cache: dropped with {} slabs outstanding, call release() first",
                outstanding
            );
        }
    }
}
