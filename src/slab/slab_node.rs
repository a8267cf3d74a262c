//! Slab node implementation.
//!
//! A slab starts with a [`SlabHeader`] followed by `slab_objects` slots of
//! `NODE_HEADER_SIZE + object_size` bytes. While a slot is free, its node
//! header holds the index of the next free slot; objects handed out start
//! right after the node header.

use core::mem::size_of;

use super::planner::SlabGeometry;

#[repr(C)]
pub(crate) struct SlabHeader {
    free_head: usize,
    free_count: usize,
    prev: usize,
    next: usize,
}

/// Node header kept at the start of every free slot.
#[repr(C)]
struct FreeSlot {
    next: usize,
}

/// Bytes taken by the header at the start of every slab.
pub const SLAB_HEADER_SIZE: usize = size_of::<SlabHeader>();

/// Bytes taken by the free-list node in front of every object.
pub const NODE_HEADER_SIZE: usize = size_of::<FreeSlot>();

/// Terminates a free-slot chain.
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
pub struct SlabNode {
    pub addr: usize, // Slab base, aligned to geometry.slab_bytes()
    pub geometry: SlabGeometry,
}

impl SlabNode {
    pub const fn new(addr: usize, geometry: SlabGeometry) -> Self {
        Self { addr, geometry }
    }

    /// Handle of the slab owning `obj_addr`.
    pub fn containing(obj_addr: usize, geometry: SlabGeometry) -> Self {
        Self::new(geometry.slab_base_of(obj_addr), geometry)
    }

    fn header(&self) -> &SlabHeader {
        unsafe { &*(self.addr as *const SlabHeader) }
    }

    fn header_mut(&mut self) -> &mut SlabHeader {
        unsafe { &mut *(self.addr as *mut SlabHeader) }
    }

    fn slot_addr(&self, slot: usize) -> usize {
        self.addr + SLAB_HEADER_SIZE + slot * self.geometry.slot_stride()
    }

    // Slot addresses are only word aligned when the object size is.
    fn read_link(&self, slot: usize) -> usize {
        unsafe { core::ptr::read_unaligned(self.slot_addr(slot) as *const FreeSlot).next }
    }

    fn write_link(&mut self, slot: usize, next: usize) {
        let node = self.slot_addr(slot) as *mut FreeSlot;
        unsafe { core::ptr::write_unaligned(node, FreeSlot { next }) };
    }

    /// Chain every slot into the free list and clear the list links.
    pub fn init_header(&mut self) {
        let objects = self.geometry.slab_objects();
        for slot in 0..objects {
            let next = if slot + 1 == objects { NIL } else { slot + 1 };
            self.write_link(slot, next);
        }

        *self.header_mut() = SlabHeader {
            free_head: 0,
            free_count: objects,
            prev: 0,
            next: 0,
        };
    }

    pub fn free_count(&self) -> usize {
        self.header().free_count
    }

    pub fn in_use(&self) -> usize {
        self.geometry.slab_objects() - self.free_count()
    }

    pub fn is_full(&self) -> bool {
        self.free_count() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.free_count() == self.geometry.slab_objects()
    }

    /// Take the most recently freed slot.
    pub fn pop_slot(&mut self) -> Option<usize> {
        let slot = self.header().free_head;
        if slot == NIL {
            return None;
        }
        let next = self.read_link(slot);
        let header = self.header_mut();
        header.free_head = next;
        header.free_count -= 1;
        Some(slot)
    }

    /// Put `slot` back at the head of the free list.
    pub fn push_slot(&mut self, slot: usize) {
        debug_assert!(slot < self.geometry.slab_objects());
        let head = self.header().free_head;
        self.write_link(slot, head);
        let header = self.header_mut();
        header.free_head = slot;
        header.free_count += 1;
    }

    /// Usable address of the object stored in `slot`.
    pub fn object_addr(&self, slot: usize) -> usize {
        self.slot_addr(slot) + NODE_HEADER_SIZE
    }

    pub fn slot_index_from_object(&self, obj_addr: usize) -> usize {
        (obj_addr - NODE_HEADER_SIZE - self.addr - SLAB_HEADER_SIZE) / self.geometry.slot_stride()
    }

    pub fn prev(&self) -> Option<usize> {
        let prev = self.header().prev;
        if prev == 0 {
            None
        } else {
            Some(prev)
        }
    }

    pub fn next(&self) -> Option<usize> {
        let next = self.header().next;
        if next == 0 {
            None
        } else {
            Some(next)
        }
    }

    pub fn set_prev(&mut self, prev: Option<usize>) {
        self.header_mut().prev = prev.unwrap_or(0);
    }

    pub fn set_next(&mut self, next: Option<usize>) {
        self.header_mut().next = next.unwrap_or(0);
    }
}
