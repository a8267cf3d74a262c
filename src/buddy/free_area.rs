//! Free block lists of the buddy provider.
//!
//! Free blocks are linked through their own first bytes, so a free area
//! needs no storage beyond its head.

#[repr(C)]
struct FreeLink {
    prev: usize,
    next: usize,
}

/// Bytes a block must span to hold its list links.
pub const FREE_LINK_SIZE: usize = core::mem::size_of::<FreeLink>();

/// Intrusive doubly linked list of free blocks of one order.
pub struct FreeArea {
    head: Option<usize>,
    len: usize,
}

impl FreeArea {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn link(addr: usize) -> *mut FreeLink {
        addr as *mut FreeLink
    }

    /// # Safety
    ///
    /// `addr` must be a free, writable block of at least [`FREE_LINK_SIZE`]
    /// bytes, aligned for `usize`, and not already on any list.
    pub unsafe fn push_front(&mut self, addr: usize) {
        let next = self.head.unwrap_or(0);
        Self::link(addr).write(FreeLink { prev: 0, next });
        if next != 0 {
            (*Self::link(next)).prev = addr;
        }
        self.head = Some(addr);
        self.len += 1;
    }

    /// # Safety
    ///
    /// Every block on this list must still be valid.
    pub unsafe fn pop_front(&mut self) -> Option<usize> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }

    /// # Safety
    ///
    /// `addr` must be on this list.
    pub unsafe fn remove(&mut self, addr: usize) {
        let FreeLink { prev, next } = Self::link(addr).read();
        if prev != 0 {
            (*Self::link(prev)).next = next;
        } else {
            self.head = if next != 0 { Some(next) } else { None };
        }
        if next != 0 {
            (*Self::link(next)).prev = prev;
        }
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_push_remove() {
        let mut blocks = [[0usize; 2]; 4];
        let addrs: Vec<usize> = blocks.iter_mut().map(|b| b.as_mut_ptr() as usize).collect();
        let mut area = FreeArea::new();

        unsafe {
            for &addr in &addrs {
                area.push_front(addr);
            }
            assert_eq!(area.len(), 4);

            // middle, head and tail removals
            area.remove(addrs[1]);
            area.remove(addrs[3]);
            area.remove(addrs[0]);
            assert_eq!(area.len(), 1);
            assert_eq!(area.pop_front(), Some(addrs[2]));
            assert!(area.is_empty());
            assert_eq!(area.pop_front(), None);
        }
    }
}
