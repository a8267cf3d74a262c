//! Slab geometry planning.
//!
//! Picks the smallest slab order able to hold a floor of objects plus the
//! slab header, then packs as many extra objects as the order leaves room for.

#[cfg(feature = "log")]
use log::{debug, warn};

use super::slab_node::{NODE_HEADER_SIZE, SLAB_HEADER_SIZE};
use crate::{region_bytes, AllocError, AllocResult, MAX_ORDER, MIN_SLAB_OBJECTS};

/// Fixed layout of every slab in one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabGeometry {
    object_size: usize,
    slab_order: usize,
    slab_objects: usize,
    page_size: usize,
}

impl SlabGeometry {
    /// Plan a slab layout with the default floor of [`MIN_SLAB_OBJECTS`].
    pub fn plan(object_size: usize, page_size: usize) -> AllocResult<Self> {
        Self::plan_with_floor(object_size, MIN_SLAB_OBJECTS, page_size)
    }

    /// Plan a slab layout holding at least `floor` objects of `object_size` bytes.
    ///
    /// # Errors
    /// - [`AllocError::InvalidParam`] if `object_size` or `floor` is zero, or
    ///   `page_size` is not a power of two.
    /// - [`AllocError::ObjectTooLarge`] if no order up to [`MAX_ORDER`] fits.
    pub fn plan_with_floor(
        object_size: usize,
        floor: usize,
        page_size: usize,
    ) -> AllocResult<Self> {
        if object_size == 0 || floor == 0 || !page_size.is_power_of_two() {
            return Err(AllocError::InvalidParam);
        }

        let per_object = NODE_HEADER_SIZE
            .checked_add(object_size)
            .ok_or(AllocError::ObjectTooLarge)?;
        let minimum_region = floor
            .checked_mul(per_object)
            .and_then(|bytes| bytes.checked_add(SLAB_HEADER_SIZE))
            .ok_or(AllocError::ObjectTooLarge)?;

        let mut order = 0;
        while region_bytes(page_size, order) < minimum_region {
            if order == MAX_ORDER {
                warn!(
                    "slab planner: {} objects of {} bytes need {} bytes, more than order {}",
                    floor, object_size, minimum_region, MAX_ORDER
                );
                return Err(AllocError::ObjectTooLarge);
            }
            order += 1;
        }

        let extra_bytes = region_bytes(page_size, order) - minimum_region;
        let slab_objects = floor + extra_bytes / per_object;

        debug!(
            "slab planner: object_size={}, order={}, objects={}",
            object_size, order, slab_objects
        );

        Ok(Self {
            object_size,
            slab_order: order,
            slab_objects,
            page_size,
        })
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn slab_order(&self) -> usize {
        self.slab_order
    }

    pub fn slab_objects(&self) -> usize {
        self.slab_objects
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes spanned by one slab; also its alignment.
    pub fn slab_bytes(&self) -> usize {
        region_bytes(self.page_size, self.slab_order)
    }

    /// Distance between two consecutive slots.
    pub fn slot_stride(&self) -> usize {
        NODE_HEADER_SIZE + self.object_size
    }

    /// Base address of the slab containing `addr`.
    pub fn slab_base_of(&self, addr: usize) -> usize {
        crate::align_down(addr, self.slab_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_PAGE_SIZE;

    #[test]
    fn test_header_sizes() {
        assert_eq!(NODE_HEADER_SIZE, core::mem::size_of::<usize>());
        assert_eq!(SLAB_HEADER_SIZE, 4 * core::mem::size_of::<usize>());
    }

    #[test]
    fn test_plan_small_object() {
        let geometry = SlabGeometry::plan(40, DEFAULT_PAGE_SIZE).unwrap();
        let per_object = NODE_HEADER_SIZE + 40;
        let minimum = SLAB_HEADER_SIZE + 32 * per_object;
        assert_eq!(geometry.slab_order(), 0);
        assert_eq!(
            geometry.slab_objects(),
            32 + (DEFAULT_PAGE_SIZE - minimum) / per_object
        );
        assert!(SLAB_HEADER_SIZE + geometry.slab_objects() * per_object <= geometry.slab_bytes());
    }

    #[test]
    fn test_plan_picks_minimal_order() {
        // 32 * (8 + 256) + 32 = 8480 bytes, more than two pages
        let geometry = SlabGeometry::plan(256, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(geometry.slab_order(), 2);
        assert!(geometry.slab_bytes() >= SLAB_HEADER_SIZE + 32 * geometry.slot_stride());
        assert!(geometry.slab_bytes() / 2 < SLAB_HEADER_SIZE + 32 * geometry.slot_stride());
    }

    #[test]
    fn test_plan_fills_extra_space() {
        for object_size in [1, 8, 40, 100, 1000, 4000, 60_000] {
            let geometry = SlabGeometry::plan(object_size, DEFAULT_PAGE_SIZE).unwrap();
            let used = SLAB_HEADER_SIZE + geometry.slab_objects() * geometry.slot_stride();
            assert!(geometry.slab_objects() >= MIN_SLAB_OBJECTS);
            assert!(used <= geometry.slab_bytes());
            // one more slot would not fit
            assert!(used + geometry.slot_stride() > geometry.slab_bytes());
        }
    }

    #[test]
    fn test_plan_too_large() {
        let largest = region_bytes(DEFAULT_PAGE_SIZE, MAX_ORDER);
        assert_eq!(
            SlabGeometry::plan(largest, DEFAULT_PAGE_SIZE),
            Err(AllocError::ObjectTooLarge)
        );
        // fits alone, but not 32 times
        assert_eq!(
            SlabGeometry::plan(largest / 16, DEFAULT_PAGE_SIZE),
            Err(AllocError::ObjectTooLarge)
        );
        assert_eq!(
            SlabGeometry::plan(usize::MAX, DEFAULT_PAGE_SIZE),
            Err(AllocError::ObjectTooLarge)
        );
    }

    #[test]
    fn test_plan_invalid_params() {
        assert_eq!(
            SlabGeometry::plan(0, DEFAULT_PAGE_SIZE),
            Err(AllocError::InvalidParam)
        );
        assert_eq!(
            SlabGeometry::plan_with_floor(64, 0, DEFAULT_PAGE_SIZE),
            Err(AllocError::InvalidParam)
        );
        assert_eq!(SlabGeometry::plan(64, 3000), Err(AllocError::InvalidParam));
    }

    #[test]
    fn test_plan_single_object_floor() {
        let geometry = SlabGeometry::plan_with_floor(3000, 1, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(geometry.slab_order(), 0);
        assert_eq!(geometry.slab_objects(), 1);
    }

    #[test]
    fn test_slab_base_of() {
        let geometry = SlabGeometry::plan(256, DEFAULT_PAGE_SIZE).unwrap();
        let base = 0x40_0000;
        assert_eq!(geometry.slab_base_of(base), base);
        assert_eq!(geometry.slab_base_of(base + geometry.slab_bytes() - 1), base);
        assert_eq!(
            geometry.slab_base_of(base + geometry.slab_bytes()),
            base + geometry.slab_bytes()
        );
    }
}
