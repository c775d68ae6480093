use cells_geom::{BlockBox, BlockPos, WorldId};

use crate::store::{CellStore, SharedCell, lock_cell};

/// Maps a world position to the cached cell whose box contains it.
///
/// A cell covers the inclusive box from its origin to origin + `margin` on
/// every axis. Only cells currently in the cache are considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialLookup {
    margin: i32,
}

impl Default for SpatialLookup {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SpatialLookup {
    pub fn new(margin: i32) -> Self {
        Self {
            margin: margin.max(0),
        }
    }

    #[inline]
    pub fn margin(&self) -> i32 {
        self.margin
    }

    #[inline]
    pub fn cell_box(&self, origin: BlockPos) -> BlockBox {
        BlockBox::from_origin_extent(origin, self.margin)
    }

    pub fn find(&self, store: &CellStore, world: &WorldId, point: BlockPos) -> Option<SharedCell> {
        store.values().into_iter().find(|shared| {
            let c = lock_cell(shared);
            c.origin.world == *world && self.cell_box(c.origin.pos).contains(point)
        })
    }
}
