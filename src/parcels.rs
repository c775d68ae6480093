use cells_geom::{BlockPos, Location, WorldId};
use cells_store::{CellId, CellRepository, PersistenceError};

use crate::config::ParcelConfig;
use crate::error::ServiceError;

/// Hands out parcel origins along the X axis of the parcels world, `spacing` apart.
#[derive(Debug, Clone)]
pub struct ParcelAllocator {
    world: WorldId,
    y: i32,
    spacing: i32,
    last_id: CellId,
}

impl ParcelAllocator {
    pub fn new(cfg: &ParcelConfig, last_id: CellId) -> Self {
        Self {
            world: WorldId::new(cfg.world.as_str()),
            y: cfg.y,
            spacing: cfg.spacing.max(1),
            last_id,
        }
    }

    /// Continues after the highest id already in storage.
    pub fn resume(cfg: &ParcelConfig, repo: &dyn CellRepository) -> Result<Self, PersistenceError> {
        let last = repo.all()?.iter().map(|c| c.id).max().unwrap_or(0);
        log::info!("Parcel allocation resumes after cell id {last}");
        Ok(Self::new(cfg, last))
    }

    #[inline]
    pub fn world(&self) -> &WorldId {
        &self.world
    }

    #[inline]
    pub fn last_id(&self) -> CellId {
        self.last_id
    }

    /// `None` once the parcel would lie past the end of the X axis.
    pub fn origin_for(&self, id: CellId) -> Option<Location> {
        let x = i64::try_from(id).ok()?.checked_mul(self.spacing as i64)?;
        let x = i32::try_from(x).ok()?;
        Some(Location::new(self.world.clone(), BlockPos::new(x, self.y, 0)))
    }

    /// Next id and its origin. The counter does not move when the world is full.
    pub fn allocate(&mut self) -> Result<(CellId, Location), ServiceError> {
        let id = self.last_id + 1;
        let origin = self.origin_for(id).ok_or(ServiceError::ParcelsExhausted(id))?;
        self.last_id = id;
        Ok((id, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cells_store::{Cell, MemoryRepository, PlayerId};

    #[test]
    fn parcels_are_spaced_along_x() {
        let mut p = ParcelAllocator::new(&ParcelConfig::default(), 0);
        let (a, la) = p.allocate().unwrap();
        let (b, lb) = p.allocate().unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(la.pos, BlockPos::new(128, 64, 0));
        assert_eq!(lb.pos, BlockPos::new(256, 64, 0));
        assert_eq!(la.world.as_str(), "cells");
    }

    #[test]
    fn resume_skips_stored_ids() {
        let repo = MemoryRepository::new();
        let p = ParcelAllocator::new(&ParcelConfig::default(), 6);
        repo.insert(Cell::new(6, PlayerId(1), 0, p.origin_for(6).unwrap()));
        let mut p = ParcelAllocator::resume(&ParcelConfig::default(), &repo).unwrap();
        assert_eq!(p.allocate().unwrap().0, 7);
    }

    #[test]
    fn allocation_stops_at_the_end_of_the_axis() {
        let cfg = ParcelConfig::default();
        let last_fit = i32::MAX as u64 / cfg.spacing as u64;
        let mut p = ParcelAllocator::new(&cfg, last_fit - 1);
        let (id, origin) = p.allocate().unwrap();
        assert_eq!(id, last_fit);
        assert_eq!(origin.pos.x as u64, last_fit * cfg.spacing as u64);

        assert!(matches!(
            p.allocate(),
            Err(ServiceError::ParcelsExhausted(n)) if n == last_fit + 1
        ));
        assert_eq!(p.last_id(), last_fit);
    }
}
