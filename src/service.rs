//! Command surface over the tier table, cell cache and placement scheduler.
//!
//! Everything here runs on the host thread. Storage is reached through the
//! cache only; the scheduler's completion continuations clear the busy flag.

use std::path::PathBuf;
use std::sync::Arc;

use cells_blocks::BlockPalette;
use cells_edit::BlockSink;
use cells_geom::{BlockPos, Location};
use cells_runtime::{PlacementHandle, PlacementScheduler, SkipMask, TickReport, no_skip};
use cells_store::{
    Cell, CellRepository, CellStore, Clock, FlushReport, PlayerId, Rank, SharedCell,
    SpatialLookup, SystemClock, TtlPolicy, lock_cell,
};
use cells_structures::{Structure, StructureLoader, TierDef, TierTable};

use crate::config::CellsConfig;
use crate::error::ServiceError;
use crate::invitations::Invitations;
use crate::parcels::ParcelAllocator;

pub struct CellService {
    tiers: Arc<TierTable>,
    tier_defs: Vec<TierDef>,
    levels_dir: PathBuf,
    loader: StructureLoader,
    store: Arc<CellStore>,
    lookup: SpatialLookup,
    scheduler: PlacementScheduler,
    parcels: ParcelAllocator,
    invitations: Invitations,
    clock: Arc<dyn Clock>,
}

impl CellService {
    /// Assembles a service from already-built parts. `cfg` supplies scheduling,
    /// lookup and invitation settings plus the tier source used by [`reload`](Self::reload).
    pub fn new(
        cfg: &CellsConfig,
        tiers: TierTable,
        store: Arc<CellStore>,
        parcels: ParcelAllocator,
        loader: StructureLoader,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tiers: Arc::new(tiers),
            tier_defs: cfg.tiers.clone(),
            levels_dir: cfg.levels_dir.clone(),
            loader,
            store,
            lookup: SpatialLookup::new(cfg.lookup.margin),
            scheduler: PlacementScheduler::new(
                cfg.placement.chunk_size,
                cfg.placement.step_delay_ticks,
            ),
            parcels,
            invitations: Invitations::new(TtlPolicy::new(std::time::Duration::from_secs(
                cfg.invitations.ttl_secs,
            ))),
            clock,
        }
    }

    /// Loads tiers and resumes parcel allocation from `repo`. Fails if the tier table is invalid.
    pub fn from_config(
        cfg: &CellsConfig,
        repo: Arc<dyn CellRepository>,
        palette: Arc<BlockPalette>,
    ) -> Result<Self, ServiceError> {
        let loader = StructureLoader::new(palette);
        let tiers = TierTable::load(&cfg.tiers, &cfg.levels_dir, &loader)?;
        for t in tiers.iter() {
            match &t.structure {
                Some(s) => log::info!(
                    "tier {}: structure {} ({} sections, {} blocks), cost {}",
                    t.level,
                    s.name(),
                    s.section_count(),
                    s.block_count(),
                    t.cost
                ),
                None => log::info!("tier {}: no structure, cost {}", t.level, t.cost),
            }
        }
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(CellStore::with_clock(
            Arc::clone(&repo),
            TtlPolicy::new(cfg.cache.ttl()),
            Arc::clone(&clock),
        ));
        let parcels = ParcelAllocator::resume(&cfg.parcels, repo.as_ref())?;
        Ok(Self::new(cfg, tiers, store, parcels, loader, clock))
    }

    pub fn store(&self) -> &Arc<CellStore> {
        &self.store
    }

    pub fn tiers(&self) -> &Arc<TierTable> {
        &self.tiers
    }

    pub fn lookup(&self) -> SpatialLookup {
        self.lookup
    }

    pub fn scheduler(&self) -> &PlacementScheduler {
        &self.scheduler
    }

    pub fn parcels(&self) -> &ParcelAllocator {
        &self.parcels
    }

    fn cell_of(&self, owner: PlayerId) -> Result<SharedCell, ServiceError> {
        self.store.get(owner)?.ok_or(ServiceError::NoCell(owner))
    }

    /// Queues `structure` at the cell origin; completion clears the busy flag.
    fn schedule(
        &mut self,
        owner: PlayerId,
        held: &SharedCell,
        structure: Arc<Structure>,
        origin: &Location,
        mask: SkipMask,
        level: u32,
    ) -> PlacementHandle {
        let store = Arc::clone(&self.store);
        let held = Arc::clone(held);
        self.scheduler.place_then(
            structure,
            origin.world.clone(),
            origin.pos,
            mask,
            move |outcome| {
                lock_cell(&held).busy = false;
                // The entry may have been refetched meanwhile; clear the cached copy as well.
                match store.update(owner, |c| c.busy = false) {
                    Ok(Some(())) => {}
                    Ok(None) => {
                        log::warn!("cell of {owner} vanished while building level {level}");
                        store.commit(owner, &held);
                    }
                    Err(e) => {
                        log::warn!("could not reload cell of {owner} after building: {e}");
                        store.commit(owner, &held);
                    }
                }
                log::info!(
                    "cell of {owner} reached level {level} ({} steps, {} blocks)",
                    outcome.steps,
                    outcome.writes
                );
            },
        )
    }

    /// Creates a level-0 cell on a fresh parcel and starts building it.
    pub fn claim(&mut self, owner: PlayerId) -> Result<(SharedCell, PlacementHandle), ServiceError> {
        if self.store.get(owner)?.is_some() {
            return Err(ServiceError::AlreadyOwned(owner));
        }
        let tiers = Arc::clone(&self.tiers);
        let structure = tiers
            .get(0)
            .and_then(|t| t.structure.clone())
            .ok_or(ServiceError::NoSuchLevel(0))?;
        let (id, origin) = self.parcels.allocate()?;
        let mut cell = Cell::new(id, owner, 0, origin.clone());
        cell.busy = true;
        let shared = self.store.put(owner, cell);
        log::info!("player {owner} claimed cell {id} at {origin}");
        let handle = self.schedule(owner, &shared, structure, &origin, no_skip(), 0);
        Ok((shared, handle))
    }

    /// Moves the cell to `level`. Returns the placement handle when the tier has a structure.
    ///
    /// Positions inside the new tier's build zones are left untouched so member builds survive.
    pub fn upgrade(
        &mut self,
        owner: PlayerId,
        level: u32,
    ) -> Result<Option<PlacementHandle>, ServiceError> {
        let tiers = Arc::clone(&self.tiers);
        let tier = tiers.get(level).ok_or(ServiceError::NoSuchLevel(level))?;
        let cell = self.cell_of(owner)?;
        let origin = {
            let mut c = lock_cell(&cell);
            if c.busy {
                return Err(ServiceError::Busy(c.id));
            }
            c.level = level;
            c.busy = tier.has_structure();
            c.origin.clone()
        };
        self.store.commit(owner, &cell);
        log::info!("upgrading cell of {owner} to level {level}");
        let Some(structure) = tier.structure.clone() else {
            return Ok(None);
        };
        let zones = tier.build_zones.clone();
        let mask: SkipMask = Arc::new(move |offset: BlockPos| zones.iter().any(|z| z.contains(offset)));
        Ok(Some(self.schedule(owner, &cell, structure, &origin, mask, level)))
    }

    pub fn upgrade_next(&mut self, owner: PlayerId) -> Result<Option<PlacementHandle>, ServiceError> {
        let level = lock_cell(&self.cell_of(owner)?).level;
        if level >= self.tiers.max_level() {
            return Err(ServiceError::MaxLevel(level));
        }
        self.upgrade(owner, level + 1)
    }

    /// Price of the next tier, `None` at the top. Nothing is charged here.
    pub fn next_cost(&self, owner: PlayerId) -> Result<Option<f64>, ServiceError> {
        let level = lock_cell(&self.cell_of(owner)?).level;
        Ok(self.tiers.next(level).map(|t| t.cost))
    }

    fn update_cell<R>(
        &self,
        owner: PlayerId,
        f: impl FnOnce(&mut Cell) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        self.store
            .update(owner, f)?
            .ok_or(ServiceError::NoCell(owner))?
    }

    pub fn add_member(&self, owner: PlayerId, player: PlayerId, rank: Rank) -> Result<(), ServiceError> {
        self.update_cell(owner, |c| {
            if c.set_member(player, rank) {
                Ok(())
            } else {
                Err(ServiceError::OwnerFixed)
            }
        })
    }

    pub fn remove_member(&self, owner: PlayerId, player: PlayerId) -> Result<Rank, ServiceError> {
        self.update_cell(owner, |c| {
            if player == c.owner {
                return Err(ServiceError::OwnerFixed);
            }
            c.remove_member(player).ok_or(ServiceError::NotMember(player))
        })
    }

    pub fn set_name(&self, owner: PlayerId, name: Option<String>) -> Result<(), ServiceError> {
        self.update_cell(owner, |c| {
            c.name = name;
            Ok(())
        })
    }

    pub fn set_description(
        &self,
        owner: PlayerId,
        description: Option<String>,
    ) -> Result<(), ServiceError> {
        self.update_cell(owner, |c| {
            c.description = description;
            Ok(())
        })
    }

    pub fn invite(&mut self, owner: PlayerId, invitee: PlayerId) -> Result<(), ServiceError> {
        if lock_cell(&self.cell_of(owner)?).is_member(invitee) {
            return Err(ServiceError::AlreadyMember(invitee));
        }
        self.invitations.insert(owner, invitee, self.clock.now());
        log::debug!("{owner} invited {invitee}");
        Ok(())
    }

    pub fn has_invitation(&self, owner: PlayerId, invitee: PlayerId) -> bool {
        self.invitations.contains(owner, invitee, self.clock.now())
    }

    /// Joins `owner`'s cell as a [`Rank::Member`]. The invitation is consumed.
    pub fn accept_invitation(&mut self, invitee: PlayerId, owner: PlayerId) -> Result<(), ServiceError> {
        if !self.invitations.take(owner, invitee, self.clock.now()) {
            return Err(ServiceError::NoInvitation);
        }
        self.update_cell(owner, |c| {
            if c.is_member(invitee) {
                return Err(ServiceError::AlreadyMember(invitee));
            }
            c.set_member(invitee, Rank::Member);
            Ok(())
        })
    }

    /// Cell origin plus the spawn offset of its current tier.
    pub fn spawnpoint(&self, cell: &Cell) -> Location {
        let tier = self.tiers.get(cell.level).unwrap_or_else(|| self.tiers.last());
        cell.origin.offset_by(tier.spawn)
    }

    pub fn find_cell_by_owner(&self, owner: PlayerId) -> Result<Option<SharedCell>, ServiceError> {
        Ok(self.store.get(owner)?)
    }

    /// Cached cell whose box contains `location`. Cold cells are not found.
    pub fn find_cell_by_location(&self, location: &Location) -> Option<SharedCell> {
        self.lookup.find(&self.store, &location.world, location.pos)
    }

    pub fn find_cells_by_member(&self, player: PlayerId) -> Vec<SharedCell> {
        self.store
            .values()
            .into_iter()
            .filter(|c| lock_cell(c).is_member(player))
            .collect()
    }

    /// Cached cells by level, highest first; ties by cell id.
    pub fn top_cells(&self, n: usize) -> Vec<SharedCell> {
        let mut cells: Vec<(u32, u64, SharedCell)> = self
            .store
            .values()
            .into_iter()
            .map(|s| {
                let (level, id) = {
                    let c = lock_cell(&s);
                    (c.level, c.id)
                };
                (level, id, s)
            })
            .collect();
        cells.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        cells.into_iter().take(n).map(|(_, _, s)| s).collect()
    }

    /// Block edit gate. Outside any cell everything is allowed.
    pub fn can_build(&self, player: PlayerId, is_admin: bool, location: &Location) -> bool {
        if is_admin {
            return true;
        }
        let Some(shared) = self.find_cell_by_location(location) else {
            return true;
        };
        let c = lock_cell(&shared);
        match c.rank_of(player) {
            None => false,
            Some(rank) if rank.can_build() => true,
            Some(_) => self
                .tiers
                .get(c.level)
                .is_some_and(|t| t.can_build(&c.origin, location)),
        }
    }

    /// Block interaction gate; containers need a rank with chest access.
    pub fn can_interact(
        &self,
        player: PlayerId,
        is_admin: bool,
        location: &Location,
        is_container: bool,
    ) -> bool {
        if is_admin {
            return true;
        }
        let Some(shared) = self.find_cell_by_location(location) else {
            return true;
        };
        let rank = lock_cell(&shared).rank_of(player);
        match rank {
            None => false,
            Some(r) => !is_container || r.can_access_chests(),
        }
    }

    /// Re-reads the tier table. On failure the current table stays in place.
    pub fn reload_tiers(&mut self) -> Result<(), ServiceError> {
        let table = TierTable::load(&self.tier_defs, &self.levels_dir, &self.loader)?;
        self.replace_tiers(table)?;
        log::info!("tier table reloaded ({} tiers)", self.tiers.len());
        Ok(())
    }

    /// Swaps in `table` unless some cached or stored cell sits above its highest level.
    pub fn replace_tiers(&mut self, table: TierTable) -> Result<(), ServiceError> {
        self.check_levels_covered(&table)?;
        self.tiers = Arc::new(table);
        Ok(())
    }

    fn check_levels_covered(&self, table: &TierTable) -> Result<(), ServiceError> {
        let max = table.max_level();
        let cached = self.store.values().iter().map(|c| lock_cell(c).level).max();
        let stored = self.store.repository().all()?.iter().map(|c| c.level).max();
        match cached.max(stored) {
            Some(level) if level > max => Err(ServiceError::LevelsNotCovered { level, max }),
            _ => Ok(()),
        }
    }

    /// Reloads tiers, then flushes and drops the cell cache.
    pub fn reload(&mut self) -> Result<FlushReport, ServiceError> {
        self.reload_tiers()?;
        Ok(self.store.reload(true))
    }

    pub fn tick(&mut self, sink: &mut dyn BlockSink) -> TickReport {
        self.scheduler.tick(sink)
    }

    /// Evicts expired cache entries and drops stale invitations.
    pub fn sweep(&mut self) -> (usize, usize) {
        let evicted = self.store.evict_expired();
        let purged = self.invitations.purge(self.clock.now());
        (evicted, purged)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn shutdown(&self) -> FlushReport {
        let report = self.store.flush_dirty();
        log::info!(
            "cells flushed on shutdown: {} saved, {} failed",
            report.saved,
            report.failed
        );
        report
    }
}
