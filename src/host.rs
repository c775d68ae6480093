use cells_edit::WorldEdits;
use cells_runtime::TickReport;
use cells_store::{CellLoader, FlushReport, PlayerId};

use crate::service::CellService;

/// Single-threaded owner of the world. Everything that writes blocks runs inside [`Host::tick`].
pub struct Host {
    service: CellService,
    world: WorldEdits,
    loader: Option<CellLoader>,
    sweep_ticks: u64,
    ticks: u64,
}

impl Host {
    pub fn new(service: CellService, world: WorldEdits, sweep_ticks: u64) -> Self {
        Self {
            service,
            world,
            loader: None,
            sweep_ticks: sweep_ticks.max(1),
            ticks: 0,
        }
    }

    pub fn with_loader(mut self, loader: CellLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Starts loading `owner`'s cell off-thread, e.g. when the player joins.
    pub fn warm(&self, owner: PlayerId) -> bool {
        match &self.loader {
            Some(l) => {
                l.request(owner);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let report = self.service.tick(&mut self.world);
        if let Some(loader) = &self.loader {
            for r in loader.drain() {
                if let Err(e) = r.result {
                    log::warn!("warming cell of {} failed: {e}", r.owner);
                }
            }
        }
        if self.ticks % self.sweep_ticks == 0 {
            let (evicted, purged) = self.service.sweep();
            if evicted + purged > 0 {
                log::debug!("sweep: {evicted} cells evicted, {purged} invitations expired");
            }
        }
        report
    }

    /// Ticks until no placement is in flight or `max_ticks` have run; returns ticks taken.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> u64 {
        let mut n = 0;
        while !self.service.is_idle() && n < max_ticks {
            self.tick();
            n += 1;
        }
        n
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn service(&self) -> &CellService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut CellService {
        &mut self.service
    }

    pub fn world(&self) -> &WorldEdits {
        &self.world
    }

    pub fn shutdown(&mut self) -> FlushReport {
        if !self.service.is_idle() {
            log::warn!(
                "shutting down with {} placements in flight",
                self.service.scheduler().in_flight()
            );
        }
        self.service.shutdown()
    }
}
