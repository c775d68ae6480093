//! Structure placement spread across host ticks.
//!
//! A placement is an explicit state machine: the index of the next section to
//! apply plus the number of steps already run. Each due step applies up to
//! `chunk_size` sections through the [`BlockSink`] and, if work remains,
//! re-queues itself `step_delay_ticks` later. No locks are held between steps
//! and nothing can cancel a started placement.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cells_edit::BlockSink;
use cells_geom::{BlockPos, WorldId};
use cells_structures::Structure;
use crossbeam_channel::{Receiver, Sender, bounded};
use hashbrown::HashMap;

use crate::queue::TickQueue;

pub type PlacementId = u64;

/// Per-position filter over structure-local offsets; `true` skips the position.
pub type SkipMask = Arc<dyn Fn(BlockPos) -> bool + Send + Sync>;

pub fn no_skip() -> SkipMask {
    Arc::new(|_| false)
}

type OnComplete = Box<dyn FnOnce(&PlacementOutcome) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementOutcome {
    pub id: PlacementId,
    pub sections: usize,
    pub steps: u32,
    pub writes: u64,
    pub skipped: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementProgress {
    pub next_section: usize,
    pub total_sections: usize,
    pub steps_run: u32,
    pub steps_remaining: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub steps: u32,
    pub completed: u32,
    pub writes: u64,
}

/// Completion signal for one placement. Fires once every section has been visited.
pub struct PlacementHandle {
    id: PlacementId,
    rx: Receiver<PlacementOutcome>,
    outcome: Option<PlacementOutcome>,
}

impl PlacementHandle {
    #[inline]
    pub fn id(&self) -> PlacementId {
        self.id
    }

    /// Non-blocking check; the outcome is retained once observed.
    pub fn poll(&mut self) -> Option<PlacementOutcome> {
        if self.outcome.is_none() {
            self.outcome = self.rx.try_recv().ok();
        }
        self.outcome
    }

    pub fn is_done(&mut self) -> bool {
        self.poll().is_some()
    }

    /// Blocks the calling thread; never call this from the thread that ticks the scheduler.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<PlacementOutcome> {
        if self.outcome.is_none() {
            self.outcome = self.rx.recv_timeout(timeout).ok();
        }
        self.outcome
    }
}

impl fmt::Debug for PlacementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementHandle")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}

struct Placement {
    structure: Arc<Structure>,
    world: WorldId,
    origin: BlockPos,
    mask: SkipMask,
    next_section: usize,
    steps_run: u32,
    writes: u64,
    skipped: u64,
    done_tx: Sender<PlacementOutcome>,
    on_complete: Option<OnComplete>,
}

pub struct PlacementScheduler {
    chunk_size: usize,
    step_delay_ticks: u64,
    queue: TickQueue<PlacementId>,
    placements: HashMap<PlacementId, Placement>,
    next_id: PlacementId,
}

impl PlacementScheduler {
    /// `chunk_size` is the number of sections per step; both values are clamped to at least 1.
    pub fn new(chunk_size: usize, step_delay_ticks: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            step_delay_ticks: step_delay_ticks.max(1),
            queue: TickQueue::default(),
            placements: HashMap::new(),
            next_id: 1,
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn step_delay_ticks(&self) -> u64 {
        self.step_delay_ticks
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.queue.now()
    }

    pub fn place(
        &mut self,
        structure: Arc<Structure>,
        world: WorldId,
        origin: BlockPos,
        mask: SkipMask,
    ) -> PlacementHandle {
        self.enqueue(structure, world, origin, mask, None)
    }

    /// Like [`place`](Self::place), running `on_complete` on the ticking thread when done.
    pub fn place_then<F>(
        &mut self,
        structure: Arc<Structure>,
        world: WorldId,
        origin: BlockPos,
        mask: SkipMask,
        on_complete: F,
    ) -> PlacementHandle
    where
        F: FnOnce(&PlacementOutcome) + Send + 'static,
    {
        self.enqueue(structure, world, origin, mask, Some(Box::new(on_complete)))
    }

    fn enqueue(
        &mut self,
        structure: Arc<Structure>,
        world: WorldId,
        origin: BlockPos,
        mask: SkipMask,
        on_complete: Option<OnComplete>,
    ) -> PlacementHandle {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let (done_tx, rx) = bounded(1);
        log::debug!(
            "Starting placement {id} of structure {} at {world}:{origin} ({} sections)",
            structure.name(),
            structure.section_count()
        );
        self.placements.insert(
            id,
            Placement {
                structure,
                world,
                origin,
                mask,
                next_section: 0,
                steps_run: 0,
                writes: 0,
                skipped: 0,
                done_tx,
                on_complete,
            },
        );
        self.queue.push_after(self.step_delay_ticks, id);
        PlacementHandle {
            id,
            rx,
            outcome: None,
        }
    }

    /// Advances one host tick and runs every step due on it.
    pub fn tick(&mut self, sink: &mut dyn BlockSink) -> TickReport {
        let due = self.queue.advance();
        let mut report = TickReport {
            tick: self.queue.now(),
            ..TickReport::default()
        };
        for id in due {
            let Some(p) = self.placements.get_mut(&id) else {
                continue;
            };
            let structure = Arc::clone(&p.structure);
            let sections = structure.sections();
            if p.next_section < sections.len() {
                let end = (p.next_section + self.chunk_size).min(sections.len());
                for section in &sections[p.next_section..end] {
                    for (offset, block) in &section.blocks {
                        if (p.mask)(*offset) {
                            p.skipped += 1;
                            continue;
                        }
                        sink.set_block(&p.world, p.origin + *offset, *block);
                        p.writes += 1;
                        report.writes += 1;
                    }
                }
                p.next_section = end;
                p.steps_run += 1;
                report.steps += 1;
            }
            if p.next_section >= sections.len() {
                self.finish(id);
                report.completed += 1;
            } else {
                self.queue.push_after(self.step_delay_ticks, id);
            }
        }
        report
    }

    fn finish(&mut self, id: PlacementId) {
        let Some(mut p) = self.placements.remove(&id) else {
            return;
        };
        let outcome = PlacementOutcome {
            id,
            sections: p.structure.section_count(),
            steps: p.steps_run,
            writes: p.writes,
            skipped: p.skipped,
        };
        log::debug!(
            "Finished placement {id} of structure {} in {} steps ({} writes, {} skipped)",
            p.structure.name(),
            outcome.steps,
            outcome.writes,
            outcome.skipped
        );
        // The handle may already be dropped; completion still runs the continuation.
        let _ = p.done_tx.try_send(outcome);
        if let Some(cb) = p.on_complete.take() {
            cb(&outcome);
        }
    }

    pub fn progress(&self, id: PlacementId) -> Option<PlacementProgress> {
        self.placements.get(&id).map(|p| {
            let total = p.structure.section_count();
            let left = total.saturating_sub(p.next_section);
            PlacementProgress {
                next_section: p.next_section,
                total_sections: total,
                steps_run: p.steps_run,
                steps_remaining: left.div_ceil(self.chunk_size) as u32,
            }
        })
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.placements.len()
    }

    /// Tick on which the next step will run.
    pub fn next_step_tick(&self) -> Option<u64> {
        self.queue.next_due()
    }

    pub fn queued_steps(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.placements.is_empty()
    }

    /// Ticks until nothing is in flight; returns the number of ticks taken.
    pub fn run_until_idle(&mut self, sink: &mut dyn BlockSink) -> u64 {
        let mut ticks = 0;
        while !self.is_idle() {
            self.tick(sink);
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cells_blocks::Block;
    use cells_structures::StructureBuilder;

    #[derive(Default)]
    struct Recorder(Vec<BlockPos>);

    impl BlockSink for Recorder {
        fn set_block(&mut self, _world: &WorldId, pos: BlockPos, _block: Block) {
            self.0.push(pos);
        }
    }

    fn layers(n: usize) -> Arc<Structure> {
        let mut b = StructureBuilder::new(1, n, 1);
        for y in 0..n as i32 {
            b.set(0, y, 0, Block::new(1));
        }
        Arc::new(b.build("layers"))
    }

    #[test]
    fn first_step_waits_for_delay() {
        let mut s = PlacementScheduler::new(2, 3);
        let mut sink = Recorder::default();
        let id = s.place(layers(3), WorldId::new("w"), BlockPos::ZERO, no_skip()).id();
        assert_eq!(s.next_step_tick(), Some(3));
        assert_eq!(s.tick(&mut sink).steps, 0);
        assert_eq!(s.tick(&mut sink).steps, 0);
        assert_eq!(s.tick(&mut sink).steps, 1);
        assert_eq!((s.next_step_tick(), s.queued_steps()), (Some(6), 1));
        let p = s.progress(id).unwrap();
        assert_eq!((p.next_section, p.steps_run, p.steps_remaining), (2, 1, 1));
    }

    #[test]
    fn progress_is_gone_after_completion() {
        let mut s = PlacementScheduler::new(5, 1);
        let mut sink = Recorder::default();
        let mut h = s.place(layers(2), WorldId::new("w"), BlockPos::ZERO, no_skip());
        assert!(!h.is_done());
        s.run_until_idle(&mut sink);
        assert!(s.progress(h.id()).is_none());
        assert!(h.is_done());
        // Outcome is retained after the first observation.
        assert_eq!(h.poll().map(|o| o.steps), Some(1));
    }
}
