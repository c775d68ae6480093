//! Write-back, TTL-bounded cache of cell records keyed by owner.
//!
//! The map lock is never held across repository calls. A miss installs an
//! in-flight slot so concurrent `get`s for the same owner wait on one fetch
//! instead of issuing their own. Records are handed out as [`SharedCell`]s;
//! mutating one does not persist it until the owner is marked dirty (see
//! [`CellStore::update`] and [`CellStore::commit`]) and a flush runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hashbrown::HashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::PersistenceError;
use crate::model::{Cell, PlayerId};
use crate::repository::CellRepository;
use crate::ttl::TtlPolicy;
use crate::writeback::WriteBackBuffer;

pub type SharedCell = Arc<Mutex<Cell>>;

type FetchOutcome = Result<Option<SharedCell>, PersistenceError>;

/// Locks a shared record, recovering from a poisoned mutex.
pub fn lock_cell(cell: &SharedCell) -> MutexGuard<'_, Cell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub dirty: usize,
    pub hits: u64,
    pub misses: u64,
    pub collapsed: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub saves: u64,
    pub save_failures: u64,
    pub evictions: u64,
}

struct Entry {
    // `None` caches "this player owns no cell"
    value: Option<SharedCell>,
    touched: Instant,
}

struct Inflight {
    outcome: Mutex<Option<FetchOutcome>>,
    ready: Condvar,
}

impl Inflight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, outcome: FetchOutcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.ready.notify_all();
    }

    fn wait(&self) -> FetchOutcome {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(o) = slot.as_ref() {
                return o.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fails waiters and frees the slot if the repository call unwinds.
struct FetchGuard<'a> {
    store: &'a CellStore,
    owner: PlayerId,
    inflight: &'a Arc<Inflight>,
    armed: bool,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.store.lock_state();
            if matches!(state.slots.get(&self.owner), Some(Slot::Loading(f)) if Arc::ptr_eq(f, self.inflight))
            {
                state.slots.remove(&self.owner);
            }
        }
        self.inflight
            .complete(Err(PersistenceError::Backend("fetch aborted".to_string())));
    }
}

enum Slot {
    Ready(Entry),
    Loading(Arc<Inflight>),
}

#[derive(Default)]
struct State {
    slots: HashMap<PlayerId, Slot>,
    writeback: WriteBackBuffer<PlayerId>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    collapsed: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    saves: AtomicU64,
    save_failures: AtomicU64,
    evictions: AtomicU64,
}

enum Next {
    Fetch(Arc<Inflight>),
    Wait(Arc<Inflight>),
    WriteBack(SharedCell, u64),
}

pub struct CellStore {
    repo: Arc<dyn CellRepository>,
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    // Serializes flushes so one dirty generation is saved at most once
    flush_lock: Mutex<()>,
    counters: Counters,
}

impl CellStore {
    pub fn new(repo: Arc<dyn CellRepository>, ttl: TtlPolicy) -> Self {
        Self::with_clock(repo, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(repo: Arc<dyn CellRepository>, ttl: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            ttl,
            clock,
            state: Mutex::new(State::default()),
            flush_lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    #[inline]
    pub fn ttl(&self) -> TtlPolicy {
        self.ttl
    }

    pub fn repository(&self) -> &Arc<dyn CellRepository> {
        &self.repo
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_flush(&self) -> MutexGuard<'_, ()> {
        self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached record, fetching from the repository when absent or expired.
    ///
    /// `Ok(None)` means the player owns no cell. Failed fetches are not cached.
    pub fn get(&self, owner: PlayerId) -> FetchOutcome {
        loop {
            let next = {
                let mut guard = self.lock_state();
                let state = &mut *guard;
                let now = self.clock.now();
                let pending = match state.slots.get_mut(&owner) {
                    Some(Slot::Ready(e)) if !self.ttl.is_expired(e.touched, now) => {
                        e.touched = now;
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(e.value.clone());
                    }
                    Some(Slot::Loading(f)) => Some(Next::Wait(Arc::clone(f))),
                    // Expired but unsaved: persist before the entry may be replaced.
                    Some(Slot::Ready(Entry { value: Some(v), .. })) => state
                        .writeback
                        .generation(&owner)
                        .map(|g| Next::WriteBack(Arc::clone(v), g)),
                    Some(Slot::Ready(_)) | None => None,
                };
                pending.unwrap_or_else(|| {
                    let f = Arc::new(Inflight::new());
                    state.slots.insert(owner, Slot::Loading(Arc::clone(&f)));
                    Next::Fetch(f)
                })
            };
            match next {
                Next::Fetch(f) => return self.fetch(owner, f),
                Next::Wait(f) => {
                    self.counters.collapsed.fetch_add(1, Ordering::Relaxed);
                    return f.wait();
                }
                Next::WriteBack(value, generation) => {
                    let saved = {
                        let _flushing = self.lock_flush();
                        self.save_entry(owner, &value, generation)
                    };
                    if !saved {
                        // Storage is down; the cached copy is the newest there is.
                        let mut state = self.lock_state();
                        if let Some(Slot::Ready(e)) = state.slots.get_mut(&owner) {
                            e.touched = self.clock.now();
                        }
                        return Ok(Some(value));
                    }
                }
            }
        }
    }

    fn fetch(&self, owner: PlayerId, inflight: Arc<Inflight>) -> FetchOutcome {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let mut guard = FetchGuard {
            store: self,
            owner,
            inflight: &inflight,
            armed: true,
        };
        let fetched = self.repo.find_by_owner(owner);
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = fetched.map(|c| c.map(|c| Arc::new(Mutex::new(c))));

        let published = {
            let mut state = self.lock_state();
            match state.slots.get(&owner) {
                Some(Slot::Loading(f)) if Arc::ptr_eq(f, &inflight) => match &fetched {
                    Ok(v) => {
                        state.slots.insert(
                            owner,
                            Slot::Ready(Entry {
                                value: v.clone(),
                                touched: self.clock.now(),
                            }),
                        );
                        fetched.clone()
                    }
                    Err(e) => {
                        state.slots.remove(&owner);
                        self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("fetching cell of {owner} failed: {e}");
                        fetched.clone()
                    }
                },
                // A put landed while the fetch ran; the local write wins.
                Some(Slot::Ready(e)) => Ok(e.value.clone()),
                // Dropped by a reload; hand back the result without caching it.
                _ => fetched.clone(),
            }
        };
        guard.armed = false;
        inflight.complete(published.clone());
        published
    }

    /// Inserts or replaces the record and marks it dirty.
    pub fn put(&self, owner: PlayerId, cell: Cell) -> SharedCell {
        let shared = Arc::new(Mutex::new(cell));
        let mut state = self.lock_state();
        let now = self.clock.now();
        state.slots.insert(
            owner,
            Slot::Ready(Entry {
                value: Some(Arc::clone(&shared)),
                touched: now,
            }),
        );
        state.writeback.mark(owner);
        shared
    }

    /// Flags a cached record for the next flush. False when nothing is cached for `owner`.
    pub fn mark_dirty(&self, owner: PlayerId) -> bool {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        match state.slots.get_mut(&owner) {
            Some(Slot::Ready(e)) if e.value.is_some() => {
                e.touched = self.clock.now();
                state.writeback.mark(owner);
                true
            }
            _ => false,
        }
    }

    /// Returns a mutated record to the cache and marks it dirty.
    ///
    /// If the entry was evicted or replaced since `cell` was handed out,
    /// `cell` is reinstalled so the mutation is not lost.
    pub fn commit(&self, owner: PlayerId, cell: &SharedCell) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let now = self.clock.now();
        match state.slots.get_mut(&owner) {
            Some(Slot::Ready(e)) if e.value.as_ref().is_some_and(|v| Arc::ptr_eq(v, cell)) => {
                e.touched = now;
            }
            _ => {
                state.slots.insert(
                    owner,
                    Slot::Ready(Entry {
                        value: Some(Arc::clone(cell)),
                        touched: now,
                    }),
                );
            }
        }
        state.writeback.mark(owner);
    }

    /// Applies `f` to the owner's record under its lock and commits it.
    ///
    /// `Ok(None)` when the player owns no cell; `f` is not called then.
    pub fn update<R>(
        &self,
        owner: PlayerId,
        f: impl FnOnce(&mut Cell) -> R,
    ) -> Result<Option<R>, PersistenceError> {
        let Some(cell) = self.get(owner)? else {
            return Ok(None);
        };
        let out = {
            let mut c = lock_cell(&cell);
            f(&mut c)
        };
        self.commit(owner, &cell);
        Ok(Some(out))
    }

    /// Snapshot of every cached record, expired ones included until evicted.
    pub fn values(&self) -> Vec<SharedCell> {
        let state = self.lock_state();
        state
            .slots
            .values()
            .filter_map(|s| match s {
                Slot::Ready(e) => e.value.clone(),
                Slot::Loading(_) => None,
            })
            .collect()
    }

    pub fn is_dirty(&self, owner: PlayerId) -> bool {
        self.lock_state().writeback.is_dirty(&owner)
    }

    /// Saves the entry unless `generation` was already acknowledged; false on a failed save.
    /// Callers hold the flush lock.
    fn save_entry(&self, owner: PlayerId, cell: &SharedCell, generation: u64) -> bool {
        if self.lock_state().writeback.generation(&owner) != Some(generation) {
            return true;
        }
        let snapshot = lock_cell(cell).clone();
        match self.repo.save(&snapshot) {
            Ok(()) => {
                self.counters.saves.fetch_add(1, Ordering::Relaxed);
                self.lock_state().writeback.acknowledge(&owner, generation);
                true
            }
            Err(e) => {
                self.counters.save_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("saving cell {} of {owner} failed: {e}", snapshot.id);
                false
            }
        }
    }

    /// Persists every dirty entry once. Failed entries stay dirty for the next flush.
    pub fn flush_dirty(&self) -> FlushReport {
        let _flushing = self.lock_flush();
        let work: Vec<(PlayerId, SharedCell, u64)> = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let mut work = Vec::new();
            for (owner, generation) in state.writeback.pending() {
                match state.slots.get(&owner) {
                    Some(Slot::Ready(Entry { value: Some(v), .. })) => {
                        work.push((owner, Arc::clone(v), generation))
                    }
                    _ => {
                        state.writeback.forget(&owner);
                    }
                }
            }
            work
        };
        let mut report = FlushReport::default();
        for (owner, cell, generation) in work {
            if self.save_entry(owner, &cell, generation) {
                report.saved += 1;
            } else {
                report.failed += 1;
            }
        }
        if report.saved + report.failed > 0 {
            log::debug!("flushed {} cells ({} failed)", report.saved, report.failed);
        }
        report
    }

    /// Drops expired entries, saving dirty ones first. Entries whose save fails are kept.
    pub fn evict_expired(&self) -> usize {
        let _flushing = self.lock_flush();
        let expired_dirty: Vec<(PlayerId, SharedCell, u64)> = {
            let state = self.lock_state();
            let now = self.clock.now();
            state
                .slots
                .iter()
                .filter_map(|(owner, s)| match s {
                    Slot::Ready(Entry {
                        value: Some(v),
                        touched,
                    }) if self.ttl.is_expired(*touched, now) => state
                        .writeback
                        .generation(owner)
                        .map(|g| (*owner, Arc::clone(v), g)),
                    _ => None,
                })
                .collect()
        };
        for (owner, cell, generation) in expired_dirty {
            self.save_entry(owner, &cell, generation);
        }

        let mut guard = self.lock_state();
        let state = &mut *guard;
        let now = self.clock.now();
        let before = state.slots.len();
        let writeback = &state.writeback;
        let ttl = self.ttl;
        state.slots.retain(|owner, s| match s {
            Slot::Ready(e) => !ttl.is_expired(e.touched, now) || writeback.is_dirty(owner),
            Slot::Loading(_) => true,
        });
        let evicted = before - state.slots.len();
        self.counters
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Drops all cached entries so the next `get` re-fetches.
    ///
    /// With `flush_first`, dirty entries are saved beforehand and any that fail
    /// to save are kept. Without it, unsaved changes are discarded.
    pub fn reload(&self, flush_first: bool) -> FlushReport {
        let report = if flush_first {
            self.flush_dirty()
        } else {
            FlushReport::default()
        };
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if flush_first {
            let writeback = &state.writeback;
            state.slots.retain(|owner, s| {
                matches!(s, Slot::Ready(_)) && writeback.is_dirty(owner)
            });
        } else {
            state.slots.clear();
            state.writeback.clear();
        }
        log::info!(
            "cell cache reloaded ({} entries kept unsaved)",
            state.slots.len()
        );
        report
    }

    pub fn stats(&self) -> StoreStats {
        let (entries, dirty) = {
            let state = self.lock_state();
            (state.slots.len(), state.writeback.len())
        };
        let c = &self.counters;
        StoreStats {
            entries,
            dirty,
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            collapsed: c.collapsed.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
            saves: c.saves.load(Ordering::Relaxed),
            save_failures: c.save_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::MemoryRepository;
    use cells_geom::{BlockPos, Location, WorldId};
    use std::time::Duration;

    fn cell(owner: u128) -> Cell {
        Cell::new(
            owner as u64,
            PlayerId(owner),
            0,
            Location::new(WorldId::new("cells"), BlockPos::ZERO),
        )
    }

    fn setup() -> (Arc<MemoryRepository>, Arc<ManualClock>, CellStore) {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new());
        let store = CellStore::with_clock(
            repo.clone(),
            TtlPolicy::new(Duration::from_secs(5)),
            clock.clone(),
        );
        (repo, clock, store)
    }

    #[test]
    fn absent_owner_is_cached_as_none() {
        let (repo, _clock, store) = setup();
        assert!(store.get(PlayerId(1)).unwrap().is_none());
        assert!(store.get(PlayerId(1)).unwrap().is_none());
        assert_eq!(repo.find_calls(), 1);
        assert!(!store.mark_dirty(PlayerId(1)));
    }

    #[test]
    fn mutation_reaches_holders_of_the_same_instance() {
        let (_repo, _clock, store) = setup();
        let a = store.put(PlayerId(1), cell(1));
        store.update(PlayerId(1), |c| c.level = 3).unwrap();
        assert_eq!(lock_cell(&a).level, 3);
    }

    #[test]
    fn commit_reinstalls_evicted_instance() {
        let (repo, clock, store) = setup();
        let a = store.put(PlayerId(1), cell(1));
        store.flush_dirty();
        clock.advance(Duration::from_secs(6));
        assert_eq!(store.evict_expired(), 1);
        lock_cell(&a).level = 2;
        store.commit(PlayerId(1), &a);
        assert!(store.is_dirty(PlayerId(1)));
        store.flush_dirty();
        assert_eq!(repo.stored(PlayerId(1)).map(|c| c.level), Some(2));
    }

    #[test]
    fn expired_dirty_entry_is_saved_before_refetch() {
        let (repo, clock, store) = setup();
        store.put(PlayerId(1), cell(1));
        clock.advance(Duration::from_secs(6));
        let got = store.get(PlayerId(1)).unwrap().unwrap();
        assert_eq!(lock_cell(&got).id, 1);
        assert_eq!(repo.save_calls(), 1);
        assert_eq!(repo.find_calls(), 1);
        assert!(!store.is_dirty(PlayerId(1)));
    }

    #[test]
    fn expired_dirty_entry_is_served_when_storage_is_down() {
        let (repo, clock, store) = setup();
        let a = store.put(PlayerId(1), cell(1));
        repo.set_fail_saves(true);
        clock.advance(Duration::from_secs(6));
        let got = store.get(PlayerId(1)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &got));
        assert_eq!(repo.find_calls(), 0);
        assert!(store.is_dirty(PlayerId(1)));
    }

    #[test]
    fn reload_without_flush_discards_changes() {
        let (repo, _clock, store) = setup();
        store.put(PlayerId(1), cell(1));
        let report = store.reload(false);
        assert_eq!(report, FlushReport::default());
        assert_eq!(store.stats().entries, 0);
        assert_eq!(repo.save_calls(), 0);
        assert!(store.get(PlayerId(1)).unwrap().is_none());
    }
}
