//! Durable storage behind the cell cache.
//!
//! Calls block; the cache invokes them without holding its own locks, and
//! [`CellLoader`](crate::CellLoader) runs them on worker threads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use hashbrown::HashMap;

use crate::error::PersistenceError;
use crate::model::{Cell, CellId, PlayerId};

pub trait CellRepository: Send + Sync {
    /// `Ok(None)` when the player owns no cell.
    fn find_by_owner(&self, owner: PlayerId) -> Result<Option<Cell>, PersistenceError>;

    /// Upserts the record keyed by its owner.
    fn save(&self, cell: &Cell) -> Result<(), PersistenceError>;

    /// Every stored record. Used for id allocation and offline tooling.
    fn all(&self) -> Result<Vec<Cell>, PersistenceError>;
}

/// In-process repository with call counters, optional latency and failure injection.
#[derive(Default)]
pub struct MemoryRepository {
    cells: Mutex<HashMap<PlayerId, Cell>>,
    finds: AtomicU64,
    saves: AtomicU64,
    latency_ms: AtomicU64,
    fail_finds: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Number of `find_by_owner` calls, failed ones included.
    pub fn find_calls(&self) -> u64 {
        self.finds.load(Ordering::Relaxed)
    }

    pub fn save_calls(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Stores a record directly, bypassing counters.
    pub fn insert(&self, cell: Cell) {
        self.lock().insert(cell.owner, cell);
    }

    pub fn stored(&self, owner: PlayerId) -> Option<Cell> {
        self.lock().get(&owner).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, Cell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }
}

impl CellRepository for MemoryRepository {
    fn find_by_owner(&self, owner: PlayerId) -> Result<Option<Cell>, PersistenceError> {
        self.finds.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();
        if self.fail_finds.load(Ordering::Relaxed) {
            return Err(PersistenceError::Backend(format!("find for {owner} refused")));
        }
        Ok(self.stored(owner))
    }

    fn save(&self, cell: &Cell) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(PersistenceError::Backend(format!(
                "save of cell {} refused",
                cell.id
            )));
        }
        self.insert(cell.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<Cell>, PersistenceError> {
        Ok(self.lock().values().cloned().collect())
    }
}

/// One pretty-printed JSON document per cell, named `<owner>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Creates the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::info!("Cell storage at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, owner: PlayerId) -> PathBuf {
        self.dir.join(format!("{owner}.json"))
    }

    /// Highest stored cell id, or 0 when empty.
    pub fn max_cell_id(&self) -> Result<CellId, PersistenceError> {
        Ok(self.all()?.iter().map(|c| c.id).max().unwrap_or(0))
    }
}

impl CellRepository for JsonFileRepository {
    fn find_by_owner(&self, owner: PlayerId) -> Result<Option<Cell>, PersistenceError> {
        let text = match fs::read_to_string(self.path_for(owner)) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, cell: &Cell) -> Result<(), PersistenceError> {
        let path = self.path_for(cell.owner);
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(cell)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<Cell>, PersistenceError> {
        let mut out = Vec::new();
        for ent in fs::read_dir(&self.dir)? {
            let p = ent?.path();
            if p.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&p)?;
            match serde_json::from_str::<Cell>(&text) {
                Ok(c) => out.push(c),
                Err(e) => log::warn!("skipping unreadable cell record {:?}: {e}", p),
            }
        }
        out.sort_by_key(|c| c.id);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cells_geom::{BlockPos, Location, WorldId};

    fn cell(id: CellId, owner: u128) -> Cell {
        Cell::new(
            id,
            PlayerId(owner),
            0,
            Location::new(WorldId::new("cells"), BlockPos::new(id as i32 * 128, 64, 0)),
        )
    }

    #[test]
    fn memory_repository_counts_and_fails_on_demand() {
        let repo = MemoryRepository::new();
        repo.save(&cell(1, 1)).unwrap();
        assert_eq!(repo.find_by_owner(PlayerId(1)).unwrap().map(|c| c.id), Some(1));
        assert_eq!(repo.find_by_owner(PlayerId(2)).unwrap(), None);
        repo.set_fail_saves(true);
        assert!(repo.save(&cell(2, 2)).is_err());
        assert_eq!((repo.find_calls(), repo.save_calls()), (2, 2));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn json_repository_roundtrips_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("cells")).unwrap();
        assert_eq!(repo.find_by_owner(PlayerId(5)).unwrap(), None);
        let mut c = cell(4, 5);
        c.name = Some("home".into());
        repo.save(&c).unwrap();
        repo.save(&cell(9, 6)).unwrap();
        assert_eq!(repo.find_by_owner(PlayerId(5)).unwrap(), Some(c));
        assert_eq!(repo.all().unwrap().len(), 2);
        assert_eq!(repo.max_cell_id().unwrap(), 9);
    }

    #[test]
    fn json_repository_reports_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path()).unwrap();
        let owner = PlayerId(3);
        fs::write(dir.path().join(format!("{owner}.json")), "{not json").unwrap();
        assert!(matches!(
            repo.find_by_owner(owner),
            Err(PersistenceError::Serde(_))
        ));
        assert!(repo.all().unwrap().is_empty());
    }
}
