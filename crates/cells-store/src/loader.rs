//! Background cache warm-up so the tick thread never waits on storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::error::PersistenceError;
use crate::model::PlayerId;
use crate::store::{CellStore, SharedCell};

#[derive(Debug)]
pub struct LoadResult {
    pub owner: PlayerId,
    pub result: Result<Option<SharedCell>, PersistenceError>,
}

pub struct CellLoader {
    pool: ThreadPool,
    store: Arc<CellStore>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    pending: Arc<AtomicUsize>,
}

impl CellLoader {
    pub fn new(store: Arc<CellStore>, threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("cells-load-{i}"))
            .build()?;
        let (tx, rx) = unbounded();
        Ok(Self {
            pool,
            store,
            tx,
            rx,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Fetches the owner's cell into the cache on a worker; the result arrives via [`drain`](Self::drain).
    pub fn request(&self, owner: PlayerId) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            let result = store.get(owner);
            if tx.send(LoadResult { owner, result }).is_err() {
                log::debug!("cell loader closed before {owner} finished loading");
            }
            pending.fetch_sub(1, Ordering::Relaxed);
        });
    }

    pub fn drain(&self) -> Vec<LoadResult> {
        self.rx.try_iter().collect()
    }

    /// Blocks until `n` results have arrived or the channel disconnects.
    pub fn recv_n(&self, n: usize) -> Vec<LoadResult> {
        self.rx.iter().take(n).collect()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cell;
    use crate::repository::MemoryRepository;
    use crate::ttl::TtlPolicy;
    use cells_geom::{BlockPos, Location, WorldId};

    #[test]
    fn warms_cache_on_workers() {
        let repo = Arc::new(MemoryRepository::new());
        for i in 1..=4u128 {
            repo.insert(Cell::new(
                i as u64,
                PlayerId(i),
                0,
                Location::new(WorldId::new("cells"), BlockPos::ZERO),
            ));
        }
        let store = Arc::new(CellStore::new(repo.clone(), TtlPolicy::default()));
        let loader = CellLoader::new(Arc::clone(&store), 2).unwrap();
        for i in 1..=5u128 {
            loader.request(PlayerId(i));
        }
        let mut got = loader.recv_n(5);
        got.sort_by_key(|r| r.owner);
        assert_eq!(got.len(), 5);
        assert!(got[..4].iter().all(|r| matches!(r.result, Ok(Some(_)))));
        assert!(matches!(got[4].result, Ok(None)));
        // Everything is cached now.
        store.get(PlayerId(2)).unwrap();
        assert_eq!(repo.find_calls(), 5);
    }
}
