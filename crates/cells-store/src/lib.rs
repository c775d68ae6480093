//! Cell records, the write-back TTL cache in front of storage, and point lookups.
#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod loader;
pub mod lookup;
pub mod model;
pub mod repository;
pub mod store;
pub mod ttl;
pub mod writeback;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::PersistenceError;
pub use loader::{CellLoader, LoadResult};
pub use lookup::SpatialLookup;
pub use model::{Cell, CellId, PlayerId, Rank};
pub use repository::{CellRepository, JsonFileRepository, MemoryRepository};
pub use store::{CellStore, FlushReport, SharedCell, StoreStats, lock_cell};
pub use ttl::TtlPolicy;
pub use writeback::WriteBackBuffer;
