//! Upgradable cells: claimable parcels whose structures are rebuilt in
//! tick-sliced steps as their owners move up a tier table.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod host;
pub mod invitations;
pub mod parcels;
pub mod sample;
pub mod service;
pub mod watch;

pub use config::CellsConfig;
pub use error::{ConfigError, ServiceError};
pub use host::Host;
pub use invitations::Invitations;
pub use parcels::ParcelAllocator;
pub use service::CellService;
