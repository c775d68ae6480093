use std::io;
use std::path::PathBuf;

use cells_store::{CellId, PersistenceError, PlayerId};
use cells_structures::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Rejections and failures at the command surface.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("player {0} owns no cell")]
    NoCell(PlayerId),
    #[error("player {0} already owns a cell")]
    AlreadyOwned(PlayerId),
    #[error("cell {0} is still being built")]
    Busy(CellId),
    #[error("cell is already at the highest level ({0})")]
    MaxLevel(u32),
    #[error("no tier for level {0}")]
    NoSuchLevel(u32),
    #[error("player {0} is not a member of this cell")]
    NotMember(PlayerId),
    #[error("player {0} is already a member of this cell")]
    AlreadyMember(PlayerId),
    #[error("the owner's membership cannot be changed")]
    OwnerFixed,
    #[error("no pending invitation")]
    NoInvitation,
    #[error("no parcel left for cell {0}")]
    ParcelsExhausted(CellId),
    #[error("a cell is at level {level} but the tier table stops at {max}")]
    LevelsNotCovered { level: u32, max: u32 },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
