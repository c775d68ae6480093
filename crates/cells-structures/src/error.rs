use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureLoadError {
    #[error("failed to read structure {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} isn't a valid structure: {reason}", .path.display())]
    InvalidFormat { path: PathBuf, reason: String },
}

/// Fatal problems with the tier table. Any of these aborts a load or reload.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("at least one cell tier must be configured")]
    NoTiers,
    #[error("tier levels must be dense from 0: expected level {expected}, found {found}")]
    NonDenseLevels { expected: u32, found: u32 },
    #[error("the level 0 tier must have a non-empty structure")]
    MissingBaseStructure,
    #[error("tier {level}: {source}")]
    Structure {
        level: u32,
        #[source]
        source: StructureLoadError,
    },
    #[error("cannot scan levels directory {}: {source}", .path.display())]
    LevelsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
