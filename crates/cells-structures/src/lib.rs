//! Layered structure layouts, schematic loading, and the cell tier table.
#![forbid(unsafe_code)]

pub mod error;
pub mod loader;
pub mod structure;
pub mod tier;

pub use error::{ConfigurationError, StructureLoadError};
pub use loader::StructureLoader;
pub use structure::{Section, Structure, StructureBuilder};
pub use tier::{Tier, TierDef, TierTable, ZoneDef};
