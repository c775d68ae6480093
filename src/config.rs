use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cells_structures::TierDef;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// Sections applied per scheduling step.
    pub chunk_size: usize,
    /// Host ticks between steps, and before the first one.
    pub step_delay_ticks: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            step_delay_ticks: 20,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Host ticks between sweeps of expired entries.
    pub sweep_ticks: u64,
    pub loader_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 5,
            sweep_ticks: 100,
            loader_threads: 2,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LookupConfig {
    pub margin: i32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { margin: 64 }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParcelConfig {
    pub world: String,
    pub y: i32,
    pub spacing: i32,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            world: "cells".to_string(),
            y: 64,
            spacing: 128,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InvitationConfig {
    pub ttl_secs: u64,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self { ttl_secs: 120 }
    }
}

/// Top-level `cells.toml`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CellsConfig {
    pub placement: PlacementConfig,
    pub cache: CacheConfig,
    pub lookup: LookupConfig,
    pub parcels: ParcelConfig,
    pub invitations: InvitationConfig,
    pub levels_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub tiers: Vec<TierDef>,
}

impl Default for CellsConfig {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            cache: CacheConfig::default(),
            lookup: LookupConfig::default(),
            parcels: ParcelConfig::default(),
            invitations: InvitationConfig::default(),
            levels_dir: PathBuf::from("levels"),
            storage_dir: PathBuf::from("data/cells"),
            tiers: Vec::new(),
        }
    }
}

impl CellsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads the file and resolves relative directories against its parent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            cfg.resolve_relative_to(base);
        }
        Ok(cfg)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.levels_dir.is_relative() {
            self.levels_dir = base.join(&self.levels_dir);
        }
        if self.storage_dir.is_relative() {
            self.storage_dir = base.join(&self.storage_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = CellsConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, CellsConfig::default());
        assert_eq!(cfg.placement.chunk_size, 5);
        assert_eq!(cfg.placement.step_delay_ticks, 20);
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(5));
        assert_eq!(cfg.lookup.margin, 64);
        assert_eq!(cfg.invitations.ttl_secs, 120);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = CellsConfig::from_toml_str(
            r#"
            levels_dir = "structures"

            [placement]
            chunk_size = 2

            [[tiers]]
            level = 0

            [[tiers]]
            level = 1
            cost = 2500.0
            spawn = [3, 1, 3]
            build_zones = [{ min = [1, 0, 1], max = [6, 4, 6] }]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.placement.chunk_size, 2);
        assert_eq!(cfg.placement.step_delay_ticks, 20);
        assert_eq!(cfg.levels_dir, PathBuf::from("structures"));
        assert_eq!(cfg.tiers.len(), 2);
        assert_eq!(cfg.tiers[1].spawn, Some([3, 1, 3]));
        assert_eq!(cfg.tiers[1].build_zones.len(), 1);
    }

    #[test]
    fn load_resolves_directories_next_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.toml");
        fs::write(&path, "storage_dir = \"db\"\n").unwrap();
        let cfg = CellsConfig::load(&path).unwrap();
        assert_eq!(cfg.storage_dir, dir.path().join("db"));
        assert_eq!(cfg.levels_dir, dir.path().join("levels"));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.toml");
        fs::write(&path, "[placement\n").unwrap();
        let err = CellsConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("cells.toml"));
    }
}
