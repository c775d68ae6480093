use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cells_geom::{BlockBox, BlockPos, Location};
use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::loader::{StructureLoader, is_structure_file};
use crate::structure::Structure;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ZoneDef {
    pub min: [i32; 3],
    pub max: [i32; 3],
}

/// One `[[tiers]]` entry of the configuration file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TierDef {
    pub level: u32,
    #[serde(default)]
    pub cost: f64,
    // Defaults to the structure anchor when absent
    #[serde(default)]
    pub spawn: Option<[i32; 3]>,
    #[serde(default)]
    pub anchor: Option<[i32; 3]>,
    // Explicit structure file, relative to the levels directory
    #[serde(default)]
    pub schematic: Option<PathBuf>,
    #[serde(default)]
    pub build_zones: Vec<ZoneDef>,
}

impl TierDef {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            cost: 0.0,
            spawn: None,
            anchor: None,
            schematic: None,
            build_zones: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tier {
    pub level: u32,
    pub structure: Option<Arc<Structure>>,
    pub spawn: BlockPos,
    pub cost: f64,
    /// Regions, relative to the cell origin, where building ranks may edit.
    pub build_zones: Vec<BlockBox>,
}

impl Tier {
    pub fn has_structure(&self) -> bool {
        self.structure.is_some()
    }

    /// Whether `point` lies in one of this tier's build zones of the cell at `origin`.
    pub fn can_build(&self, origin: &Location, point: &Location) -> bool {
        if origin.world != point.world {
            return false;
        }
        let rel = point.pos - origin.pos;
        self.build_zones.iter().any(|z| z.contains(rel))
    }

    /// Whether a structure-local offset falls in a build zone.
    pub fn in_build_zone(&self, offset: BlockPos) -> bool {
        self.build_zones.iter().any(|z| z.contains(offset))
    }
}

/// Dense, zero-based tier sequence. Loading is all-or-nothing.
#[derive(Clone, Debug)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn load(
        defs: &[TierDef],
        levels_dir: &Path,
        loader: &StructureLoader,
    ) -> Result<Self, ConfigurationError> {
        log::info!("Loading cell tiers...");
        let discovered = discover_structures(levels_dir)?;

        let mut defs: Vec<&TierDef> = defs.iter().collect();
        defs.sort_by_key(|d| d.level);
        let mut tiers = Vec::with_capacity(defs.len());
        for (expected, def) in defs.iter().enumerate() {
            let expected = expected as u32;
            if def.level != expected {
                return Err(ConfigurationError::NonDenseLevels {
                    expected,
                    found: def.level,
                });
            }
            let path = match &def.schematic {
                Some(p) if p.is_absolute() => Some(p.clone()),
                Some(p) => Some(levels_dir.join(p)),
                None => discovered.get(&def.level).cloned(),
            };
            let structure = match path {
                Some(p) => {
                    let mut s = loader
                        .load(&p)
                        .map_err(|source| ConfigurationError::Structure {
                            level: def.level,
                            source,
                        })?;
                    if let Some(anchor) = def.anchor {
                        s = s.with_anchor(anchor.into());
                    }
                    Some(Arc::new(s))
                }
                None => None,
            };
            tiers.push(Self::tier_from_def(def, structure));
        }
        for level in discovered.keys() {
            if *level as usize >= tiers.len() {
                log::warn!("structure for level {level} has no tier definition; ignored");
            }
        }
        let table = Self::from_tiers(tiers)?;
        log::info!("Loaded {} cell tiers", table.len());
        Ok(table)
    }

    /// Validates an already-assembled tier list.
    pub fn from_tiers(tiers: Vec<Tier>) -> Result<Self, ConfigurationError> {
        let Some(base) = tiers.first() else {
            return Err(ConfigurationError::NoTiers);
        };
        for (i, t) in tiers.iter().enumerate() {
            if t.level != i as u32 {
                return Err(ConfigurationError::NonDenseLevels {
                    expected: i as u32,
                    found: t.level,
                });
            }
        }
        match &base.structure {
            Some(s) if !s.is_empty() => {}
            _ => return Err(ConfigurationError::MissingBaseStructure),
        }
        Ok(Self { tiers })
    }

    pub fn tier_from_def(def: &TierDef, structure: Option<Arc<Structure>>) -> Tier {
        let spawn = match (def.spawn, &structure) {
            (Some(s), _) => s.into(),
            (None, Some(st)) => st.anchor(),
            (None, None) => BlockPos::ZERO,
        };
        Tier {
            level: def.level,
            structure,
            spawn,
            cost: def.cost,
            build_zones: def
                .build_zones
                .iter()
                .map(|z| BlockBox::new(z.min.into(), z.max.into()))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, level: u32) -> Option<&Tier> {
        self.tiers.get(level as usize)
    }

    #[inline]
    pub fn next(&self, level: u32) -> Option<&Tier> {
        self.get(level.saturating_add(1))
    }

    pub fn last(&self) -> &Tier {
        // Construction guarantees at least one tier.
        &self.tiers[self.tiers.len() - 1]
    }

    #[inline]
    pub fn max_level(&self) -> u32 {
        (self.tiers.len() - 1) as u32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }
}

/// Maps `<level>.<ext>` files in `dir` to their level. A missing directory discovers nothing.
fn discover_structures(dir: &Path) -> Result<BTreeMap<u32, PathBuf>, ConfigurationError> {
    let mut out = BTreeMap::new();
    if !dir.exists() {
        log::warn!("levels directory {:?} does not exist", dir);
        return Ok(out);
    }
    let rd = fs::read_dir(dir).map_err(|source| ConfigurationError::LevelsDir {
        path: dir.to_path_buf(),
        source,
    })?;
    for ent in rd {
        let ent = ent.map_err(|source| ConfigurationError::LevelsDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let p = ent.path();
        if !p.is_file() || !is_structure_file(&p) {
            continue;
        }
        let Some(level) = p
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            log::debug!("skipping {:?}: file name is not a level number", p);
            continue;
        };
        if let Some(prev) = out.insert(level, p.clone()) {
            log::warn!("level {level} has several structure files; using {:?} over {:?}", p, prev);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::StructureBuilder;
    use cells_blocks::Block;
    use cells_geom::WorldId;

    fn base_structure() -> Arc<Structure> {
        let mut b = StructureBuilder::new(2, 2, 2);
        b.fill_layer(0, Block::new(1));
        Arc::new(b.build("0"))
    }

    #[test]
    fn from_tiers_requires_base_structure() {
        let t0 = TierTable::tier_from_def(&TierDef::new(0), None);
        let err = TierTable::from_tiers(vec![t0]).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingBaseStructure));
        assert!(matches!(
            TierTable::from_tiers(Vec::new()).unwrap_err(),
            ConfigurationError::NoTiers
        ));
    }

    #[test]
    fn spawn_defaults_to_anchor() {
        let s = Arc::new(Arc::unwrap_or_clone(base_structure()).with_anchor(BlockPos::new(1, 1, 0)));
        let t = TierTable::tier_from_def(&TierDef::new(0), Some(s));
        assert_eq!(t.spawn, BlockPos::new(1, 1, 0));
    }

    #[test]
    fn can_build_uses_zones_relative_to_origin() {
        let mut def = TierDef::new(1);
        def.build_zones.push(ZoneDef {
            min: [2, 0, 2],
            max: [4, 3, 4],
        });
        let tier = TierTable::tier_from_def(&def, None);
        let world = WorldId::new("cells");
        let origin = Location::new(world.clone(), BlockPos::new(100, 64, 100));
        assert!(tier.can_build(&origin, &Location::new(world.clone(), BlockPos::new(102, 64, 104))));
        assert!(!tier.can_build(&origin, &Location::new(world, BlockPos::new(105, 64, 104))));
        assert!(!tier.can_build(
            &origin,
            &Location::new(WorldId::new("other"), BlockPos::new(102, 64, 104))
        ));
    }

    #[test]
    fn navigation_helpers() {
        let t0 = TierTable::tier_from_def(&TierDef::new(0), Some(base_structure()));
        let t1 = TierTable::tier_from_def(&TierDef::new(1), None);
        let table = TierTable::from_tiers(vec![t0, t1]).unwrap();
        assert_eq!(table.max_level(), 1);
        assert_eq!(table.next(0).map(|t| t.level), Some(1));
        assert!(table.next(1).is_none());
        assert_eq!(table.last().level, 1);
    }
}
