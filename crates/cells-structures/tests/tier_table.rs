use std::fs;
use std::sync::Arc;

use cells_blocks::BlockPalette;
use cells_structures::{ConfigurationError, StructureLoadError, StructureLoader, TierDef, TierTable};

fn loader() -> StructureLoader {
    StructureLoader::new(Arc::new(BlockPalette::new()))
}

#[derive(serde::Deserialize)]
struct Tiers {
    tiers: Vec<TierDef>,
}

#[test]
fn tier_defs_parse_from_toml() {
    let cfg: Tiers = toml::from_str(
        r#"
        [[tiers]]
        level = 0
        spawn = [3, 1, 3]

        [[tiers]]
        level = 1
        cost = 2500.0
        schematic = "upgrade.schem"
        build_zones = [{ min = [1, 0, 1], max = [6, 4, 6] }]
    "#,
    )
    .unwrap();
    assert_eq!(cfg.tiers.len(), 2);
    assert_eq!(cfg.tiers[0].spawn, Some([3, 1, 3]));
    assert_eq!(cfg.tiers[1].cost, 2500.0);
    assert_eq!(cfg.tiers[1].build_zones[0].max, [6, 4, 6]);
}

#[test]
fn empty_definitions_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = TierTable::load(&[], dir.path(), &loader()).unwrap_err();
    assert!(matches!(err, ConfigurationError::NoTiers));
}

#[test]
fn gaps_in_levels_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let defs = vec![TierDef::new(0), TierDef::new(2)];
    let err = TierTable::load(&defs, dir.path(), &loader()).unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::NonDenseLevels {
            expected: 1,
            found: 2
        }
    ));
}

#[test]
fn base_tier_without_structure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = TierTable::load(&[TierDef::new(0)], dir.path(), &loader()).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingBaseStructure));
}

#[test]
fn explicit_missing_structure_aborts_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut def = TierDef::new(0);
    def.schematic = Some("missing.schem".into());
    let err = TierTable::load(&[def], dir.path(), &loader()).unwrap_err();
    match err {
        ConfigurationError::Structure { level, source } => {
            assert_eq!(level, 0);
            assert!(matches!(source, StructureLoadError::Io { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn discovered_garbage_file_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("0.schem"), b"definitely not nbt").unwrap();
    // Non-level names are ignored by discovery
    fs::write(dir.path().join("notes.schem"), b"ignored").unwrap();
    let err = TierTable::load(&[TierDef::new(0)], dir.path(), &loader()).unwrap_err();
    match err {
        ConfigurationError::Structure { level: 0, source } => {
            assert!(matches!(source, StructureLoadError::InvalidFormat { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}
