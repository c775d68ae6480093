//! Generated tier tables for dry runs without structure files.

use std::sync::Arc;

use cells_blocks::{Block, BlockPalette};
use cells_structures::{ConfigurationError, StructureBuilder, TierDef, TierTable, ZoneDef};

/// `levels` tiers of hollow towers, `width` wide; tier `n` is `n + 2` layers tall.
///
/// Every tier above the base keeps its interior as a build zone.
pub fn sample_tiers(
    levels: u32,
    width: usize,
    palette: &BlockPalette,
) -> Result<TierTable, ConfigurationError> {
    let floor = palette.intern("minecraft:stone");
    let wall = palette.intern("minecraft:oak_planks");
    let w = width.max(3) as i32;
    let mut tiers = Vec::with_capacity(levels as usize);
    for level in 0..levels {
        let height = level as usize + 2;
        let mut b = StructureBuilder::new(w as usize, height, w as usize);
        b.fill_layer(0, floor);
        for y in 1..height as i32 {
            for z in 0..w {
                for x in 0..w {
                    let edge = x == 0 || z == 0 || x == w - 1 || z == w - 1;
                    b.set(x, y, z, if edge { wall } else { Block::AIR });
                }
            }
        }
        let mut def = TierDef::new(level);
        def.cost = 1000.0 * level as f64;
        def.spawn = Some([w / 2, 1, w / 2]);
        if level > 0 {
            def.build_zones.push(ZoneDef {
                min: [1, 1, 1],
                max: [w - 2, height as i32 - 1, w - 2],
            });
        }
        let structure = Arc::new(b.build(level.to_string()));
        tiers.push(TierTable::tier_from_def(&def, Some(structure)));
    }
    TierTable::from_tiers(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn towers_grow_one_layer_per_tier() {
        let palette = BlockPalette::new();
        let table = sample_tiers(3, 5, &palette).unwrap();
        assert_eq!(table.len(), 3);
        let heights: Vec<usize> = table
            .iter()
            .map(|t| t.structure.as_ref().map_or(0, |s| s.section_count()))
            .collect();
        assert_eq!(heights, vec![2, 3, 4]);
        assert!(table.get(0).unwrap().build_zones.is_empty());
        assert_eq!(table.get(2).unwrap().build_zones.len(), 1);
    }

    #[test]
    fn zero_levels_is_a_configuration_error() {
        assert!(matches!(
            sample_tiers(0, 5, &BlockPalette::new()),
            Err(ConfigurationError::NoTiers)
        ));
    }
}
