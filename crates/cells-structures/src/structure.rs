use std::collections::BTreeMap;

use cells_blocks::{Block, BlockPalette, base_key};
use cells_geom::{BlockBox, BlockPos};

/// One Y layer of a structure. Offsets are relative to the structure's
/// bounding-box minimum and appear in insertion order (z, then x).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Section {
    pub y: i32,
    pub blocks: Vec<(BlockPos, Block)>,
}

impl Section {
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Immutable layered block layout, shared read-only by every placement of a tier.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    name: String,
    size: BlockPos,
    anchor: BlockPos,
    sections: Vec<Section>,
}

impl Structure {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounding-box dimensions.
    #[inline]
    pub fn size(&self) -> BlockPos {
        self.size
    }

    /// Logical anchor relative to the bounding-box minimum.
    #[inline]
    pub fn anchor(&self) -> BlockPos {
        self.anchor
    }

    pub fn with_anchor(mut self, anchor: BlockPos) -> Self {
        self.anchor = anchor;
        self
    }

    #[inline]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[inline]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(Section::is_empty)
    }

    pub fn block_count(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    /// Local bounds, or `None` for a zero-sized box.
    pub fn bounds(&self) -> Option<BlockBox> {
        if self.size.x <= 0 || self.size.y <= 0 || self.size.z <= 0 {
            return None;
        }
        Some(BlockBox::new(BlockPos::ZERO, self.size - BlockPos::splat(1)))
    }

    /// Block at a local offset, if the layout touches that position.
    pub fn get(&self, offset: BlockPos) -> Option<Block> {
        if offset.y < 0 {
            return None;
        }
        self.sections
            .get(offset.y as usize)
            .and_then(|s| s.blocks.iter().find(|(p, _)| *p == offset))
            .map(|(_, b)| *b)
    }

    /// Non-air block totals keyed by base block name.
    pub fn block_counts(&self, palette: &BlockPalette) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for (_, b) in self.sections.iter().flat_map(|s| s.blocks.iter()) {
            if b.is_air() {
                continue;
            }
            let key = palette
                .key(*b)
                .map(|k| base_key(&k).to_string())
                .unwrap_or_else(|| format!("#{}", b.id));
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

/// Dense builder: every position starts as structure void (untouched on placement).
pub struct StructureBuilder {
    sx: usize,
    sy: usize,
    sz: usize,
    cells: Vec<Option<Block>>,
}

impl StructureBuilder {
    pub fn new(sx: usize, sy: usize, sz: usize) -> Self {
        Self {
            sx,
            sy,
            sz,
            cells: vec![None; sx * sy * sz],
        }
    }

    #[inline]
    fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.sz + z) * self.sx + x
    }

    /// Sets a local position; out-of-range positions are ignored.
    pub fn set(&mut self, x: i32, y: i32, z: i32, b: Block) -> &mut Self {
        if x < 0 || y < 0 || z < 0 {
            return self;
        }
        let (xu, yu, zu) = (x as usize, y as usize, z as usize);
        if xu >= self.sx || yu >= self.sy || zu >= self.sz {
            return self;
        }
        let i = self.idx(xu, yu, zu);
        self.cells[i] = Some(b);
        self
    }

    /// Fills a whole Y layer.
    pub fn fill_layer(&mut self, y: i32, b: Block) -> &mut Self {
        for z in 0..self.sz as i32 {
            for x in 0..self.sx as i32 {
                self.set(x, y, z, b);
            }
        }
        self
    }

    pub fn build(self, name: impl Into<String>) -> Structure {
        let mut sections = Vec::with_capacity(self.sy);
        if self.sx > 0 && self.sz > 0 {
            for y in 0..self.sy {
                let mut blocks = Vec::new();
                for z in 0..self.sz {
                    for x in 0..self.sx {
                        if let Some(b) = self.cells[self.idx(x, y, z)] {
                            blocks.push((BlockPos::new(x as i32, y as i32, z as i32), b));
                        }
                    }
                }
                sections.push(Section {
                    y: y as i32,
                    blocks,
                });
            }
        }
        Structure {
            name: name.into(),
            size: BlockPos::new(self.sx as i32, self.sy as i32, self.sz as i32),
            anchor: BlockPos::ZERO,
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_has_no_sections() {
        let s = StructureBuilder::new(0, 4, 3).build("flat");
        assert_eq!(s.section_count(), 0);
        assert!(s.bounds().is_none());
        let s = StructureBuilder::new(2, 0, 2).build("none");
        assert_eq!(s.section_count(), 0);
    }

    #[test]
    fn sections_follow_layers_and_skip_void() {
        let stone = Block::new(1);
        let mut b = StructureBuilder::new(2, 3, 2);
        b.fill_layer(0, stone).set(1, 2, 1, Block::AIR);
        let s = b.build("t");
        assert_eq!(s.section_count(), 3);
        assert_eq!(s.sections()[0].len(), 4);
        assert!(s.sections()[1].is_empty());
        assert_eq!(s.sections()[2].blocks, vec![(BlockPos::new(1, 2, 1), Block::AIR)]);
        assert_eq!(s.get(BlockPos::new(1, 0, 1)), Some(stone));
        assert_eq!(s.get(BlockPos::new(0, 1, 0)), None);
    }
}
