//! World mutation seam and an in-memory, chunk-bucketed world.
#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};

use cells_blocks::Block;
use cells_geom::{BlockPos, WorldId};

/// The single world-mutation primitive. Implementations are only called from
/// the thread that owns the world.
pub trait BlockSink {
    fn set_block(&mut self, world: &WorldId, pos: BlockPos, block: Block);
}

#[derive(Default, Debug, Clone, Copy)]
pub struct WorldEditsStats {
    pub worlds: usize,
    pub chunk_entries: usize,
    pub blocks: usize,
    pub writes: u64,
    pub dirty_chunks: usize,
}

type ChunkKey = (i32, i32, i32);

/// Chunk-aware block store keyed by world, with per-chunk change tracking.
pub struct WorldEdits {
    sx: i32,
    sy: i32,
    sz: i32,
    // world -> chunk -> world coords -> Block
    inner: HashMap<WorldId, HashMap<ChunkKey, HashMap<BlockPos, Block>>>,
    rev: HashMap<(WorldId, ChunkKey), u64>,
    dirty: BTreeSet<(WorldId, ChunkKey)>,
    counter: u64,
    writes: u64,
}

impl Default for WorldEdits {
    fn default() -> Self {
        Self::new(16, 16, 16)
    }
}

impl WorldEdits {
    pub fn new(sx: i32, sy: i32, sz: i32) -> Self {
        debug_assert!(sx > 0 && sy > 0 && sz > 0);
        Self {
            sx,
            sy,
            sz,
            inner: HashMap::new(),
            rev: HashMap::new(),
            dirty: BTreeSet::new(),
            counter: 0,
            writes: 0,
        }
    }

    #[inline]
    fn chunk_key(&self, p: BlockPos) -> ChunkKey {
        (
            p.x.div_euclid(self.sx),
            p.y.div_euclid(self.sy),
            p.z.div_euclid(self.sz),
        )
    }

    pub fn get(&self, world: &WorldId, pos: BlockPos) -> Option<Block> {
        let k = self.chunk_key(pos);
        self.inner
            .get(world)
            .and_then(|chunks| chunks.get(&k))
            .and_then(|m| m.get(&pos).copied())
    }

    pub fn set(&mut self, world: &WorldId, pos: BlockPos, b: Block) {
        let k = self.chunk_key(pos);
        self.inner
            .entry(world.clone())
            .or_default()
            .entry(k)
            .or_default()
            .insert(pos, b);
        self.counter = self.counter.wrapping_add(1).max(1);
        self.rev.insert((world.clone(), k), self.counter);
        self.dirty.insert((world.clone(), k));
        self.writes += 1;
    }

    /// Snapshot of all blocks for a specific chunk.
    pub fn snapshot_for_chunk(&self, world: &WorldId, cx: i32, cy: i32, cz: i32) -> Vec<(BlockPos, Block)> {
        self.inner
            .get(world)
            .and_then(|chunks| chunks.get(&(cx, cy, cz)))
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default()
    }

    pub fn get_rev(&self, world: &WorldId, cx: i32, cy: i32, cz: i32) -> u64 {
        self.rev
            .get(&(world.clone(), (cx, cy, cz)))
            .copied()
            .unwrap_or(0)
    }

    /// Chunks written since the last call, in world then coordinate order.
    pub fn take_dirty_chunks(&mut self) -> Vec<(WorldId, ChunkKey)> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Total number of `set` calls since creation.
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn stats(&self) -> WorldEditsStats {
        WorldEditsStats {
            worlds: self.inner.len(),
            chunk_entries: self.inner.values().map(|c| c.len()).sum(),
            blocks: self
                .inner
                .values()
                .flat_map(|c| c.values())
                .map(|m| m.len())
                .sum(),
            writes: self.writes,
            dirty_chunks: self.dirty.len(),
        }
    }
}

impl BlockSink for WorldEdits {
    fn set_block(&mut self, world: &WorldId, pos: BlockPos, block: Block) {
        self.set(world, pos, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coords_bucket_with_div_euclid() {
        let mut w = WorldEdits::new(16, 16, 16);
        let world = WorldId::new("cells");
        w.set_block(&world, BlockPos::new(-1, 0, 15), Block::new(3));
        assert_eq!(w.get(&world, BlockPos::new(-1, 0, 15)), Some(Block::new(3)));
        assert_eq!(
            w.snapshot_for_chunk(&world, -1, 0, 0),
            vec![(BlockPos::new(-1, 0, 15), Block::new(3))]
        );
        assert!(w.get_rev(&world, -1, 0, 0) > 0);
        assert_eq!(w.get_rev(&world, 0, 0, 0), 0);
    }

    #[test]
    fn worlds_are_isolated_and_dirty_chunks_drain() {
        let mut w = WorldEdits::default();
        let a = WorldId::new("a");
        let b = WorldId::new("b");
        w.set_block(&a, BlockPos::new(1, 1, 1), Block::new(1));
        w.set_block(&a, BlockPos::new(2, 1, 1), Block::new(2));
        w.set_block(&b, BlockPos::new(40, 1, 1), Block::new(1));
        assert_eq!(w.get(&b, BlockPos::new(1, 1, 1)), None);
        let dirty = w.take_dirty_chunks();
        assert_eq!(dirty, vec![(a, (0, 0, 0)), (b, (2, 0, 0))]);
        assert!(w.take_dirty_chunks().is_empty());
        let s = w.stats();
        assert_eq!((s.worlds, s.blocks, s.writes), (2, 3, 3));
    }
}
