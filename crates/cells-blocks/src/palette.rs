use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{Block, BlockId};

pub const AIR_KEY: &str = "minecraft:air";

/// Strips a state suffix: `minecraft:oak_log[axis=y]` -> `minecraft:oak_log`.
#[inline]
pub fn base_key(key: &str) -> &str {
    key.split('[').next().unwrap_or(key)
}

#[derive(Default)]
struct PaletteInner {
    keys: Vec<Arc<str>>,
    by_key: HashMap<Arc<str>, BlockId>,
}

/// Append-only interner from full block keys to [`Block`] ids.
///
/// Ids are never reused or removed, so blocks written to the world before a
/// tier reload keep resolving to the same key afterwards.
pub struct BlockPalette {
    inner: RwLock<PaletteInner>,
}

impl Default for BlockPalette {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPalette {
    pub fn new() -> Self {
        let palette = Self {
            inner: RwLock::new(PaletteInner::default()),
        };
        let air = palette.intern(AIR_KEY);
        debug_assert_eq!(air, Block::AIR);
        palette
    }

    /// Returns the id for `key`, allocating a new one on first sight.
    pub fn intern(&self, key: &str) -> Block {
        if let Some(b) = self.lookup(key) {
            return b;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have won the race since the read above.
        if let Some(&id) = inner.by_key.get(key) {
            return Block::new(id);
        }
        let id = inner.keys.len() as BlockId;
        let shared: Arc<str> = Arc::from(key);
        inner.keys.push(shared.clone());
        inner.by_key.insert(shared, id);
        log::trace!("palette: interned {key} as {id}");
        Block::new(id)
    }

    pub fn lookup(&self, key: &str) -> Option<Block> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_key.get(key).copied().map(Block::new)
    }

    pub fn key(&self, block: Block) -> Option<Arc<str>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.keys.get(block.id as usize).cloned()
    }

    /// First id whose base name (state suffix stripped) equals `name`.
    pub fn id_by_name(&self, name: &str) -> Option<Block> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .keys
            .iter()
            .position(|k| base_key(k) == name)
            .map(|i| Block::new(i as BlockId))
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_reserved_zero() {
        let p = BlockPalette::new();
        assert_eq!(p.lookup(AIR_KEY), Some(Block::AIR));
        assert_eq!(p.key(Block::AIR).as_deref(), Some(AIR_KEY));
        assert!(Block::AIR.is_air());
    }

    #[test]
    fn id_by_name_ignores_state() {
        let p = BlockPalette::new();
        let log = p.intern("minecraft:oak_log[axis=y]");
        assert_eq!(p.id_by_name("minecraft:oak_log"), Some(log));
        assert_eq!(p.id_by_name("minecraft:birch_log"), None);
    }
}
