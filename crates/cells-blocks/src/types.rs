use serde::{Deserialize, Serialize};

pub type BlockId = u32;

/// Interned block descriptor. The full key (name plus state properties) lives
/// in the [`BlockPalette`](crate::BlockPalette) that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
}

impl Block {
    /// Reserved palette slot for `minecraft:air`.
    pub const AIR: Block = Block { id: 0 };

    #[inline]
    pub const fn new(id: BlockId) -> Self {
        Self { id }
    }

    #[inline]
    pub fn is_air(&self) -> bool {
        self.id == Self::AIR.id
    }
}
