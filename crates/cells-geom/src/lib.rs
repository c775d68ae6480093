//! Integer block geometry shared by the cell crates (no world dependency).
#![forbid(unsafe_code)]

use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A block position in world or structure-local space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ZERO: BlockPos = BlockPos { x: 0, y: 0, z: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: i32) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    #[inline]
    pub fn min_components(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max_components(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }
}

impl Add for BlockPos {
    type Output = BlockPos;
    #[inline]
    fn add(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for BlockPos {
    #[inline]
    fn add_assign(&mut self, rhs: BlockPos) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for BlockPos {
    type Output = BlockPos;
    #[inline]
    fn sub(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for BlockPos {
    #[inline]
    fn sub_assign(&mut self, rhs: BlockPos) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl Neg for BlockPos {
    type Output = BlockPos;
    #[inline]
    fn neg(self) -> BlockPos {
        BlockPos::new(-self.x, -self.y, -self.z)
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from(v: [i32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<BlockPos> for [i32; 3] {
    fn from(p: BlockPos) -> Self {
        [p.x, p.y, p.z]
    }
}

impl From<(i32, i32, i32)> for BlockPos {
    fn from(v: (i32, i32, i32)) -> Self {
        Self::new(v.0, v.1, v.2)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

/// Name of a world (dimension) the host knows about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(Arc<str>);

impl WorldId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A block position qualified by its world.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: WorldId,
    pub pos: BlockPos,
}

impl Location {
    pub fn new(world: WorldId, pos: BlockPos) -> Self {
        Self { world, pos }
    }

    #[inline]
    pub fn offset_by(&self, delta: BlockPos) -> Location {
        Location {
            world: self.world.clone(),
            pos: self.pos + delta,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world, self.pos)
    }
}

/// Axis-aligned integer box. Both `min` and `max` are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct BlockBox {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BlockBox {
    /// Builds a box from two corners in any order.
    #[inline]
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: a.min_components(b),
            max: a.max_components(b),
        }
    }

    /// Box spanning `origin ..= origin + extent` on every axis.
    #[inline]
    pub fn from_origin_extent(origin: BlockPos, extent: i32) -> Self {
        Self::new(origin, origin + BlockPos::splat(extent))
    }

    #[inline]
    pub fn contains(&self, p: BlockPos) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    #[inline]
    pub fn translated(&self, delta: BlockPos) -> BlockBox {
        BlockBox {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    #[inline]
    pub fn size(&self) -> BlockPos {
        self.max - self.min + BlockPos::splat(1)
    }

    pub fn volume(&self) -> u64 {
        let s = self.size();
        s.x as u64 * s.y as u64 * s.z as u64
    }

    /// Iterates every position, x fastest, then z, then y.
    pub fn iter(&self) -> impl Iterator<Item = BlockPos> + '_ {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| {
            (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| BlockPos::new(x, y, z)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn new_orders_corners(b in any::<BlockBox>()) {
            let n = BlockBox::new(b.max, b.min);
            prop_assert!(n.min.x <= n.max.x && n.min.y <= n.max.y && n.min.z <= n.max.z);
        }
    }

    #[test]
    fn iter_visits_volume() {
        let b = BlockBox::new(BlockPos::new(-1, 0, 2), BlockPos::new(1, 2, 3));
        assert_eq!(b.iter().count() as u64, b.volume());
        assert_eq!(b.iter().next(), Some(BlockPos::new(-1, 0, 2)));
    }
}
