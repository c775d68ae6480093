use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cells_geom::Location;
use serde::{Deserialize, Serialize};

pub type CellId = u64;

/// Stable 128-bit player identifier, written in the usual hyphenated hex form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(pub u128);

impl PlayerId {
    #[inline]
    pub const fn from_u128(v: u128) -> Self {
        Self(v)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlayerIdError(String);

impl fmt::Display for ParsePlayerIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid player id '{}'", self.0)
    }
}

impl std::error::Error for ParsePlayerIdError {}

impl FromStr for PlayerId {
    type Err = ParsePlayerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(ParsePlayerIdError(s.to_string()));
        }
        u128::from_str_radix(&hex, 16)
            .map(PlayerId)
            .map_err(|_| ParsePlayerIdError(s.to_string()))
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ParsePlayerIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PlayerId> for String {
    fn from(p: PlayerId) -> Self {
        p.to_string()
    }
}

/// Ordered permission tier of a cell member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Member,
    Guard,
    Manager,
    Owner,
}

impl Rank {
    /// Edit blocks anywhere inside the cell.
    pub fn can_build(self) -> bool {
        self >= Rank::Guard
    }

    pub fn can_access_chests(self) -> bool {
        self >= Rank::Guard
    }

    pub fn can_invite(self) -> bool {
        self >= Rank::Manager
    }

    /// Upgrade the cell and change membership.
    pub fn can_manage(self) -> bool {
        self >= Rank::Manager
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rank::Member => "member",
            Rank::Guard => "guard",
            Rank::Manager => "manager",
            Rank::Owner => "owner",
        };
        f.write_str(s)
    }
}

/// A claimed parcel. The owner is always present in `members` as [`Rank::Owner`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub owner: PlayerId,
    pub members: BTreeMap<PlayerId, Rank>,
    pub level: u32,
    pub origin: Location,
    // True only while a placement for this cell is in flight
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Cell {
    pub fn new(id: CellId, owner: PlayerId, level: u32, origin: Location) -> Self {
        let mut members = BTreeMap::new();
        members.insert(owner, Rank::Owner);
        Self {
            id,
            owner,
            members,
            level,
            origin,
            busy: false,
            name: None,
            description: None,
        }
    }

    #[inline]
    pub fn rank_of(&self, player: PlayerId) -> Option<Rank> {
        self.members.get(&player).copied()
    }

    #[inline]
    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains_key(&player)
    }

    /// Inserts or re-ranks a member. The owner's rank cannot be changed.
    pub fn set_member(&mut self, player: PlayerId, rank: Rank) -> bool {
        if player == self.owner || rank == Rank::Owner {
            return false;
        }
        self.members.insert(player, rank);
        true
    }

    /// Removes a member; the owner is never removed.
    pub fn remove_member(&mut self, player: PlayerId) -> Option<Rank> {
        if player == self.owner {
            return None;
        }
        self.members.remove(&player)
    }
}
