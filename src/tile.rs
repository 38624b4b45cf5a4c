//! Tile-type bit packing for stored rows.
//!
//! Every stored tile row carries a details word describing which
//! application-defined tile types are present at that tile and whether
//! each one fully covers it:
//!
//! ```text
//! |63 ----------- 20|19 ----------- 10|9 ------------- 0|
//! |      unused     |  type present   |   type full     |
//! ```
//!
//! A "full" type lets queries short-circuit without descending: the tile
//! is entirely inside the associated feature. This is the one and only
//! layout; encode and decode through this module.

use serde::{Deserialize, Serialize};

use crate::quadkey::QuadKey;

/// Bit distance between a type's full flag and its presence flag.
pub const DETAILS_TYPE_OFFSET: u32 = 10;

/// Number of type bits the details word can hold.
pub const MAX_TILE_TYPES: u8 = 10;

/// An application-defined tile category, occupying a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileType(u16);

impl TileType {
    /// The tile type at bit position `index` (0-based, below
    /// [`MAX_TILE_TYPES`]).
    pub const fn from_bit(index: u8) -> TileType {
        assert!(index < MAX_TILE_TYPES);
        TileType(1 << index)
    }

    /// The raw one-bit value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Details-word bits marking this type present but not full.
    pub const fn presence_mask(self) -> u64 {
        (self.0 as u64) << DETAILS_TYPE_OFFSET
    }

    /// Details-word bits marking this type present and full.
    pub const fn full_mask(self) -> u64 {
        self.presence_mask() | self.0 as u64
    }
}

/// The packed per-tile details word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileDetails(u64);

impl TileDetails {
    pub const fn new() -> TileDetails {
        TileDetails(0)
    }

    pub const fn from_raw(raw: u64) -> TileDetails {
        TileDetails(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Record a tile type, marking or clearing its full flag.
    pub fn set(&mut self, tile_type: TileType, full: bool) {
        self.0 |= tile_type.presence_mask();
        if full {
            self.0 |= u64::from(tile_type.raw());
        } else {
            self.0 &= !u64::from(tile_type.raw());
        }
    }

    /// Whether the tile type is present.
    pub fn has(self, tile_type: TileType) -> bool {
        self.0 & tile_type.presence_mask() != 0
    }

    /// Whether the tile type is present and covers the whole tile.
    pub fn is_full(self, tile_type: TileType) -> bool {
        self.0 & u64::from(tile_type.raw()) != 0
    }
}

/// A tile with its packed details, as written to and read from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub key: QuadKey,
    pub details: TileDetails,
}

impl Tile {
    pub fn new(key: QuadKey) -> Tile {
        Tile {
            key,
            details: TileDetails::new(),
        }
    }

    /// A tile carrying one type from the start.
    pub fn with_type(key: QuadKey, tile_type: TileType, full: bool) -> Tile {
        let mut tile = Tile::new(key);
        tile.details.set(tile_type, full);
        tile
    }
}
