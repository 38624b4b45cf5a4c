//! Hierarchical spatial index over the Web-Mercator slippy tile pyramid.
//!
//! ```rust
//! use quadtile::{exterior_covering, search, CoveringConfig, Entry, Payload, QuadIndex, QuadKey};
//!
//! #[derive(Clone)]
//! struct Feature(&'static str);
//!
//! impl Payload for Feature {
//!     type Id = &'static str;
//!     fn id(&self) -> &'static str {
//!         self.0
//!     }
//! }
//!
//! let sydney = QuadKey::from_slippy(471, 307, 9)?;
//! let index = QuadIndex::new([Entry::new(sydney, Feature("sydney"))]);
//!
//! let geometry = quadtile::covering::parse_wkt("POINT(151.196 -33.866)")?;
//! let cover = exterior_covering(&geometry, &CoveringConfig::with_max_cells(20))?;
//! let found = search(&index, &cover, 0)?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), quadtile::QuadtileError>(())
//! ```
//!
//! Geometries are covered by tiles ([`exterior_covering`]), tile sets
//! are decomposed into sorted key ranges ([`search_ranges`]), and ranges
//! are resolved against a sorted index — in memory ([`QuadIndex`]) or in
//! SQLite ([`TileStore`]).

pub mod covering;
pub mod error;
pub mod index;
pub mod quadkey;
pub mod range;
pub mod search;
pub mod storage;
pub mod tile;

pub use covering::{exterior_covering, exterior_covering_wkt, CoveringConfig};
pub use error::{QuadtileError, Result};
pub use index::{Entry, EntryStream, Payload, QuadIndex};
pub use quadkey::{slippy_to_lonlat, QuadKey, MAX_ZOOM, MIN_ZOOM};
pub use range::QuadKeyRange;
pub use search::{all_ancestors, search, search_geometry, search_ranges};
pub use storage::{DetailsRecord, SearchHit, TileStore, TABLE_PARTITION_ZOOM};
pub use tile::{Tile, TileDetails, TileType, DETAILS_TYPE_OFFSET};

pub use geo::Geometry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{QuadKey, QuadKeyRange, QuadtileError, Result};

    pub use crate::{exterior_covering, CoveringConfig};

    pub use crate::{search, search_ranges};

    pub use crate::{Entry, Payload, QuadIndex};

    pub use crate::{Tile, TileDetails, TileStore, TileType};
}
