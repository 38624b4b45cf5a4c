//! Range decomposition and payload search.
//!
//! Stored tiles relevant to a query tile come in two flavours:
//! descendants, whose raw keys fall inside the query tile's
//! [`range`](crate::QuadKey::range), and ancestors, whose raw keys fall
//! *outside* it (an ancestor's key is numerically smaller than the range
//! of any of its descendants). Decomposition therefore expands every
//! query tile into its descendant range plus one singleton range per
//! ancestor, then sorts and merges the lot into a minimal disjoint list.
//!
//! Scanning those ranges can surface false positives: ancestor
//! singletons of *other* tiles in the query set, and low-zoom keys whose
//! tile bits happen to be zero. [`search`] filters them with an explicit
//! ancestor-or-descendant check per entry.

use geo::Geometry;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::covering::{exterior_covering, CoveringConfig};
use crate::error::Result;
use crate::index::{Payload, QuadIndex};
use crate::quadkey::QuadKey;
use crate::range::QuadKeyRange;

/// Collect every ancestor of the given tiles with zoom in
/// `[min_zoom, tile.zoom())`, deduplicated across the whole set.
///
/// Order is unspecified.
pub fn all_ancestors(tiles: &[QuadKey], min_zoom: u8) -> Vec<QuadKey> {
    let mut seen = FxHashSet::default();
    for &tile in tiles {
        let mut key = tile;
        while key.zoom() > min_zoom {
            let Ok(parent) = key.parent() else { break };
            if !seen.insert(parent) {
                // The rest of this chain was walked for an earlier tile.
                break;
            }
            key = parent;
        }
    }
    seen.into_iter().collect()
}

/// Decompose query tiles into a minimal sorted list of disjoint ranges.
///
/// The union of the result contains every stored key that is a
/// descendant (or equal) of a query tile, plus every ancestor down to
/// `min_zoom`. Consecutive ranges are separated by a gap of at least two
/// raw values; anything closer is merged.
pub fn search_ranges(tiles: &[QuadKey], min_zoom: u8) -> Vec<QuadKeyRange> {
    let ancestors = all_ancestors(tiles, min_zoom);

    let mut ranges = Vec::with_capacity(tiles.len() + ancestors.len());
    ranges.extend(tiles.iter().map(|t| t.range()));
    ranges.extend(ancestors.iter().map(|a| a.single_range()));
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<QuadKeyRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if let Some(last) = merged.last_mut() {
            if let Some(combined) = last.merge(range) {
                *last = combined;
                continue;
            }
        }
        merged.push(range);
    }
    merged
}

/// Resolve query tiles to deduplicated payload values.
///
/// Every payload stored under a key that is an ancestor or descendant of
/// (or equal to) some query tile is returned exactly once, keyed by
/// [`Payload::id`]. Result order is unspecified.
pub fn search<P: Payload>(
    index: &QuadIndex<P>,
    tiles: &[QuadKey],
    min_zoom: u8,
) -> Result<Vec<P>> {
    let ranges = search_ranges(tiles, min_zoom);

    let mut by_id: FxHashMap<P::Id, P> = FxHashMap::default();
    for entry in index.get(&ranges) {
        if by_id.contains_key(&entry.payload.id()) {
            continue;
        }
        let related = tiles
            .iter()
            .any(|&t| entry.key.is_ancestor_of(t) || t.is_ancestor_of(entry.key));
        if related {
            by_id.insert(entry.payload.id(), entry.payload);
        }
    }
    Ok(by_id.into_values().collect())
}

/// Resolve a query geometry to deduplicated payload values.
///
/// Covers the geometry first, then searches the cover; geometry failures
/// from the covering step propagate unchanged.
pub fn search_geometry<P: Payload>(
    index: &QuadIndex<P>,
    geometry: &Geometry<f64>,
    config: &CoveringConfig,
    min_zoom: u8,
) -> Result<Vec<P>> {
    let tiles = exterior_covering(geometry, config)?;
    search(index, &tiles, min_zoom)
}
