//! Exterior tile coverings of geometries.
//!
//! [`exterior_covering`] converts an arbitrary 2D geometry into a set of
//! tiles whose geographic union contains it, refining best-first until a
//! cell budget or zoom ceiling is hit.
//!
//! The refinement priority of a tile is its *outside area*: the area of
//! the tile envelope not covered by the geometry, in unprojected lon/lat
//! degrees. The least efficient tile is always refined first, so when the
//! budget runs out the retained tiles are the tightest cover found so
//! far. Web-Mercator distortion is not corrected for: refinement choices
//! compare sibling tiles in the same latitude band, where the distortion
//! cancels.

use std::collections::BinaryHeap;
use std::str::FromStr;

use geo::{Area, BooleanOps, Geometry, Intersects, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuadtileError, Result};
use crate::quadkey::{QuadKey, MAX_ZOOM};

/// Relative tolerance below which a tile's outside area is treated as
/// zero. Boolean overlay arithmetic leaves sub-ulp residue on tiles that
/// lie entirely within the geometry, and a tile that close to full would
/// only ever be refined into four equally full children.
const OUTSIDE_AREA_EPSILON: f64 = 1e-9;

/// Limits for covering generation.
///
/// A covering is bounded by a maximum cell count, a maximum zoom, or
/// both; the default refines freely down to [`MAX_ZOOM`].
///
/// # Example
///
/// ```rust
/// use quadtile::covering::CoveringConfig;
///
/// let config = CoveringConfig::with_max_cells(20).with_max_zoom(18);
/// assert_eq!(config.max_cells, Some(20));
/// assert_eq!(config.max_zoom, 18);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoveringConfig {
    /// Largest number of tiles the cover may contain.
    #[serde(default)]
    pub max_cells: Option<usize>,

    /// Deepest zoom level refinement may reach.
    #[serde(default = "CoveringConfig::default_max_zoom")]
    pub max_zoom: u8,
}

impl CoveringConfig {
    const fn default_max_zoom() -> u8 {
        MAX_ZOOM
    }

    /// Bound the cover by cell count.
    pub fn with_max_cells(max_cells: usize) -> Self {
        Self {
            max_cells: Some(max_cells),
            max_zoom: Self::default_max_zoom(),
        }
    }

    /// Bound refinement by zoom level.
    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom.min(MAX_ZOOM);
        self
    }
}

impl Default for CoveringConfig {
    fn default() -> Self {
        Self {
            max_cells: None,
            max_zoom: Self::default_max_zoom(),
        }
    }
}

/// Parse a WKT string into a geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    wkt::Wkt::<f64>::from_str(wkt)
        .map_err(|e| QuadtileError::Geometry(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| QuadtileError::Geometry(format!("{:?}", e)))
        })
}

/// A queued tile ordered by outside area; the max-heap pops the least
/// efficient tile first. Ties break on the key so refinement order is
/// deterministic.
#[derive(Debug, Clone, Copy)]
struct ScoredTile {
    key: QuadKey,
    outside: f64,
}

impl PartialEq for ScoredTile {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for ScoredTile {}

impl PartialOrd for ScoredTile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredTile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.outside
            .total_cmp(&other.outside)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Compute an exterior cover of `geometry`.
///
/// The union of the returned tiles' envelopes contains the geometry, no
/// member is an ancestor of another, and the tile count respects
/// `config.max_cells` when set. Returns an empty cover for an empty
/// geometry and `CapacityExceeded` for a zero cell budget.
///
/// Member order is unspecified; compare covers as sets.
pub fn exterior_covering(geometry: &Geometry<f64>, config: &CoveringConfig) -> Result<Vec<QuadKey>> {
    if config.max_cells == Some(0) {
        return Err(QuadtileError::CapacityExceeded { max_cells: 0 });
    }
    let max_zoom = config.max_zoom.min(MAX_ZOOM);
    let polygonal = polygonal_part(geometry);

    let mut queue = BinaryHeap::new();
    match score_tile(QuadKey::ROOT, geometry, &polygonal) {
        Some(root) => queue.push(root),
        None => return Ok(Vec::new()),
    }

    while let Some(tile) = queue.pop() {
        // A popped tile with no outside area means every queued tile lies
        // entirely within the geometry; the cover cannot improve.
        if tile.outside == 0.0 {
            queue.push(tile);
            break;
        }
        if tile.key.zoom() >= max_zoom {
            queue.push(tile);
            break;
        }

        let mut candidates = Vec::with_capacity(4);
        for child in tile.key.children()? {
            if let Some(scored) = score_tile(child, geometry, &polygonal) {
                candidates.push(scored);
            }
        }

        if let Some(max_cells) = config.max_cells {
            if queue.len() + candidates.len() > max_cells {
                queue.push(tile);
                break;
            }
        }
        for candidate in candidates {
            queue.push(candidate);
        }
    }

    debug!(cells = queue.len(), max_zoom, "exterior covering complete");
    Ok(queue.into_iter().map(|t| t.key).collect())
}

/// Cover a geometry given as WKT.
pub fn exterior_covering_wkt(wkt: &str, config: &CoveringConfig) -> Result<Vec<QuadKey>> {
    exterior_covering(&parse_wkt(wkt)?, config)
}

/// Score a tile against the geometry, or `None` when they are disjoint.
///
/// Emptiness uses the intersection predicate, so a tile that only touches
/// the geometry's boundary still scores (with its full envelope area as
/// outside area, as does any tile over a zero-area geometry).
fn score_tile(key: QuadKey, geometry: &Geometry<f64>, polygonal: &MultiPolygon<f64>) -> Option<ScoredTile> {
    let envelope = key.envelope();
    let tile = MultiPolygon::new(vec![envelope.to_polygon()]);
    if !geometry.intersects(&tile) {
        return None;
    }
    let inside = if polygonal.0.is_empty() {
        0.0
    } else {
        tile.intersection(polygonal).unsigned_area()
    };
    let envelope_area = envelope.unsigned_area();
    let mut outside = envelope_area - inside;
    if outside.abs() < OUTSIDE_AREA_EPSILON * envelope_area {
        outside = 0.0;
    }
    Some(ScoredTile { key, outside })
}

/// Collect the polygonal members of a geometry into one multipolygon.
///
/// Zero-area members (points, lines) contribute nothing: their
/// intersection area with any tile is zero.
fn polygonal_part(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    MultiPolygon::new(polygons)
}

fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for member in gc {
                collect_polygons(member, out);
            }
        }
        _ => {}
    }
}
