//! Packed QuadKey tile identifiers.
//!
//! A [`QuadKey`] encodes a Web-Mercator slippy tile `(x, y, z)` into a
//! single `u64`:
//!
//! ```text
//! |63 ......................... 64-2z|...............|4.......0|
//! |  interleaved y/x bit pairs       |  zero tail    |  zoom   |
//! |  most significant pair first     |               |         |
//! ```
//!
//! Each pair holds the y bit above the x bit, so numeric ordering of the
//! raw word is a recursive Z-order over the plane. The zoom-0 root is the
//! all-zero word. Parent, child and ancestry checks are plain bit
//! arithmetic on the raw value.

use std::fmt;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{QuadtileError, Result};
use crate::range::QuadKeyRange;

/// Deepest zoom level a QuadKey can represent.
///
/// 24 pairs of tile bits plus the 5 zoom bits fit in 64 bits with room to
/// spare; one level deeper and the child shift would collide with the
/// zoom field.
pub const MAX_ZOOM: u8 = 24;

/// Shallowest zoom level; the zoom-0 root covers the whole map.
pub const MIN_ZOOM: u8 = 0;

/// Zoom level lives in the bottom 5 bits.
const ZOOM_MASK: u64 = 0b11111;

/// A slippy tile identifier packed into 64 bits.
///
/// `QuadKey` is a plain value: cheap to copy, hashable, and ordered by
/// its raw word (which is Z-order). Construct one with
/// [`QuadKey::from_slippy`] or by navigating from an existing key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuadKey(u64);

impl QuadKey {
    /// The zoom-0 root tile covering the entire map.
    pub const ROOT: QuadKey = QuadKey(0);

    /// Encode slippy coordinates into a QuadKey.
    ///
    /// Fails with `ZoomOutOfRange` when `z > MAX_ZOOM` and with
    /// `CoordinateOutOfRange` when `x` or `y` does not exist at zoom `z`.
    pub fn from_slippy(x: u32, y: u32, z: u8) -> Result<QuadKey> {
        if z > MAX_ZOOM {
            return Err(QuadtileError::ZoomOutOfRange { zoom: z });
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(QuadtileError::CoordinateOutOfRange { x, y, zoom: z });
        }

        let mut raw = 0u64;
        for i in 0..z {
            // Pair i sits at bits (63 - 2i, 62 - 2i); it encodes the bit
            // of x and y selected by mask for the (i+1)-th split.
            let mask = 1u32 << (z - 1 - i);
            let x_bit = 62 - 2 * u32::from(i);
            if x & mask != 0 {
                raw |= 1 << x_bit;
            }
            if y & mask != 0 {
                raw |= 1 << (x_bit + 1);
            }
        }
        Ok(QuadKey(raw | u64::from(z)))
    }

    /// Decode back into slippy `(x, y, z)` coordinates.
    pub fn to_slippy(self) -> (u32, u32, u8) {
        let z = self.zoom();
        let mut x = 0u32;
        let mut y = 0u32;
        for i in 0..z {
            let x_bit = 62 - 2 * u32::from(i);
            x = (x << 1) | ((self.0 >> x_bit) & 1) as u32;
            y = (y << 1) | ((self.0 >> (x_bit + 1)) & 1) as u32;
        }
        (x, y, z)
    }

    /// The raw 64-bit word.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw word previously obtained via [`raw`].
    ///
    /// The caller is responsible for the word being a valid encoding;
    /// range scans deal in raw words that are not.
    ///
    /// [`raw`]: QuadKey::raw
    pub fn from_raw(raw: u64) -> QuadKey {
        QuadKey(raw)
    }

    /// Zoom level, stored in the low 5 bits.
    pub fn zoom(self) -> u8 {
        (self.0 & ZOOM_MASK) as u8
    }

    /// The containing tile one zoom level up.
    ///
    /// Fails with `NoParent` on the zoom-0 root.
    pub fn parent(self) -> Result<QuadKey> {
        let z = self.zoom();
        if z == 0 {
            return Err(QuadtileError::NoParent);
        }
        let parent_zoom = z - 1;
        if parent_zoom == 0 {
            return Ok(QuadKey::ROOT);
        }
        // Clear everything below the parent's tile bits, then restamp zoom.
        let shift = 64 - 2 * u32::from(parent_zoom);
        let raw = (self.0 >> shift) << shift;
        Ok(QuadKey(raw | u64::from(parent_zoom)))
    }

    /// The child tile at position `pos`.
    ///
    /// Positions follow the Bing Maps quadrant convention: 0 = NW,
    /// 1 = NE, 2 = SW, 3 = SE (high bit y, low bit x).
    pub fn child(self, pos: u8) -> Result<QuadKey> {
        let z = self.zoom();
        if z >= MAX_ZOOM {
            return Err(QuadtileError::MaxZoomExceeded { max: MAX_ZOOM });
        }
        if pos > 3 {
            return Err(QuadtileError::InvalidChildPosition { pos });
        }
        let prefix = if z == 0 { 0 } else { self.0 >> (64 - 2 * u32::from(z)) };
        let raw = ((prefix << 2) | u64::from(pos)) << (62 - 2 * u32::from(z));
        Ok(QuadKey(raw | u64::from(z + 1)))
    }

    /// All four children, NW to SE.
    pub fn children(self) -> Result<[QuadKey; 4]> {
        Ok([self.child(0)?, self.child(1)?, self.child(2)?, self.child(3)?])
    }

    /// The closed raw-value range containing this key and every
    /// descendant.
    ///
    /// The range also admits a handful of false positives: keys at a
    /// lower zoom whose remaining tile bits are all zero. Callers filter
    /// those with an explicit [`is_ancestor_of`] check after scanning.
    ///
    /// [`is_ancestor_of`]: QuadKey::is_ancestor_of
    pub fn range(self) -> QuadKeyRange {
        let tail = u64::MAX >> (2 * u32::from(self.zoom()));
        let start = self.0 & !tail;
        QuadKeyRange { start, end: start | tail }
    }

    /// A range containing exactly this key.
    pub fn single_range(self) -> QuadKeyRange {
        QuadKeyRange { start: self.0, end: self.0 }
    }

    /// Whether this key contains `desc` geographically (or equals it).
    pub fn is_ancestor_of(self, desc: QuadKey) -> bool {
        self.zoom() <= desc.zoom() && self.range().contains(desc)
    }

    /// Lon/lat bounds of the tile, per the OpenStreetMap slippy formulas.
    pub fn envelope(self) -> Rect<f64> {
        let (x, y, z) = self.to_slippy();
        Rect::new(slippy_to_lonlat(x, y, z), slippy_to_lonlat(x + 1, y + 1, z))
    }

    /// The NW-most and SE-most descendants at `zoom`.
    ///
    /// Fails with `ZoomOutOfRange` when `zoom` is shallower than this
    /// key or deeper than `MAX_ZOOM`.
    pub fn min_max_at_zoom(self, zoom: u8) -> Result<(QuadKey, QuadKey)> {
        if zoom < self.zoom() || zoom > MAX_ZOOM {
            return Err(QuadtileError::ZoomOutOfRange { zoom });
        }
        let mut min = self;
        let mut max = self;
        for _ in self.zoom()..zoom {
            min = min.child(0)?;
            max = max.child(3)?;
        }
        Ok((min, max))
    }

    /// Every ancestor plus the key itself, ordered by ascending zoom.
    pub fn ancestors_and_self(self) -> Vec<QuadKey> {
        let mut chain = vec![self];
        let mut key = self;
        while let Ok(parent) = key.parent() {
            chain.push(parent);
            key = parent;
        }
        chain.reverse();
        chain
    }

    /// Lazily iterate every descendant at `zoom`, in Z-order.
    ///
    /// Descendants at a fixed zoom occupy a contiguous run of raw values,
    /// so the iterator is pure arithmetic and restartable: clone it to
    /// scan again.
    pub fn descendants_at_zoom(self, zoom: u8) -> Result<DescendantsAtZoom> {
        if zoom < self.zoom() || zoom > MAX_ZOOM {
            return Err(QuadtileError::ZoomOutOfRange { zoom });
        }
        let start = (self.0 & !ZOOM_MASK) | u64::from(zoom);
        let step = if zoom == 0 { 0 } else { 1u64 << (64 - 2 * u32::from(zoom)) };
        Ok(DescendantsAtZoom {
            next: start,
            step,
            remaining: 1u64 << (2 * (zoom - self.zoom())),
        })
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y, z) = self.to_slippy();
        write!(f, "{}/{}/{}", x, y, z)
    }
}

impl fmt::Debug for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuadKey({:#018x})", self.0)
    }
}

/// Lon/lat of the top-left corner of slippy tile `(x, y, z)`.
///
/// From <https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames>.
pub fn slippy_to_lonlat(x: u32, y: u32, z: u8) -> Coord<f64> {
    let n = (1u64 << z) as f64;
    let lon = f64::from(x) / n * 360.0 - 180.0;
    let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * f64::from(y) / n)).sinh().atan();
    Coord { x: lon, y: lat_rad.to_degrees() }
}

/// Iterator over the descendants of a key at a fixed zoom level.
///
/// Yields keys in ascending raw (Z-order) value. See
/// [`QuadKey::descendants_at_zoom`].
#[derive(Debug, Clone)]
pub struct DescendantsAtZoom {
    next: u64,
    step: u64,
    remaining: u64,
}

impl Iterator for DescendantsAtZoom {
    type Item = QuadKey;

    fn next(&mut self) -> Option<QuadKey> {
        if self.remaining == 0 {
            return None;
        }
        let key = QuadKey(self.next);
        self.next = self.next.wrapping_add(self.step);
        self.remaining -= 1;
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).ok();
        (n.unwrap_or(usize::MAX), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Levels 1-6 populated (first 12 bits), zoom 6 stamped at the end.
    const KEY: QuadKey =
        QuadKey(0b1101110110110000000000000000000000000000000000000000000000000110);

    // Children of KEY: bits 12-13 vary, zoom reads 7.
    const CHILD_0: QuadKey =
        QuadKey(0b1101110110110000000000000000000000000000000000000000000000000111);
    const CHILD_1: QuadKey =
        QuadKey(0b1101110110110100000000000000000000000000000000000000000000000111);
    const CHILD_2: QuadKey =
        QuadKey(0b1101110110111000000000000000000000000000000000000000000000000111);
    const CHILD_3: QuadKey =
        QuadKey(0b1101110110111100000000000000000000000000000000000000000000000111);

    // KEY with bits 10-11 zeroed and zoom restamped to 5.
    const PARENT: QuadKey =
        QuadKey(0b1101110110000000000000000000000000000000000000000000000000000101);

    #[test]
    fn test_parent() {
        assert_eq!(KEY.zoom(), 6);
        let parent = KEY.parent().unwrap();
        assert_eq!(parent, PARENT);
        assert_eq!(parent.zoom(), 5);
    }

    #[test]
    fn test_child_at_pos() {
        for (pos, expected) in [CHILD_0, CHILD_1, CHILD_2, CHILD_3].into_iter().enumerate() {
            let child = KEY.child(pos as u8).unwrap();
            assert_eq!(child, expected, "child {}", pos);
            assert_eq!(child.zoom(), 7);
            assert_eq!(child.parent().unwrap(), KEY);
        }
    }

    #[test]
    fn test_child_matches_slippy_encoding() {
        let key = QuadKey::from_slippy(123, 456, 10).unwrap();
        let (x, y, z) = key.to_slippy();
        assert_eq!(key.child(0).unwrap(), QuadKey::from_slippy(2 * x, 2 * y, z + 1).unwrap());
        assert_eq!(
            key.child(1).unwrap(),
            QuadKey::from_slippy(2 * x + 1, 2 * y, z + 1).unwrap()
        );
        assert_eq!(
            key.child(2).unwrap(),
            QuadKey::from_slippy(2 * x, 2 * y + 1, z + 1).unwrap()
        );
        assert_eq!(
            key.child(3).unwrap(),
            QuadKey::from_slippy(2 * x + 1, 2 * y + 1, z + 1).unwrap()
        );
    }

    #[test]
    fn test_slippy_round_trip() {
        for (x, y, z) in [
            (0, 0, 0),
            (0, 0, 1),
            (1, 1, 1),
            (123, 456, 9),
            (60292, 39326, 16),
            ((1 << 24) - 1, (1 << 24) - 1, 24),
        ] {
            let key = QuadKey::from_slippy(x, y, z).unwrap();
            assert_eq!(key.to_slippy(), (x, y, z), "round trip {}/{}/{}", x, y, z);
            assert_eq!(key.zoom(), z);
        }
    }

    #[test]
    fn test_from_slippy_rejects_bad_input() {
        assert!(matches!(
            QuadKey::from_slippy(0, 0, 25),
            Err(QuadtileError::ZoomOutOfRange { zoom: 25 })
        ));
        assert!(matches!(
            QuadKey::from_slippy(2, 0, 1),
            Err(QuadtileError::CoordinateOutOfRange { .. })
        ));
        assert!(matches!(
            QuadKey::from_slippy(1, 0, 0),
            Err(QuadtileError::CoordinateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_root_has_no_parent() {
        assert!(matches!(QuadKey::ROOT.parent(), Err(QuadtileError::NoParent)));
    }

    #[test]
    fn test_child_limits() {
        let deepest = QuadKey::from_slippy(0, 0, MAX_ZOOM).unwrap();
        assert!(matches!(
            deepest.child(0),
            Err(QuadtileError::MaxZoomExceeded { .. })
        ));
        assert!(matches!(
            KEY.child(4),
            Err(QuadtileError::InvalidChildPosition { pos: 4 })
        ));

        // SE corner one level up still descends cleanly.
        let corner = QuadKey::from_slippy((1 << 23) - 1, (1 << 23) - 1, MAX_ZOOM - 1).unwrap();
        let child = corner.child(3).unwrap();
        assert_eq!(child.zoom(), MAX_ZOOM);
        assert_eq!(child.to_slippy(), ((1 << 24) - 1, (1 << 24) - 1, MAX_ZOOM));
    }

    #[test]
    fn test_range_contains_self_and_descendants() {
        let key = QuadKey::from_slippy(123, 456, 9).unwrap();
        let range = key.range();
        assert!(range.contains(key));
        for descendant in key.descendants_at_zoom(12).unwrap() {
            assert!(range.contains(descendant));
        }
        assert_eq!(range.start, key.raw() & !(u64::MAX >> 18));
        assert_eq!(range.end, range.start | (u64::MAX >> 18));
    }

    #[test]
    fn test_root_range_spans_everything() {
        let range = QuadKey::ROOT.range();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, u64::MAX);
    }

    #[test]
    fn test_single_range() {
        let key = QuadKey::from_slippy(5, 9, 4).unwrap();
        let range = key.single_range();
        assert!(range.contains(key));
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_is_ancestor_of() {
        let key = QuadKey::from_slippy(123, 456, 9).unwrap();
        assert!(key.is_ancestor_of(key));
        for pos in 0..4 {
            let child = key.child(pos).unwrap();
            assert!(key.is_ancestor_of(child));
            assert!(!child.is_ancestor_of(key));
        }
        assert!(QuadKey::ROOT.is_ancestor_of(key));

        let sibling = QuadKey::from_slippy(124, 456, 9).unwrap();
        assert!(!key.is_ancestor_of(sibling));
        assert!(!sibling.is_ancestor_of(key));
    }

    #[test]
    fn test_exactly_one_child_covers_a_descendant() {
        let key = QuadKey::from_slippy(7, 3, 5).unwrap();
        let descendant = QuadKey::from_slippy(7 * 8 + 3, 3 * 8 + 5, 8).unwrap();
        let covering: Vec<_> = key
            .children()
            .unwrap()
            .into_iter()
            .filter(|c| c.is_ancestor_of(descendant))
            .collect();
        assert_eq!(covering.len(), 1);
    }

    #[test]
    fn test_envelope() {
        let key = QuadKey::from_slippy(60292, 39326, 16).unwrap();
        let env = key.envelope();
        assert!((env.min().x - 151.19384765625).abs() < 1e-9);
        assert!((env.min().y - -33.86585445407186).abs() < 1e-9);
        assert!((env.max().x - 151.1993408203125).abs() < 1e-9);
        assert!((env.max().y - -33.861293113515515).abs() < 1e-9);
    }

    #[test]
    fn test_whole_map_envelope() {
        let env = QuadKey::ROOT.envelope();
        assert!((env.min().x - -180.0).abs() < 1e-9);
        assert!((env.max().x - 180.0).abs() < 1e-9);
        assert!(env.max().y < 86.0 && env.max().y > 85.0);
    }

    #[test]
    fn test_min_max_at_zoom() {
        let key = QuadKey::from_slippy(1, 1, 1).unwrap();
        let (min, max) = key.min_max_at_zoom(3).unwrap();
        assert_eq!(min, QuadKey::from_slippy(4, 4, 3).unwrap());
        assert_eq!(max, QuadKey::from_slippy(7, 7, 3).unwrap());

        let (same_min, same_max) = key.min_max_at_zoom(1).unwrap();
        assert_eq!(same_min, key);
        assert_eq!(same_max, key);

        assert!(key.min_max_at_zoom(0).is_err());
    }

    #[test]
    fn test_ancestors_and_self() {
        let key = QuadKey::from_slippy(123, 456, 9).unwrap();
        let chain = key.ancestors_and_self();
        assert_eq!(chain.len(), 10);
        assert_eq!(chain[0], QuadKey::ROOT);
        assert_eq!(chain[9], key);
        for (zoom, ancestor) in chain.iter().enumerate() {
            assert_eq!(ancestor.zoom() as usize, zoom);
            assert!(ancestor.is_ancestor_of(key));
        }
    }

    #[test]
    fn test_descendants_at_zoom() {
        let key = QuadKey::from_slippy(2, 3, 2).unwrap();
        let descendants: Vec<_> = key.descendants_at_zoom(4).unwrap().collect();
        assert_eq!(descendants.len(), 16);
        for pair in descendants.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for d in &descendants {
            assert_eq!(d.zoom(), 4);
            assert!(key.is_ancestor_of(*d));
        }

        let self_only: Vec<_> = key.descendants_at_zoom(2).unwrap().collect();
        assert_eq!(self_only, vec![key]);
    }

    #[test]
    fn test_display() {
        let key = QuadKey::from_slippy(123, 456, 9).unwrap();
        assert_eq!(key.to_string(), "123/456/9");
        assert_eq!(format!("{:?}", key), "QuadKey(0xad71400000000009)");
    }
}
