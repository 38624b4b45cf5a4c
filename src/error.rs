//! Error types for quadtile.

use thiserror::Error;

/// All failure modes surfaced by this crate.
///
/// There is no internal recovery: every operation that can fail returns
/// the error to the caller unchanged.
#[derive(Error, Debug)]
pub enum QuadtileError {
    /// Zoom level outside `[MIN_ZOOM, MAX_ZOOM]`.
    #[error("zoom level {zoom} out of range")]
    ZoomOutOfRange { zoom: u8 },

    /// `parent()` called on the zoom-0 root.
    #[error("no parent: key is the zoom-0 root")]
    NoParent,

    /// `child()` called at the maximum zoom level.
    #[error("maximum zoom is {max}")]
    MaxZoomExceeded { max: u8 },

    /// Child position outside `0..=3`.
    #[error("invalid child position {pos}")]
    InvalidChildPosition { pos: u8 },

    /// Slippy coordinate does not exist at the given zoom.
    #[error("slippy coordinate ({x}, {y}) out of range at zoom {zoom}")]
    CoordinateOutOfRange { x: u32, y: u32, zoom: u8 },

    /// Geometry parsing or computation failed.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Underlying SQLite error, surfaced unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Covering requested with a zero cell budget.
    #[error("covering capacity of {max_cells} cells is too small")]
    CapacityExceeded { max_cells: usize },
}

/// Result type for quadtile operations.
pub type Result<T> = std::result::Result<T, QuadtileError>;
