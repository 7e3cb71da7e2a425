//! Error types for the `township-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

use township_types::Tile;

/// Errors that can occur during tile-map operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A tile lies outside the map.
    #[error("tile ({}, {}) is outside the {width}x{height} map", tile.x, tile.y)]
    OutOfBounds {
        /// The offending tile.
        tile: Tile,
        /// Map width in tiles.
        width: u32,
        /// Map height in tiles.
        height: u32,
    },

    /// An object layer index beyond the supported range was requested.
    #[error("object layer {layer} exceeds the limit of {max} layers")]
    LayerOutOfRange {
        /// Requested layer.
        layer: usize,
        /// Maximum number of layers.
        max: usize,
    },
}
