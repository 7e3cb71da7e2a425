//! Geometric value types shared by the map, movement and wire formats.
//!
//! Positions are in tile units. A [`Point`] may sit between tiles while a
//! player is walking; [`Tile`] is always a whole grid cell.

use serde::{Deserialize, Serialize};

/// A position on the map in tile units (sub-tile precision).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate, growing to the right.
    pub x: f64,
    /// Vertical coordinate, growing downwards.
    pub y: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Tile> for Point {
    fn from(tile: Tile) -> Self {
        Self {
            x: f64::from(tile.x),
            y: f64::from(tile.y),
        }
    }
}

/// A direction or displacement in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    /// Horizontal component.
    pub dx: f64,
    /// Vertical component.
    pub dy: f64,
}

impl Vector {
    /// Create a vector from its components.
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// The four cardinal unit vectors (east, west, south, north).
    pub const CARDINALS: [Self; 4] = [
        Self::new(1.0, 0.0),
        Self::new(-1.0, 0.0),
        Self::new(0.0, 1.0),
        Self::new(0.0, -1.0),
    ];
}

/// One sample of a precomputed path: where the player is, which way it
/// faces and at what simulated time (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathComponent {
    /// Position at time `t`.
    pub position: Point,
    /// Facing while leaving this sample.
    pub facing: Vector,
    /// Simulated timestamp in milliseconds.
    pub t: u64,
}

/// A whole grid cell. Signed so ring searches can probe past the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tile {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Tile {
    /// Create a tile from its column and row.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Width and height of a rectangular footprint, in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// Width in tiles.
    pub w: u32,
    /// Height in tiles.
    pub h: u32,
}

impl Footprint {
    /// A single-tile footprint.
    pub const UNIT: Self = Self { w: 1, h: 1 };

    /// Create a footprint from its dimensions.
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::UNIT
    }
}
