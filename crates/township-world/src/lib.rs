//! Tile grid, geometry, route search and free-space placement for the
//! Township world engine.
//!
//! Everything in this crate is synchronous and free of global state. The
//! world aggregate in `township-core` owns a [`WorldMap`] and calls into
//! these functions from its tick and command handlers.
//!
//! # Modules
//!
//! - [`error`] -- Error types for tile-map operations.
//! - [`geometry`] -- Distances, orientation, path interpolation and
//!   compression.
//! - [`movement`] -- Collision checks and A* route search.
//! - [`placement`] -- Occupancy derivation and the ring-search allocator.
//! - [`world_map`] -- Map dimensions, lazily grown object layers and placed
//!   sprites.

pub mod error;
pub mod geometry;
pub mod movement;
pub mod placement;
pub mod world_map;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use geometry::{PathSample, path_position};
pub use movement::{BlockReason, Route, RouteRequest, blocked_with_positions, find_route};
pub use placement::{Placement, find_free_placement, find_free_placement_in, occupied_tiles};
pub use world_map::{EMPTY_TILE, MAX_OBJECT_LAYERS, PlacedSprite, WorldMap};
