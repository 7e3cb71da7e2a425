//! Shared type definitions for the Township world engine.
//!
//! This crate is the single source of truth for the data that crosses crate
//! boundaries: entity identifiers, geometry value types, player state and
//! agent operation markers. Everything here is plain serializable data with
//! no behaviour beyond small accessors.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`geometry`] -- Points, vectors, path samples, tiles and footprints
//! - [`player`] -- Players, pathfinding sub-states, activities, inventory
//! - [`agent`] -- Agents and their in-flight operation markers

pub mod agent;
pub mod geometry;
pub mod ids;
pub mod player;

// Re-export all public types at crate root for convenience.
pub use agent::{Agent, InProgressOperation, OperationKind};
pub use geometry::{Footprint, PathComponent, Point, Tile, Vector};
pub use ids::{AgentId, ConversationId, OperationId, PlayerId};
pub use player::{
    Activity, DEFAULT_COINS, InventoryItem, Pathfinding, PathfindingKind, PathfindingState,
    Player, PlayerDescription,
};
