//! Player state: position, movement intent, activity, coins and inventory.
//!
//! Field names serialize in camelCase because they form part of the wire
//! contract read by clients and by the operation executor.

use serde::{Deserialize, Serialize};

use crate::geometry::{PathComponent, Point, Vector};
use crate::ids::PlayerId;

/// Coins every player starts with.
pub const DEFAULT_COINS: u64 = 100;

/// A controllable entity in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable identity for the player's lifetime.
    pub id: PlayerId,
    /// Ownership token of the controlling human, absent for autonomous players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human: Option<String>,
    /// Active movement intent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathfinding: Option<Pathfinding>,
    /// Active activity bubble, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    /// The last time (ms) this player submitted an input.
    pub last_input: u64,
    /// Current position in tile units.
    pub position: Point,
    /// Unit vector the player is facing.
    pub facing: Vector,
    /// Current speed in tiles per second, 0 when stationary.
    pub speed: f64,
    /// Coin balance.
    #[serde(default = "default_coins")]
    pub coins: u64,
    /// Items carried, in acquisition order.
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

impl Player {
    /// A stationary player with default coins and an empty inventory.
    pub fn new(id: PlayerId, position: Point, facing: Vector, now: u64) -> Self {
        Self {
            id,
            human: None,
            pathfinding: None,
            activity: None,
            last_input: now,
            position,
            facing,
            speed: 0.0,
            coins: DEFAULT_COINS,
            inventory: Vec::new(),
        }
    }

    /// Whether a human controls this player.
    pub const fn is_human(&self) -> bool {
        self.human.is_some()
    }
}

const fn default_coins() -> u64 {
    DEFAULT_COINS
}

/// A movement intent towards a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pathfinding {
    /// Target tile; always inside the map.
    pub destination: Point,
    /// When the intent was created. Never reset while the intent lives.
    pub started: u64,
    /// Current sub-state.
    pub state: PathfindingState,
}

/// Sub-state of a [`Pathfinding`] intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PathfindingState {
    /// A route must be (re)computed.
    NeedsPath,
    /// Blocked by a collision; retry after `until`.
    Waiting {
        /// Retry deadline in milliseconds.
        until: u64,
    },
    /// Following a precomputed path.
    Moving {
        /// Time-stamped samples from the start of the route to its end.
        path: Vec<PathComponent>,
    },
}

/// Discriminant of [`PathfindingState`], handy for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathfindingKind {
    /// See [`PathfindingState::NeedsPath`].
    NeedsPath,
    /// See [`PathfindingState::Waiting`].
    Waiting,
    /// See [`PathfindingState::Moving`].
    Moving,
}

impl PathfindingState {
    /// The variant tag of this state.
    pub const fn kind(&self) -> PathfindingKind {
        match self {
            Self::NeedsPath => PathfindingKind::NeedsPath,
            Self::Waiting { .. } => PathfindingKind::Waiting,
            Self::Moving { .. } => PathfindingKind::Moving,
        }
    }
}

/// A short-lived activity shown above a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// What the player is doing ("build", "reading a book", ...).
    pub description: String,
    /// Optional emoji rendered with the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Expiry timestamp in milliseconds.
    pub until: u64,
}

/// An item carried by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Display name (the English generation prompt for discovered items).
    pub name: String,
    /// Sprite sheet URL.
    pub image_url: String,
    /// When the item was obtained, in milliseconds.
    pub created: u64,
}

/// Descriptive metadata persisted separately from the per-tick state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDescription {
    /// The described player.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Character sprite name or asset path.
    pub character: String,
    /// Free-form self description.
    pub description: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pathfinding_state_is_tagged_by_kind() {
        let waiting = PathfindingState::Waiting { until: 42 };
        let json = serde_json::to_value(&waiting).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "waiting", "until": 42 }));

        let needs: PathfindingState =
            serde_json::from_value(serde_json::json!({ "kind": "needsPath" })).unwrap();
        assert_eq!(needs.kind(), PathfindingKind::NeedsPath);
    }

    #[test]
    fn missing_coins_default_to_one_hundred() {
        let json = serde_json::json!({
            "id": PlayerId::new(),
            "lastInput": 0,
            "position": { "x": 1.0, "y": 2.0 },
            "facing": { "dx": 0.0, "dy": 1.0 },
            "speed": 0.0
        });
        let player: Player = serde_json::from_value(json).unwrap();
        assert_eq!(player.coins, DEFAULT_COINS);
        assert!(player.inventory.is_empty());
        assert!(!player.is_human());
    }
}
