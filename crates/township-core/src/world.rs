//! The world aggregate owned exclusively by the tick engine.
//!
//! [`World`] holds every player, agent and conversation, the tile map, the
//! per-step pathfinding counter, the dirty flag read by the persistence
//! collaborator and the outbox of operations waiting for the executor. All
//! mutation goes through command handlers and tick hooks implemented in
//! the sibling modules.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use township_types::{
    Agent, AgentId, ConversationId, Player, PlayerDescription, PlayerId, Point,
};
use township_world::{BlockReason, WorldMap, blocked_with_positions};

use crate::config::SimulationConfig;
use crate::conversation::Conversation;
use crate::error::CommandError;
use crate::operations::ScheduledOperation;

/// The mutable state of one world.
#[derive(Debug, Clone)]
pub struct World {
    pub(crate) config: SimulationConfig,
    pub(crate) map: WorldMap,
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) descriptions: BTreeMap<PlayerId, PlayerDescription>,
    pub(crate) agents: BTreeMap<AgentId, Agent>,
    pub(crate) conversations: BTreeMap<ConversationId, Conversation>,
    pub(crate) num_pathfinds: u32,
    pub(crate) pathfind_budget_warned: bool,
    pub(crate) descriptions_modified: bool,
    pub(crate) scheduled: Vec<ScheduledOperation>,
    pub(crate) rng: StdRng,
}

impl World {
    /// Create an empty world sized from `config.world`.
    pub fn new(config: SimulationConfig) -> Self {
        let map = WorldMap::new(config.world.width, config.world.height, config.world.tile_dim);
        Self::with_map(config, map)
    }

    /// Create an empty world on an existing map.
    pub fn with_map(config: SimulationConfig, map: WorldMap) -> Self {
        let rng = StdRng::seed_from_u64(config.world.seed);
        Self {
            config,
            map,
            players: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            agents: BTreeMap::new(),
            conversations: BTreeMap::new(),
            num_pathfinds: 0,
            pathfind_budget_warned: false,
            descriptions_modified: false,
            scheduled: Vec::new(),
            rng,
        }
    }

    // -------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------

    /// The configuration this world runs with.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Mutable access to the configuration, for world setup.
    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    /// The tile map.
    pub const fn map(&self) -> &WorldMap {
        &self.map
    }

    /// Mutable access to the tile map, for world setup.
    pub fn map_mut(&mut self) -> &mut WorldMap {
        &mut self.map
    }

    /// All players, ordered by id.
    pub const fn players(&self) -> &BTreeMap<PlayerId, Player> {
        &self.players
    }

    /// Look up a player.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Look up a player's descriptive metadata.
    pub fn description(&self, id: PlayerId) -> Option<&PlayerDescription> {
        self.descriptions.get(&id)
    }

    /// All player descriptions, including those of departed players.
    pub const fn descriptions(&self) -> &BTreeMap<PlayerId, PlayerDescription> {
        &self.descriptions
    }

    /// All agents, ordered by id.
    pub const fn agents(&self) -> &BTreeMap<AgentId, Agent> {
        &self.agents
    }

    /// Look up an agent.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// The agent driving `player_id`, if any.
    pub fn agent_for_player(&self, player_id: PlayerId) -> Option<&Agent> {
        self.agents.values().find(|agent| agent.player_id == player_id)
    }

    /// Route searches performed during the current step.
    pub const fn num_pathfinds(&self) -> u32 {
        self.num_pathfinds
    }

    /// Whether descriptive metadata changed since the last flush.
    pub const fn descriptions_modified(&self) -> bool {
        self.descriptions_modified
    }

    /// Operations dispatched but not yet handed to the executor.
    pub fn scheduled(&self) -> &[ScheduledOperation] {
        &self.scheduled
    }

    // -------------------------------------------------------------------
    // Step bookkeeping
    // -------------------------------------------------------------------

    /// Reset per-step counters.
    pub fn begin_step(&mut self) {
        self.num_pathfinds = 0;
        self.pathfind_budget_warned = false;
    }

    /// Read and clear the "descriptions modified" flag.
    pub fn take_descriptions_modified(&mut self) -> bool {
        std::mem::take(&mut self.descriptions_modified)
    }

    /// Drain the outbox of dispatched operations.
    pub fn take_scheduled(&mut self) -> Vec<ScheduledOperation> {
        std::mem::take(&mut self.scheduled)
    }

    // -------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------

    /// Insert a fully-formed player and its description.
    ///
    /// Used by `join` once a start tile has been chosen, and by world setup
    /// code that needs players at known positions.
    pub fn insert_player(&mut self, player: Player, description: PlayerDescription) -> PlayerId {
        let id = player.id;
        self.players.insert(id, player);
        self.descriptions.insert(id, description);
        self.descriptions_modified = true;
        id
    }

    /// Look up a player or fail with [`CommandError::NotFound`].
    pub fn require_player(&self, id: PlayerId) -> Result<&Player, CommandError> {
        self.players
            .get(&id)
            .ok_or_else(|| CommandError::not_found("player", id))
    }

    /// Look up an agent or fail with [`CommandError::NotFound`].
    pub fn require_agent(&self, id: AgentId) -> Result<&Agent, CommandError> {
        self.agents
            .get(&id)
            .ok_or_else(|| CommandError::not_found("agent", id))
    }

    /// Positions of every player except `exclude`.
    pub fn other_positions(&self, exclude: Option<PlayerId>) -> Vec<Point> {
        self.players
            .values()
            .filter(|player| Some(player.id) != exclude)
            .map(|player| player.position)
            .collect()
    }

    /// Why `position` cannot be occupied, ignoring the player `exclude`.
    pub fn blocked(&self, position: Point, exclude: Option<PlayerId>) -> Option<BlockReason> {
        blocked_with_positions(
            position,
            &self.other_positions(exclude),
            &self.map,
            self.config.movement.collision_threshold,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use township_types::Vector;

    fn world() -> World {
        let mut config = SimulationConfig::default();
        config.world.width = 10;
        config.world.height = 10;
        World::new(config)
    }

    fn add_player(world: &mut World, x: f64, y: f64) -> PlayerId {
        let id = PlayerId::new();
        world.insert_player(
            Player::new(id, Point::new(x, y), Vector::new(1.0, 0.0), 0),
            PlayerDescription {
                player_id: id,
                name: "Ada".to_owned(),
                character: "f1".to_owned(),
                description: String::new(),
            },
        )
    }

    #[test]
    fn insert_marks_descriptions_modified() {
        let mut world = world();
        assert!(!world.descriptions_modified());
        let id = add_player(&mut world, 2.0, 2.0);
        assert!(world.player(id).is_some());
        assert!(world.take_descriptions_modified());
        assert!(!world.descriptions_modified());
    }

    #[test]
    fn blocked_ignores_the_excluded_player() {
        let mut world = world();
        let id = add_player(&mut world, 2.0, 2.0);
        let spot = Point::new(2.5, 2.0);
        assert_eq!(world.blocked(spot, None), Some(BlockReason::PlayerCollision));
        assert_eq!(world.blocked(spot, Some(id)), None);
        assert_eq!(
            world.blocked(Point::new(10.0, 0.0), Some(id)),
            Some(BlockReason::OutOfBounds)
        );
    }

    #[test]
    fn missing_entities_are_not_found() {
        let world = world();
        assert!(matches!(
            world.require_player(PlayerId::new()),
            Err(CommandError::NotFound { entity: "player", .. })
        ));
        assert!(matches!(
            world.require_agent(AgentId::new()),
            Err(CommandError::NotFound { entity: "agent", .. })
        ));
    }
}
