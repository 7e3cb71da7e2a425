//! Player lifecycle and the per-tick movement state machine.
//!
//! Joining, leaving and setting a movement intent are commands. The three
//! tick hooks run for every player on every tick, in this order across the
//! whole world:
//!
//! 1. [`World::tick_player`] removes humans that have been idle too long.
//! 2. [`World::tick_pathfinding`] advances the pathfinding sub-state and
//!    computes routes, bounded by a per-step search budget.
//! 3. [`World::tick_position`] moves players along their routes and backs
//!    off on collisions.

use rand::Rng;
use rand::seq::IndexedRandom;
use township_types::{Pathfinding, PathfindingState, Player, PlayerDescription, PlayerId, Point, Vector};
use township_world::{RouteRequest, blocked_with_positions, find_route, path_position};
use township_world::geometry::points_equal;
use tracing::{debug, info, warn};

use crate::error::{CommandError, Precondition};
use crate::inputs::JoinArgs;
use crate::world::World;

/// Clear a player's movement intent and bring it to rest.
pub fn stop_player(player: &mut Player) {
    player.pathfinding = None;
    player.speed = 0.0;
}

impl World {
    // -------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------

    /// Add a player on a random free tile.
    ///
    /// # Errors
    ///
    /// [`Precondition::DuplicateHuman`] and [`Precondition::TooManyHumans`]
    /// for human joins, [`Precondition::InvalidCharacter`] for an unknown
    /// character and [`Precondition::NoFreePosition`] when every sampled
    /// start tile is blocked.
    pub fn join(&mut self, now: u64, args: &JoinArgs) -> Result<PlayerId, CommandError> {
        if let Some(token) = &args.token_identifier {
            if self.players.values().any(|p| p.human.as_ref() == Some(token)) {
                return Err(CommandError::precondition(
                    Precondition::DuplicateHuman,
                    format!("{token} is already playing"),
                ));
            }
            let humans = self.players.values().filter(|p| p.is_human()).count();
            let cap = usize::try_from(self.config.players.max_human_players).unwrap_or(usize::MAX);
            if humans >= cap {
                return Err(CommandError::precondition(
                    Precondition::TooManyHumans,
                    format!("only {cap} human players can join at once"),
                ));
            }
        }
        let players = &self.config.players;
        if !players.characters.contains(&args.character)
            && !args.character.starts_with(&players.character_asset_prefix)
        {
            return Err(CommandError::precondition(
                Precondition::InvalidCharacter,
                format!("unknown character {}", args.character),
            ));
        }

        let position = self.sample_free_position().ok_or_else(|| {
            CommandError::precondition(
                Precondition::NoFreePosition,
                format!(
                    "no free start tile after {} attempts",
                    self.config.players.join_attempts
                ),
            )
        })?;
        let facing = Vector::CARDINALS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Vector::new(0.0, 1.0));

        let id = PlayerId::new();
        let mut player = Player::new(id, position, facing, now);
        player.human.clone_from(&args.token_identifier);
        self.insert_player(
            player,
            PlayerDescription {
                player_id: id,
                name: args.name.clone(),
                character: args.character.clone(),
                description: args.description.clone(),
            },
        );
        info!(
            player_id = %id,
            name = %args.name,
            human = args.token_identifier.is_some(),
            x = position.x,
            y = position.y,
            "Player joined"
        );
        Ok(id)
    }

    fn sample_free_position(&mut self) -> Option<Point> {
        let (width, height) = (self.map.width(), self.map.height());
        if width == 0 || height == 0 {
            return None;
        }
        for _ in 0..self.config.players.join_attempts {
            let x = self.rng.random_range(0..width);
            let y = self.rng.random_range(0..height);
            let candidate = Point::new(f64::from(x), f64::from(y));
            if self.blocked(candidate, None).is_none() {
                return Some(candidate);
            }
        }
        None
    }

    /// Remove a player, ending its conversation and dropping any agent
    /// that drives it. Its description is kept for history.
    pub fn leave(&mut self, player_id: PlayerId, now: u64) {
        if let Some(conversation_id) = self.player_conversation(player_id).map(|c| c.id) {
            self.stop_conversation(conversation_id, now);
        }
        if self.players.remove(&player_id).is_some() {
            self.agents.retain(|_, agent| agent.player_id != player_id);
            info!(player_id = %player_id, "Player left");
        }
    }

    /// Validate a destination for `player_id`.
    ///
    /// Returns `false` when the player already stands on it.
    pub(crate) fn check_destination(
        &self,
        player_id: PlayerId,
        destination: Point,
    ) -> Result<bool, CommandError> {
        let player = self.require_player(player_id)?;
        if !destination.x.is_finite()
            || !destination.y.is_finite()
            || destination.x.fract() != 0.0
            || destination.y.fract() != 0.0
        {
            return Err(CommandError::InvalidArgument {
                command: "moveTo".to_owned(),
                message: format!(
                    "destination ({}, {}) is not a whole tile",
                    destination.x, destination.y
                ),
            });
        }
        if !self.map.contains(destination) {
            return Err(CommandError::precondition(
                Precondition::OutOfBounds,
                format!("destination ({}, {}) is outside the map", destination.x, destination.y),
            ));
        }
        if self.player_conversation(player_id).is_some() {
            return Err(CommandError::precondition(
                Precondition::InConversation,
                format!("player {player_id} cannot move while in a conversation"),
            ));
        }
        Ok(!points_equal(player.position, destination))
    }

    /// Set or clear a movement intent. Never computes a route.
    ///
    /// # Errors
    ///
    /// See [`World::check_destination`]; clearing (`None`) only requires
    /// the player to exist.
    pub fn move_player(
        &mut self,
        player_id: PlayerId,
        now: u64,
        destination: Option<Point>,
    ) -> Result<(), CommandError> {
        let Some(destination) = destination else {
            let player = self
                .players
                .get_mut(&player_id)
                .ok_or_else(|| CommandError::not_found("player", player_id))?;
            stop_player(player);
            return Ok(());
        };
        if !self.check_destination(player_id, destination)? {
            return Ok(());
        }
        if let Some(player) = self.players.get_mut(&player_id) {
            player.pathfinding = Some(Pathfinding {
                destination,
                started: now,
                state: PathfindingState::NeedsPath,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Tick hooks
    // -------------------------------------------------------------------

    /// Force out a human whose last input is too old.
    pub fn tick_player(&mut self, player_id: PlayerId, now: u64) {
        let idle_limit = self.config.players.human_idle_too_long_ms;
        let Some(player) = self.players.get(&player_id) else {
            return;
        };
        if player.is_human() && now.saturating_sub(player.last_input) > idle_limit {
            info!(player_id = %player_id, idle_ms = now.saturating_sub(player.last_input), "Removing idle human");
            self.leave(player_id, now);
        }
    }

    /// Advance one player's pathfinding sub-state.
    pub fn tick_pathfinding(&mut self, player_id: PlayerId, now: u64) {
        let movement = &self.config.movement;
        let (timeout, max_pathfinds, speed) = (
            movement.pathfinding_timeout_ms,
            movement.max_pathfinds_per_step,
            movement.speed,
        );
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        let Some(pathfinding) = player.pathfinding.as_mut() else {
            return;
        };

        if matches!(pathfinding.state, PathfindingState::Moving { .. })
            && points_equal(player.position, pathfinding.destination)
        {
            stop_player(player);
            return;
        }
        if now.saturating_sub(pathfinding.started) > timeout {
            warn!(player_id = %player_id, started = pathfinding.started, "Pathfinding timed out");
            stop_player(player);
            return;
        }
        if let PathfindingState::Waiting { until } = pathfinding.state {
            if until < now {
                pathfinding.state = PathfindingState::NeedsPath;
            }
        }
        if !matches!(pathfinding.state, PathfindingState::NeedsPath) {
            return;
        }
        if points_equal(player.position, pathfinding.destination) {
            stop_player(player);
            return;
        }
        if self.num_pathfinds >= max_pathfinds {
            if !self.pathfind_budget_warned {
                self.pathfind_budget_warned = true;
                warn!(max_pathfinds, "Pathfinding budget exhausted for this step");
            }
            return;
        }
        self.num_pathfinds = self.num_pathfinds.saturating_add(1);

        let request = RouteRequest {
            start: player.position,
            facing: player.facing,
            now,
            destination: pathfinding.destination,
            speed,
        };
        let route = find_route(&request, |position| self.blocked(position, Some(player_id)));

        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        let Some(route) = route else {
            debug!(player_id = %player_id, "No route, clearing pathfinding");
            stop_player(player);
            return;
        };
        if let Some(pathfinding) = player.pathfinding.as_mut() {
            if let Some(adjusted) = route.new_destination {
                warn!(
                    player_id = %player_id,
                    x = adjusted.x,
                    y = adjusted.y,
                    "Destination unreachable, heading for the closest point"
                );
                pathfinding.destination = adjusted;
            }
            pathfinding.state = PathfindingState::Moving { path: route.path };
        }
    }

    /// Move one player along its route, or back off on a collision.
    pub fn tick_position(&mut self, player_id: PlayerId, now: u64) {
        let others = self.other_positions(Some(player_id));
        let threshold = self.config.movement.collision_threshold;
        let backoff = self.config.movement.pathfinding_backoff_ms;
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };

        let sample = match player.pathfinding.as_ref().map(|p| &p.state) {
            Some(PathfindingState::Moving { path }) => path_position(path, now),
            _ => {
                player.speed = 0.0;
                return;
            }
        };
        let Some(sample) = sample else {
            warn!(player_id = %player_id, now, "Path does not cover the current time");
            return;
        };

        if let Some(reason) = blocked_with_positions(sample.position, &others, &self.map, threshold) {
            let until = now.saturating_add(self.rng.random_range(1..backoff.max(2)));
            debug!(player_id = %player_id, %reason, until, "Movement blocked, waiting");
            player.speed = 0.0;
            if let Some(pathfinding) = player.pathfinding.as_mut() {
                pathfinding.state = PathfindingState::Waiting { until };
            }
            return;
        }
        player.position = sample.position;
        player.facing = sample.facing;
        player.speed = sample.velocity;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use township_types::{PathComponent, PathfindingKind};

    fn world(size: u32) -> World {
        let mut config = SimulationConfig::default();
        config.world.width = size;
        config.world.height = size;
        World::new(config)
    }

    fn join_args(token: Option<&str>) -> JoinArgs {
        JoinArgs {
            name: "Lucky".to_owned(),
            character: "f1".to_owned(),
            description: "a cheerful wanderer".to_owned(),
            token_identifier: token.map(str::to_owned),
        }
    }

    fn place(world: &mut World, x: f64, y: f64) -> PlayerId {
        let id = PlayerId::new();
        world.insert_player(
            Player::new(id, Point::new(x, y), Vector::new(1.0, 0.0), 0),
            PlayerDescription {
                player_id: id,
                name: "p".to_owned(),
                character: "f2".to_owned(),
                description: String::new(),
            },
        )
    }

    fn state_kind(world: &World, id: PlayerId) -> Option<PathfindingKind> {
        world.player(id).unwrap().pathfinding.as_ref().map(|p| p.state.kind())
    }

    #[test]
    fn join_creates_a_default_player() {
        let mut world = world(10);
        let id = world.join(5, &join_args(Some("tok-1"))).unwrap();
        let player = world.player(id).unwrap();
        assert_eq!(player.coins, 100);
        assert!(player.inventory.is_empty());
        assert_eq!(player.human.as_deref(), Some("tok-1"));
        assert_eq!(player.last_input, 5);
        assert!(world.map().contains(player.position));
        assert!(Vector::CARDINALS.contains(&player.facing));
        assert_eq!(world.description(id).unwrap().name, "Lucky");
        assert!(world.descriptions_modified());
    }

    #[test]
    fn join_rejects_duplicate_humans_and_enforces_the_cap() {
        let mut world = world(20);
        world.join(0, &join_args(Some("tok"))).unwrap();
        let err = world.join(0, &join_args(Some("tok"))).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::DuplicateHuman));

        for i in 1..8 {
            world.join(0, &join_args(Some(&format!("tok-{i}")))).unwrap();
        }
        let err = world.join(0, &join_args(Some("tok-9"))).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::TooManyHumans));
        // Autonomous players are not capped.
        world.join(0, &join_args(None)).unwrap();
        assert_eq!(world.players().len(), 9);
    }

    #[test]
    fn join_checks_the_character() {
        let mut world = world(10);
        let mut args = join_args(None);
        args.character = "dragon".to_owned();
        let err = world.join(0, &args).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::InvalidCharacter));

        args.character = "/township/assets/characters/7.png".to_owned();
        assert!(world.join(0, &args).is_ok());
    }

    #[test]
    fn join_fails_when_no_tile_is_free() {
        let mut world = world(1);
        place(&mut world, 0.0, 0.0);
        let err = world.join(0, &join_args(None)).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::NoFreePosition));
        assert_eq!(world.players().len(), 1);
    }

    #[test]
    fn leave_ends_the_conversation_first() {
        let mut world = world(10);
        let a = place(&mut world, 1.0, 1.0);
        let b = place(&mut world, 3.0, 1.0);
        world.start_conversation(0, a, b).unwrap();
        world.leave(a, 50);
        assert!(world.player(a).is_none());
        assert!(world.player_conversation(b).is_none());
        assert!(world.description(a).is_some());
    }

    #[test]
    fn move_player_validates_the_destination() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);

        let err = world.move_player(a, 0, Some(Point::new(3.5, 2.0))).unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgument { .. }));
        let err = world.move_player(a, 0, Some(Point::new(10.0, 2.0))).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::OutOfBounds));

        // Already there: nothing to do.
        world.move_player(a, 0, Some(Point::new(2.0, 2.0))).unwrap();
        assert!(world.player(a).unwrap().pathfinding.is_none());

        world.move_player(a, 7, Some(Point::new(5.0, 2.0))).unwrap();
        let pathfinding = world.player(a).unwrap().pathfinding.clone().unwrap();
        assert_eq!(pathfinding.started, 7);
        assert_eq!(pathfinding.state, PathfindingState::NeedsPath);

        world.move_player(a, 8, None).unwrap();
        assert!(world.player(a).unwrap().pathfinding.is_none());
    }

    #[test]
    fn conversations_pin_players_in_place() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        let b = place(&mut world, 4.0, 2.0);
        world.start_conversation(0, a, b).unwrap();
        let err = world.move_player(a, 0, Some(Point::new(6.0, 2.0))).unwrap_err();
        assert_eq!(err.precondition_kind(), Some(Precondition::InConversation));
    }

    #[test]
    fn needs_path_becomes_moving() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        world.move_player(a, 0, Some(Point::new(6.0, 2.0))).unwrap();
        world.tick_pathfinding(a, 16);
        assert_eq!(state_kind(&world, a), Some(PathfindingKind::Moving));
        assert_eq!(world.num_pathfinds(), 1);
    }

    #[test]
    fn pathfinding_budget_is_per_step() {
        let mut world = world(20);
        world.config.movement.max_pathfinds_per_step = 1;
        let a = place(&mut world, 2.0, 2.0);
        let b = place(&mut world, 2.0, 8.0);
        world.move_player(a, 0, Some(Point::new(6.0, 2.0))).unwrap();
        world.move_player(b, 0, Some(Point::new(6.0, 8.0))).unwrap();

        world.tick_pathfinding(a, 16);
        world.tick_pathfinding(b, 16);
        assert_eq!(state_kind(&world, b), Some(PathfindingKind::NeedsPath));

        world.begin_step();
        world.tick_pathfinding(b, 1_016);
        assert_eq!(state_kind(&world, b), Some(PathfindingKind::Moving));
    }

    #[test]
    fn stale_intents_time_out() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        world.move_player(a, 0, Some(Point::new(6.0, 2.0))).unwrap();
        world.tick_pathfinding(a, 60_001);
        assert!(world.player(a).unwrap().pathfinding.is_none());
    }

    #[test]
    fn waiting_retries_after_the_deadline() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        world.move_player(a, 0, Some(Point::new(6.0, 2.0))).unwrap();
        world.players.get_mut(&a).unwrap().pathfinding.as_mut().unwrap().state =
            PathfindingState::Waiting { until: 500 };

        world.tick_pathfinding(a, 500);
        assert_eq!(state_kind(&world, a), Some(PathfindingKind::Waiting));
        world.tick_pathfinding(a, 501);
        assert_eq!(state_kind(&world, a), Some(PathfindingKind::Moving));
    }

    #[test]
    fn collisions_back_off_without_moving() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        place(&mut world, 3.0, 2.0);
        let path = vec![
            PathComponent {
                position: Point::new(2.0, 2.0),
                facing: Vector::new(1.0, 0.0),
                t: 0,
            },
            PathComponent {
                position: Point::new(6.0, 2.0),
                facing: Vector::new(1.0, 0.0),
                t: 4_000,
            },
        ];
        world.players.get_mut(&a).unwrap().pathfinding = Some(Pathfinding {
            destination: Point::new(6.0, 2.0),
            started: 0,
            state: PathfindingState::Moving { path },
        });

        world.tick_position(a, 1_000);
        let player = world.player(a).unwrap();
        assert_eq!(player.position, Point::new(2.0, 2.0));
        assert!(player.speed.abs() < f64::EPSILON);
        let Some(PathfindingState::Waiting { until }) =
            player.pathfinding.as_ref().map(|p| p.state.clone())
        else {
            panic!("expected waiting");
        };
        assert!(until > 1_000 && until < 2_000);
    }

    #[test]
    fn moving_players_follow_their_path() {
        let mut world = world(10);
        let a = place(&mut world, 2.0, 2.0);
        world.move_player(a, 0, Some(Point::new(5.0, 2.0))).unwrap();
        world.tick_pathfinding(a, 0);
        world.tick_position(a, 2_000);
        let player = world.player(a).unwrap();
        assert!(player.position.x > 2.0 && player.position.x < 5.0);
        assert!((player.speed - 0.75).abs() < 1e-9);

        world.tick_position(a, 10_000);
        world.tick_pathfinding(a, 10_000);
        let player = world.player(a).unwrap();
        assert_eq!(player.position, Point::new(5.0, 2.0));
        assert!(player.pathfinding.is_none());
    }

    #[test]
    fn idle_humans_are_removed() {
        let mut world = world(10);
        let id = world.join(0, &join_args(Some("tok"))).unwrap();
        world.tick_player(id, 300_000);
        assert!(world.player(id).is_some());
        world.tick_player(id, 300_001);
        assert!(world.player(id).is_none());
    }
}
