//! Autonomous agents: creation and the per-tick decision trigger.
//!
//! An agent is a brain bound to one player. The agent tick never decides
//! anything itself; it only works out whether the agent is idle and, if
//! so, dispatches an operation through the bridge in
//! [`operations`](crate::operations).

use rand::Rng;
use township_types::{Agent, AgentId, OperationKind, PlayerId};
use tracing::{info, warn};

use crate::error::CommandError;
use crate::inputs::{CreateAgentArgs, JoinArgs};
use crate::world::World;

/// A Bernoulli draw that tolerates any `probability`: values at or below
/// zero never succeed and values at or above one always do.
pub fn chance<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.random::<f64>() < probability
}

impl World {
    /// Join a new autonomous player and attach an agent to it.
    ///
    /// # Errors
    ///
    /// Whatever [`World::join`] rejects.
    pub fn create_agent(
        &mut self,
        now: u64,
        args: &CreateAgentArgs,
    ) -> Result<(AgentId, PlayerId), CommandError> {
        let player_id = self.join(
            now,
            &JoinArgs {
                name: args.name.clone(),
                character: args.character.clone(),
                description: args.identity.clone(),
                token_identifier: None,
            },
        )?;
        let agent_id = AgentId::new();
        self.agents.insert(
            agent_id,
            Agent {
                id: agent_id,
                player_id,
                identity: args.identity.clone(),
                plan: args.plan.clone(),
                in_progress_operation: None,
                last_conversation: None,
                last_invite_attempt: None,
            },
        );
        info!(agent_id = %agent_id, player_id = %player_id, name = %args.name, "Agent created");
        Ok((agent_id, player_id))
    }

    /// Decide whether an agent needs a new operation.
    ///
    /// A marker older than the action timeout is dropped with a warning.
    /// A running activity is cut short once the player is walking or
    /// talking. An agent that is neither talking nor busy with an activity
    /// dispatches `doSomething`, or `handleInventory` when it carries items
    /// and the inventory draw succeeds; a recent invite keeps a walking
    /// agent from being interrupted.
    pub fn tick_agent(&mut self, agent_id: AgentId, now: u64) {
        let agents = &self.config.agents;
        let (action_timeout, cooldown, inventory_probability) = (
            agents.action_timeout_ms,
            agents.conversation_cooldown_ms,
            agents.inventory_probability,
        );
        let Some(agent) = self.agents.get_mut(&agent_id) else {
            return;
        };
        if let Some(op) = agent.in_progress_operation {
            if now < op.started.saturating_add(action_timeout) {
                return;
            }
            warn!(
                agent_id = %agent_id,
                operation_id = %op.operation_id,
                kind = %op.kind,
                "Operation timed out, clearing"
            );
            agent.in_progress_operation = None;
        }
        let player_id = agent.player_id;
        let recently_invited = agent
            .last_invite_attempt
            .is_some_and(|at| now < at.saturating_add(cooldown));

        let in_conversation = self.player_conversation(player_id).is_some();
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        let mut doing_activity = false;
        if let Some(activity) = player.activity.as_mut() {
            if activity.until > now {
                doing_activity = true;
                if in_conversation || player.pathfinding.is_some() {
                    activity.until = now;
                }
            }
        }
        if in_conversation || doing_activity {
            return;
        }
        if player.pathfinding.is_some() && recently_invited {
            return;
        }
        let kind = if !player.inventory.is_empty() && chance(&mut self.rng, inventory_probability) {
            OperationKind::HandleInventory
        } else {
            OperationKind::DoSomething
        };
        if let Err(err) = self.dispatch(agent_id, kind, now) {
            warn!(agent_id = %agent_id, error = %err, "Failed to dispatch operation");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use township_types::{Activity, InventoryItem, Pathfinding, PathfindingState, Point};

    fn world() -> World {
        let mut config = SimulationConfig::default();
        config.world.width = 12;
        config.world.height = 12;
        World::new(config)
    }

    fn agent(world: &mut World, name: &str) -> (AgentId, PlayerId) {
        world
            .create_agent(
                0,
                &CreateAgentArgs {
                    name: name.to_owned(),
                    character: "f3".to_owned(),
                    identity: format!("{name} likes tea"),
                    plan: "make friends".to_owned(),
                },
            )
            .unwrap()
    }

    #[test]
    fn chance_handles_degenerate_probabilities() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert!((0..100).all(|_| !chance(&mut rng, 0.0)));
        assert!((0..100).all(|_| !chance(&mut rng, -1.0)));
        assert!((0..100).all(|_| chance(&mut rng, 1.0)));
        assert!((0..100).all(|_| !chance(&mut rng, f64::NAN)));
    }

    #[test]
    fn create_agent_joins_a_player() {
        let mut world = world();
        let (agent_id, player_id) = agent(&mut world, "Stella");
        let player = world.player(player_id).unwrap();
        assert!(!player.is_human());
        assert_eq!(world.description(player_id).unwrap().description, "Stella likes tea");
        assert_eq!(world.agent_for_player(player_id).unwrap().id, agent_id);
    }

    #[test]
    fn idle_agents_dispatch() {
        let mut world = world();
        let (agent_id, _) = agent(&mut world, "Lucky");
        world.tick_agent(agent_id, 1_000);
        let marker = world.agent(agent_id).unwrap().in_progress_operation.unwrap();
        assert_eq!(marker.kind, OperationKind::DoSomething);
        assert_eq!(world.scheduled().len(), 1);

        // Busy until the completion or the timeout.
        world.tick_agent(agent_id, 2_000);
        assert_eq!(world.scheduled().len(), 1);
    }

    #[test]
    fn stuck_operations_time_out() {
        let mut world = world();
        let (agent_id, _) = agent(&mut world, "Bob");
        world.tick_agent(agent_id, 0);
        let first = world.agent(agent_id).unwrap().in_progress_operation.unwrap();

        world.tick_agent(agent_id, 119_999);
        assert_eq!(
            world.agent(agent_id).unwrap().in_progress_operation.unwrap().operation_id,
            first.operation_id
        );
        world.tick_agent(agent_id, 120_000);
        let second = world.agent(agent_id).unwrap().in_progress_operation.unwrap();
        assert_ne!(second.operation_id, first.operation_id);
        assert_eq!(second.started, 120_000);
    }

    #[test]
    fn activities_keep_agents_busy() {
        let mut world = world();
        let (agent_id, player_id) = agent(&mut world, "Pete");
        world.players.get_mut(&player_id).unwrap().activity = Some(Activity {
            description: "reading a book".to_owned(),
            emoji: Some("📖".to_owned()),
            until: 60_000,
        });
        world.tick_agent(agent_id, 1_000);
        assert!(!world.agent(agent_id).unwrap().is_busy());

        world.tick_agent(agent_id, 60_000);
        assert!(world.agent(agent_id).unwrap().is_busy());
    }

    #[test]
    fn walking_cuts_activities_short() {
        let mut world = world();
        let (agent_id, player_id) = agent(&mut world, "Kira");
        let player = world.players.get_mut(&player_id).unwrap();
        player.activity = Some(Activity {
            description: "daydreaming".to_owned(),
            emoji: None,
            until: 60_000,
        });
        player.pathfinding = Some(Pathfinding {
            destination: Point::new(1.0, 1.0),
            started: 0,
            state: PathfindingState::NeedsPath,
        });
        world.tick_agent(agent_id, 1_000);
        assert_eq!(world.player(player_id).unwrap().activity.as_ref().unwrap().until, 1_000);
        assert!(!world.agent(agent_id).unwrap().is_busy());

        // The next tick sees an idle agent.
        world.tick_agent(agent_id, 1_016);
        assert!(world.agent(agent_id).unwrap().is_busy());
    }

    #[test]
    fn conversations_keep_agents_quiet() {
        let mut world = world();
        let (agent_id, player_id) = agent(&mut world, "Ada");
        let (_, other) = agent(&mut world, "Grace");
        world.start_conversation(0, player_id, other).unwrap();
        world.tick_agent(agent_id, 1_000);
        assert!(!world.agent(agent_id).unwrap().is_busy());
    }

    #[test]
    fn carried_items_can_trigger_inventory_handling() {
        let mut world = world();
        world.config.agents.inventory_probability = 1.0;
        let (agent_id, player_id) = agent(&mut world, "Mo");
        world.players.get_mut(&player_id).unwrap().inventory.push(InventoryItem {
            name: "lantern".to_owned(),
            image_url: "https://img/lantern".to_owned(),
            created: 0,
        });
        world.tick_agent(agent_id, 1_000);
        let marker = world.agent(agent_id).unwrap().in_progress_operation.unwrap();
        assert_eq!(marker.kind, OperationKind::HandleInventory);
    }
}
