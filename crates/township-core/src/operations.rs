//! The agent-operation bridge.
//!
//! Slow decisions never run inside a tick. Instead an agent dispatches an
//! operation: the world records a single in-flight marker carrying a fresh
//! [`OperationId`] and queues a [`ScheduledOperation`] holding a snapshot of
//! everything the decision needs. The engine drains that outbox after each
//! step and hands the snapshots to the out-of-band executor, which answers
//! with an ordinary `finishDoSomething` input echoing the id.
//!
//! A completion whose id does not match the in-flight marker (the agent
//! timed out, left, or already completed) is ignored, so completing twice
//! is harmless.

use serde::Serialize;
use township_types::{Agent, AgentId, InProgressOperation, OperationId, OperationKind, Player};
use township_world::WorldMap;
use tracing::{debug, info};

use crate::error::{CommandError, Precondition};
use crate::inputs::FinishDoSomethingArgs;
use crate::world::World;

/// Everything a decision may look at, copied at dispatch time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPayload {
    /// The agent's player.
    pub player: Player,
    /// The agent itself, marker included.
    pub agent: Agent,
    /// Other players that are not in a conversation.
    pub other_free_players: Vec<Player>,
    /// The map, for wander targets and free-space searches.
    pub map: WorldMap,
    /// Dispatch time in milliseconds.
    pub now: u64,
}

/// An operation waiting to be handed to the executor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledOperation {
    /// What to compute.
    pub kind: OperationKind,
    /// Correlation id the completion must echo.
    pub operation_id: OperationId,
    /// The requesting agent.
    pub agent_id: AgentId,
    /// Snapshot taken at dispatch.
    pub payload: OperationPayload,
}

impl World {
    /// Start an out-of-band operation for an agent.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown agent or player and
    /// [`Precondition::OperationInFlight`] when the agent is already
    /// waiting on an operation.
    pub fn dispatch(
        &mut self,
        agent_id: AgentId,
        kind: OperationKind,
        now: u64,
    ) -> Result<OperationId, CommandError> {
        let agent = self.require_agent(agent_id)?;
        if let Some(op) = &agent.in_progress_operation {
            return Err(CommandError::precondition(
                Precondition::OperationInFlight,
                format!("agent {agent_id} is still waiting on {}", op.operation_id),
            ));
        }
        let player = self.require_player(agent.player_id)?.clone();
        let other_free_players = self
            .players
            .values()
            .filter(|other| other.id != player.id && self.player_conversation(other.id).is_none())
            .cloned()
            .collect();

        let operation_id = OperationId::new();
        let marker = InProgressOperation {
            kind,
            operation_id,
            started: now,
        };
        let Some(agent) = self.agents.get_mut(&agent_id) else {
            return Err(CommandError::not_found("agent", agent_id));
        };
        agent.in_progress_operation = Some(marker);
        let agent = agent.clone();

        self.scheduled.push(ScheduledOperation {
            kind,
            operation_id,
            agent_id,
            payload: OperationPayload {
                player,
                agent,
                other_free_players,
                map: self.map.clone(),
                now,
            },
        });
        info!(agent_id = %agent_id, operation_id = %operation_id, %kind, "Operation dispatched");
        Ok(operation_id)
    }

    /// Apply an operation's result.
    ///
    /// Returns `Ok(false)` without touching anything when the operation is
    /// no longer in flight.
    ///
    /// # Errors
    ///
    /// Rejects results that cannot be applied: an invalid destination, an
    /// invitee that cannot talk, or both at once. The marker stays in place
    /// so the executor can retry with an empty result.
    pub fn finish_do_something(
        &mut self,
        now: u64,
        args: &FinishDoSomethingArgs,
    ) -> Result<bool, CommandError> {
        let Some(agent) = self.agents.get(&args.agent_id) else {
            debug!(agent_id = %args.agent_id, "Completion for a departed agent");
            return Ok(false);
        };
        let in_flight = agent.in_progress_operation.map(|op| op.operation_id);
        if in_flight != Some(args.operation_id) {
            debug!(
                agent_id = %args.agent_id,
                operation_id = %args.operation_id,
                "Ignoring stale operation completion"
            );
            return Ok(false);
        }
        let player_id = agent.player_id;

        if args.destination.is_some() && args.invitee.is_some() {
            return Err(CommandError::precondition(
                Precondition::InConversation,
                "cannot walk away while starting a conversation",
            ));
        }
        if let Some(invitee) = args.invitee {
            self.check_can_converse(player_id, invitee)?;
        }
        let needs_move = match args.destination {
            Some(destination) => self.check_destination(player_id, destination)?,
            None => false,
        };

        if let Some(agent) = self.agents.get_mut(&args.agent_id) {
            agent.in_progress_operation = None;
        }
        if let Some(invitee) = args.invitee {
            self.start_conversation(now, player_id, invitee)?;
            if let Some(agent) = self.agents.get_mut(&args.agent_id) {
                agent.last_invite_attempt = Some(now);
            }
        }
        if needs_move {
            self.move_player(player_id, now, args.destination)?;
        }
        if let Some(activity) = &args.activity {
            if let Some(player) = self.players.get_mut(&player_id) {
                player.activity = Some(activity.clone());
            }
        }
        info!(
            agent_id = %args.agent_id,
            operation_id = %args.operation_id,
            moved = needs_move,
            invited = args.invitee.is_some(),
            activity = args.activity.as_ref().map(|a| a.description.as_str()),
            "Operation completed"
        );
        Ok(true)
    }
}
