//! A minimal conversation registry.
//!
//! Conversations here only track who is talking to whom. Message exchange
//! and the invite/accept handshake live with an external collaborator; the
//! world needs membership to gate movement and trading, and a `stop` hook
//! so leaving players end their conversations. Conversations also end on
//! their own once they are older than `agents.conversation_max_ms`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use township_types::{ConversationId, PlayerId};
use tracing::{debug, info};

use crate::error::{CommandError, Precondition};
use crate::world::World;

/// Two or more players talking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identity.
    pub id: ConversationId,
    /// Who started it.
    pub creator: PlayerId,
    /// When it started, in milliseconds.
    pub created: u64,
    /// Everyone taking part, creator included.
    pub participants: BTreeSet<PlayerId>,
}

impl World {
    /// The conversation `player_id` is part of, if any.
    pub fn player_conversation(&self, player_id: PlayerId) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|conversation| conversation.participants.contains(&player_id))
    }

    /// Whether two players are in the same conversation.
    pub fn in_same_conversation(&self, a: PlayerId, b: PlayerId) -> bool {
        self.player_conversation(a)
            .is_some_and(|conversation| conversation.participants.contains(&b))
    }

    /// Check that `creator` may start a conversation with `invitee`.
    pub fn check_can_converse(&self, creator: PlayerId, invitee: PlayerId) -> Result<(), CommandError> {
        if creator == invitee {
            return Err(CommandError::InvalidArgument {
                command: "invite".to_owned(),
                message: "a player cannot talk to itself".to_owned(),
            });
        }
        self.require_player(creator)?;
        self.require_player(invitee)?;
        for id in [creator, invitee] {
            if self.player_conversation(id).is_some() {
                return Err(CommandError::precondition(
                    Precondition::InConversation,
                    format!("player {id} is already in a conversation"),
                ));
            }
        }
        Ok(())
    }

    /// Start a conversation between two free players.
    pub fn start_conversation(
        &mut self,
        now: u64,
        creator: PlayerId,
        invitee: PlayerId,
    ) -> Result<ConversationId, CommandError> {
        self.check_can_converse(creator, invitee)?;
        let id = ConversationId::new();
        self.conversations.insert(
            id,
            Conversation {
                id,
                creator,
                created: now,
                participants: BTreeSet::from([creator, invitee]),
            },
        );
        info!(conversation_id = %id, creator = %creator, invitee = %invitee, "Conversation started");
        Ok(id)
    }

    /// End a conversation and stamp `last_conversation` on every
    /// participating agent. Returns `false` if it did not exist.
    pub fn stop_conversation(&mut self, id: ConversationId, now: u64) -> bool {
        let Some(conversation) = self.conversations.remove(&id) else {
            return false;
        };
        for agent in self.agents.values_mut() {
            if conversation.participants.contains(&agent.player_id) {
                agent.last_conversation = Some(now);
            }
        }
        info!(conversation_id = %id, "Conversation stopped");
        true
    }

    /// Stop every conversation that has run for the configured maximum.
    pub fn tick_conversations(&mut self, now: u64) {
        let max = self.config.agents.conversation_max_ms;
        let expired: Vec<ConversationId> = self
            .conversations
            .values()
            .filter(|conversation| now >= conversation.created.saturating_add(max))
            .map(|conversation| conversation.id)
            .collect();
        for id in expired {
            debug!(conversation_id = %id, "Conversation reached its time limit");
            self.stop_conversation(id, now);
        }
    }
}
