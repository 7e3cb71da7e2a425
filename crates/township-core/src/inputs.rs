//! Named, schema-checked inputs: the only way to mutate a [`World`].
//!
//! An input arrives as a command name plus a JSON argument object. Parsing
//! maps the name to one [`Input`] variant and deserializes the arguments
//! into that variant's typed struct; unknown names and malformed arguments
//! fail before any handler runs. Handlers validate every precondition
//! before their first write, so a rejected input leaves the world exactly
//! as it was.
//!
//! Argument field names are camelCase and unknown fields are rejected;
//! together with the command names they form the wire contract shared with
//! clients and the operation executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use township_types::{Activity, AgentId, Footprint, OperationId, PlayerId, Point};

use crate::error::CommandError;
use crate::world::World;

// ---------------------------------------------------------------------------
// Argument schemas
// ---------------------------------------------------------------------------

/// Arguments of `join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinArgs {
    /// Display name.
    pub name: String,
    /// Character name or asset path.
    pub character: String,
    /// Free-form description.
    pub description: String,
    /// Ownership token of the joining human; absent for autonomous players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_identifier: Option<String>,
}

/// Arguments of `leave`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeaveArgs {
    /// The departing player.
    pub player_id: PlayerId,
}

/// Arguments of `moveTo`. A `null` destination stops the player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MoveToArgs {
    /// The moving player.
    pub player_id: PlayerId,
    /// Whole-tile destination, or `null` to stop.
    pub destination: Option<Point>,
}

/// Arguments of `placeObject`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaceObjectArgs {
    /// The building player.
    pub player_id: PlayerId,
    /// Target position; floored to a tile.
    pub position: Point,
    /// Object tile index to write.
    pub tile_index: i32,
    /// Object layer, 0 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<usize>,
}

/// Arguments of `placeInventoryItem`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaceInventoryItemArgs {
    /// The player dropping the item.
    pub player_id: PlayerId,
    /// Index into the player's inventory.
    pub item_index: usize,
    /// Target position; floored to a tile.
    pub position: Point,
}

/// Whether a discovery is a small item or a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryKind {
    /// A 1x1 item.
    #[default]
    Item,
    /// A multi-tile building.
    Building,
}

/// A newly generated item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiscoveredItem {
    /// Item name (the English generation prompt).
    pub name: String,
    /// Sprite sheet URL.
    pub image_url: String,
}

/// Arguments of `discoverItem`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiscoverItemArgs {
    /// The discovering player.
    pub player_id: PlayerId,
    /// The item added to the player's inventory.
    pub item: DiscoveredItem,
    /// Where to also place the item on the map, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Point>,
    /// Item or building; item when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DiscoveryKind>,
    /// Footprint of the placed sprite; 1x1 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Footprint>,
}

/// Arguments of `tradeCoins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TradeCoinsArgs {
    /// Paying player.
    pub from: PlayerId,
    /// Receiving player.
    pub to: PlayerId,
    /// Coins to transfer; must be positive.
    pub amount: i64,
}

/// Arguments of `tradeItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TradeItemArgs {
    /// Giving player.
    pub from: PlayerId,
    /// Receiving player.
    pub to: PlayerId,
    /// Index into the giver's inventory.
    pub item_index: usize,
}

/// Arguments of `emote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmoteArgs {
    /// The emoting player.
    pub player_id: PlayerId,
    /// Emoji to show.
    pub emoji: String,
    /// Requested duration; short values are raised to the configured floor.
    pub duration_ms: u64,
}

/// Arguments of `createAgent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAgentArgs {
    /// Display name.
    pub name: String,
    /// Character name or asset path.
    pub character: String,
    /// Who the agent is; also used as the player description.
    pub identity: String,
    /// What the agent is up to.
    pub plan: String,
}

/// Arguments of `finishDoSomething`, the completion of an agent operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FinishDoSomethingArgs {
    /// Correlation id handed out at dispatch.
    pub operation_id: OperationId,
    /// The agent the operation belongs to.
    pub agent_id: AgentId,
    /// Walk here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Point>,
    /// Start a conversation with this player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee: Option<PlayerId>,
    /// Start this activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

impl FinishDoSomethingArgs {
    /// A completion that only clears the in-flight marker.
    pub const fn bare(agent_id: AgentId, operation_id: OperationId) -> Self {
        Self {
            operation_id,
            agent_id,
            destination: None,
            invitee: None,
            activity: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A parsed input, one variant per command.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Add a player to the world.
    Join(JoinArgs),
    /// Remove a player, ending its conversation.
    Leave(LeaveArgs),
    /// Set or clear a player's movement intent.
    MoveTo(MoveToArgs),
    /// Write an object tile near the player.
    PlaceObject(PlaceObjectArgs),
    /// Drop an inventory item onto the map.
    PlaceInventoryItem(PlaceInventoryItemArgs),
    /// Add a generated item to a player, optionally placing it.
    DiscoverItem(DiscoverItemArgs),
    /// Transfer coins between players.
    TradeCoins(TradeCoinsArgs),
    /// Transfer an inventory item between players.
    TradeItem(TradeItemArgs),
    /// Show an emoji above a player.
    Emote(EmoteArgs),
    /// Join a new autonomous player and attach an agent to it.
    CreateAgent(CreateAgentArgs),
    /// Complete an agent operation.
    FinishDoSomething(FinishDoSomethingArgs),
}

/// What a successfully applied input produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InputOutcome {
    /// Applied; nothing to report.
    Done,
    /// A completion whose operation id no longer matched; nothing changed.
    Ignored,
    /// A player joined.
    #[serde(rename_all = "camelCase")]
    Joined {
        /// The new player.
        player_id: PlayerId,
    },
    /// An agent was created together with its player.
    #[serde(rename_all = "camelCase")]
    AgentCreated {
        /// The new agent.
        agent_id: AgentId,
        /// The player it drives.
        player_id: PlayerId,
    },
}

fn parse_args<T: serde::de::DeserializeOwned>(command: &str, args: Value) -> Result<T, CommandError> {
    serde_json::from_value(args).map_err(|e| CommandError::InvalidArgument {
        command: command.to_owned(),
        message: e.to_string(),
    })
}

impl Input {
    /// Parse a named command and its JSON arguments.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownCommand`] for an unknown name and
    /// [`CommandError::InvalidArgument`] when the arguments do not match
    /// the command's schema.
    pub fn parse(name: &str, args: Value) -> Result<Self, CommandError> {
        let input = match name {
            "join" => Self::Join(parse_args(name, args)?),
            "leave" => Self::Leave(parse_args(name, args)?),
            "moveTo" => Self::MoveTo(parse_args(name, args)?),
            "placeObject" => Self::PlaceObject(parse_args(name, args)?),
            "placeInventoryItem" => Self::PlaceInventoryItem(parse_args(name, args)?),
            "discoverItem" => Self::DiscoverItem(parse_args(name, args)?),
            "tradeCoins" => Self::TradeCoins(parse_args(name, args)?),
            "tradeItem" => Self::TradeItem(parse_args(name, args)?),
            "emote" => Self::Emote(parse_args(name, args)?),
            "createAgent" => Self::CreateAgent(parse_args(name, args)?),
            "finishDoSomething" => Self::FinishDoSomething(parse_args(name, args)?),
            _ => {
                return Err(CommandError::UnknownCommand {
                    name: name.to_owned(),
                });
            }
        };
        Ok(input)
    }

    /// The wire name of this command.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::MoveTo(_) => "moveTo",
            Self::PlaceObject(_) => "placeObject",
            Self::PlaceInventoryItem(_) => "placeInventoryItem",
            Self::DiscoverItem(_) => "discoverItem",
            Self::TradeCoins(_) => "tradeCoins",
            Self::TradeItem(_) => "tradeItem",
            Self::Emote(_) => "emote",
            Self::CreateAgent(_) => "createAgent",
            Self::FinishDoSomething(_) => "finishDoSomething",
        }
    }

    /// The player acting through this input, whose `last_input` is
    /// refreshed when it succeeds.
    pub const fn actor(&self) -> Option<PlayerId> {
        match self {
            Self::MoveTo(args) => Some(args.player_id),
            Self::PlaceObject(args) => Some(args.player_id),
            Self::PlaceInventoryItem(args) => Some(args.player_id),
            Self::DiscoverItem(args) => Some(args.player_id),
            Self::TradeCoins(args) => Some(args.from),
            Self::TradeItem(args) => Some(args.from),
            Self::Emote(args) => Some(args.player_id),
            Self::Join(_) | Self::Leave(_) | Self::CreateAgent(_) | Self::FinishDoSomething(_) => None,
        }
    }
}

impl World {
    /// Parse and apply a named command at simulated time `now`.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`]; the world is unchanged when one is returned.
    pub fn apply(&mut self, now: u64, name: &str, args: Value) -> Result<InputOutcome, CommandError> {
        let input = Input::parse(name, args)?;
        self.apply_input(now, input)
    }

    /// Apply an already parsed input at simulated time `now`.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`]; the world is unchanged when one is returned.
    pub fn apply_input(&mut self, now: u64, input: Input) -> Result<InputOutcome, CommandError> {
        let actor = input.actor();
        let outcome = match input {
            Input::Join(args) => {
                let player_id = self.join(now, &args)?;
                InputOutcome::Joined { player_id }
            }
            Input::Leave(args) => {
                self.require_player(args.player_id)?;
                self.leave(args.player_id, now);
                InputOutcome::Done
            }
            Input::MoveTo(args) => {
                self.move_player(args.player_id, now, args.destination)?;
                InputOutcome::Done
            }
            Input::PlaceObject(args) => {
                self.place_object(now, &args)?;
                InputOutcome::Done
            }
            Input::PlaceInventoryItem(args) => {
                self.place_inventory_item(now, &args)?;
                InputOutcome::Done
            }
            Input::DiscoverItem(args) => {
                self.discover_item(now, &args)?;
                InputOutcome::Done
            }
            Input::TradeCoins(args) => {
                self.trade_coins(&args)?;
                InputOutcome::Done
            }
            Input::TradeItem(args) => {
                self.trade_item(&args)?;
                InputOutcome::Done
            }
            Input::Emote(args) => {
                self.emote(now, &args)?;
                InputOutcome::Done
            }
            Input::CreateAgent(args) => {
                let (agent_id, player_id) = self.create_agent(now, &args)?;
                InputOutcome::AgentCreated {
                    agent_id,
                    player_id,
                }
            }
            Input::FinishDoSomething(args) => {
                if self.finish_do_something(now, &args)? {
                    InputOutcome::Done
                } else {
                    InputOutcome::Ignored
                }
            }
        };
        if let Some(player) = actor.and_then(|id| self.players.get_mut(&id)) {
            player.last_input = now;
        }
        Ok(outcome)
    }
}
