//! Building, trading and emoting commands.
//!
//! Every handler checks all of its preconditions against an immutable view
//! of the world first and only then writes, so a rejected command changes
//! nothing. Map edits set the "descriptions modified" flag so the
//! persistence collaborator picks up the new layout.

use township_types::{Activity, Footprint, InventoryItem, Player, PlayerId, Point, Tile};
use township_world::geometry::manhattan_distance;
use tracing::{debug, info};

use crate::error::{CommandError, Precondition};
use crate::inputs::{
    DiscoverItemArgs, DiscoveryKind, EmoteArgs, PlaceInventoryItemArgs, PlaceObjectArgs,
    TradeCoinsArgs, TradeItemArgs,
};
use crate::world::World;

const BUILD_ACTIVITY: &str = "build";
const EXPLORE_ACTIVITY: &str = "explore";
const EMOTE_ACTIVITY: &str = "emote";

impl World {
    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, CommandError> {
        self.players
            .get_mut(&id)
            .ok_or_else(|| CommandError::not_found("player", id))
    }

    fn require_tile(&self, position: Point) -> Result<Tile, CommandError> {
        self.map.tile_at(position).ok_or_else(|| {
            CommandError::precondition(
                Precondition::OutOfBounds,
                format!("({}, {}) is outside the map", position.x, position.y),
            )
        })
    }

    fn require_within_reach(&self, player: &Player, tile: Tile) -> Result<(), CommandError> {
        let limit = f64::from(self.config.interaction.build_distance);
        let distance = manhattan_distance(player.position, Point::from(tile));
        if distance > limit {
            return Err(CommandError::precondition(
                Precondition::TooFar,
                format!("tile ({}, {}) is {distance} tiles away, limit {limit}", tile.x, tile.y),
            ));
        }
        Ok(())
    }

    /// Whether two players may trade: close enough or talking to each other.
    pub fn can_trade(&self, a: &Player, b: &Player) -> bool {
        let limit = f64::from(self.config.interaction.trade_distance);
        manhattan_distance(a.position, b.position) <= limit || self.in_same_conversation(a.id, b.id)
    }

    fn require_nearby(&self, from: PlayerId, to: PlayerId) -> Result<(), CommandError> {
        let a = self.require_player(from)?;
        let b = self.require_player(to)?;
        if !self.can_trade(a, b) {
            return Err(CommandError::precondition(
                Precondition::NotNearby,
                format!("players {from} and {to} are too far apart to trade"),
            ));
        }
        Ok(())
    }

    fn activity_for(&self, now: u64, description: &str) -> Activity {
        Activity {
            description: description.to_owned(),
            emoji: None,
            until: now.saturating_add(self.config.interaction.activity_duration_ms),
        }
    }

    // -------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------

    /// Write an object tile within build distance of the player.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown player, `OutOfBounds`, `TooFar`, or
    /// `InvalidArgument` for a layer beyond the supported range.
    pub fn place_object(&mut self, now: u64, args: &PlaceObjectArgs) -> Result<(), CommandError> {
        let player = self.require_player(args.player_id)?;
        let tile = self.require_tile(args.position)?;
        let layer = args.layer.unwrap_or_default();
        self.map.check_object_tile(layer, tile)?;
        self.require_within_reach(player, tile)?;

        self.map.set_object_tile(layer, tile, args.tile_index)?;
        self.descriptions_modified = true;
        let activity = self.activity_for(now, BUILD_ACTIVITY);
        self.player_mut(args.player_id)?.activity = Some(activity);
        info!(player_id = %args.player_id, x = tile.x, y = tile.y, layer, "Object placed");
        Ok(())
    }

    /// Drop one inventory item onto a nearby tile as a 1x1 sprite.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidItem` for an out-of-range index, `OutOfBounds`
    /// or `TooFar`.
    pub fn place_inventory_item(
        &mut self,
        now: u64,
        args: &PlaceInventoryItemArgs,
    ) -> Result<(), CommandError> {
        let player = self.require_player(args.player_id)?;
        let Some(item) = player.inventory.get(args.item_index) else {
            return Err(CommandError::precondition(
                Precondition::InvalidItem,
                format!("player has no item at index {}", args.item_index),
            ));
        };
        let tile = self.require_tile(args.position)?;
        self.require_within_reach(player, tile)?;
        let sheet = item.image_url.clone();

        self.map.place_sprite(tile, Footprint::UNIT, &sheet)?;
        self.descriptions_modified = true;
        let activity = self.activity_for(now, BUILD_ACTIVITY);
        let player = self.player_mut(args.player_id)?;
        let item = player.inventory.remove(args.item_index);
        player.activity = Some(activity);
        info!(player_id = %args.player_id, item = %item.name, x = tile.x, y = tile.y, "Inventory item placed");
        Ok(())
    }

    /// Give a player a newly generated item and optionally place it.
    ///
    /// # Errors
    ///
    /// `NotFound` or `OutOfBounds` for a placement outside the map.
    pub fn discover_item(&mut self, now: u64, args: &DiscoverItemArgs) -> Result<(), CommandError> {
        self.require_player(args.player_id)?;
        if let Some(size) = args.size {
            self.check_discovery_size(size)?;
        }
        let place = args.place.map(|p| self.require_tile(p)).transpose()?;
        let kind = args.kind.unwrap_or_default();

        if let Some(tile) = place {
            let footprint = args.size.unwrap_or_default();
            self.map.place_sprite(tile, footprint, &args.item.image_url)?;
            self.descriptions_modified = true;
        }
        let description = match kind {
            DiscoveryKind::Building => BUILD_ACTIVITY,
            DiscoveryKind::Item => EXPLORE_ACTIVITY,
        };
        let activity = self.activity_for(now, description);
        let player = self.player_mut(args.player_id)?;
        player.inventory.push(InventoryItem {
            name: args.item.name.clone(),
            image_url: args.item.image_url.clone(),
            created: now,
        });
        player.activity = Some(activity);
        info!(
            player_id = %args.player_id,
            item = %args.item.name,
            kind = ?kind,
            placed = place.is_some(),
            "Item discovered"
        );
        Ok(())
    }

    /// Footprints need a tile on each side and may not exceed the largest
    /// generated building or area.
    fn check_discovery_size(&self, size: Footprint) -> Result<(), CommandError> {
        let generation = &self.config.generation;
        let max = generation.building_max.max(generation.max_area);
        if size.w == 0 || size.h == 0 || size.w > max || size.h > max {
            return Err(CommandError::InvalidArgument {
                command: "discoverItem".to_owned(),
                message: format!("size {}x{} must be between 1 and {max} per side", size.w, size.h),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Trading
    // -------------------------------------------------------------------

    /// Move coins between two players.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for a non-positive amount, `NotFound`,
    /// `InsufficientResource` when the sender cannot afford it, `NotNearby`.
    pub fn trade_coins(&mut self, args: &TradeCoinsArgs) -> Result<(), CommandError> {
        let amount = u64::try_from(args.amount)
            .ok()
            .filter(|&amount| amount > 0)
            .ok_or_else(|| {
                CommandError::precondition(
                    Precondition::InvalidAmount,
                    format!("cannot trade {} coins", args.amount),
                )
            })?;
        let sender = self.require_player(args.from)?;
        self.require_player(args.to)?;
        if sender.coins < amount {
            return Err(CommandError::precondition(
                Precondition::InsufficientResource,
                format!("player has {} coins, needs {amount}", sender.coins),
            ));
        }
        self.require_nearby(args.from, args.to)?;

        if args.from == args.to {
            return Ok(());
        }
        let sender = self.player_mut(args.from)?;
        sender.coins = sender.coins.saturating_sub(amount);
        let receiver = self.player_mut(args.to)?;
        receiver.coins = receiver.coins.saturating_add(amount);
        info!(from = %args.from, to = %args.to, amount, "Coins traded");
        Ok(())
    }

    /// Move one inventory item between two players.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidItem` for an out-of-range index, `NotNearby`.
    pub fn trade_item(&mut self, args: &TradeItemArgs) -> Result<(), CommandError> {
        let sender = self.require_player(args.from)?;
        self.require_player(args.to)?;
        if args.item_index >= sender.inventory.len() {
            return Err(CommandError::precondition(
                Precondition::InvalidItem,
                format!("player has no item at index {}", args.item_index),
            ));
        }
        self.require_nearby(args.from, args.to)?;

        if args.from == args.to {
            return Ok(());
        }
        let item = self.player_mut(args.from)?.inventory.remove(args.item_index);
        info!(from = %args.from, to = %args.to, item = %item.name, "Item traded");
        self.player_mut(args.to)?.inventory.push(item);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Emotes
    // -------------------------------------------------------------------

    /// Show an emoji above a player for at least the configured minimum.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown player.
    pub fn emote(&mut self, now: u64, args: &EmoteArgs) -> Result<(), CommandError> {
        let duration = args.duration_ms.max(self.config.interaction.emote_min_ms);
        let player = self.player_mut(args.player_id)?;
        player.activity = Some(Activity {
            description: EMOTE_ACTIVITY.to_owned(),
            emoji: Some(args.emoji.clone()),
            until: now.saturating_add(duration),
        });
        debug!(player_id = %args.player_id, emoji = %args.emoji, duration, "Emote");
        Ok(())
    }
}
