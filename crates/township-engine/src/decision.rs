//! Agent decision logic, run by the executor outside the tick loop.
//!
//! A decision looks only at the snapshot taken when the operation was
//! dispatched and produces inputs: optionally some side inputs such as
//! `discoverItem` or `tradeItem`, always followed by the `finishDoSomething`
//! completion that clears the agent's in-flight marker.

use rand::Rng;
use rand::seq::IndexedRandom;
use township_core::config::{AgentsConfig, GenerationConfig};
use township_core::inputs::{
    DiscoverItemArgs, DiscoveredItem, DiscoveryKind, FinishDoSomethingArgs,
    PlaceInventoryItemArgs, TradeItemArgs,
};
use township_core::{BudgetPolicy, BudgetStore, GateDecision, Input, ScheduledOperation, chance, try_acquire};
use township_types::{Activity, Footprint, OperationKind, Player, PlayerId, Point, Tile};
use township_world::geometry::{distance, manhattan_distance};
use township_world::{WorldMap, find_free_placement};
use tracing::{debug, info, warn};

use crate::content::{ContentSource, image_url, resolve_prompt};
use crate::error::EngineError;

/// Collaborators and settings a decision may consult.
#[derive(Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Cooldowns, activity catalog and inventory parameters.
    pub agents: &'a AgentsConfig,
    /// Budget policy, footprint limits and image settings.
    pub generation: &'a GenerationConfig,
    /// Shared generation budget.
    pub budget: &'a dyn BudgetStore,
    /// Prompt source for generated sprites.
    pub content: &'a dyn ContentSource,
}

impl core::fmt::Debug for DecisionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionContext")
            .field("agents", self.agents)
            .field("generation", self.generation)
            .finish_non_exhaustive()
    }
}

/// The inputs an operation resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Submitted first, in order.
    pub inputs: Vec<Input>,
    /// Submitted last.
    pub completion: FinishDoSomethingArgs,
}

impl Decision {
    /// A decision that only completes `op`.
    pub const fn bare(op: &ScheduledOperation) -> Self {
        Self {
            inputs: Vec::new(),
            completion: FinishDoSomethingArgs::bare(op.agent_id, op.operation_id),
        }
    }
}

/// Compute the decision for a dispatched operation.
///
/// # Errors
///
/// Budget store failures while deciding whether to generate.
pub fn decide<R: Rng + ?Sized>(
    op: &ScheduledOperation,
    ctx: &DecisionContext<'_>,
    rng: &mut R,
) -> Result<Decision, EngineError> {
    match op.kind {
        OperationKind::DoSomething => do_something(op, ctx, rng),
        OperationKind::HandleInventory => Ok(handle_inventory(op, ctx, rng)),
    }
}

// ---------------------------------------------------------------------------
// doSomething
// ---------------------------------------------------------------------------

fn do_something<R: Rng + ?Sized>(
    op: &ScheduledOperation,
    ctx: &DecisionContext<'_>,
    rng: &mut R,
) -> Result<Decision, EngineError> {
    let payload = &op.payload;
    let (player, agent, now) = (&payload.player, &payload.agent, payload.now);
    let cooldown = ctx.agents.conversation_cooldown_ms;
    let just_left_conversation = agent
        .last_conversation
        .is_some_and(|at| now < at.saturating_add(cooldown));
    let recently_invited = agent
        .last_invite_attempt
        .is_some_and(|at| now < at.saturating_add(cooldown));
    let recent_activity = player
        .activity
        .as_ref()
        .is_some_and(|activity| now < activity.until.saturating_add(ctx.agents.activity_cooldown_ms));

    let mut decision = Decision::bare(op);
    if player.pathfinding.is_none() {
        let activity = if recent_activity || just_left_conversation {
            None
        } else {
            pick_activity(ctx.agents, now, rng)
        };
        match activity {
            Some(activity) => decision.completion.activity = Some(activity),
            None => decision.completion.destination = Some(wander_destination(&payload.map, rng)),
        }
        return Ok(decision);
    }

    let invitee = if just_left_conversation || recently_invited {
        None
    } else {
        conversation_candidate(player, &payload.other_free_players)
    };

    let policy = BudgetPolicy::from(ctx.generation);
    let draw = rng.random::<f64>();
    if let GateDecision::Approved { next } = try_acquire(ctx.budget, now, &policy, draw)? {
        let kind = if chance(rng, 0.5) {
            DiscoveryKind::Building
        } else {
            DiscoveryKind::Item
        };
        let footprint = discovery_footprint(ctx.generation, kind, rng);
        let anchor = wander_tile(&payload.map, rng);
        let discovery = discover(player.id, kind, anchor, footprint, &payload.map, ctx, rng);
        info!(
            agent_id = %op.agent_id,
            kind = ?kind,
            name = %discovery.item.name,
            bucket = next.bucket,
            window_count = next.window_count,
            "Generation approved"
        );
        decision.inputs.push(Input::DiscoverItem(discovery));
    } else {
        decision.completion.invitee = invitee;
    }
    Ok(decision)
}

/// A random activity from the catalog, starting at `now`.
fn pick_activity<R: Rng + ?Sized>(agents: &AgentsConfig, now: u64, rng: &mut R) -> Option<Activity> {
    let choice = agents.activities.choose(rng)?;
    Some(Activity {
        description: choice.description.clone(),
        emoji: Some(choice.emoji.clone()),
        until: now.saturating_add(choice.duration_ms),
    })
}

/// A random whole-tile point at least one tile away from the map edge.
pub fn wander_destination<R: Rng + ?Sized>(map: &WorldMap, rng: &mut R) -> Point {
    let tile = wander_tile(map, rng);
    Point::new(f64::from(tile.x), f64::from(tile.y))
}

fn wander_tile<R: Rng + ?Sized>(map: &WorldMap, rng: &mut R) -> Tile {
    let mut axis = |size: u32| {
        let offset = rng.random_range(0..size.saturating_sub(2).max(1));
        let coordinate = offset.saturating_add(1).min(size.saturating_sub(1));
        i32::try_from(coordinate).unwrap_or(i32::MAX)
    };
    let x = axis(map.width());
    let y = axis(map.height());
    Tile::new(x, y)
}

/// The nearest free player, if any.
fn conversation_candidate(player: &Player, others: &[Player]) -> Option<PlayerId> {
    others
        .iter()
        .filter(|other| other.id != player.id)
        .min_by(|a, b| {
            distance(player.position, a.position).total_cmp(&distance(player.position, b.position))
        })
        .map(|other| other.id)
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn discovery_footprint<R: Rng + ?Sized>(
    generation: &GenerationConfig,
    kind: DiscoveryKind,
    rng: &mut R,
) -> Footprint {
    match kind {
        DiscoveryKind::Item => Footprint::UNIT,
        DiscoveryKind::Building => {
            let min = generation.building_min.max(1);
            let max = generation.building_max.max(min);
            Footprint::new(rng.random_range(min..=max), rng.random_range(min..=max))
        }
    }
}

/// Build a `discoverItem` for a fresh sprite placed as close to `anchor` as
/// the map allows.
fn discover<R: Rng + ?Sized>(
    player_id: PlayerId,
    kind: DiscoveryKind,
    anchor: Tile,
    footprint: Footprint,
    map: &WorldMap,
    ctx: &DecisionContext<'_>,
    rng: &mut R,
) -> DiscoverItemArgs {
    let name = resolve_prompt(ctx.content, kind);
    let image_url = image_url(ctx.generation, &name, rng.random());
    let placement = find_free_placement(map, anchor, footprint);
    if !placement.free {
        warn!(
            anchor_x = anchor.x,
            anchor_y = anchor.y,
            w = footprint.w,
            h = footprint.h,
            "No free space for discovery, using clamped origin"
        );
    }
    DiscoverItemArgs {
        player_id,
        item: DiscoveredItem { name, image_url },
        place: Some(Point::new(f64::from(placement.tile.x), f64::from(placement.tile.y))),
        kind: Some(kind),
        size: Some(footprint),
    }
}

/// A requested generation area, corners inclusive and in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    /// First corner, x.
    pub x1: i32,
    /// First corner, y.
    pub y1: i32,
    /// Opposite corner, x.
    pub x2: i32,
    /// Opposite corner, y.
    pub y2: i32,
}

impl Area {
    /// Width in tiles.
    pub const fn width(&self) -> u32 {
        self.x1.abs_diff(self.x2).saturating_add(1)
    }

    /// Height in tiles.
    pub const fn height(&self) -> u32 {
        self.y1.abs_diff(self.y2).saturating_add(1)
    }

    /// The corner with the smallest coordinates.
    pub fn top_left(&self) -> Tile {
        Tile::new(self.x1.min(self.x2), self.y1.min(self.y2))
    }

    /// The centre tile, rounded down.
    pub fn center(&self) -> Tile {
        Tile::new(midpoint(self.x1, self.x2), midpoint(self.y1, self.y2))
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    let sum = i64::from(a).saturating_add(i64::from(b));
    i32::try_from(sum.div_euclid(2)).unwrap_or(a)
}

/// Generate a discovery for an explicitly requested area, bypassing the
/// budget gate.
///
/// Buildings cover at least 3x3 tiles anchored at the area's top-left
/// corner; items are 1x1 at its centre. A missing `kind` is drawn 50/50.
///
/// # Errors
///
/// [`EngineError::AreaTooLarge`] when either side exceeds the configured
/// maximum.
pub fn generate_for_area<R: Rng + ?Sized>(
    player_id: PlayerId,
    area: Area,
    kind: Option<DiscoveryKind>,
    map: &WorldMap,
    ctx: &DecisionContext<'_>,
    rng: &mut R,
) -> Result<DiscoverItemArgs, EngineError> {
    let (width, height) = (area.width(), area.height());
    let max = ctx.generation.max_area;
    if width > max || height > max {
        return Err(EngineError::AreaTooLarge { width, height, max });
    }
    let kind = kind.unwrap_or_else(|| {
        if chance(rng, 0.5) {
            DiscoveryKind::Item
        } else {
            DiscoveryKind::Building
        }
    });
    let min = ctx.generation.building_min;
    let (anchor, footprint) = match kind {
        DiscoveryKind::Building => (area.top_left(), Footprint::new(width.max(min), height.max(min))),
        DiscoveryKind::Item => (area.center(), Footprint::UNIT),
    };
    debug!(%player_id, ?kind, w = footprint.w, h = footprint.h, "Generating for area");
    Ok(discover(player_id, kind, anchor, footprint, map, ctx, rng))
}

// ---------------------------------------------------------------------------
// handleInventory
// ---------------------------------------------------------------------------

fn handle_inventory<R: Rng + ?Sized>(
    op: &ScheduledOperation,
    ctx: &DecisionContext<'_>,
    rng: &mut R,
) -> Decision {
    let payload = &op.payload;
    let player = &payload.player;
    let mut decision = Decision::bare(op);
    if player.inventory.is_empty() {
        return decision;
    }
    let item_index = rng.random_range(0..player.inventory.len());

    let nearest = payload
        .other_free_players
        .iter()
        .map(|other| (other, manhattan_distance(player.position, other.position)))
        .min_by(|a, b| a.1.total_cmp(&b.1));
    let partner = nearest
        .filter(|(_, d)| *d <= f64::from(ctx.agents.trade_distance))
        .filter(|_| chance(rng, ctx.agents.trade_probability));

    if let Some((partner, _)) = partner {
        decision.inputs.push(Input::TradeItem(TradeItemArgs {
            from: player.id,
            to: partner.id,
            item_index,
        }));
    } else if let Some(position) = drop_position(&payload.map, player.position, rng) {
        decision.inputs.push(Input::PlaceInventoryItem(PlaceInventoryItemArgs {
            player_id: player.id,
            item_index,
            position,
        }));
    }
    decision
}

/// The player's tile or a neighbour of it, clamped to the map.
fn drop_position<R: Rng + ?Sized>(map: &WorldMap, position: Point, rng: &mut R) -> Option<Point> {
    let tile = map.tile_at(position)?;
    let mut step = || -> i32 {
        if chance(rng, 0.5) {
            0
        } else if chance(rng, 0.5) {
            1
        } else {
            -1
        }
    };
    let last_x = i32::try_from(map.width().saturating_sub(1)).unwrap_or(i32::MAX);
    let last_y = i32::try_from(map.height().saturating_sub(1)).unwrap_or(i32::MAX);
    let x = tile.x.saturating_add(step()).clamp(0, last_x);
    let y = tile.y.saturating_add(step()).clamp(0, last_y);
    Some(Point::new(f64::from(x), f64::from(y)))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::content::CannedContent;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use township_core::inputs::CreateAgentArgs;
    use township_core::{GenerationBudget, InMemoryBudgetStore, SimulationConfig, World};
    use township_types::{InventoryItem, Pathfinding, PathfindingState, Vector};

    struct Fixture {
        config: SimulationConfig,
        budget: InMemoryBudgetStore,
        content: CannedContent,
    }

    impl Fixture {
        fn new() -> Self {
            let mut config = SimulationConfig::default();
            config.world.width = 12;
            config.world.height = 12;
            Self {
                config,
                budget: InMemoryBudgetStore::default(),
                content: CannedContent::new(),
            }
        }

        fn ready_budget(mut self) -> Self {
            self.config.generation.probability = 1.0;
            self.budget = InMemoryBudgetStore::new(GenerationBudget {
                bucket: 1,
                ..GenerationBudget::default()
            });
            self
        }

        fn ctx(&self) -> DecisionContext<'_> {
            DecisionContext {
                agents: &self.config.agents,
                generation: &self.config.generation,
                budget: &self.budget,
                content: &self.content,
            }
        }

        fn operation(&self, kind: OperationKind, now: u64) -> ScheduledOperation {
            let mut world = World::new(self.config.clone());
            let (agent_id, _) = world
                .create_agent(
                    0,
                    &CreateAgentArgs {
                        name: "Kurt".to_owned(),
                        character: "f2".to_owned(),
                        identity: "a tinkerer".to_owned(),
                        plan: "build things".to_owned(),
                    },
                )
                .unwrap();
            world.dispatch(agent_id, kind, now).unwrap();
            world.take_scheduled().remove(0)
        }
    }

    fn walking(op: &mut ScheduledOperation) {
        op.payload.player.pathfinding = Some(Pathfinding {
            destination: Point::new(1.0, 1.0),
            started: 0,
            state: PathfindingState::NeedsPath,
        });
    }

    fn other_at(x: f64, y: f64) -> Player {
        Player::new(PlayerId::new(), Point::new(x, y), Vector::new(0.0, 1.0), 0)
    }

    fn item(name: &str) -> InventoryItem {
        InventoryItem {
            name: name.to_owned(),
            image_url: format!("https://img/{name}"),
            created: 0,
        }
    }

    #[test]
    fn idle_agents_start_an_activity() {
        let fixture = Fixture::new();
        let op = fixture.operation(OperationKind::DoSomething, 5_000);
        let mut rng = SmallRng::seed_from_u64(1);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        assert!(decision.inputs.is_empty());
        let activity = decision.completion.activity.unwrap();
        assert_eq!(activity.until, 65_000);
        assert!(["reading a book", "daydreaming", "gardening"].contains(&activity.description.as_str()));
        assert!(decision.completion.destination.is_none());
    }

    #[test]
    fn recent_activity_means_wandering() {
        let fixture = Fixture::new();
        let mut op = fixture.operation(OperationKind::DoSomething, 20_000);
        op.payload.player.activity = Some(Activity {
            description: "gardening".to_owned(),
            emoji: None,
            until: 15_000,
        });
        let mut rng = SmallRng::seed_from_u64(2);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        let destination = decision.completion.destination.unwrap();
        assert!((1.0..=10.0).contains(&destination.x));
        assert!((1.0..=10.0).contains(&destination.y));
        assert_eq!(destination.x.fract(), 0.0);
        assert!(decision.completion.activity.is_none());
    }

    #[test]
    fn leaving_a_conversation_means_wandering() {
        let fixture = Fixture::new();
        let mut op = fixture.operation(OperationKind::DoSomething, 20_000);
        op.payload.agent.last_conversation = Some(10_000);
        let mut rng = SmallRng::seed_from_u64(3);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        assert!(decision.completion.destination.is_some());
    }

    #[test]
    fn walking_agents_invite_the_nearest_free_player() {
        let fixture = Fixture::new();
        let mut op = fixture.operation(OperationKind::DoSomething, 50_000);
        walking(&mut op);
        op.payload.player.position = Point::new(5.0, 5.0);
        let far = other_at(10.0, 10.0);
        let near = other_at(6.0, 5.0);
        op.payload.other_free_players = vec![far, near.clone()];
        let mut rng = SmallRng::seed_from_u64(4);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        assert_eq!(decision.completion.invitee, Some(near.id));
        assert!(decision.inputs.is_empty());
    }

    #[test]
    fn recent_invites_suppress_new_ones() {
        let fixture = Fixture::new();
        let mut op = fixture.operation(OperationKind::DoSomething, 50_000);
        walking(&mut op);
        op.payload.agent.last_invite_attempt = Some(40_000);
        op.payload.other_free_players = vec![other_at(1.0, 1.0)];
        let mut rng = SmallRng::seed_from_u64(5);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        assert!(decision.completion.invitee.is_none());
    }

    #[test]
    fn approved_generation_places_a_discovery() {
        let fixture = Fixture::new().ready_budget();
        let mut op = fixture.operation(OperationKind::DoSomething, 50_000);
        walking(&mut op);
        op.payload.other_free_players = vec![other_at(1.0, 1.0)];
        let mut rng = SmallRng::seed_from_u64(6);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();

        assert!(decision.completion.invitee.is_none());
        let Input::DiscoverItem(discovery) = &decision.inputs[0] else {
            panic!("expected a discovery");
        };
        let size = discovery.size.unwrap();
        match discovery.kind.unwrap() {
            DiscoveryKind::Item => assert_eq!(size, Footprint::UNIT),
            DiscoveryKind::Building => {
                assert!((3..=6).contains(&size.w) && (3..=6).contains(&size.h));
            }
        }
        let place = discovery.place.unwrap();
        assert!(place.x + f64::from(size.w) <= 12.0);
        assert!(discovery.item.image_url.contains("model=flux"));

        let budget = fixture.budget.load().unwrap().value;
        assert_eq!(budget.last_generation_bucket, 1);
        assert_eq!(budget.window_count, 1);

        // The bucket is spent until the scheduler advances it.
        let second = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        assert!(second.inputs.is_empty());
    }

    #[test]
    fn empty_inventories_just_complete() {
        let fixture = Fixture::new();
        let op = fixture.operation(OperationKind::HandleInventory, 0);
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(decide(&op, &fixture.ctx(), &mut rng).unwrap(), Decision::bare(&op));
    }

    #[test]
    fn nearby_partners_receive_items() {
        let mut fixture = Fixture::new();
        fixture.config.agents.trade_probability = 1.0;
        let mut op = fixture.operation(OperationKind::HandleInventory, 0);
        op.payload.player.position = Point::new(4.0, 4.0);
        op.payload.player.inventory = vec![item("lantern"), item("compass")];
        let partner = other_at(5.0, 5.0);
        op.payload.other_free_players = vec![other_at(11.0, 11.0), partner.clone()];
        let mut rng = SmallRng::seed_from_u64(8);
        let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
        let Input::TradeItem(trade) = &decision.inputs[0] else {
            panic!("expected a trade");
        };
        assert_eq!(trade.to, partner.id);
        assert!(trade.item_index < 2);
    }

    #[test]
    fn lonely_agents_drop_items_nearby() {
        let fixture = Fixture::new();
        let mut op = fixture.operation(OperationKind::HandleInventory, 0);
        op.payload.player.position = Point::new(0.0, 11.0);
        op.payload.player.inventory = vec![item("apple")];
        op.payload.other_free_players = vec![other_at(8.0, 2.0)];
        for seed in 0..20 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let decision = decide(&op, &fixture.ctx(), &mut rng).unwrap();
            let Input::PlaceInventoryItem(drop) = &decision.inputs[0] else {
                panic!("expected a drop");
            };
            assert_eq!(drop.item_index, 0);
            assert!((0.0..=1.0).contains(&drop.position.x));
            assert!((10.0..=11.0).contains(&drop.position.y));
        }
    }

    #[test]
    fn areas_are_bounded() {
        let fixture = Fixture::new();
        let map = WorldMap::new(12, 12, 32);
        let mut rng = SmallRng::seed_from_u64(9);
        let area = Area { x1: 0, y1: 0, x2: 6, y2: 2 };
        let err = generate_for_area(PlayerId::new(), area, None, &map, &fixture.ctx(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::AreaTooLarge { width: 7, height: 3, max: 6 }));
    }

    #[test]
    fn area_buildings_grow_to_the_minimum() {
        let fixture = Fixture::new();
        let map = WorldMap::new(12, 12, 32);
        let mut rng = SmallRng::seed_from_u64(10);
        let area = Area { x1: 5, y1: 4, x2: 4, y2: 5 };
        let building = generate_for_area(
            PlayerId::new(),
            area,
            Some(DiscoveryKind::Building),
            &map,
            &fixture.ctx(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(building.size, Some(Footprint::new(3, 3)));
        assert_eq!(building.place, Some(Point::new(4.0, 4.0)));

        let item = generate_for_area(
            PlayerId::new(),
            Area { x1: 2, y1: 2, x2: 5, y2: 3 },
            Some(DiscoveryKind::Item),
            &map,
            &fixture.ctx(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(item.size, Some(Footprint::UNIT));
        assert_eq!(item.place, Some(Point::new(3.0, 2.0)));
    }
}
