//! End-to-end scenarios driving the world through named inputs and steps.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::float_cmp,
    clippy::panic
)]

use std::collections::BTreeSet;

use serde_json::json;
use township_core::inputs::{CreateAgentArgs, FinishDoSomethingArgs};
use township_core::{CommandError, Game, Input, InputOutcome, Precondition, SimulationConfig, World};
use township_types::{AgentId, Footprint, Player, PlayerDescription, PlayerId, Point, Tile, Vector};
use township_world::find_free_placement;

fn small_world(size: u32) -> World {
    let mut config = SimulationConfig::default();
    config.world.width = size;
    config.world.height = size;
    World::new(config)
}

fn put_player(world: &mut World, x: f64, y: f64) -> PlayerId {
    let id = PlayerId::new();
    world.insert_player(
        Player::new(id, Point::new(x, y), Vector::new(0.0, 1.0), 0),
        PlayerDescription {
            player_id: id,
            name: format!("player at {x},{y}"),
            character: "f6".to_owned(),
            description: String::new(),
        },
    )
}

#[test]
fn walking_across_an_empty_map() {
    let mut game = Game::new(small_world(10));
    let walker = put_player(game.world_mut(), 2.0, 2.0);
    let input = Input::parse(
        "moveTo",
        json!({ "playerId": walker, "destination": { "x": 8.0, "y": 2.0 } }),
    )
    .unwrap();
    game.submit(input, 0);

    let mut last_x = 2.0;
    for second in 0..=12_u64 {
        let summary = game.run_step(second * 1_000).unwrap();
        assert!(summary.results.iter().all(|r| r.result.is_ok()));
        let position = game.world().player(walker).unwrap().position;
        assert!(position.x >= last_x, "walked backwards: {} < {last_x}", position.x);
        assert_eq!(position.y, 2.0);
        last_x = position.x;
    }

    let player = game.world().player(walker).unwrap();
    assert!(player.pathfinding.is_none());
    assert_eq!(player.position, Point::new(8.0, 2.0));
    assert_eq!(player.speed, 0.0);
}

#[test]
fn overdrawn_trades_change_nothing() {
    let mut world = small_world(10);
    let from = put_player(&mut world, 2.0, 2.0);
    let to = put_player(&mut world, 3.0, 2.0);
    world.apply(0, "tradeCoins", json!({ "from": from, "to": to, "amount": 50 })).unwrap();
    assert_eq!(world.player(from).unwrap().coins, 50);

    let err = world
        .apply(1, "tradeCoins", json!({ "from": from, "to": to, "amount": 80 }))
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::PreconditionFailed {
            kind: Precondition::InsufficientResource,
            ..
        }
    ));
    assert_eq!(world.player(from).unwrap().coins, 50);
    assert_eq!(world.player(to).unwrap().coins, 150);
}

#[test]
fn human_players_are_capped_and_unique() {
    let mut world = small_world(32);
    for i in 0..8 {
        let outcome = world
            .apply(
                0,
                "join",
                json!({
                    "name": format!("human {i}"),
                    "character": "f1",
                    "description": "a visitor",
                    "tokenIdentifier": format!("token-{i}"),
                }),
            )
            .unwrap();
        assert!(matches!(outcome, InputOutcome::Joined { .. }));
    }
    let err = world
        .apply(
            0,
            "join",
            json!({ "name": "late", "character": "f1", "description": "", "tokenIdentifier": "token-8" }),
        )
        .unwrap_err();
    assert_eq!(err.precondition_kind(), Some(Precondition::TooManyHumans));

    let tags: BTreeSet<&str> = world
        .players()
        .values()
        .filter_map(|p| p.human.as_deref())
        .collect();
    assert_eq!(tags.len(), 8);
    assert_eq!(world.players().len(), 8);
}

#[test]
fn completing_an_operation_twice_is_harmless() {
    let mut world = small_world(12);
    let InputOutcome::AgentCreated {
        agent_id,
        player_id,
    } = world
        .apply(
            0,
            "createAgent",
            json!({ "name": "Lucky", "character": "f1", "identity": "an explorer", "plan": "see everything" }),
        )
        .unwrap()
    else {
        panic!("expected an agent");
    };

    world.tick(0);
    let scheduled = world.take_scheduled();
    assert_eq!(scheduled.len(), 1);
    let operation_id = scheduled[0].operation_id;

    let start = world.player(player_id).unwrap().position;
    let destination = if start.x < 6.0 { 10.0 } else { 1.0 };
    let completion = json!({
        "operationId": operation_id,
        "agentId": agent_id,
        "destination": { "x": destination, "y": start.y },
        "activity": { "description": "wandering", "until": 50 },
    });

    let first = world.apply(10, "finishDoSomething", completion.clone()).unwrap();
    assert_eq!(first, InputOutcome::Done);
    let after_first = world.player(player_id).unwrap().clone();
    assert!(after_first.pathfinding.is_some());

    let second = world.apply(20, "finishDoSomething", completion).unwrap();
    assert_eq!(second, InputOutcome::Ignored);
    assert_eq!(world.player(player_id).unwrap(), &after_first);
}

#[test]
fn discoveries_land_on_free_tiles() {
    let mut world = small_world(10);
    let finder = put_player(&mut world, 1.0, 1.0);
    world
        .map_mut()
        .place_sprite(Tile::new(5, 5), Footprint::UNIT, "https://img/well")
        .unwrap();

    let placement = find_free_placement(world.map(), Tile::new(5, 5), Footprint::UNIT);
    assert!(placement.free);
    assert_ne!(placement.tile, Tile::new(5, 5));
    assert!((placement.tile.x - 5).abs() <= 1 && (placement.tile.y - 5).abs() <= 1);

    world
        .apply(
            100,
            "discoverItem",
            json!({
                "playerId": finder,
                "item": { "name": "stone bench", "imageUrl": "https://img/bench" },
                "place": { "x": placement.tile.x, "y": placement.tile.y },
            }),
        )
        .unwrap();
    assert_eq!(world.map().sprites().len(), 2);
    assert_eq!(world.player(finder).unwrap().inventory[0].name, "stone bench");
    assert_eq!(world.player(finder).unwrap().last_input, 100);
}

#[test]
fn idle_humans_leave_during_steps() {
    let mut world = small_world(10);
    // One coarse tick per step so a few steps span the idle limit.
    world.config_mut().world.tick_ms = 100_000;
    let mut game = Game::new(world);
    let other = put_player(game.world_mut(), 1.0, 1.0);
    let join = Input::parse(
        "join",
        json!({ "name": "afk", "character": "f2", "description": "", "tokenIdentifier": "afk" }),
    )
    .unwrap();
    game.submit(join, 0);
    let summary = game.run_step(0).unwrap();
    let Ok(InputOutcome::Joined { player_id }) = summary.results[0].result else {
        panic!("join failed");
    };
    game.world_mut().start_conversation(0, player_id, other).unwrap();

    for step in 1..=3 {
        game.run_step(step * 100_000).unwrap();
    }
    assert!(game.world().player(player_id).is_some());
    game.run_step(400_000).unwrap();
    assert!(game.world().player(player_id).is_none());
    assert!(game.world().player_conversation(other).is_none());
}

fn create_agent(name: &str) -> Input {
    Input::CreateAgent(CreateAgentArgs {
        name: name.to_owned(),
        character: "f3".to_owned(),
        identity: format!("{name} likes to chat"),
        plan: "meet the neighbours".to_owned(),
    })
}

#[test]
fn invited_agents_talk_for_a_while_then_carry_on() {
    let mut world = small_world(12);
    world.config_mut().world.tick_ms = 1_000;
    let mut game = Game::new(world);
    game.submit(create_agent("Ada"), 0);
    game.submit(create_agent("Grace"), 0);
    let summary = game.run_step(0).unwrap();
    let created: Vec<(AgentId, PlayerId)> = summary
        .results
        .iter()
        .map(|record| match &record.result {
            Ok(InputOutcome::AgentCreated { agent_id, player_id }) => (*agent_id, *player_id),
            other => panic!("agent not created: {other:?}"),
        })
        .collect();
    let (ada, _) = created[0];
    let (grace, grace_player) = created[1];
    assert_eq!(summary.scheduled.len(), 2);

    for op in &summary.scheduled {
        let mut completion = FinishDoSomethingArgs::bare(op.agent_id, op.operation_id);
        if op.agent_id == ada {
            completion.invitee = Some(grace_player);
        }
        game.submit(Input::FinishDoSomething(completion), 1_000);
    }
    let summary = game.run_step(1_000).unwrap();
    assert!(summary.results.iter().all(|r| r.result == Ok(InputOutcome::Done)));
    assert!(game.world().player_conversation(grace_player).is_some());

    // Talking agents do not ask for anything new.
    for second in 2..=60_u64 {
        let summary = game.run_step(second * 1_000).unwrap();
        assert!(summary.scheduled.is_empty(), "dispatched mid-conversation at {second}s");
    }

    let summary = game.run_step(61_000).unwrap();
    assert!(game.world().player_conversation(grace_player).is_none());
    let dispatched: BTreeSet<AgentId> = summary.scheduled.iter().map(|op| op.agent_id).collect();
    assert_eq!(dispatched, BTreeSet::from([ada, grace]));
    for agent_id in [ada, grace] {
        assert_eq!(game.world().agent(agent_id).unwrap().last_conversation, Some(61_000));
    }
}
