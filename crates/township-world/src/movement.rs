//! Collision checks and route search on the tile grid.
//!
//! Routes are searched with A* over the grid lattice. A player standing
//! between tiles first snaps to one of the neighbouring whole coordinates,
//! after which it moves one tile at a time in the four cardinal directions.
//! The search yields a dense list of timed samples that is compressed down
//! to its corners before being handed to the player.
//!
//! When the destination cannot be reached the route ends at the explored
//! position closest (Manhattan) to it, and the caller is told to adopt
//! that position as its new destination.

use std::collections::{BTreeMap, BTreeSet};

use township_types::{PathComponent, Point, Vector};

use crate::geometry::{compress_path, distance, manhattan_distance, points_equal, secs_to_millis};
use crate::world_map::WorldMap;

/// Why a position cannot be occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The position lies outside the map.
    OutOfBounds,
    /// An object tile sits under the position.
    WorldBlocked,
    /// Another player stands too close.
    PlayerCollision,
}

impl core::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfBounds => f.write_str("out of bounds"),
            Self::WorldBlocked => f.write_str("world blocked"),
            Self::PlayerCollision => f.write_str("player collision"),
        }
    }
}

/// Check whether `position` is free, given the positions of every other
/// player and the minimum distance allowed between two players.
///
/// Checks run in a fixed order: map bounds, object layers, then players.
pub fn blocked_with_positions(
    position: Point,
    others: &[Point],
    map: &WorldMap,
    collision_threshold: f64,
) -> Option<BlockReason> {
    if !map.contains(position) {
        return Some(BlockReason::OutOfBounds);
    }
    if map.object_blocks(position) {
        return Some(BlockReason::WorldBlocked);
    }
    if others
        .iter()
        .any(|other| distance(*other, position) < collision_threshold)
    {
        return Some(BlockReason::PlayerCollision);
    }
    None
}

/// Inputs for a route search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    /// Where the player currently stands.
    pub start: Point,
    /// Where the player currently faces.
    pub facing: Vector,
    /// Timestamp of the first path sample.
    pub now: u64,
    /// Where the player wants to go.
    pub destination: Point,
    /// Walking speed in tiles per second.
    pub speed: f64,
}

/// A computed route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Compressed, time-stamped path from the start position.
    pub path: Vec<PathComponent>,
    /// Set when the destination was unreachable and the route stops at the
    /// closest reachable position instead.
    pub new_destination: Option<Point>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    position: Point,
    facing: Vector,
    t: u64,
    length: f64,
    prev: Option<usize>,
}

/// Positions reachable in one step from `position`.
fn neighbours(position: Point) -> Vec<(Point, Vector)> {
    let Point { x, y } = position;
    let mut out = Vec::with_capacity(4);
    let x_whole = x.floor();
    let y_whole = y.floor();
    if (x - x_whole).abs() > 0.0 {
        out.push((Point::new(x_whole, y), Vector::new(-1.0, 0.0)));
        out.push((Point::new(x_whole + 1.0, y), Vector::new(1.0, 0.0)));
    }
    if (y - y_whole).abs() > 0.0 {
        out.push((Point::new(x, y_whole), Vector::new(0.0, -1.0)));
        out.push((Point::new(x, y_whole + 1.0), Vector::new(0.0, 1.0)));
    }
    if out.is_empty() {
        for facing in Vector::CARDINALS {
            out.push((Point::new(x + facing.dx, y + facing.dy), facing));
        }
    }
    out
}

/// Order-preserving key for non-negative finite costs.
fn cost_key(cost: f64) -> u64 {
    cost.max(0.0).to_bits()
}

fn position_key(position: Point) -> (u64, u64) {
    (position.x.to_bits(), position.y.to_bits())
}

/// Search a route from `request.start` to `request.destination`.
///
/// `blocked` reports whether a position may be entered; the start position
/// itself is never checked. Returns `None` when the player cannot move at
/// all (every neighbour is blocked and the destination is elsewhere).
pub fn find_route(
    request: &RouteRequest,
    blocked: impl Fn(Point) -> Option<BlockReason>,
) -> Option<Route> {
    let speed = if request.speed > 0.0 { request.speed } else { 1.0 };
    let destination = request.destination;

    let mut arena = vec![Candidate {
        position: request.start,
        facing: request.facing,
        t: request.now,
        length: 0.0,
        prev: None,
    }];
    // Priority queue keyed on (cost, insertion order).
    let mut open: BTreeSet<(u64, usize)> = BTreeSet::new();
    let mut best_cost: BTreeMap<(u64, u64), f64> = BTreeMap::new();

    let mut best = 0_usize;
    let mut current = Some(0_usize);
    let mut reached = None;

    while let Some(index) = current {
        let Some(&node) = arena.get(index) else {
            break;
        };
        if points_equal(node.position, destination) {
            reached = Some(index);
            break;
        }
        let best_distance = arena
            .get(best)
            .map_or(f64::INFINITY, |b| manhattan_distance(b.position, destination));
        if manhattan_distance(node.position, destination) < best_distance {
            best = index;
        }

        for (position, facing) in neighbours(node.position) {
            if blocked(position).is_some() {
                continue;
            }
            let segment = distance(node.position, position);
            let length = node.length + segment;
            let cost = length + manhattan_distance(position, destination);
            let key = position_key(position);
            if best_cost.get(&key).is_some_and(|&existing| existing <= cost) {
                continue;
            }
            best_cost.insert(key, cost);
            let next = arena.len();
            arena.push(Candidate {
                position,
                facing,
                t: request.now.saturating_add(secs_to_millis(length / speed)),
                length,
                prev: Some(index),
            });
            open.insert((cost_key(cost), next));
        }
        current = open.pop_first().map(|(_, next)| next);
    }

    let (end, new_destination) = match reached {
        Some(index) => (index, None),
        None => {
            let candidate = arena.get(best)?;
            if candidate.length <= 0.0 {
                return None;
            }
            (best, Some(candidate.position))
        }
    };

    // Walk back from the end; each sample faces along the segment leaving it.
    let mut dense = Vec::new();
    let mut cursor = arena.get(end).copied();
    let mut facing = cursor.map_or(request.facing, |c| c.facing);
    while let Some(candidate) = cursor {
        dense.push(PathComponent {
            position: candidate.position,
            facing,
            t: candidate.t,
        });
        facing = candidate.facing;
        cursor = candidate.prev.and_then(|prev| arena.get(prev).copied());
    }
    dense.reverse();

    Some(Route {
        path: compress_path(&dense),
        new_destination,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::geometry::path_position;
    use township_types::Tile;

    fn request(start: Point, destination: Point) -> RouteRequest {
        RouteRequest {
            start,
            facing: Vector::new(1.0, 0.0),
            now: 1_000,
            destination,
            speed: 0.75,
        }
    }

    fn map_blocked(map: &WorldMap) -> impl Fn(Point) -> Option<BlockReason> + '_ {
        move |p| blocked_with_positions(p, &[], map, 0.75)
    }

    #[test]
    fn block_reasons_are_checked_in_order() {
        let mut map = WorldMap::new(10, 10, 32);
        map.set_object_tile(0, Tile::new(3, 3), 5).unwrap();
        let others = [Point::new(6.0, 6.0)];

        assert_eq!(
            blocked_with_positions(Point::new(-1.0, 3.0), &others, &map, 0.75),
            Some(BlockReason::OutOfBounds)
        );
        assert_eq!(
            blocked_with_positions(Point::new(3.4, 3.9), &others, &map, 0.75),
            Some(BlockReason::WorldBlocked)
        );
        assert_eq!(
            blocked_with_positions(Point::new(6.5, 6.0), &others, &map, 0.75),
            Some(BlockReason::PlayerCollision)
        );
        assert_eq!(
            blocked_with_positions(Point::new(7.0, 6.0), &others, &map, 0.75),
            None
        );
    }

    #[test]
    fn straight_route_is_two_samples() {
        let map = WorldMap::new(10, 10, 32);
        let route = find_route(
            &request(Point::new(2.0, 2.0), Point::new(8.0, 2.0)),
            map_blocked(&map),
        )
        .unwrap();

        assert!(route.new_destination.is_none());
        assert_eq!(route.path.len(), 2);
        let first = route.path.first().unwrap();
        let last = route.path.last().unwrap();
        assert_eq!(first.t, 1_000);
        assert_eq!(first.facing, Vector::new(1.0, 0.0));
        assert!(points_equal(last.position, Point::new(8.0, 2.0)));
        // Six tiles at 0.75 tiles per second.
        assert_eq!(last.t, 9_000);
    }

    #[test]
    fn routes_around_a_wall() {
        let mut map = WorldMap::new(10, 10, 32);
        for y in 0..9 {
            map.set_object_tile(0, Tile::new(5, y), 1).unwrap();
        }
        let route = find_route(
            &request(Point::new(2.0, 2.0), Point::new(8.0, 2.0)),
            map_blocked(&map),
        )
        .unwrap();

        assert!(route.new_destination.is_none());
        assert!(points_equal(
            route.path.last().unwrap().position,
            Point::new(8.0, 2.0)
        ));
        // Every interpolated point avoids the wall.
        let end = route.path.last().unwrap().t;
        for t in (1_000..=end).step_by(250) {
            let sample = path_position(&route.path, t).unwrap();
            assert!(!map.object_blocks(sample.position), "hit wall at t={t}");
        }
    }

    #[test]
    fn unreachable_destination_adopts_closest_position() {
        let mut map = WorldMap::new(10, 10, 32);
        for y in 0..10 {
            map.set_object_tile(0, Tile::new(5, y), 1).unwrap();
        }
        let route = find_route(
            &request(Point::new(2.0, 2.0), Point::new(8.0, 2.0)),
            map_blocked(&map),
        )
        .unwrap();

        assert_eq!(route.new_destination, Some(Point::new(4.0, 2.0)));
        assert!(points_equal(
            route.path.last().unwrap().position,
            Point::new(4.0, 2.0)
        ));
    }

    #[test]
    fn boxed_in_player_has_no_route() {
        let map = WorldMap::new(10, 10, 32);
        let route = find_route(
            &request(Point::new(2.0, 2.0), Point::new(8.0, 2.0)),
            |_| Some(BlockReason::PlayerCollision),
        );
        assert!(route.is_none());
    }

    #[test]
    fn fractional_start_snaps_to_the_lattice() {
        let map = WorldMap::new(10, 10, 32);
        let route = find_route(
            &request(Point::new(2.5, 2.0), Point::new(4.0, 2.0)),
            map_blocked(&map),
        )
        .unwrap();
        let last = route.path.last().unwrap();
        assert!(points_equal(last.position, Point::new(4.0, 2.0)));
        assert_eq!(last.t, 1_000 + 2_000);
    }
}
