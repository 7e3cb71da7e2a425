//! Free-space search for new objects.
//!
//! Occupancy is derived from the placed sprites: each sprite covers the
//! tiles under its pixel bounding box, rounded up to whole tiles. Object
//! tile layers are not consulted, so an object may be placed on terrain
//! that blocks walking.
//!
//! The search scans square rings of growing radius around the anchor,
//! horizontal edges first, and returns the first origin whose whole
//! footprint is in bounds and free. When nothing fits the anchor is clamped
//! into the map and reported as not free.

use std::collections::BTreeSet;

use township_types::{Footprint, Tile};

use crate::world_map::WorldMap;

/// Result of a placement search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Top-left tile of the footprint.
    pub tile: Tile,
    /// `false` when the search fell back to clamping and the footprint may
    /// overlap existing objects.
    pub free: bool,
}

/// Tiles covered by the map's placed sprites, clipped to the map.
pub fn occupied_tiles(map: &WorldMap) -> BTreeSet<Tile> {
    let dim = map.tile_dim().max(1);
    let mut occupied = BTreeSet::new();
    for sprite in map.sprites() {
        let base_x = sprite.x.checked_div(dim).unwrap_or_default();
        let base_y = sprite.y.checked_div(dim).unwrap_or_default();
        let end_x = base_x
            .saturating_add(sprite.w.div_ceil(dim).max(1))
            .min(map.width());
        let end_y = base_y
            .saturating_add(sprite.h.div_ceil(dim).max(1))
            .min(map.height());
        for x in base_x..end_x {
            for y in base_y..end_y {
                if let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) {
                    occupied.insert(Tile::new(x, y));
                }
            }
        }
    }
    occupied
}

/// Find the free origin closest to `anchor` for a `footprint` on `map`.
pub fn find_free_placement(map: &WorldMap, anchor: Tile, footprint: Footprint) -> Placement {
    let occupied = occupied_tiles(map);
    find_free_placement_in(map.width(), map.height(), &occupied, anchor, footprint)
}

/// Ring search against an explicit occupancy set.
pub fn find_free_placement_in(
    width: u32,
    height: u32,
    occupied: &BTreeSet<Tile>,
    anchor: Tile,
    footprint: Footprint,
) -> Placement {
    let width = i64::from(width);
    let height = i64::from(height);
    let w = i64::from(footprint.w.max(1));
    let h = i64::from(footprint.h.max(1));
    let ax = i64::from(anchor.x);
    let ay = i64::from(anchor.y);

    let fits = |x: i64, y: i64| -> bool {
        if x < 0 || y < 0 || x.saturating_add(w) > width || y.saturating_add(h) > height {
            return false;
        }
        (0..w).all(|dx| {
            (0..h).all(|dy| {
                to_tile(x.saturating_add(dx), y.saturating_add(dy))
                    .is_some_and(|tile| !occupied.contains(&tile))
            })
        })
    };
    let hit = |x: i64, y: i64| fits(x, y).then(|| to_tile(x, y)).flatten();

    let max_radius = width.max(height);
    for r in 0..=max_radius {
        for dx in r.saturating_neg()..=r {
            for dy in [r, r.saturating_neg()] {
                if let Some(tile) = hit(ax.saturating_add(dx), ay.saturating_add(dy)) {
                    return Placement { tile, free: true };
                }
            }
        }
        for dy in r.saturating_neg().saturating_add(1)..r {
            for dx in [r, r.saturating_neg()] {
                if let Some(tile) = hit(ax.saturating_add(dx), ay.saturating_add(dy)) {
                    return Placement { tile, free: true };
                }
            }
        }
    }

    let clamp = |value: i64, extent: i64, size: i64| value.min(extent.saturating_sub(size)).max(0);
    let tile = to_tile(clamp(ax, width, w), clamp(ay, height, h)).unwrap_or_default();
    Placement { tile, free: false }
}

fn to_tile(x: i64, y: i64) -> Option<Tile> {
    Some(Tile::new(i32::try_from(x).ok()?, i32::try_from(y).ok()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn ring_distance(a: Tile, b: Tile) -> i32 {
        (a.x - b.x).abs().max((a.y - b.y).abs())
    }

    #[test]
    fn empty_grid_returns_the_anchor() {
        let placement =
            find_free_placement_in(10, 10, &BTreeSet::new(), Tile::new(5, 5), Footprint::UNIT);
        assert_eq!(placement, Placement { tile: Tile::new(5, 5), free: true });
    }

    #[test]
    fn occupied_anchor_moves_to_ring_one() {
        let occupied = BTreeSet::from([Tile::new(5, 5)]);
        let placement =
            find_free_placement_in(10, 10, &occupied, Tile::new(5, 5), Footprint::UNIT);
        assert!(placement.free);
        assert_eq!(ring_distance(placement.tile, Tile::new(5, 5)), 1);
    }

    #[test]
    fn footprint_must_fit_inside_the_map() {
        let placement =
            find_free_placement_in(10, 10, &BTreeSet::new(), Tile::new(8, 8), Footprint::new(3, 3));
        assert!(placement.free);
        assert!(placement.tile.x + 3 <= 10 && placement.tile.y + 3 <= 10);
        assert_eq!(ring_distance(placement.tile, Tile::new(8, 8)), 1);
    }

    #[test]
    fn whole_footprint_must_be_free() {
        // A 2x2 footprint anchored at (2, 2) overlaps the blocker at (3, 3).
        let occupied = BTreeSet::from([Tile::new(3, 3)]);
        let placement =
            find_free_placement_in(10, 10, &occupied, Tile::new(2, 2), Footprint::new(2, 2));
        assert!(placement.free);
        let Tile { x, y } = placement.tile;
        assert!(!(x..x + 2).contains(&3) || !(y..y + 2).contains(&3));
    }

    #[test]
    fn full_grid_falls_back_to_clamping() {
        let occupied: BTreeSet<Tile> = (0..4)
            .flat_map(|x| (0..4).map(move |y| Tile::new(x, y)))
            .collect();
        let placement =
            find_free_placement_in(4, 4, &occupied, Tile::new(9, -2), Footprint::new(2, 2));
        assert_eq!(placement, Placement { tile: Tile::new(2, 0), free: false });
    }

    #[test]
    fn sprites_cover_rounded_up_tiles() {
        let mut map = WorldMap::new(10, 10, 32);
        map.place_sprite(Tile::new(1, 1), Footprint::new(2, 1), "/a.png")
            .unwrap();
        let occupied = occupied_tiles(&map);
        assert_eq!(
            occupied,
            BTreeSet::from([Tile::new(1, 1), Tile::new(2, 1)])
        );

        let placement = find_free_placement(&map, Tile::new(1, 1), Footprint::UNIT);
        assert!(placement.free);
        assert!(!occupied.contains(&placement.tile));
    }

    #[test]
    fn overhanging_sprites_only_cover_map_tiles() {
        let mut map = WorldMap::new(10, 10, 32);
        map.place_sprite(Tile::new(8, 8), Footprint::new(2_000, 2_000), "/huge.png")
            .unwrap();
        let occupied = occupied_tiles(&map);
        assert_eq!(occupied.len(), 4);
        assert!(occupied.iter().all(|tile| map.contains_tile(*tile)));
    }

    #[test]
    fn object_layers_do_not_block_placement() {
        let mut map = WorldMap::new(10, 10, 32);
        map.set_object_tile(0, Tile::new(4, 4), 3).unwrap();
        let placement = find_free_placement(&map, Tile::new(4, 4), Footprint::UNIT);
        assert_eq!(placement.tile, Tile::new(4, 4));
    }
}
