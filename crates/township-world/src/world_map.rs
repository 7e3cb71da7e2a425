//! The tile map: dimensions, object tile layers and placed sprites.
//!
//! Object tile layers are stored column-major (`layers[layer][x][y]`) with
//! `-1` meaning "no object". Any non-empty object tile blocks movement.
//! Placed sprites are kept in pixel coordinates, the way renderers consume
//! them; the placement allocator converts them back into tiles.

use serde::{Deserialize, Serialize};
use township_types::{Footprint, Point, Tile};

use crate::error::WorldError;

/// Value of an empty object tile.
pub const EMPTY_TILE: i32 = -1;

/// Upper bound on object layers created lazily by placement commands.
pub const MAX_OBJECT_LAYERS: usize = 16;

/// A sprite placed on the map, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedSprite {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
    /// Render layer.
    pub layer: u32,
    /// Sprite sheet URL.
    pub sheet: String,
    /// Animation name within the sheet.
    pub animation: String,
}

/// The tile grid every player walks on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldMap {
    /// Width in tiles.
    width: u32,
    /// Height in tiles.
    height: u32,
    /// Tile size in pixels.
    tile_dim: u32,
    /// Object layers, indexed `[layer][x][y]`.
    object_tiles: Vec<Vec<Vec<i32>>>,
    /// Sprites placed on top of the map.
    sprites: Vec<PlacedSprite>,
}

impl WorldMap {
    /// Create an empty map with no object layers.
    ///
    /// A `tile_dim` of zero is bumped to one pixel.
    pub fn new(width: u32, height: u32, tile_dim: u32) -> Self {
        Self {
            width,
            height,
            tile_dim: tile_dim.max(1),
            object_tiles: Vec::new(),
            sprites: Vec::new(),
        }
    }

    /// Width in tiles.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in tiles.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Tile size in pixels.
    pub const fn tile_dim(&self) -> u32 {
        self.tile_dim
    }

    /// Whether a sub-tile point lies inside the map.
    ///
    /// `NaN` coordinates are never inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < f64::from(self.width)
            && point.y < f64::from(self.height)
    }

    /// Whether a whole tile lies inside the map.
    pub fn contains_tile(&self, tile: Tile) -> bool {
        u32::try_from(tile.x).is_ok_and(|x| x < self.width)
            && u32::try_from(tile.y).is_ok_and(|y| y < self.height)
    }

    /// Return `Ok` when the tile is inside the map.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] otherwise.
    pub fn check_tile(&self, tile: Tile) -> Result<(), WorldError> {
        if self.contains_tile(tile) {
            Ok(())
        } else {
            Err(WorldError::OutOfBounds {
                tile,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// The tile containing a sub-tile point (coordinates floored).
    ///
    /// Returns `None` for points outside the map.
    #[allow(clippy::cast_possible_truncation)]
    pub fn tile_at(&self, point: Point) -> Option<Tile> {
        if !self.contains(point) {
            return None;
        }
        let x = i32::try_from(point.x.floor() as i64).ok()?;
        let y = i32::try_from(point.y.floor() as i64).ok()?;
        Some(Tile::new(x, y))
    }

    /// Whether any object layer has an object on the tile under `point`.
    pub fn object_blocks(&self, point: Point) -> bool {
        let Some(tile) = self.tile_at(point) else {
            return false;
        };
        (0..self.object_tiles.len()).any(|layer| {
            self.object_tile(layer, tile)
                .is_some_and(|index| index != EMPTY_TILE)
        })
    }

    /// Number of object layers allocated so far.
    pub fn layer_count(&self) -> usize {
        self.object_tiles.len()
    }

    /// Read an object tile, or `None` if the layer or tile does not exist.
    pub fn object_tile(&self, layer: usize, tile: Tile) -> Option<i32> {
        let x = usize::try_from(tile.x).ok()?;
        let y = usize::try_from(tile.y).ok()?;
        self.object_tiles.get(layer)?.get(x)?.get(y).copied()
    }

    /// Validate that [`set_object_tile`](Self::set_object_tile) would succeed.
    ///
    /// # Errors
    ///
    /// Same as [`set_object_tile`](Self::set_object_tile).
    pub fn check_object_tile(&self, layer: usize, tile: Tile) -> Result<(), WorldError> {
        self.check_tile(tile)?;
        if layer >= MAX_OBJECT_LAYERS {
            return Err(WorldError::LayerOutOfRange {
                layer,
                max: MAX_OBJECT_LAYERS,
            });
        }
        Ok(())
    }

    /// Write an object tile, allocating empty layers up to `layer` first.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] for tiles outside the map and
    /// [`WorldError::LayerOutOfRange`] beyond [`MAX_OBJECT_LAYERS`].
    pub fn set_object_tile(&mut self, layer: usize, tile: Tile, index: i32) -> Result<(), WorldError> {
        self.check_object_tile(layer, tile)?;
        while self.object_tiles.len() <= layer {
            self.object_tiles.push(self.empty_layer());
        }
        let x = usize::try_from(tile.x).unwrap_or_default();
        let y = usize::try_from(tile.y).unwrap_or_default();
        if let Some(cell) = self
            .object_tiles
            .get_mut(layer)
            .and_then(|columns| columns.get_mut(x))
            .and_then(|column| column.get_mut(y))
        {
            *cell = index;
        }
        Ok(())
    }

    fn empty_layer(&self) -> Vec<Vec<i32>> {
        let height = usize::try_from(self.height).unwrap_or_default();
        let width = usize::try_from(self.width).unwrap_or_default();
        vec![vec![EMPTY_TILE; height]; width]
    }

    /// Sprites placed so far, in placement order.
    pub fn sprites(&self) -> &[PlacedSprite] {
        &self.sprites
    }

    /// Place a sprite covering `footprint` tiles from `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] when `origin` is outside the map.
    /// The footprint itself may overhang the edge; renderers clip it.
    pub fn place_sprite(
        &mut self,
        origin: Tile,
        footprint: Footprint,
        sheet: &str,
    ) -> Result<(), WorldError> {
        self.check_tile(origin)?;
        let x = u32::try_from(origin.x).unwrap_or_default();
        let y = u32::try_from(origin.y).unwrap_or_default();
        self.sprites.push(PlacedSprite {
            x: x.saturating_mul(self.tile_dim),
            y: y.saturating_mul(self.tile_dim),
            w: footprint.w.max(1).saturating_mul(self.tile_dim),
            h: footprint.h.max(1).saturating_mul(self.tile_dim),
            layer: 0,
            sheet: sheet.to_owned(),
            animation: String::from("default"),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bounds_checks() {
        let map = WorldMap::new(10, 8, 32);
        assert!(map.contains(Point::new(9.9, 7.9)));
        assert!(!map.contains(Point::new(10.0, 0.0)));
        assert!(!map.contains(Point::new(-0.1, 0.0)));
        assert!(!map.contains(Point::new(f64::NAN, 1.0)));
        assert!(map.contains_tile(Tile::new(0, 7)));
        assert!(!map.contains_tile(Tile::new(0, 8)));
        assert!(map.check_tile(Tile::new(-1, 0)).is_err());
    }

    #[test]
    fn object_layers_grow_lazily() {
        let mut map = WorldMap::new(4, 4, 32);
        assert_eq!(map.layer_count(), 0);
        assert!(!map.object_blocks(Point::new(2.5, 1.0)));

        map.set_object_tile(2, Tile::new(2, 1), 7).unwrap();
        assert_eq!(map.layer_count(), 3);
        assert_eq!(map.object_tile(2, Tile::new(2, 1)), Some(7));
        assert_eq!(map.object_tile(0, Tile::new(2, 1)), Some(EMPTY_TILE));
        assert!(map.object_blocks(Point::new(2.5, 1.0)));
    }

    #[test]
    fn rejects_out_of_range_layers() {
        let mut map = WorldMap::new(4, 4, 32);
        let err = map.set_object_tile(MAX_OBJECT_LAYERS, Tile::new(0, 0), 1);
        assert!(matches!(err, Err(WorldError::LayerOutOfRange { .. })));
        assert_eq!(map.layer_count(), 0);
    }

    #[test]
    fn sprites_are_stored_in_pixels() {
        let mut map = WorldMap::new(10, 10, 16);
        map.place_sprite(Tile::new(2, 3), Footprint::new(3, 4), "/sheet.png")
            .unwrap();
        let sprite = map.sprites().last().unwrap();
        assert_eq!((sprite.x, sprite.y, sprite.w, sprite.h), (32, 48, 48, 64));
        assert_eq!(map.sprites().len(), 1);
    }
}
