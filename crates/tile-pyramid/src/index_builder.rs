//! Per-pixel nearest-element index for a whole zoom level.

use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use spatial_index::NearestIndex;
use tiler_common::{
    latlon_to_xyz, validate_tiling, PixelProjector, TileCoord, TilerError, TilerResult, Xyz,
};

use crate::mesh::ElementKind;
use crate::types::{TileArray, TileIndex};

/// Renders tile index arrays from a spatial index and a projector.
///
/// Tiles are independent; a level is rendered in parallel across tiles and
/// the result for a given tile depends only on its geometry and the index.
pub struct TileIndexBuilder<'a, I: NearestIndex + ?Sized, P: PixelProjector + ?Sized> {
    index: &'a I,
    projector: &'a P,
    element_kind: ElementKind,
}

impl<'a, I: NearestIndex + ?Sized, P: PixelProjector + ?Sized> TileIndexBuilder<'a, I, P> {
    pub fn new(index: &'a I, projector: &'a P, element_kind: ElementKind) -> Self {
        Self {
            index,
            projector,
            element_kind,
        }
    }

    /// Build the `[2^L, 2^L, S, S]` index array for `level`.
    pub fn generate_index(&self, level: u32, tilesize: u32) -> TilerResult<TileIndex> {
        validate_tiling(level, tilesize)?;
        let start = Instant::now();
        let mut tiles = TileArray::filled(level, tilesize, 0u32)?;
        let n = tiles.num_tiles() as usize;
        let tile_len = tiles.tile_len();

        info!(
            level,
            tilesize,
            tiles = n * n,
            projection = self.projector.name(),
            "Building tile index"
        );

        tiles
            .data_mut()
            .par_chunks_mut(tile_len)
            .enumerate()
            .try_for_each(|(i, out)| {
                let coord = TileCoord::new(level, (i / n) as u32, (i % n) as u32);
                let found = self.render_tile(&coord, tilesize)?;
                out.copy_from_slice(&found);
                Ok::<(), TilerError>(())
            })?;

        info!(
            level,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tile index complete"
        );

        Ok(TileIndex {
            tiles,
            element_kind: self.element_kind,
        })
    }

    /// Nearest element of every pixel of one tile, row-major.
    pub fn render_tile(&self, coord: &TileCoord, tilesize: u32) -> TilerResult<Vec<u32>> {
        if !coord.is_valid() {
            return Err(TilerError::configuration(format!(
                "tile {}/{}/{} is outside level {}",
                coord.z, coord.x, coord.y, coord.z
            )));
        }
        let queries = self.pixel_positions(coord, tilesize)?;
        Ok(self.index.nearest(&queries))
    }

    /// Unit-sphere position of every pixel centre of a tile.
    fn pixel_positions(&self, coord: &TileCoord, tilesize: u32) -> TilerResult<Vec<Xyz>> {
        let mut positions = Vec::with_capacity(tilesize as usize * tilesize as usize);
        for py in 0..tilesize {
            for px in 0..tilesize {
                let (lat, lon) = self.projector.pixel_to_latlon(coord, px, py, tilesize);
                if !lat.is_finite()
                    || !lon.is_finite()
                    || !(-90.0..=90.0).contains(&lat)
                    || !(-180.0..=180.0).contains(&lon)
                {
                    return Err(TilerError::configuration(format!(
                        "projector {} mapped pixel ({}, {}) of tile {}/{}/{} to ({}, {}); \
                         check level and tilesize",
                        self.projector.name(),
                        px,
                        py,
                        coord.z,
                        coord.x,
                        coord.y,
                        lat,
                        lon
                    )));
                }
                positions.push(latlon_to_xyz(lat, lon));
            }
        }
        Ok(positions)
    }
}
