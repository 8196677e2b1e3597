//! Gathering mesh values into tiles through a tile index.

use rayon::prelude::*;
use tracing::debug;

use tiler_common::{TilerError, TilerResult};

use crate::types::{TileArray, TileIndex};

/// Materialize a raw tile level: every pixel takes the value of its element.
///
/// Fails with a configuration error when the index references an element
/// beyond `values`, which means the index was built for a different mesh.
pub fn build_raw_tiles(values: &[f32], index: &TileIndex) -> TilerResult<TileArray<f32>> {
    if let Some(max) = index.max_element() {
        if max as usize >= values.len() {
            return Err(TilerError::configuration(format!(
                "tile index references {} {} but the variable has {} values",
                index.element_kind.as_str(),
                max,
                values.len()
            )));
        }
    }

    let tiles = &index.tiles;
    let data: Vec<f32> = tiles
        .data()
        .par_iter()
        .map(|&i| values[i as usize])
        .collect();

    debug!(
        level = tiles.level(),
        pixels = data.len(),
        "Gathered raw tile values"
    );
    TileArray::new(tiles.level(), tiles.tilesize(), data)
}
