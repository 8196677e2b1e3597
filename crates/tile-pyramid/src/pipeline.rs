//! Finest-to-coarsest raw pyramid construction.

use std::time::Instant;

use tracing::{info, instrument};

use tiler_common::{TilerError, TilerResult};

use crate::downsample::{pyramid_step, DownsampleMethod};
use crate::store::RawTileStore;
use crate::types::TileArray;

/// What was written for one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    pub level: u32,
    pub num_tiles: u32,
    pub tilesize: u32,
    /// Pixels that hold no value.
    pub missing_pixels: usize,
    pub elapsed_ms: u64,
}

impl LevelSummary {
    fn of(tiles: &TileArray<f32>, started: Instant) -> Self {
        Self {
            level: tiles.level(),
            num_tiles: tiles.num_tiles(),
            tilesize: tiles.tilesize(),
            missing_pixels: tiles.data().iter().filter(|v| v.is_nan()).count(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Store `tiles` at its own level and every coarser level down to 0.
///
/// Each coarser level is computed from the persisted copy of the level above
/// it, so the stored pyramid is consistent with what readers will see.
/// Summaries are returned finest first.
#[instrument(skip(store, tiles), fields(level = tiles.level()))]
pub fn store_raw_tiles(
    store: &RawTileStore,
    tiles: &TileArray<f32>,
    method: DownsampleMethod,
) -> TilerResult<Vec<LevelSummary>> {
    let started = Instant::now();
    store.write_level(tiles.level(), tiles)?;
    let mut summaries = vec![LevelSummary::of(tiles, started)];
    summaries.extend(rebuild_coarser_levels(store, tiles.level(), method)?);
    Ok(summaries)
}

/// Recompute every level below `from_level` from what is stored there.
pub fn rebuild_coarser_levels(
    store: &RawTileStore,
    from_level: u32,
    method: DownsampleMethod,
) -> TilerResult<Vec<LevelSummary>> {
    if !store.has_level(from_level) {
        return Err(TilerError::pyramid_consistency(
            from_level,
            format!(
                "cannot reduce from level {}: not stored under {}",
                from_level,
                store.root().display()
            ),
        ));
    }

    let mut summaries = Vec::with_capacity(from_level as usize);
    let mut level = from_level;
    while level > 0 {
        let started = Instant::now();
        let fine = store.read_level(level)?;
        let coarse = pyramid_step(&fine, method)?;
        store.write_level(level - 1, &coarse)?;

        let summary = LevelSummary::of(&coarse, started);
        info!(
            level = summary.level,
            num_tiles = summary.num_tiles,
            missing = summary.missing_pixels,
            elapsed_ms = summary.elapsed_ms,
            "Reduced level"
        );
        summaries.push(summary);
        level -= 1;
    }
    Ok(summaries)
}
