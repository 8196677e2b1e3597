//! Image tiles from a stored raw pyramid.
//!
//! Tiles are written to `<target>/<level>/<tx>/<ty>.png`. Every tile of a
//! level is rendered independently; a tile that keeps failing after its
//! retries is recorded in the [`RenderSummary`] and the rest of the level
//! carries on.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{error, info, warn};

use tile_pyramid::{LevelReader, RawTileStore};
use tiler_common::{TileCoord, TilerError, TilerResult};

use crate::colormap::{colorize, ColorMap};
use crate::png::encode_png;
use crate::style::Normalization;

/// Attempts per tile after the first failure.
pub const DEFAULT_RETRIES: u32 = 2;

/// Outcome of rendering one or more levels.
#[derive(Debug, Default)]
pub struct RenderSummary {
    pub levels: Vec<u32>,
    pub written: usize,
    pub failed: Vec<TilerError>,
}

impl RenderSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: RenderSummary) {
        self.levels.extend(other.levels);
        self.written += other.written;
        self.failed.extend(other.failed);
    }
}

/// Colours and encodes raw tiles.
pub struct TileRenderer<'a> {
    norm: &'a Normalization,
    cmap: &'a ColorMap,
    retries: u32,
}

impl<'a> TileRenderer<'a> {
    pub fn new(norm: &'a Normalization, cmap: &'a ColorMap) -> Self {
        Self {
            norm,
            cmap,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Render levels `0..=max_level`.
    ///
    /// Fails only for problems that stop a whole level (bad normalization,
    /// a level missing from the store).
    pub fn render_levels(
        &self,
        store: &RawTileStore,
        target: &Path,
        max_level: u32,
    ) -> TilerResult<RenderSummary> {
        self.norm.validate()?;
        let mut summary = RenderSummary::default();
        for level in 0..=max_level {
            summary.merge(self.render_level(store, target, level)?);
        }
        Ok(summary)
    }

    /// Render every tile of one level.
    pub fn render_level(
        &self,
        store: &RawTileStore,
        target: &Path,
        level: u32,
    ) -> TilerResult<RenderSummary> {
        let started = Instant::now();
        let reader = store.open_reader(level)?;
        let coords: Vec<TileCoord> = TileCoord::all(level).collect();

        let failed: Vec<TilerError> = coords
            .par_iter()
            .filter_map(|coord| self.render_with_retries(&reader, target, coord).err())
            .collect();

        let written = coords.len() - failed.len();
        if failed.is_empty() {
            info!(
                level,
                tiles = written,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Rendered level"
            );
        } else {
            error!(
                level,
                written,
                failed = failed.len(),
                "Rendered level with failures"
            );
        }

        Ok(RenderSummary {
            levels: vec![level],
            written,
            failed,
        })
    }

    fn render_with_retries(
        &self,
        reader: &LevelReader,
        target: &Path,
        coord: &TileCoord,
    ) -> TilerResult<()> {
        let mut attempt = 0;
        loop {
            match self.render_tile(reader, target, coord) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        level = coord.z,
                        x = coord.x,
                        y = coord.y,
                        attempt,
                        error = %e,
                        "Retrying tile"
                    );
                }
                Err(e) => {
                    error!(level = coord.z, x = coord.x, y = coord.y, error = %e, "Tile failed");
                    return Err(e);
                }
            }
        }
    }

    fn render_tile(&self, reader: &LevelReader, target: &Path, coord: &TileCoord) -> TilerResult<()> {
        let (level, x, y) = (coord.z, coord.x, coord.y);
        let values = reader.read_tile(x, y)?;
        let s = reader.tilesize() as usize;
        let pixels = colorize(&values, self.norm, self.cmap);
        let png = encode_png(&pixels, s, s).map_err(|e| TilerError::tile_io(level, x, y, e.to_string()))?;

        let path = tile_path(target, coord);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| TilerError::tile_io(level, x, y, format!("{}: {}", dir.display(), e)))?;
        }
        std::fs::write(&path, png)
            .map_err(|e| TilerError::tile_io(level, x, y, format!("{}: {}", path.display(), e)))
    }
}

/// Where tile `coord` is written below `target`.
pub fn tile_path(target: &Path, coord: &TileCoord) -> PathBuf {
    target.join(coord.path_key("png"))
}

/// Render levels `0..=max_level` with the default retry count.
pub fn render_levels(
    store: &RawTileStore,
    target: &Path,
    max_level: u32,
    norm: &Normalization,
    cmap: &ColorMap,
) -> TilerResult<RenderSummary> {
    TileRenderer::new(norm, cmap).render_levels(store, target, max_level)
}
