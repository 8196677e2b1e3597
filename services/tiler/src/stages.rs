//! The three tiling stages and their composition.
//!
//! Each stage reads what the previous one persisted, so stages can be rerun
//! independently.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::info;

use renderer::{RenderSummary, TileRenderer};
use spatial_index::RTreeIndex;
use tile_pyramid::{
    build_raw_tiles, read_index, store_raw_tiles, write_index, LevelSummary, MeshSource,
    RawTileStore, TileIndex, TileIndexBuilder,
};

use crate::config::TilerConfig;

/// Build the tile index for the mesh and persist it.
pub fn run_index(config: &TilerConfig) -> Result<TileIndex> {
    let start = Instant::now();
    let source = MeshSource::open(&config.mesh_path)
        .with_context(|| format!("Failed to open mesh {:?}", config.mesh_path))?;
    let geometry = source
        .geometry(config.element_kind)
        .context("Failed to read mesh geometry")?;
    let index: RTreeIndex = geometry.build_index().context("Failed to build spatial index")?;

    let projector = config.projection.projector();
    let tile_index = TileIndexBuilder::new(&index, &*projector, config.element_kind)
        .generate_index(config.level, config.tilesize)
        .with_context(|| format!("Failed to generate tile index for level {}", config.level))?;

    write_index(&config.index_path, &tile_index, &config.pyramid)
        .with_context(|| format!("Failed to write tile index to {:?}", config.index_path))?;

    info!(
        level = config.level,
        tilesize = config.tilesize,
        elements = geometry.len(),
        projection = projector.name(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Index stage complete"
    );
    Ok(tile_index)
}

/// Gather the configured variable through the stored index and build the
/// raw pyramid.
pub fn run_raw(config: &TilerConfig) -> Result<Vec<LevelSummary>> {
    let start = Instant::now();
    let name = config
        .variable
        .as_deref()
        .context("No variable configured (set `variable`, TILER_VARIABLE or --variable)")?;

    let index = read_index(&config.index_path)
        .with_context(|| format!("Failed to read tile index {:?}", config.index_path))?;
    if index.tiles.level() != config.level || index.tiles.tilesize() != config.tilesize {
        bail!(
            "tile index {:?} is level {} / tilesize {}, configured level {} / tilesize {}; rerun the index stage",
            config.index_path,
            index.tiles.level(),
            index.tiles.tilesize(),
            config.level,
            config.tilesize
        );
    }

    let source = MeshSource::open(&config.mesh_path)
        .with_context(|| format!("Failed to open mesh {:?}", config.mesh_path))?;
    let variable = source
        .variable(name)
        .with_context(|| format!("Failed to read variable '{}'", name))?;

    let tiles = build_raw_tiles(&variable.values, &index)
        .with_context(|| format!("Failed to gather '{}' into tiles", name))?;

    let store = RawTileStore::new(&config.raw_dir, config.pyramid.clone())
        .with_attributes(variable.attributes.clone());
    let summaries = store_raw_tiles(&store, &tiles, config.pyramid.downsample)
        .with_context(|| format!("Failed to build raw pyramid in {:?}", config.raw_dir))?;

    info!(
        variable = name,
        levels = summaries.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Raw stage complete"
    );
    Ok(summaries)
}

/// Render image tiles from the stored raw pyramid.
pub fn run_images(config: &TilerConfig) -> Result<RenderSummary> {
    let start = Instant::now();
    let (cmap, norm) = config.render.resolve().context("Invalid render configuration")?;
    let store = RawTileStore::new(&config.raw_dir, config.pyramid.clone());
    let max_level = config.render_max_level();

    let summary = TileRenderer::new(&norm, &cmap)
        .with_retries(config.render.retries)
        .render_levels(&store, &config.image_dir, max_level)
        .with_context(|| format!("Failed to render levels 0..={}", max_level))?;

    info!(
        written = summary.written,
        failed = summary.failed.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Image stage complete"
    );
    Ok(summary)
}

/// Run index, raw and image stages in order.
pub fn run_all(config: &TilerConfig) -> Result<RenderSummary> {
    run_index(config)?;
    run_raw(config)?;
    run_images(config)
}
