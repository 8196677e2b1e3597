//! End-to-end tests for index generation, gathering and raw pyramid storage.

use serde_json::{json, Map};
use spatial_index::{BruteForceIndex, NearestIndex, RTreeIndex};
use test_utils::{assert_approx_eq, cardinal_mesh, fibonacci_mesh, sequential_tiles, ScratchDir};
use tile_pyramid::{
    build_raw_tiles, pyramid_step, read_index, rebuild_coarser_levels, store_raw_tiles,
    write_index, DownsampleMethod, ElementKind, MeshGeometry, MeshSource, PyramidConfig,
    RawTileStore, TileArray, TileIndexBuilder, ZarrCompression,
};
use tiler_common::{TilerError, WebMercatorProjector};

fn cardinal_index(level: u32, tilesize: u32) -> tile_pyramid::TileIndex {
    let mesh = cardinal_mesh();
    let geometry = MeshGeometry::from_latlon(ElementKind::Cell, &mesh.lats, &mesh.lons).unwrap();
    let index: RTreeIndex = geometry.build_index().unwrap();
    TileIndexBuilder::new(&index, &WebMercatorProjector, ElementKind::Cell)
        .generate_index(level, tilesize)
        .unwrap()
}

fn small_chunks() -> PyramidConfig {
    PyramidConfig {
        tiles_per_chunk: 2,
        ..Default::default()
    }
}

// ============================================================================
// Four-element equatorial mesh
// ============================================================================

#[test]
fn test_cardinal_mesh_columns() {
    // Level 1, S = 4 gives 8 global columns centred on
    // -157.5, -112.5, ..., 157.5 degrees.
    let index = cardinal_index(1, 4);
    let expected = [2, 3, 3, 0, 0, 1, 1, 2];
    for gy in 0..8 {
        for gx in 0..8 {
            assert_eq!(
                index.tiles.global_pixel(gx, gy),
                expected[gx as usize],
                "pixel ({}, {})",
                gx,
                gy
            );
        }
    }
}

#[test]
fn test_cardinal_mesh_pyramid() {
    let scratch = ScratchDir::new();
    let mesh = cardinal_mesh();
    let index = cardinal_index(1, 4);
    let raw = build_raw_tiles(&mesh.values, &index).unwrap();

    let store = RawTileStore::new(scratch.raw_dir(), small_chunks());
    let summaries = store_raw_tiles(&store, &raw, DownsampleMethod::Mean).unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].level, 1);
    assert_eq!(summaries[1].level, 0);
    assert!(summaries.iter().all(|s| s.missing_pixels == 0));

    let level0 = store.read_level(0).unwrap();
    let expected_columns = [3.5, 2.5, 1.5, 2.5];
    for py in 0..4 {
        for px in 0..4 {
            assert_approx_eq!(level0.get(0, 0, py, px), expected_columns[px as usize], 1e-6);
        }
    }
    let mean: f32 = level0.data().iter().sum::<f32>() / level0.data().len() as f32;
    assert_approx_eq!(mean, 2.5, 1e-6);
}

// ============================================================================
// Pyramid exactness
// ============================================================================

#[test]
fn test_each_coarse_pixel_is_mean_of_children() {
    let scratch = ScratchDir::new();
    let fine = TileArray::new(3, 4, sequential_tiles(3, 4)).unwrap();
    let store = RawTileStore::new(scratch.raw_dir(), small_chunks());
    store_raw_tiles(&store, &fine, DownsampleMethod::Mean).unwrap();

    for level in (0..3).rev() {
        let coarse = store.read_level(level).unwrap();
        let finer = store.read_level(level + 1).unwrap();
        let width = 4 << level;
        for gy in 0..width {
            for gx in 0..width {
                let children = [
                    finer.global_pixel(2 * gx, 2 * gy),
                    finer.global_pixel(2 * gx + 1, 2 * gy),
                    finer.global_pixel(2 * gx, 2 * gy + 1),
                    finer.global_pixel(2 * gx + 1, 2 * gy + 1),
                ];
                let expected = children.iter().map(|&v| v as f64).sum::<f64>() / 4.0;
                assert_approx_eq!(coarse.global_pixel(gx, gy), expected, 1e-3);
            }
        }
    }
}

#[test]
fn test_constant_field_stays_constant() {
    let scratch = ScratchDir::new();
    let fine = TileArray::filled(4, 2, 7.25f32).unwrap();
    let store = RawTileStore::new(scratch.raw_dir(), PyramidConfig::default());
    store_raw_tiles(&store, &fine, DownsampleMethod::Mean).unwrap();

    assert_eq!(store.levels(), vec![0, 1, 2, 3, 4]);
    for level in 0..=4 {
        let tiles = store.read_level(level).unwrap();
        assert_eq!(tiles.num_tiles(), 1 << level);
        assert!(tiles.data().iter().all(|&v| v == 7.25));
    }
}

#[test]
fn test_missing_values_are_skipped() {
    let mut fine = TileArray::filled(1, 2, 4.0f32).unwrap();
    // Blank out one child of every coarse pixel.
    for tx in 0..2 {
        for ty in 0..2 {
            fine.tile_mut(tx, ty)[0] = f32::NAN;
        }
    }
    let coarse = pyramid_step(&fine, DownsampleMethod::Mean).unwrap();
    assert!(coarse.data().iter().all(|&v| v == 4.0));

    let all_missing = TileArray::filled(1, 2, f32::NAN).unwrap();
    let coarse = pyramid_step(&all_missing, DownsampleMethod::Mean).unwrap();
    assert!(coarse.data().iter().all(|v| v.is_nan()));
}

// ============================================================================
// Storage
// ============================================================================

#[test]
fn test_level_round_trip_across_compressions() {
    for compression in [
        ZarrCompression::None,
        ZarrCompression::BloscLz4,
        ZarrCompression::BloscZstd,
    ] {
        let scratch = ScratchDir::new();
        let config = PyramidConfig {
            compression,
            tiles_per_chunk: 2,
            ..Default::default()
        };
        let store = RawTileStore::new(scratch.raw_dir(), config);
        let tiles = TileArray::new(2, 3, sequential_tiles(2, 3)).unwrap();
        store.write_level(2, &tiles).unwrap();
        assert_eq!(store.read_level(2).unwrap(), tiles, "{}", compression);
    }
}

#[test]
fn test_level_attributes() {
    let scratch = ScratchDir::new();
    let mut attrs = Map::new();
    attrs.insert("units".to_string(), json!("K"));
    let store =
        RawTileStore::new(scratch.raw_dir(), small_chunks()).with_attributes(attrs);
    store
        .write_level(1, &TileArray::filled(1, 8, 1.0f32).unwrap())
        .unwrap();

    let info = store.level_info(1).unwrap();
    assert_eq!(info.tilesize, 8);
    assert_eq!(info.num_tiles, 2);
    assert_eq!(info.attributes["units"], json!("K"));
    assert_eq!(info.attributes["tile_level"], json!(1));
    assert_eq!(info.attributes["tilesize"], json!(8));
}

#[test]
fn test_rewriting_a_level_replaces_it() {
    let scratch = ScratchDir::new();
    let store = RawTileStore::new(scratch.raw_dir(), small_chunks());
    store
        .write_level(2, &TileArray::filled(2, 2, 1.0f32).unwrap())
        .unwrap();
    let second = TileArray::new(2, 2, sequential_tiles(2, 2)).unwrap();
    store.write_level(2, &second).unwrap();
    assert_eq!(store.read_level(2).unwrap(), second);
}

#[test]
fn test_rebuild_requires_source_level() {
    let scratch = ScratchDir::new();
    let store = RawTileStore::new(scratch.raw_dir(), small_chunks());
    let err = rebuild_coarser_levels(&store, 3, DownsampleMethod::Mean).unwrap_err();
    assert!(matches!(err, TilerError::PyramidConsistency { level: 3, .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_rebuild_from_existing_level() {
    let scratch = ScratchDir::new();
    let store = RawTileStore::new(scratch.raw_dir(), small_chunks());
    store
        .write_level(2, &TileArray::filled(2, 2, 3.0f32).unwrap())
        .unwrap();
    let summaries = rebuild_coarser_levels(&store, 2, DownsampleMethod::Max).unwrap();
    assert_eq!(
        summaries.iter().map(|s| s.level).collect::<Vec<_>>(),
        vec![1, 0]
    );
    assert_eq!(store.finest_level(), Some(2));
}

// ============================================================================
// Index persistence and determinism
// ============================================================================

#[test]
fn test_index_round_trip() {
    let scratch = ScratchDir::new();
    let index = cardinal_index(2, 4);
    let path = scratch.path().join("index.zarr");
    write_index(&path, &index, &PyramidConfig::default()).unwrap();

    let loaded = read_index(&path).unwrap();
    assert_eq!(loaded.tiles, index.tiles);
    assert_eq!(loaded.element_kind, ElementKind::Cell);
    assert_eq!(loaded.array_name(), "cell_of_pixel");
}

#[test]
fn test_index_is_reproducible() {
    let mesh = fibonacci_mesh(500);
    let geometry = MeshGeometry::from_latlon(ElementKind::Node, &mesh.lats, &mesh.lons).unwrap();
    let rtree: RTreeIndex = geometry.build_index().unwrap();
    let brute: BruteForceIndex = geometry.build_index().unwrap();

    let first = TileIndexBuilder::new(&rtree, &WebMercatorProjector, ElementKind::Node)
        .generate_index(2, 8)
        .unwrap();
    let second = TileIndexBuilder::new(&rtree, &WebMercatorProjector, ElementKind::Node)
        .generate_index(2, 8)
        .unwrap();
    let reference = TileIndexBuilder::new(&brute, &WebMercatorProjector, ElementKind::Node)
        .generate_index(2, 8)
        .unwrap();

    assert_eq!(first.tiles, second.tiles);
    assert_eq!(first.tiles, reference.tiles);
    assert!(first.max_element().unwrap() < rtree.len() as u32);
}

#[test]
fn test_same_global_grid_gives_same_index() {
    let mesh = fibonacci_mesh(300);
    let geometry = MeshGeometry::from_latlon(ElementKind::Cell, &mesh.lats, &mesh.lons).unwrap();
    let index: RTreeIndex = geometry.build_index().unwrap();
    let builder = TileIndexBuilder::new(&index, &WebMercatorProjector, ElementKind::Cell);

    let a = builder.generate_index(2, 2).unwrap();
    let b = builder.generate_index(1, 4).unwrap();
    for gy in 0..8 {
        for gx in 0..8 {
            assert_eq!(a.tiles.global_pixel(gx, gy), b.tiles.global_pixel(gx, gy));
        }
    }
}

// ============================================================================
// Mesh sources
// ============================================================================

#[test]
fn test_mesh_source_end_to_end() {
    let scratch = ScratchDir::new();
    let mesh = cardinal_mesh();
    let mesh_dir = scratch.mesh_dir();
    tile_pyramid::mesh::write_mesh_array(&mesh_dir, "lat", &mesh.lats, Map::new()).unwrap();
    tile_pyramid::mesh::write_mesh_array(&mesh_dir, "lon", &mesh.lons, Map::new()).unwrap();
    let values: Vec<f64> = mesh.values.iter().map(|&v| v as f64).collect();
    let mut attrs = Map::new();
    attrs.insert("long_name".to_string(), json!("test field"));
    tile_pyramid::mesh::write_mesh_array(&mesh_dir, "field", &values, attrs).unwrap();

    let source = MeshSource::open(&mesh_dir).unwrap();
    let geometry = source.geometry(ElementKind::Cell).unwrap();
    assert_eq!(geometry.len(), 4);
    let variable = source.variable("field").unwrap();
    assert_eq!(variable.values, mesh.values);

    let index: RTreeIndex = geometry.build_index().unwrap();
    let tile_index = TileIndexBuilder::new(&index, &WebMercatorProjector, ElementKind::Cell)
        .generate_index(1, 4)
        .unwrap();
    let raw = build_raw_tiles(&variable.values, &tile_index).unwrap();

    let store = RawTileStore::new(scratch.raw_dir(), small_chunks())
        .with_attributes(variable.attributes.clone());
    store_raw_tiles(&store, &raw, DownsampleMethod::Mean).unwrap();
    assert_eq!(
        store.level_info(0).unwrap().attributes["long_name"],
        json!("test field")
    );
}
