//! Tile index construction and raw tile pyramids for unstructured meshes.
//!
//! # Architecture
//!
//! ```text
//! MeshGeometry ──► NearestIndex (spatial-index)
//!                        │
//!                        ▼
//!            TileIndexBuilder::generate_index(level, tilesize)
//!                        │            (persisted: index.zarr)
//!                        ▼
//!            build_raw_tiles(variable, index)
//!                        │
//!                        ▼
//!            store_raw_tiles ── write level L ─► read L ─► pyramid_step ─► write L-1 ...
//!                                                 (persisted: <L>.zarr ... 0.zarr)
//! ```
//!
//! Every tile array is laid out `[tile-x, tile-y, pixel-y, pixel-x]`.

pub mod config;
pub mod downsample;
pub mod gather;
pub mod index_builder;
pub mod mesh;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{PyramidConfig, ZarrCompression};
pub use downsample::{pyramid_step, DownsampleMethod};
pub use gather::build_raw_tiles;
pub use index_builder::TileIndexBuilder;
pub use mesh::{ElementKind, MeshGeometry, MeshSource, Variable};
pub use pipeline::{rebuild_coarser_levels, store_raw_tiles, LevelSummary};
pub use store::{read_index, write_index, LevelInfo, LevelReader, RawTileStore};
pub use types::{TileArray, TileIndex};
