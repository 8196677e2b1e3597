//! Common types and utilities shared across the mesh tiler crates.

pub mod bbox;
pub mod error;
pub mod geodesy;
pub mod projector;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{TilerError, TilerResult};
pub use geodesy::{latlon_to_xyz, latlon_to_xyz_many, Xyz};
pub use projector::{EquirectangularProjector, PixelProjector, WebMercatorProjector};
pub use tile::{num_tiles, validate_tiling, TileCoord, MAX_LEVEL};
