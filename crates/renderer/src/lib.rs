//! Image tiles from raw tile pyramids.
//!
//! - Value normalization (linear, log) and JSON style files
//! - Colour ramps with a configurable colour for missing values
//! - Indexed / RGBA PNG encoding
//! - Parallel per-level tile rendering with per-tile retries

pub mod colormap;
pub mod png;
pub mod style;
pub mod tiles;

pub use colormap::{colorize, Color, ColorMap};
pub use png::encode_png;
pub use style::{hex_to_rgb, hex_to_rgba, ColorStop, Normalization, StyleConfig, StyleDefinition};
pub use tiles::{render_levels, tile_path, RenderSummary, TileRenderer, DEFAULT_RETRIES};
