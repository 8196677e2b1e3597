//! Staged mesh tiling: tile index, raw pyramid, image tiles.

pub mod config;
pub mod stages;

pub use config::{Overrides, Projection, RenderConfig, TilerConfig};
pub use stages::{run_all, run_images, run_index, run_raw};
