//! Tile-pixel to geographic coordinate projections.
//!
//! A projector maps the centre of pixel `(px, py)` of a tile to (lat, lon)
//! in degrees and maps (lat, lon) back to the tile containing it. Pixel
//! `(0, 0)` is the top-left (north-west) pixel of the tile.

use std::f64::consts::PI;

use crate::bbox::BoundingBox;
use crate::tile::{num_tiles, TileCoord};

/// Latitude limit of the Web Mercator square.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Projection from tile pixels to geographic coordinates.
pub trait PixelProjector: Send + Sync {
    /// Short identifier stored alongside persisted artifacts.
    fn name(&self) -> &'static str;

    /// (lat, lon) in degrees of the centre of pixel `(px, py)`.
    fn pixel_to_latlon(&self, tile: &TileCoord, px: u32, py: u32, tilesize: u32) -> (f64, f64);

    /// Tile containing (lat, lon) at `level`, or `None` outside the projection.
    fn latlon_to_tile(&self, lat: f64, lon: f64, level: u32) -> Option<TileCoord>;

    /// Geographic bounds of a tile.
    fn tile_bounds(&self, tile: &TileCoord) -> BoundingBox;
}

/// Global pixel position of a pixel centre as a fraction of the level extent.
#[inline]
fn pixel_fraction(tile: &TileCoord, px: u32, py: u32, tilesize: u32) -> (f64, f64) {
    let extent = num_tiles(tile.z) as f64 * tilesize as f64;
    let gx = tile.x as f64 * tilesize as f64 + px as f64 + 0.5;
    let gy = tile.y as f64 * tilesize as f64 + py as f64 + 0.5;
    (gx / extent, gy / extent)
}

/// Standard Web Mercator (Google/OSM) XYZ tiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorProjector;

impl PixelProjector for WebMercatorProjector {
    fn name(&self) -> &'static str {
        "web_mercator"
    }

    fn pixel_to_latlon(&self, tile: &TileCoord, px: u32, py: u32, tilesize: u32) -> (f64, f64) {
        let (fx, fy) = pixel_fraction(tile, px, py, tilesize);
        let lon = fx * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * fy)).sinh().atan().to_degrees();
        (lat, lon)
    }

    fn latlon_to_tile(&self, lat: f64, lon: f64, level: u32) -> Option<TileCoord> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > WEB_MERCATOR_MAX_LAT {
            return None;
        }
        let n = num_tiles(level) as f64;
        let x = ((lon + 180.0) / 360.0 * n).floor();
        let lat_rad = lat.to_radians();
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
        let max = n - 1.0;
        if x < 0.0 || y < 0.0 {
            return None;
        }
        Some(TileCoord::new(level, x.min(max) as u32, y.min(max) as u32))
    }

    fn tile_bounds(&self, tile: &TileCoord) -> BoundingBox {
        let n = num_tiles(tile.z) as f64;

        let lon_min = tile.x as f64 / n * 360.0 - 180.0;
        let lon_max = (tile.x + 1) as f64 / n * 360.0 - 180.0;

        let lat_max = (PI * (1.0 - 2.0 * tile.y as f64 / n))
            .sinh()
            .atan()
            .to_degrees();
        let lat_min = (PI * (1.0 - 2.0 * (tile.y + 1) as f64 / n))
            .sinh()
            .atan()
            .to_degrees();

        BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
    }
}

/// Plate carrée tiling: linear lat/lon over a square 2^z × 2^z grid.
///
/// Each tile is twice as wide in degrees as it is tall; the whole globe
/// including the poles is covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquirectangularProjector;

impl PixelProjector for EquirectangularProjector {
    fn name(&self) -> &'static str {
        "equirectangular"
    }

    fn pixel_to_latlon(&self, tile: &TileCoord, px: u32, py: u32, tilesize: u32) -> (f64, f64) {
        let (fx, fy) = pixel_fraction(tile, px, py, tilesize);
        (90.0 - fy * 180.0, fx * 360.0 - 180.0)
    }

    fn latlon_to_tile(&self, lat: f64, lon: f64, level: u32) -> Option<TileCoord> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        let n = num_tiles(level) as f64;
        let x = ((lon + 180.0) / 360.0 * n).floor().min(n - 1.0);
        let y = ((90.0 - lat) / 180.0 * n).floor().min(n - 1.0);
        Some(TileCoord::new(level, x as u32, y as u32))
    }

    fn tile_bounds(&self, tile: &TileCoord) -> BoundingBox {
        let n = num_tiles(tile.z) as f64;
        BoundingBox::new(
            tile.x as f64 / n * 360.0 - 180.0,
            90.0 - (tile.y + 1) as f64 / n * 180.0,
            (tile.x + 1) as f64 / n * 360.0 - 180.0,
            90.0 - tile.y as f64 / n * 180.0,
        )
    }
}
