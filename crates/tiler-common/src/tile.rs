//! Slippy-map tile coordinates and level arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::{TilerError, TilerResult};

/// Deepest zoom level the tiler accepts.
pub const MAX_LEVEL: u32 = 22;

/// Number of tiles along each axis at `level`.
#[inline]
pub fn num_tiles(level: u32) -> u32 {
    1u32 << level
}

/// Reject level/tilesize combinations before any work is done.
pub fn validate_tiling(level: u32, tilesize: u32) -> TilerResult<()> {
    if level > MAX_LEVEL {
        return Err(TilerError::configuration(format!(
            "level {} exceeds maximum level {}",
            level, MAX_LEVEL
        )));
    }
    if tilesize == 0 {
        return Err(TilerError::configuration("tilesize must be > 0"));
    }
    let n = num_tiles(level) as u64;
    let pixels = n
        .checked_mul(n)
        .and_then(|t| t.checked_mul(tilesize as u64 * tilesize as u64))
        .filter(|&p| p <= usize::MAX as u64);
    if pixels.is_none() {
        return Err(TilerError::configuration(format!(
            "level {} with tilesize {} does not fit in memory",
            level, tilesize
        )));
    }
    Ok(())
}

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y), 0 at the top
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether x and y lie in `[0, 2^z)`.
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_LEVEL && self.x < num_tiles(self.z) && self.y < num_tiles(self.z)
    }

    /// Relative path of this tile's image, `z/x/y.ext`.
    pub fn path_key(&self, ext: &str) -> String {
        format!("{}/{}/{}.{}", self.z, self.x, self.y, ext)
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the four children tiles (zoom + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }

    /// All tiles of a level in raster order (x outer, y inner).
    pub fn all(level: u32) -> impl Iterator<Item = TileCoord> {
        let n = num_tiles(level);
        (0..n).flat_map(move |x| (0..n).map(move |y| TileCoord::new(level, x, y)))
    }
}
