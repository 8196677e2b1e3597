//! Tile array types.

use tiler_common::{num_tiles, validate_tiling, TileCoord, TilerError, TilerResult};

use crate::mesh::ElementKind;

/// A full zoom level of tiles stored as one flat buffer.
///
/// Logical shape is `[n, n, S, S]` indexed `[tile-x, tile-y, pixel-y,
/// pixel-x]` with `n = 2^level` and `S = tilesize`; each tile's `S * S`
/// pixels are contiguous and row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TileArray<T> {
    level: u32,
    tilesize: u32,
    data: Vec<T>,
}

impl<T: Copy> TileArray<T> {
    /// Wrap an existing buffer, checking its length against the shape.
    pub fn new(level: u32, tilesize: u32, data: Vec<T>) -> TilerResult<Self> {
        validate_tiling(level, tilesize)?;
        let expected = Self::element_count(level, tilesize);
        if data.len() != expected {
            return Err(TilerError::configuration(format!(
                "level {} tilesize {} needs {} values, got {}",
                level,
                tilesize,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            level,
            tilesize,
            data,
        })
    }

    /// A level where every pixel holds `value`.
    pub fn filled(level: u32, tilesize: u32, value: T) -> TilerResult<Self> {
        validate_tiling(level, tilesize)?;
        Ok(Self {
            level,
            tilesize,
            data: vec![value; Self::element_count(level, tilesize)],
        })
    }

    fn element_count(level: u32, tilesize: u32) -> usize {
        let n = num_tiles(level) as usize;
        let s = tilesize as usize;
        n * n * s * s
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn tilesize(&self) -> u32 {
        self.tilesize
    }

    /// Tiles per axis.
    pub fn num_tiles(&self) -> u32 {
        num_tiles(self.level)
    }

    /// Shape as `[tile-x, tile-y, pixel-y, pixel-x]`.
    pub fn shape(&self) -> [usize; 4] {
        let n = self.num_tiles() as usize;
        let s = self.tilesize as usize;
        [n, n, s, s]
    }

    /// Pixels per tile.
    #[inline]
    pub fn tile_len(&self) -> usize {
        self.tilesize as usize * self.tilesize as usize
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Flat offset of the first pixel of tile (tx, ty).
    #[inline]
    fn tile_offset(&self, tx: u32, ty: u32) -> usize {
        (tx as usize * self.num_tiles() as usize + ty as usize) * self.tile_len()
    }

    /// Tile coordinate of the `i`-th tile in storage order.
    #[inline]
    pub fn coord_at(&self, i: usize) -> TileCoord {
        let n = self.num_tiles() as usize;
        TileCoord::new(self.level, (i / n) as u32, (i % n) as u32)
    }

    /// Pixels of tile (tx, ty), row-major.
    pub fn tile(&self, tx: u32, ty: u32) -> &[T] {
        let start = self.tile_offset(tx, ty);
        &self.data[start..start + self.tile_len()]
    }

    pub fn tile_mut(&mut self, tx: u32, ty: u32) -> &mut [T] {
        let start = self.tile_offset(tx, ty);
        let len = self.tile_len();
        &mut self.data[start..start + len]
    }

    /// Value at `[tx, ty, py, px]`.
    pub fn get(&self, tx: u32, ty: u32, py: u32, px: u32) -> T {
        self.tile(tx, ty)[py as usize * self.tilesize as usize + px as usize]
    }

    /// Value at global pixel (gx, gy) of the level's `n*S` square.
    pub fn global_pixel(&self, gx: u32, gy: u32) -> T {
        let s = self.tilesize;
        self.get(gx / s, gy / s, gy % s, gx % s)
    }

    /// Apply `f` to every pixel, keeping the layout.
    pub fn map<U, F>(&self, f: F) -> TileArray<U>
    where
        F: Fn(T) -> U,
    {
        TileArray {
            level: self.level,
            tilesize: self.tilesize,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// The per-pixel nearest-element map for one zoom level.
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndex {
    /// Element index of every pixel.
    pub tiles: TileArray<u32>,
    /// What the indices refer to.
    pub element_kind: ElementKind,
}

impl TileIndex {
    /// Name of the persisted array, e.g. `cell_of_pixel`.
    pub fn array_name(&self) -> String {
        format!("{}_of_pixel", self.element_kind.as_str())
    }

    /// Largest element index referenced, if any pixel exists.
    pub fn max_element(&self) -> Option<u32> {
        self.tiles.data().iter().copied().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_tx_ty_py_px() {
        let data: Vec<u32> = (0..4 * 9).collect();
        let tiles = TileArray::new(1, 3, data).unwrap();
        assert_eq!(tiles.shape(), [2, 2, 3, 3]);
        // tile (0, 1) is second in storage order
        assert_eq!(tiles.get(0, 1, 0, 0), 9);
        // tile (1, 0) is third
        assert_eq!(tiles.get(1, 0, 2, 1), 18 + 7);
        assert_eq!(tiles.coord_at(2), TileCoord::new(1, 1, 0));
    }

    #[test]
    fn test_global_pixel() {
        let data: Vec<u32> = (0..16).collect();
        let tiles = TileArray::new(1, 2, data).unwrap();
        // global (3, 0): tile x=1, y=0, pixel (0, 1)
        assert_eq!(tiles.global_pixel(3, 0), tiles.get(1, 0, 0, 1));
        // global (0, 2): tile x=0, y=1, pixel (0, 0)
        assert_eq!(tiles.global_pixel(0, 2), tiles.get(0, 1, 0, 0));
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(TileArray::new(1, 2, vec![0u32; 15]).is_err());
        assert!(TileArray::new(0, 0, Vec::<u32>::new()).is_err());
    }

    #[test]
    fn test_tile_mut() {
        let mut tiles = TileArray::filled(1, 2, 0.0f32).unwrap();
        tiles.tile_mut(1, 1).fill(7.0);
        assert_eq!(tiles.get(1, 1, 1, 1), 7.0);
        assert_eq!(tiles.get(1, 0, 1, 1), 0.0);
    }

    #[test]
    fn test_array_name() {
        let index = TileIndex {
            tiles: TileArray::filled(0, 1, 0).unwrap(),
            element_kind: ElementKind::Node,
        };
        assert_eq!(index.array_name(), "node_of_pixel");
        assert_eq!(index.max_element(), Some(0));
    }
}
