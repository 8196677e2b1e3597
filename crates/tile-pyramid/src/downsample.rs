//! Downsampling functions for generating pyramid levels.
//!
//! A pyramid step turns level L+1 into level L. The four level-(L+1) tiles
//! `(2x, 2y)`, `(2x+1, 2y)`, `(2x, 2y+1)` and `(2x+1, 2y+1)` are stitched into
//! a `2S x 2S` block (tile-x offset along pixel-x, tile-y offset along
//! pixel-y) and every 2x2 pixel block of it is reduced to one pixel of tile
//! `(x, y)`.
//!
//! Missing values are NaN. `Mean` and `Max` ignore NaN inputs and only
//! produce NaN when all four inputs are NaN.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tiler_common::{TilerError, TilerResult};

use crate::types::TileArray;

/// Method used to downsample tile data.
///
/// - **Mean**: continuous fields; every pixel is the mean of its 4 children
/// - **Max**: peak-preserving fields
/// - **Nearest**: top-left child, preserves exact values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMethod {
    /// Average of 2x2 block
    #[default]
    Mean,
    /// Maximum of 2x2 block
    Max,
    /// Top-left value of 2x2 block
    Nearest,
}

impl DownsampleMethod {
    /// Parse from string (case-insensitive), defaulting to `Mean`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "max" => Self::Max,
            "nearest" => Self::Nearest,
            _ => Self::Mean,
        }
    }
}

/// Downsample a 2D grid by a factor of 2.
///
/// Takes a grid of size (width, height) and produces a grid of size
/// (width/2, height/2), rounded down for odd dimensions.
///
/// # Arguments
/// * `data` - Input grid data in row-major order
/// * `width` - Width of input grid
/// * `height` - Height of input grid
/// * `method` - Downsampling method to use
///
/// # Returns
/// Tuple of (downsampled_data, new_width, new_height)
pub fn downsample_2x(
    data: &[f32],
    width: usize,
    height: usize,
    method: DownsampleMethod,
) -> (Vec<f32>, usize, usize) {
    let new_width = width / 2;
    let new_height = height / 2;

    if new_width == 0 || new_height == 0 {
        return (vec![], 0, 0);
    }

    let mut output = vec![f32::NAN; new_width * new_height];

    for out_y in 0..new_height {
        for out_x in 0..new_width {
            let in_x = out_x * 2;
            let in_y = out_y * 2;

            // Get 2x2 block values
            let v00 = data.get(in_y * width + in_x).copied().unwrap_or(f32::NAN);
            let v10 = data.get(in_y * width + in_x + 1).copied().unwrap_or(f32::NAN);
            let v01 = data.get((in_y + 1) * width + in_x).copied().unwrap_or(f32::NAN);
            let v11 = data
                .get((in_y + 1) * width + in_x + 1)
                .copied()
                .unwrap_or(f32::NAN);

            output[out_y * new_width + out_x] = reduce_block(method, v00, v10, v01, v11);
        }
    }

    (output, new_width, new_height)
}

#[inline]
fn reduce_block(method: DownsampleMethod, v00: f32, v10: f32, v01: f32, v11: f32) -> f32 {
    match method {
        DownsampleMethod::Mean => mean_of_block(v00, v10, v01, v11),
        DownsampleMethod::Max => max_of_block(v00, v10, v01, v11),
        DownsampleMethod::Nearest => v00,
    }
}

/// Calculate mean of a 2x2 block, handling NaN values.
///
/// If all values are NaN, returns NaN.
/// Otherwise, returns the mean of valid (non-NaN) values. The sum is
/// accumulated in f64 so four finite inputs give the correctly rounded mean.
#[inline]
fn mean_of_block(v00: f32, v10: f32, v01: f32, v11: f32) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0u32;

    for v in [v00, v10, v01, v11] {
        if !v.is_nan() {
            sum += v as f64;
            count += 1;
        }
    }

    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}

/// Calculate maximum of a 2x2 block, handling NaN values.
#[inline]
fn max_of_block(v00: f32, v10: f32, v01: f32, v11: f32) -> f32 {
    [v00, v10, v01, v11]
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(f32::NAN)
}

/// Derive level L from level L+1.
///
/// Fails with `PyramidConsistency` when `fine` is already level 0.
pub fn pyramid_step(fine: &TileArray<f32>, method: DownsampleMethod) -> TilerResult<TileArray<f32>> {
    let level = fine.level();
    if level == 0 {
        return Err(TilerError::pyramid_consistency(
            0,
            "level 0 has no coarser level",
        ));
    }

    let s = fine.tilesize() as usize;
    let mut coarse = TileArray::filled(level - 1, fine.tilesize(), f32::NAN)?;
    let coarse_n = coarse.num_tiles() as usize;

    coarse
        .data_mut()
        .par_chunks_mut(s * s)
        .enumerate()
        .for_each(|(i, out)| {
            let cx = (i / coarse_n) as u32;
            let cy = (i % coarse_n) as u32;
            let block = stitch_quadrants(fine, cx, cy);
            let (reduced, _, _) = downsample_2x(&block, 2 * s, 2 * s, method);
            out.copy_from_slice(&reduced);
        });

    Ok(coarse)
}

/// Row-major `2S x 2S` block of the four children of coarse tile (cx, cy).
fn stitch_quadrants(fine: &TileArray<f32>, cx: u32, cy: u32) -> Vec<f32> {
    let s = fine.tilesize() as usize;
    let width = 2 * s;
    let mut block = vec![f32::NAN; width * width];
    for iy in 0..2u32 {
        for ix in 0..2u32 {
            let tile = fine.tile(2 * cx + ix, 2 * cy + iy);
            for py in 0..s {
                let row = (iy as usize * s + py) * width + ix as usize * s;
                block[row..row + s].copy_from_slice(&tile[py * s..(py + 1) * s]);
            }
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_2x_mean() {
        // 4x4 grid with values 1-16
        let data: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        let (result, w, h) = downsample_2x(&data, 4, 4, DownsampleMethod::Mean);

        assert_eq!(w, 2);
        assert_eq!(h, 2);
        assert_eq!(result.len(), 4);

        // Top-left 2x2 block: 1,2,5,6 -> mean = 3.5
        assert_eq!(result[0], 3.5);
        // Top-right 2x2 block: 3,4,7,8 -> mean = 5.5
        assert_eq!(result[1], 5.5);
    }

    #[test]
    fn test_downsample_2x_max() {
        let data: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        let (result, _, _) = downsample_2x(&data, 4, 4, DownsampleMethod::Max);

        assert_eq!(result[0], 6.0);
        assert_eq!(result[1], 8.0);
    }

    #[test]
    fn test_downsample_2x_nearest() {
        let data: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        let (result, _, _) = downsample_2x(&data, 4, 4, DownsampleMethod::Nearest);

        // Top-left of each 2x2 block
        assert_eq!(result[0], 1.0);
        assert_eq!(result[1], 3.0);
    }

    #[test]
    fn test_downsample_handles_nan() {
        let data = vec![1.0, f32::NAN, 3.0, 4.0];
        let (result, w, h) = downsample_2x(&data, 2, 2, DownsampleMethod::Mean);

        assert_eq!(w, 1);
        assert_eq!(h, 1);
        // Mean of 1, 3, 4 (ignoring NaN)
        assert!((result[0] - 8.0 / 3.0).abs() < 1e-6);

        let (all_nan, _, _) = downsample_2x(&[f32::NAN; 4], 2, 2, DownsampleMethod::Max);
        assert!(all_nan[0].is_nan());
    }

    #[test]
    fn test_stitch_quadrants_placement() {
        // Level 1, tilesize 1: tile (x, y) holds 10*x + y
        let tiles = TileArray::new(1, 1, vec![0.0, 1.0, 10.0, 11.0]).unwrap();
        let block = stitch_quadrants(&tiles, 0, 0);
        // row 0: (0,0) (1,0); row 1: (0,1) (1,1)
        assert_eq!(block, vec![0.0, 10.0, 1.0, 11.0]);
    }

    #[test]
    fn test_pyramid_step_rejects_level_zero() {
        let tiles = TileArray::filled(0, 4, 1.0f32).unwrap();
        assert!(matches!(
            pyramid_step(&tiles, DownsampleMethod::Mean),
            Err(TilerError::PyramidConsistency { level: 0, .. })
        ));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(DownsampleMethod::from_str("MAX"), DownsampleMethod::Max);
        assert_eq!(DownsampleMethod::from_str("nearest"), DownsampleMethod::Nearest);
        assert_eq!(DownsampleMethod::from_str("other"), DownsampleMethod::Mean);
    }
}
