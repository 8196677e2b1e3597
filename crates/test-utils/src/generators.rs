//! Synthetic mesh generators.
//!
//! Meshes are returned as plain latitude/longitude arrays in degrees so the
//! generators stay independent of the tiler's own types.

/// A mesh described by element centroids and one scalar field.
#[derive(Debug, Clone)]
pub struct MeshFixture {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub values: Vec<f32>,
}

impl MeshFixture {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }
}

/// Four equatorial elements at 0°E, 90°E, 180°E and 270°E with values 1..=4.
pub fn cardinal_mesh() -> MeshFixture {
    MeshFixture {
        lats: vec![0.0; 4],
        lons: vec![0.0, 90.0, 180.0, 270.0],
        values: vec![1.0, 2.0, 3.0, 4.0],
    }
}

/// Near-uniform points on the sphere using the Fibonacci lattice.
///
/// Values are the element index, so gathered tiles reveal which element
/// each pixel picked.
///
/// # Example
///
/// ```
/// use test_utils::fibonacci_mesh;
///
/// let mesh = fibonacci_mesh(100);
/// assert_eq!(mesh.len(), 100);
/// assert!(mesh.lats.iter().all(|lat| lat.abs() <= 90.0));
/// ```
pub fn fibonacci_mesh(n: usize) -> MeshFixture {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    let mut lats = Vec::with_capacity(n);
    let mut lons = Vec::with_capacity(n);
    for i in 0..n {
        let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
        let lat = z.asin().to_degrees();
        let lon = ((golden * i as f64).to_degrees() + 180.0).rem_euclid(360.0) - 180.0;
        lats.push(lat);
        lons.push(lon);
    }
    MeshFixture {
        lats,
        lons,
        values: (0..n).map(|i| i as f32).collect(),
    }
}

/// Regular lat/lon grid of cell centres, `nlat` rows by `nlon` columns.
///
/// Values follow `row * 1000 + col` for easy verification.
pub fn latlon_grid_mesh(nlat: usize, nlon: usize) -> MeshFixture {
    let mut mesh = MeshFixture {
        lats: Vec::with_capacity(nlat * nlon),
        lons: Vec::with_capacity(nlat * nlon),
        values: Vec::with_capacity(nlat * nlon),
    };
    for row in 0..nlat {
        let lat = 90.0 - (row as f64 + 0.5) * 180.0 / nlat as f64;
        for col in 0..nlon {
            let lon = -180.0 + (col as f64 + 0.5) * 360.0 / nlon as f64;
            mesh.lats.push(lat);
            mesh.lons.push(lon);
            mesh.values.push((row * 1000 + col) as f32);
        }
    }
    mesh
}

/// Tile data with predictable values, laid out `[tx, ty, py, px]`.
///
/// Each value is its flat position, so any reshuffling is visible.
pub fn sequential_tiles(level: u32, tilesize: usize) -> Vec<f32> {
    let n = 1usize << level;
    (0..n * n * tilesize * tilesize).map(|i| i as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal_mesh() {
        let mesh = cardinal_mesh();
        assert_eq!(mesh.len(), 4);
        assert_eq!(mesh.values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_latlon_grid_mesh_values() {
        let mesh = latlon_grid_mesh(3, 4);
        assert_eq!(mesh.len(), 12);
        assert_eq!(mesh.values[5], 1001.0);
        assert!((mesh.lats[0] - 60.0).abs() < 1e-9);
        assert!((mesh.lons[0] + 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequential_tiles_len() {
        assert_eq!(sequential_tiles(2, 3).len(), 16 * 9);
    }
}
