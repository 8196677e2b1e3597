//! Lat/lon to unit-sphere Cartesian conversion.
//!
//! Mesh positions and pixel queries must both go through [`latlon_to_xyz`]:
//! Euclidean distance between the resulting points is monotonic in
//! great-circle distance, so nearest-neighbour search in this embedding is
//! nearest-neighbour search on the sphere.

use crate::error::{TilerError, TilerResult};

/// A point on the unit sphere.
pub type Xyz = [f64; 3];

/// Convert latitude/longitude in degrees to a unit-sphere point.
///
/// Latitude is measured from the equator, longitude eastward from the
/// prime meridian.
#[inline]
pub fn latlon_to_xyz(lat: f64, lon: f64) -> Xyz {
    let lat = lat.to_radians();
    let lon = lon.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

/// Convert equal-length latitude and longitude arrays to unit-sphere points.
pub fn latlon_to_xyz_many(lats: &[f64], lons: &[f64]) -> TilerResult<Vec<Xyz>> {
    if lats.len() != lons.len() {
        return Err(TilerError::configuration(format!(
            "latitude and longitude lengths differ: {} vs {}",
            lats.len(),
            lons.len()
        )));
    }
    Ok(lats
        .iter()
        .zip(lons)
        .map(|(&lat, &lon)| latlon_to_xyz(lat, lon))
        .collect())
}

/// Inverse of [`latlon_to_xyz`], returning (lat, lon) in degrees.
pub fn xyz_to_latlon(p: &Xyz) -> (f64, f64) {
    let [x, y, z] = *p;
    let lat = z.atan2((x * x + y * y).sqrt()).to_degrees();
    let lon = y.atan2(x).to_degrees();
    (lat, lon)
}
