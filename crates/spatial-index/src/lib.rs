//! Nearest-neighbour indexes over mesh element positions.
//!
//! Every implementation answers the same question: which mesh element is
//! closest to a query point on the unit sphere. Ties are broken towards the
//! lowest element index so results are reproducible across runs and thread
//! counts.

mod brute;
mod rtree;

pub use brute::BruteForceIndex;
pub use rtree::RTreeIndex;

use rayon::prelude::*;
use tiler_common::{TilerError, TilerResult, Xyz};

/// Capability interface for spatial indexes.
///
/// Implementations are immutable after [`NearestIndex::build`] and must be
/// safe to query from many threads at once.
pub trait NearestIndex: Send + Sync {
    /// Build the index over mesh element positions.
    fn build(positions: &[Xyz]) -> TilerResult<Self>
    where
        Self: Sized;

    /// Number of indexed elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the element nearest to `query`.
    fn nearest_one(&self, query: &Xyz) -> u32;

    /// Bulk lookup, parallel over the rayon pool. Output order matches input.
    fn nearest(&self, queries: &[Xyz]) -> Vec<u32> {
        queries.par_iter().map(|q| self.nearest_one(q)).collect()
    }
}

/// Shared validation for index construction.
pub(crate) fn check_positions(positions: &[Xyz]) -> TilerResult<()> {
    if positions.is_empty() {
        return Err(TilerError::index_build("mesh has no elements"));
    }
    if positions.len() > u32::MAX as usize {
        return Err(TilerError::index_build(format!(
            "mesh has {} elements, more than a u32 index can address",
            positions.len()
        )));
    }
    if let Some(i) = positions
        .iter()
        .position(|p| p.iter().any(|c| !c.is_finite()))
    {
        return Err(TilerError::index_build(format!(
            "element {} has a non-finite position {:?}",
            i, positions[i]
        )));
    }
    Ok(())
}

#[inline]
pub(crate) fn distance_2(a: &Xyz, b: &Xyz) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}
