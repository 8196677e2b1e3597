use tiler_common::{TilerResult, Xyz};

use crate::{check_positions, distance_2, NearestIndex};

/// Linear scan over all elements.
///
/// Exact by construction; used as a reference for [`crate::RTreeIndex`] and
/// for very small meshes. Query cost is O(N) per point.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    positions: Vec<Xyz>,
}

impl NearestIndex for BruteForceIndex {
    fn build(positions: &[Xyz]) -> TilerResult<Self> {
        check_positions(positions)?;
        Ok(Self {
            positions: positions.to_vec(),
        })
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn nearest_one(&self, query: &Xyz) -> u32 {
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for (i, p) in self.positions.iter().enumerate() {
            let d = distance_2(p, query);
            // strict comparison keeps the lowest index on ties
            if d < best_d {
                best = i;
                best_d = d;
            }
        }
        best as u32
    }
}
