use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use tracing::debug;

use tiler_common::{TilerResult, Xyz};

use crate::{check_positions, distance_2, NearestIndex};

type IndexedPoint = GeomWithData<Xyz, u32>;

/// R*-tree over the 3-D unit-sphere embedding.
///
/// Queries search a cube around the query point, doubling its half-width
/// until the best hit lies within that half-width. Every element at the
/// minimal distance is then inside the cube, so ties resolve to the lowest
/// element index.
pub struct RTreeIndex {
    tree: RTree<IndexedPoint>,
    /// Starting half-width of the search cube.
    initial_radius: f64,
}

impl NearestIndex for RTreeIndex {
    fn build(positions: &[Xyz]) -> TilerResult<Self> {
        check_positions(positions)?;
        let points: Vec<IndexedPoint> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(*p, i as u32))
            .collect();
        let tree = RTree::bulk_load(points);

        // Typical spacing of N points spread over the unit sphere.
        let initial_radius = (4.0 * std::f64::consts::PI / positions.len() as f64).sqrt();
        debug!(
            elements = tree.size(),
            initial_radius, "Built R*-tree index"
        );
        Ok(Self {
            tree,
            initial_radius,
        })
    }

    fn len(&self) -> usize {
        self.tree.size()
    }

    fn nearest_one(&self, query: &Xyz) -> u32 {
        let mut radius = self.initial_radius;
        loop {
            let envelope = AABB::from_corners(
                [query[0] - radius, query[1] - radius, query[2] - radius],
                [query[0] + radius, query[1] + radius, query[2] + radius],
            );

            let mut hits = 0usize;
            let mut best: Option<(f64, u32)> = None;
            for candidate in self.tree.locate_in_envelope_intersecting(&envelope) {
                hits += 1;
                let d = distance_2(candidate.geom(), query);
                best = match best {
                    Some((best_d, best_i)) if best_d < d || (best_d == d && best_i < candidate.data) => {
                        Some((best_d, best_i))
                    }
                    _ => Some((d, candidate.data)),
                };
            }

            match best {
                Some((d, i)) if d <= radius * radius || hits == self.tree.size() => return i,
                _ if radius > MAX_RADIUS => return self.scan(query),
                _ => radius *= 2.0,
            }
        }
    }
}

/// Beyond this the query is nowhere near the mesh (or not finite).
const MAX_RADIUS: f64 = 1.0e6;

impl RTreeIndex {
    fn scan(&self, query: &Xyz) -> u32 {
        self.tree
            .iter()
            .map(|p| (distance_2(p.geom(), query), p.data))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map_or(0, |(_, i)| i)
    }
}
