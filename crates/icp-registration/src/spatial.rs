use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use std::cmp::Ordering;
use std::num::NonZero;

/// A neighbor returned by a spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the indexed set.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

/// Nearest neighbor oracle over a fixed reference point set.
///
/// Implementations are built once and never mutated afterwards, so they can be
/// queried concurrently. All distances are Euclidean (not squared).
pub trait SpatialIndex: Sized + Sync {
    /// Build the index over `points`.
    fn build(points: &[[f64; 3]]) -> Self;

    /// Number of indexed points.
    fn len(&self) -> usize;

    /// Check if the index holds no point.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The closest point to `query`; ties are broken by the lowest index.
    ///
    /// Returns `None` if the index is empty or the query is not finite.
    fn nearest_neighbor(&self, query: &[f64; 3]) -> Option<Neighbor>;

    /// The `k` closest points sorted by `(distance, index)`.
    fn knn(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor>;

    /// All points with `distance <= radius`, sorted by `(distance, index)`.
    fn radius_search(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor>;
}

fn by_distance_then_index(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

#[inline]
fn is_finite3(p: &[f64; 3]) -> bool {
    p.iter().all(|v| v.is_finite())
}

/// Item stored in the kd-tree leaves: the position in the reference set.
///
/// `usize` so that any slice index fits without narrowing.
type KdItem = usize;

/// A kd-tree index built on kiddo's `ImmutableKdTree`.
#[derive(Debug, Clone)]
pub struct KdTreeIndex {
    tree: Option<ImmutableKdTree<f64, KdItem, 3, 32>>,
    num_points: usize,
}

impl SpatialIndex for KdTreeIndex {
    fn build(points: &[[f64; 3]]) -> Self {
        let tree = (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(points));
        Self {
            tree,
            num_points: points.len(),
        }
    }

    fn len(&self) -> usize {
        self.num_points
    }

    fn nearest_neighbor(&self, query: &[f64; 3]) -> Option<Neighbor> {
        let tree = self.tree.as_ref()?;
        if !is_finite3(query) {
            return None;
        }

        let nn = tree.nearest_one::<SquaredEuclidean>(query);

        // kiddo returns any of the equidistant points, look for a lower index
        // among the ones sharing the best distance. `within_unsorted` is strict.
        let radius_sq = nn.distance + nn.distance * f64::EPSILON + f64::MIN_POSITIVE;
        let index = tree
            .within_unsorted::<SquaredEuclidean>(query, radius_sq)
            .into_iter()
            .filter(|candidate| candidate.distance <= nn.distance)
            .map(|candidate| candidate.item)
            .fold(nn.item, KdItem::min);

        Some(Neighbor {
            index,
            distance: nn.distance.sqrt(),
        })
    }

    fn knn(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let (Some(tree), Some(nz_k)) = (self.tree.as_ref(), NonZero::new(k)) else {
            return Vec::new();
        };
        if !is_finite3(query) {
            return Vec::new();
        }

        let mut neighbors = tree
            .nearest_n::<SquaredEuclidean>(query, nz_k)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item,
                distance: nn.distance.sqrt(),
            })
            .collect::<Vec<_>>();
        neighbors.sort_by(by_distance_then_index);
        neighbors
    }

    fn radius_search(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if radius < 0.0 || !radius.is_finite() || !is_finite3(query) {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        let query_radius_sq = radius_sq + f64::EPSILON * radius_sq.max(1.0);

        let mut neighbors = tree
            .within_unsorted::<SquaredEuclidean>(query, query_radius_sq)
            .into_iter()
            .filter(|nn| nn.distance <= radius_sq)
            .map(|nn| Neighbor {
                index: nn.item,
                distance: nn.distance.sqrt(),
            })
            .collect::<Vec<_>>();
        neighbors.sort_by(by_distance_then_index);
        neighbors
    }
}

/// Exhaustive linear scan over the reference points.
///
/// Same contract as [`KdTreeIndex`]; useful for tiny clouds and as a reference
/// when checking other indices.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    points: Vec<[f64; 3]>,
}

impl BruteForceIndex {
    fn scan<'a>(&'a self, query: &'a [f64; 3]) -> impl Iterator<Item = Neighbor> + 'a {
        self.points.iter().enumerate().map(move |(index, p)| {
            let dx = p[0] - query[0];
            let dy = p[1] - query[1];
            let dz = p[2] - query[2];
            Neighbor {
                index,
                distance: (dx * dx + dy * dy + dz * dz).sqrt(),
            }
        })
    }
}

impl SpatialIndex for BruteForceIndex {
    fn build(points: &[[f64; 3]]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn nearest_neighbor(&self, query: &[f64; 3]) -> Option<Neighbor> {
        if !is_finite3(query) {
            return None;
        }
        // min_by keeps the first of equal elements, i.e. the lowest index
        self.scan(query)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn knn(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        if k == 0 || !is_finite3(query) {
            return Vec::new();
        }
        let mut neighbors = self.scan(query).collect::<Vec<_>>();
        neighbors.sort_by(by_distance_then_index);
        neighbors.truncate(k);
        neighbors
    }

    fn radius_search(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        if radius < 0.0 || !radius.is_finite() || !is_finite3(query) {
            return Vec::new();
        }
        let mut neighbors = self
            .scan(query)
            .filter(|nn| nn.distance <= radius)
            .collect::<Vec<_>>();
        neighbors.sort_by(by_distance_then_index);
        neighbors
    }
}
