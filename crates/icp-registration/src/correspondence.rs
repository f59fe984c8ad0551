use rayon::prelude::*;

use crate::spatial::SpatialIndex;

/// A matched pair between a source point and its nearest target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index of the point in the source set.
    pub source_index: usize,
    /// Index of the nearest point in the target set.
    pub target_index: usize,
    /// Euclidean distance between both points.
    pub distance: f64,
}

/// Find the nearest target point of every source point.
///
/// The queries run in parallel; each one writes its own slot, so the output is
/// ordered by source index. Matches farther than `max_distance` are rejected.
pub fn find_correspondences<S: SpatialIndex>(
    source: &[[f64; 3]],
    index: &S,
    max_distance: f64,
) -> Vec<Correspondence> {
    let slots = source
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            index
                .nearest_neighbor(p)
                .filter(|nn| nn.distance <= max_distance)
                .map(|nn| Correspondence {
                    source_index: i,
                    target_index: nn.index,
                    distance: nn.distance,
                })
        })
        .collect::<Vec<_>>();

    slots.into_iter().flatten().collect()
}
