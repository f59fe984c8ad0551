use rayon::prelude::*;

use crate::pointcloud::PointCloud;
use crate::spatial::{KdTreeIndex, SpatialIndex};

/// Fallback normal when a neighborhood is too small to fit a plane.
const DEFAULT_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

/// Estimate surface normals with PCA over the `k` nearest neighbors.
///
/// The normal is the direction of least variance of the neighborhood, i.e.
/// the last right singular vector of its covariance, and it is flipped to face
/// `viewpoint`. Points with fewer than 3 neighbors get `[0, 0, 1]`.
///
/// Returns a copy of `cloud` with the normals attached.
pub fn estimate_normals(cloud: &PointCloud, k: usize, viewpoint: [f64; 3]) -> PointCloud {
    let index = KdTreeIndex::build(cloud.points());
    estimate_normals_with_index(cloud, &index, k, viewpoint)
}

/// Same as [`estimate_normals`] but reuses an index built over `cloud`.
pub fn estimate_normals_with_index<S: SpatialIndex>(
    cloud: &PointCloud,
    index: &S,
    k: usize,
    viewpoint: [f64; 3],
) -> PointCloud {
    let points = cloud.points();

    let normals = points
        .par_iter()
        .map(|point| {
            let neighbors = index.knn(point, k);
            if neighbors.len() < 3 {
                return DEFAULT_NORMAL;
            }

            let count = neighbors.len() as f64;
            let mut centroid = [0.0; 3];
            for nn in &neighbors {
                for (c, v) in centroid.iter_mut().zip(points[nn.index].iter()) {
                    *c += v / count;
                }
            }

            let mut cov = [[0.0; 3]; 3];
            for nn in &neighbors {
                let p = &points[nn.index];
                let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
                for (i, row) in cov.iter_mut().enumerate() {
                    for (j, val) in row.iter_mut().enumerate() {
                        *val += d[i] * d[j];
                    }
                }
            }

            // singular values come sorted in decreasing order
            let cov_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| cov[i][j]);
            let svd = cov_mat.svd();
            let v = svd.v();
            let mut normal = [v.read(0, 2), v.read(1, 2), v.read(2, 2)];

            let norm = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2])
                .sqrt();
            if !(norm > 1e-12) {
                return DEFAULT_NORMAL;
            }

            // orient toward the viewpoint
            let to_view = [
                viewpoint[0] - point[0],
                viewpoint[1] - point[1],
                viewpoint[2] - point[2],
            ];
            let dot = normal[0] * to_view[0] + normal[1] * to_view[1] + normal[2] * to_view[2];
            let sign = if dot < 0.0 { -1.0 } else { 1.0 };
            for n in normal.iter_mut() {
                *n *= sign / norm;
            }

            normal
        })
        .collect::<Vec<_>>();

    PointCloud::with_normals(points.to_vec(), normals).unwrap_or_else(|_| cloud.clone())
}
