use icp_lie::se3::Se3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Errors raised when building a point cloud.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// The number of normals differs from the number of points.
    #[error("Normals length ({normals}) does not match points length ({points})")]
    MismatchedNormals {
        /// Number of points.
        points: usize,
        /// Number of normals.
        normals: usize,
    },
}

/// A point cloud with points and optional normals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The normals of the points, one per point when present.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud without normals.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            normals: None,
        }
    }

    /// Create a new point cloud with one normal per point.
    pub fn with_normals(
        points: Vec<[f64; 3]>,
        normals: Vec<[f64; 3]>,
    ) -> Result<Self, PointCloudError> {
        if points.len() != normals.len() {
            return Err(PointCloudError::MismatchedNormals {
                points: points.len(),
                normals: normals.len(),
            });
        }
        Ok(Self {
            points,
            normals: Some(normals),
        })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Check if the point cloud carries normals.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Apply a rigid transformation, rotating the normals along with the points.
    pub fn transform(&self, pose: &Se3) -> PointCloud {
        let points = self
            .points
            .par_iter()
            .map(|p| pose.transform_point(p))
            .collect();
        let normals = self
            .normals
            .as_ref()
            .map(|normals| normals.par_iter().map(|n| pose.rotate_vector(n)).collect());

        PointCloud { points, normals }
    }

    /// Gather the points (and normals) at `indices`, in that order.
    ///
    /// PRECONDITION: every index is lower than `self.len()`.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let normals = self
            .normals
            .as_ref()
            .map(|normals| indices.iter().map(|&i| normals[i]).collect());

        PointCloud { points, normals }
    }
}
