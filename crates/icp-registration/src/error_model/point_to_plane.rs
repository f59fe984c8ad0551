use glam::DVec3;
use rayon::prelude::*;

use super::ErrorModel;
use crate::error::IcpError;
use crate::pointcloud::PointCloud;

/// Point-to-plane error: signed distance of each current point to the tangent
/// plane through its matched reference point.
///
/// With `d = p - q` and `n` the normal of the current point `p`, the residual
/// is `r = w_x n_x d_x + w_y n_y d_y + w_z n_z d_z` where `w` are constant
/// per-axis weights (ones by default). The Jacobian row is the small-angle
/// linearization `[m, p x m]` with `m = w * n`, which reduces to `[n, p x n]`
/// for unit weights.
#[derive(Debug, Clone)]
pub struct PointToPlane {
    reference: PointCloud,
    current: PointCloud,
    axis_weights: [f64; 3],
    residuals: Vec<f64>,
    jacobian: Vec<[f64; 6]>,
    weights: Vec<[f64; 3]>,
}

impl Default for PointToPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl PointToPlane {
    /// Create a point-to-plane model with unit axis weights.
    pub fn new() -> Self {
        Self {
            reference: PointCloud::default(),
            current: PointCloud::default(),
            axis_weights: [1.0; 3],
            residuals: Vec::new(),
            jacobian: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Set constant per-axis weights applied to every correspondence.
    pub fn with_axis_weights(mut self, axis_weights: [f64; 3]) -> Self {
        self.axis_weights = axis_weights;
        self.weights.fill(axis_weights);
        self
    }

    /// The per-correspondence axis weights, one row per current point.
    pub fn weights(&self) -> &[[f64; 3]] {
        &self.weights
    }

    // both clouds must be index aligned and the current one must have normals
    fn check_inputs(&self) -> Result<&[[f64; 3]], IcpError> {
        if self.reference.len() != self.current.len() {
            return Err(IcpError::MismatchedLengths {
                left_name: "reference",
                left_len: self.reference.len(),
                right_name: "current",
                right_len: self.current.len(),
            });
        }
        self.current
            .normals()
            .ok_or(IcpError::MissingNormals("current"))
    }
}

impl ErrorModel for PointToPlane {
    fn set_input_reference(&mut self, reference: PointCloud) {
        self.reference = reference;
    }

    fn set_input_current(&mut self, current: PointCloud) {
        let n = current.len();
        self.current = current;
        self.residuals.clear();
        self.residuals.resize(n, 0.0);
        self.jacobian.clear();
        self.jacobian.resize(n, [0.0; 6]);
        self.weights.clear();
        self.weights.resize(n, self.axis_weights);
    }

    fn compute_error(&mut self) -> Result<(), IcpError> {
        let normals = self.check_inputs()?;
        let current = self.current.points();
        let reference = self.reference.points();

        let residuals = current
            .par_iter()
            .zip(reference.par_iter())
            .zip(normals.par_iter())
            .zip(self.weights.par_iter())
            .map(|(((p, q), n), w)| {
                let d = DVec3::from_array(*p) - DVec3::from_array(*q);
                (DVec3::from_array(*w) * DVec3::from_array(*n)).dot(d)
            })
            .collect::<Vec<_>>();

        if let Some(index) = residuals.iter().position(|r| !r.is_finite()) {
            log::warn!("non-finite point-to-plane residual at correspondence {index}");
            return Err(IcpError::NonFiniteResidual { index });
        }

        self.residuals = residuals;
        Ok(())
    }

    fn compute_jacobian(&mut self) -> Result<(), IcpError> {
        let normals = self.check_inputs()?;
        let current = self.current.points();

        let jacobian = current
            .par_iter()
            .zip(normals.par_iter())
            .zip(self.weights.par_iter())
            .map(|((p, n), w)| {
                let m = DVec3::from_array(*w) * DVec3::from_array(*n);
                let p_cross_m = DVec3::from_array(*p).cross(m);
                [m.x, m.y, m.z, p_cross_m.x, p_cross_m.y, p_cross_m.z]
            })
            .collect::<Vec<_>>();

        if let Some(index) = jacobian.iter().position(|row| row.iter().any(|v| !v.is_finite())) {
            log::warn!("non-finite point-to-plane jacobian at correspondence {index}");
            return Err(IcpError::NonFiniteResidual { index });
        }

        self.jacobian = jacobian;
        Ok(())
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn jacobian(&self) -> &[[f64; 6]] {
        &self.jacobian
    }

    fn requires_normals(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(
        current: Vec<[f64; 3]>,
        normals: Vec<[f64; 3]>,
        reference: Vec<[f64; 3]>,
    ) -> Result<PointToPlane, IcpError> {
        let mut model = PointToPlane::new();
        model.set_input_reference(PointCloud::new(reference));
        model.set_input_current(PointCloud::with_normals(current, normals)?);
        Ok(model)
    }

    #[test]
    fn test_residual_is_signed_plane_distance() -> Result<(), IcpError> {
        let mut model = pair(
            vec![[1.0, 2.0, 0.5], [0.0, 0.0, -0.25]],
            vec![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
            vec![[0.0, 0.0, 0.0], [3.0, 3.0, 0.0]],
        )?;
        model.compute_error()?;
        assert_eq!(model.residuals(), &[0.5, -0.25]);
        Ok(())
    }

    #[test]
    fn test_jacobian_row() -> Result<(), IcpError> {
        let mut model = pair(
            vec![[1.0, 2.0, 3.0]],
            vec![[0.0, 0.0, 1.0]],
            vec![[1.0, 2.0, 3.0]],
        )?;
        model.compute_jacobian()?;
        // p x n = (2, -1, 0)
        assert_eq!(model.jacobian(), &[[0.0, 0.0, 1.0, 2.0, -1.0, 0.0]]);
        Ok(())
    }

    #[test]
    fn test_jacobian_matches_finite_differences() -> Result<(), Box<dyn std::error::Error>> {
        let p = [0.3, -0.7, 1.2];
        let q = [0.1, -0.5, 1.0];
        let n = {
            let n = [0.2_f64, 0.5, 0.8];
            let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            [n[0] / norm, n[1] / norm, n[2] / norm]
        };

        let mut model = pair(vec![p], vec![n], vec![q])?;
        model.compute_error()?;
        model.compute_jacobian()?;
        let r0 = model.residuals()[0];
        let row = model.jacobian()[0];

        // perturb the current point (normal kept fixed) with a small left twist
        let h = 1e-7;
        for k in 0..6 {
            let mut twist = [0.0; 6];
            twist[k] = h;
            let pose = icp_lie::se3::Se3::exp(&twist);
            let moved = pose.transform_point(&p);
            let mut model = pair(vec![moved], vec![n], vec![q])?;
            model.compute_error()?;
            let derivative = (model.residuals()[0] - r0) / h;
            assert_relative_eq!(derivative, row[k], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_axis_weights() -> Result<(), IcpError> {
        let mut model = pair(
            vec![[1.0, 1.0, 1.0]],
            vec![[1.0, 1.0, 1.0]],
            vec![[0.0, 0.0, 0.0]],
        )?
        .with_axis_weights([1.0, 0.0, 2.0]);
        assert_eq!(model.weights(), &[[1.0, 0.0, 2.0]]);
        model.compute_error()?;
        assert_eq!(model.residuals(), &[3.0]);
        Ok(())
    }

    #[test]
    fn test_missing_normals() {
        let mut model = PointToPlane::new();
        model.set_input_reference(PointCloud::new(vec![[0.0; 3]]));
        model.set_input_current(PointCloud::new(vec![[0.0; 3]]));
        assert!(matches!(
            model.compute_error(),
            Err(IcpError::MissingNormals("current"))
        ));
        assert!(model.requires_normals());
    }

    #[test]
    fn test_mismatched_lengths() -> Result<(), IcpError> {
        let mut model = pair(vec![[0.0; 3]], vec![[0.0, 0.0, 1.0]], vec![[0.0; 3]; 2])?;
        let err = model.compute_jacobian().err();
        assert!(matches!(
            err,
            Some(IcpError::MismatchedLengths {
                left_len: 2,
                right_len: 1,
                ..
            })
        ));
        assert_eq!(err.map(|e| e.kind()), Some(crate::IcpErrorKind::Numerical));
        Ok(())
    }

    #[test]
    fn test_non_finite_residual() -> Result<(), IcpError> {
        let mut model = pair(
            vec![[0.0; 3], [1.0, 0.0, 0.0]],
            vec![[0.0, 0.0, 1.0], [f64::NAN, 0.0, 0.0]],
            vec![[0.0; 3], [0.0; 3]],
        )?;
        assert!(matches!(
            model.compute_error(),
            Err(IcpError::NonFiniteResidual { index: 1 })
        ));
        assert!(matches!(
            model.compute_jacobian(),
            Err(IcpError::NonFiniteResidual { index: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_buffers_resized() -> Result<(), IcpError> {
        let mut model = pair(vec![[0.0; 3]; 4], vec![[0.0, 0.0, 1.0]; 4], vec![[0.0; 3]; 4])?;
        assert_eq!(model.residuals().len(), 4);
        assert_eq!(model.jacobian().len(), 4);
        assert_eq!(model.weights(), &[[1.0; 3]; 4]);
        Ok(())
    }
}
