mod point_to_plane;
pub use point_to_plane::PointToPlane;

use crate::error::IcpError;
use crate::pointcloud::PointCloud;

/// Trait for the error models minimized by [`crate::Icp`].
///
/// The driver hands over index-aligned clouds: the `i`-th point of the current
/// cloud is matched with the `i`-th point of the reference cloud. Each pair
/// yields one residual and one Jacobian row with respect to the twist
/// `[v_x, v_y, v_z, w_x, w_y, w_z]` of a left perturbation of the current
/// points.
pub trait ErrorModel: Send + Sync {
    /// Set the matched reference points.
    fn set_input_reference(&mut self, reference: PointCloud);

    /// Set the current (transformed) source points and resize the buffers.
    fn set_input_current(&mut self, current: PointCloud);

    /// Fill the residual buffer.
    fn compute_error(&mut self) -> Result<(), IcpError>;

    /// Fill the Jacobian buffer.
    fn compute_jacobian(&mut self) -> Result<(), IcpError>;

    /// Residuals computed by the last [`ErrorModel::compute_error`].
    fn residuals(&self) -> &[f64];

    /// Jacobian rows computed by the last [`ErrorModel::compute_jacobian`].
    fn jacobian(&self) -> &[[f64; 6]];

    /// Whether the current cloud must carry normals.
    fn requires_normals(&self) -> bool {
        false
    }
}

impl<E: ErrorModel + ?Sized> ErrorModel for Box<E> {
    fn set_input_reference(&mut self, reference: PointCloud) {
        (**self).set_input_reference(reference)
    }

    fn set_input_current(&mut self, current: PointCloud) {
        (**self).set_input_current(current)
    }

    fn compute_error(&mut self) -> Result<(), IcpError> {
        (**self).compute_error()
    }

    fn compute_jacobian(&mut self) -> Result<(), IcpError> {
        (**self).compute_jacobian()
    }

    fn residuals(&self) -> &[f64] {
        (**self).residuals()
    }

    fn jacobian(&self) -> &[[f64; 6]] {
        (**self).jacobian()
    }

    fn requires_normals(&self) -> bool {
        (**self).requires_normals()
    }
}
