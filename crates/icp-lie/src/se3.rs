use glam::{DMat3, DVec3};

use crate::so3::So3;
use crate::LieError;

/// A rigid body transformation `p' = R * p + t`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Se3 {
    rotation: So3,
    translation: DVec3,
}

impl Se3 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        rotation: So3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a transformation from a rotation and a translation.
    pub fn new(rotation: So3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build a transformation from a row-major 4x4 homogeneous matrix.
    pub fn from_matrix(matrix: &[[f64; 4]; 4]) -> Result<Self, LieError> {
        if matrix[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(LieError::InvalidHomogeneousRow(matrix[3]));
        }

        let [r0, r1, r2, _] = matrix;
        let rotation = So3::from_matrix(&DMat3::from_cols_array_2d(&[
            [r0[0], r1[0], r2[0]],
            [r0[1], r1[1], r2[1]],
            [r0[2], r1[2], r2[2]],
        ]))?;
        let translation = DVec3::new(r0[3], r1[3], r2[3]);
        if !translation.is_finite() {
            return Err(LieError::NonFinite);
        }

        Ok(Self {
            rotation,
            translation,
        })
    }

    /// The rotation part.
    #[inline]
    pub fn rotation(&self) -> &So3 {
        &self.rotation
    }

    /// The translation part.
    #[inline]
    pub fn translation(&self) -> DVec3 {
        self.translation
    }

    /// Lie algebra -> Lie group.
    ///
    /// The twist is `[v_x, v_y, v_z, w_x, w_y, w_z]`.
    pub fn exp(twist: &[f64; 6]) -> Self {
        let v = DVec3::new(twist[0], twist[1], twist[2]);
        let omega = DVec3::new(twist[3], twist[4], twist[5]);

        Self {
            rotation: So3::exp(omega),
            translation: So3::left_jacobian(omega) * v,
        }
    }

    /// Lie group -> Lie algebra.
    pub fn log(&self) -> [f64; 6] {
        let omega = self.rotation.log();
        let v = So3::left_jacobian_inverse(omega) * self.translation;
        [v.x, v.y, v.z, omega.x, omega.y, omega.z]
    }

    /// Compose two transformations as `self * other` (apply `other` first).
    pub fn compose(&self, other: &Se3) -> Self {
        Self {
            rotation: self.rotation.compose(&other.rotation),
            translation: self.rotation.rotate(other.translation) + self.translation,
        }
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -rotation.rotate(self.translation),
        }
    }

    /// Apply the transformation to a point.
    #[inline]
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        (self.rotation.rotate(DVec3::from_array(*point)) + self.translation).to_array()
    }

    /// Apply only the rotation part, e.g. to a surface normal.
    #[inline]
    pub fn rotate_vector(&self, vector: &[f64; 3]) -> [f64; 3] {
        self.rotation.rotate(DVec3::from_array(*vector)).to_array()
    }

    /// The row-major 4x4 homogeneous matrix of the transformation.
    pub fn matrix(&self) -> [[f64; 4]; 4] {
        let [r0, r1, r2] = self.rotation.to_rows();
        let t = self.translation;
        [
            [r0[0], r0[1], r0[2], t.x],
            [r1[0], r1[1], r1[2], t.y],
            [r2[0], r2[1], r2[2], t.z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}
