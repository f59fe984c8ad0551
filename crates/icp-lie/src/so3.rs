use glam::{DMat3, DVec3};

use crate::LieError;

/// Squared angle under which the Taylor expansions of the closed forms are used.
const SMALL_ANGLE_SQ: f64 = 1e-8;

/// Distance to pi under which the logarithm switches to the symmetric branch.
const NEAR_PI: f64 = 1e-6;

/// Tolerance used to accept a matrix as a rotation.
const ORTHONORMAL_TOL: f64 = 1e-6;

/// A 3D rotation stored as a 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct So3 {
    matrix: DMat3,
}

impl Default for So3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl So3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self {
        matrix: DMat3::IDENTITY,
    };

    /// Build a rotation from a matrix.
    ///
    /// Fails if the matrix is not orthonormal with determinant +1.
    pub fn from_matrix(matrix: &DMat3) -> Result<Self, LieError> {
        if !matrix.is_finite() {
            return Err(LieError::NonFinite);
        }

        // R * R^T must be the identity
        let gram = *matrix * matrix.transpose() - DMat3::IDENTITY;
        let deviation = gram
            .to_cols_array()
            .iter()
            .fold((matrix.determinant() - 1.0).abs(), |acc, v| acc.max(v.abs()));

        if deviation > ORTHONORMAL_TOL {
            return Err(LieError::NotOrthonormal(deviation));
        }

        Ok(Self { matrix: *matrix })
    }

    /// Build a rotation from a row-major array.
    pub fn from_rows(rows: &[[f64; 3]; 3]) -> Result<Self, LieError> {
        Self::from_matrix(&DMat3::from_cols_array_2d(rows).transpose())
    }

    /// Get the rotation matrix.
    #[inline]
    pub fn matrix(&self) -> DMat3 {
        self.matrix
    }

    /// The rotation as a row-major array.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        self.matrix.transpose().to_cols_array_2d()
    }

    /// Lie algebra -> Lie group (Rodrigues formula).
    pub fn exp(omega: DVec3) -> Self {
        let theta_sq = omega.length_squared();

        let (a, b) = if theta_sq < SMALL_ANGLE_SQ {
            (1.0 - theta_sq / 6.0, 0.5 - theta_sq / 24.0)
        } else {
            let theta = theta_sq.sqrt();
            (theta.sin() / theta, (1.0 - theta.cos()) / theta_sq)
        };

        let skew = Self::hat(omega);
        Self {
            matrix: DMat3::IDENTITY + a * skew + b * (skew * skew),
        }
    }

    /// Lie group -> Lie algebra.
    ///
    /// The returned rotation vector has a norm in `[0, pi]`.
    pub fn log(&self) -> DVec3 {
        let m = &self.matrix;
        let cos_theta = ((m.x_axis.x + m.y_axis.y + m.z_axis.z - 1.0) * 0.5).clamp(-1.0, 1.0);
        let theta = cos_theta.acos();

        // vee(R - R^T) = 2 sin(theta) * axis
        let anti = Self::vee(*m - m.transpose());

        if theta * theta < SMALL_ANGLE_SQ {
            return anti * (0.5 * (1.0 + theta * theta / 6.0));
        }

        if std::f64::consts::PI - theta < NEAR_PI {
            // R ~ 2 n n^T - I, recover the axis from the dominant column
            let diagonal = DVec3::new(m.x_axis.x, m.y_axis.y, m.z_axis.z);
            let k = (0..3)
                .max_by(|&a, &b| diagonal[a].total_cmp(&diagonal[b]))
                .unwrap_or(0);
            let column = m.col(k);
            let row = m.row(k);
            let nk = ((diagonal[k] + 1.0) * 0.5).max(0.0).sqrt();

            let mut axis = (column + row) / (4.0 * nk);
            axis[k] = nk;
            let axis = axis.normalize();
            let sign = if axis.dot(anti) < 0.0 { -1.0 } else { 1.0 };
            return axis * (sign * theta);
        }

        anti * (theta / (2.0 * theta.sin()))
    }

    /// Vector space -> Lie algebra.
    pub fn hat(v: DVec3) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(0.0, v.z, -v.y),
            DVec3::new(-v.z, 0.0, v.x),
            DVec3::new(v.y, -v.x, 0.0),
        )
    }

    /// Lie algebra -> vector space.
    pub fn vee(omega: DMat3) -> DVec3 {
        DVec3::new(omega.y_axis.z, omega.z_axis.x, omega.x_axis.y)
    }

    /// Compose two rotations as `self * other`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// The inverse rotation (transpose).
    pub fn inverse(&self) -> Self {
        Self {
            matrix: self.matrix.transpose(),
        }
    }

    /// Rotate a vector.
    #[inline]
    pub fn rotate(&self, v: DVec3) -> DVec3 {
        self.matrix * v
    }

    /// Left Jacobian of SO(3), the `V` matrix of the SE(3) exponential.
    pub fn left_jacobian(omega: DVec3) -> DMat3 {
        let theta_sq = omega.length_squared();

        let (b, c) = if theta_sq < SMALL_ANGLE_SQ {
            (0.5 - theta_sq / 24.0, 1.0 / 6.0 - theta_sq / 120.0)
        } else {
            let theta = theta_sq.sqrt();
            (
                (1.0 - theta.cos()) / theta_sq,
                (theta - theta.sin()) / (theta_sq * theta),
            )
        };

        let skew = Self::hat(omega);
        DMat3::IDENTITY + b * skew + c * (skew * skew)
    }

    /// Inverse of [`So3::left_jacobian`], valid for rotation angles in `[0, pi]`.
    pub fn left_jacobian_inverse(omega: DVec3) -> DMat3 {
        let theta_sq = omega.length_squared();

        let d = if theta_sq < SMALL_ANGLE_SQ {
            1.0 / 12.0 + theta_sq / 720.0
        } else {
            let theta = theta_sq.sqrt();
            (1.0 - theta * theta.sin() / (2.0 * (1.0 - theta.cos()))) / theta_sq
        };

        let skew = Self::hat(omega);
        DMat3::IDENTITY - 0.5 * skew + d * (skew * skew)
    }
}
