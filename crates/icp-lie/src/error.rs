/// Errors raised when building group elements from raw matrices.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LieError {
    /// The rotation block is not orthonormal with determinant +1.
    #[error("Rotation matrix is not orthonormal (max deviation {0:e})")]
    NotOrthonormal(f64),

    /// The last row of a homogeneous matrix is not `[0, 0, 0, 1]`.
    #[error("Invalid homogeneous row: {0:?}")]
    InvalidHomogeneousRow([f64; 4]),

    /// The matrix contains NaN or infinite values.
    #[error("Matrix contains non-finite values")]
    NonFinite,
}
