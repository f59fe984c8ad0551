use crate::pointcloud::PointCloudError;

/// Broad classes of ICP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpErrorKind {
    /// The run could not start: missing or invalid inputs or parameters.
    Configuration,
    /// The solve or the residual computation broke down.
    Numerical,
    /// An iteration produced no valid correspondence.
    NoCorrespondence,
}

/// Error types for the ICP registration.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// `run` was called before the target point cloud was set.
    #[error("Target point cloud is not set")]
    TargetNotSet,

    /// `run` was called before the source point cloud was set.
    #[error("Source point cloud is not set")]
    SourceNotSet,

    /// The target point cloud has no points, so no spatial index exists.
    #[error("Target point cloud is empty")]
    EmptyTarget,

    /// The source point cloud has no points.
    #[error("Source point cloud is empty")]
    EmptySource,

    /// The error model needs normals that the given point cloud lacks.
    #[error("The {0} point cloud has no normals")]
    MissingNormals(&'static str),

    /// A parameter is outside its valid range.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The error model was given clouds that are not index aligned.
    #[error("Mismatched lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedLengths {
        /// Label for the left-hand input.
        left_name: &'static str,
        /// Length of the left-hand input.
        left_len: usize,
        /// Label for the right-hand input.
        right_name: &'static str,
        /// Length of the right-hand input.
        right_len: usize,
    },

    /// The weighted normal equations are singular or too ill-conditioned.
    #[error("Normal equations are rank deficient at iteration {iteration} (rcond {rcond:e})")]
    RankDeficient {
        /// Iteration at which the solve failed.
        iteration: usize,
        /// Ratio between the smallest and largest singular values.
        rcond: f64,
    },

    /// A residual or Jacobian entry is NaN or infinite.
    #[error("Non-finite residual or jacobian at correspondence {index}")]
    NonFiniteResidual {
        /// Position of the offending correspondence.
        index: usize,
    },

    /// Every correspondence was rejected.
    #[error("No valid correspondences at iteration {iteration}")]
    NoCorrespondences {
        /// Iteration at which the search came back empty.
        iteration: usize,
    },

    /// Invalid point cloud.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

impl IcpError {
    /// The class of the failure.
    pub fn kind(&self) -> IcpErrorKind {
        match self {
            // the error model only sees misaligned clouds in the middle of a run
            IcpError::RankDeficient { .. }
            | IcpError::NonFiniteResidual { .. }
            | IcpError::MismatchedLengths { .. } => IcpErrorKind::Numerical,
            IcpError::NoCorrespondences { .. } => IcpErrorKind::NoCorrespondence,
            _ => IcpErrorKind::Configuration,
        }
    }
}
