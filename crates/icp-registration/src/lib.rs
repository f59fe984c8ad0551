#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`Icp`] driver alternates nearest neighbor matching against the target
//! cloud and a weighted Gauss-Newton step on the SE(3) twist of the source
//! pose. The error model ([`ErrorModel`]), the robust weighting
//! ([`MEstimator`]) and the spatial index ([`SpatialIndex`]) are plugged in as
//! type parameters.

/// Nearest neighbor matching between the source and the target.
pub mod correspondence;

/// Residual and Jacobian models.
pub mod error_model;

/// M-estimators for iteratively reweighted least squares.
pub mod mestimator;

/// Surface normal estimation.
pub mod normals;

/// Point cloud with optional normals.
pub mod pointcloud;

/// Spatial indices answering nearest neighbor queries.
pub mod spatial;

/// Robust order statistics.
pub mod stats;

mod error;
pub use error::{IcpError, IcpErrorKind};

mod icp;
pub use icp::{Icp, IcpResult, IcpState, IcpStatus};

mod ops;

mod params;
pub use params::IcpParameters;

pub use error_model::{ErrorModel, PointToPlane};
pub use mestimator::{Cauchy, Huber, MEstimator, NoWeighting, Tukey};
pub use pointcloud::{PointCloud, PointCloudError};
pub use spatial::{BruteForceIndex, KdTreeIndex, Neighbor, SpatialIndex};
