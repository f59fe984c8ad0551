#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # ICP Lie Groups
//!
//! Rotations and rigid body transformations used by the registration crate to
//! keep the pose estimate on the manifold while it is refined.
//!
//! ## Supported Groups
//!
//! - **SO(3)**: 3D rotation group
//! - **SE(3)**: 3D rigid body transformations (rotation + translation)
//!
//! Twists are laid out as `[v_x, v_y, v_z, w_x, w_y, w_z]`: translation block
//! first, rotation block last.
//!
//! ## Example
//!
//! ```rust
//! use icp_lie::se3::Se3;
//!
//! let pose = Se3::exp(&[0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
//! let point = pose.transform_point(&[1.0, 0.0, 0.0]);
//! assert!(point[0].abs() < 1e-12);
//! assert!((point[1] - 1.0).abs() < 1e-12);
//! ```

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

mod error;
pub use error::LieError;
