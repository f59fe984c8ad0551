use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IcpError;

/// Parameters controlling the ICP iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParameters {
    /// Damping factor applied to every twist increment, typically in `(0, 1]`.
    pub lambda: f64,
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Stop when the error changes by less than this between two iterations.
    pub min_variation: f64,
    /// Correspondences farther apart than this are rejected.
    #[serde(alias = "max_correspondance_distance")]
    pub max_correspondence_distance: f64,
    /// Initial pose as a twist `[v_x, v_y, v_z, w_x, w_y, w_z]`.
    pub initial_guess: [f64; 6],
}

impl Default for IcpParameters {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            max_iter: 10,
            min_variation: 1e-4,
            max_correspondence_distance: f64::MAX,
            initial_guess: [0.0; 6],
        }
    }
}

impl IcpParameters {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the damping factor.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the minimum error variation.
    pub fn with_min_variation(mut self, min_variation: f64) -> Self {
        self.min_variation = min_variation;
        self
    }

    /// Set the maximum correspondence distance.
    pub fn with_max_correspondence_distance(mut self, distance: f64) -> Self {
        self.max_correspondence_distance = distance;
        self
    }

    /// Set the initial pose twist.
    pub fn with_initial_guess(mut self, twist: [f64; 6]) -> Self {
        self.initial_guess = twist;
        self
    }

    /// Check every parameter is in its valid range.
    pub fn validate(&self) -> Result<(), IcpError> {
        if !(self.lambda > 0.0 && self.lambda.is_finite()) {
            return Err(IcpError::InvalidParameter {
                name: "lambda",
                reason: format!("must be positive and finite, got {}", self.lambda),
            });
        }
        if self.max_iter == 0 {
            return Err(IcpError::InvalidParameter {
                name: "max_iter",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.min_variation >= 0.0 && self.min_variation.is_finite()) {
            return Err(IcpError::InvalidParameter {
                name: "min_variation",
                reason: format!("must be non-negative and finite, got {}", self.min_variation),
            });
        }
        // f64::MAX and infinity both mean "no rejection"
        if !(self.max_correspondence_distance >= 0.0) {
            return Err(IcpError::InvalidParameter {
                name: "max_correspondence_distance",
                reason: format!(
                    "must be non-negative, got {}",
                    self.max_correspondence_distance
                ),
            });
        }
        if self.initial_guess.iter().any(|v| !v.is_finite()) {
            return Err(IcpError::InvalidParameter {
                name: "initial_guess",
                reason: format!("must be finite, got {:?}", self.initial_guess),
            });
        }
        Ok(())
    }
}

impl fmt::Display for IcpParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Icp parameters:")?;
        writeln!(f, "  lambda: {}", self.lambda)?;
        writeln!(f, "  max_iter: {}", self.max_iter)?;
        writeln!(f, "  min_variation: {}", self.min_variation)?;
        writeln!(
            f,
            "  max_correspondence_distance: {}",
            self.max_correspondence_distance
        )?;
        write!(f, "  initial_guess: {:?}", self.initial_guess)
    }
}
