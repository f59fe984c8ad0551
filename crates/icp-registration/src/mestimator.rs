use crate::error::IcpError;
use crate::stats;

/// Scales below this are treated as a degenerate residual distribution.
const MIN_SCALE: f64 = 1e-12;

/// Consistency constant turning the mean absolute residual into a standard
/// deviation estimate for normally distributed data, `sqrt(pi / 2)`.
const MEAN_ABS_TO_SIGMA: f64 = 1.253_314_137_315_500_3;

/// Scale used to standardize the residuals.
///
/// `1.4826 * MAD` when it is positive. When more than half of the residuals
/// coincide the MAD collapses, and the scale falls back to the mean absolute
/// residual. Returns `None` when the residuals carry no spread at all (empty,
/// all equal or all ~0).
fn residual_scale(residuals: &[f64]) -> Option<f64> {
    let scale = stats::robust_scale(residuals)?;
    if scale > MIN_SCALE {
        return Some(scale);
    }

    let (min, max) = residuals
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(r), hi.max(r))
        });
    if max - min <= MIN_SCALE {
        return None;
    }

    let mean_abs = residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len() as f64;
    let scale = MEAN_ABS_TO_SIGMA * mean_abs;
    (scale > MIN_SCALE).then_some(scale)
}

/// Trait for M-estimators turning residuals into least squares weights.
///
/// Implementations are stateless: the scale of the residuals is re-estimated
/// on every call.
pub trait MEstimator: Send + Sync {
    /// Weight in `[0, 1]` for a residual standardized by the robust scale.
    ///
    /// Must be non-increasing in `|u|`.
    fn weight(&self, u: f64) -> f64;

    /// One weight per residual, `weight(|r| / scale)`.
    ///
    /// Residuals without any spread (e.g. all equal) all get a weight of 1.
    fn compute_weights(&self, residuals: &[f64]) -> Vec<f64> {
        match residual_scale(residuals) {
            Some(scale) => residuals
                .iter()
                .map(|r| self.weight(r.abs() / scale))
                .collect(),
            None => vec![1.0; residuals.len()],
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), IcpError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(IcpError::InvalidParameter {
            name,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

/// Plain least squares: weight always 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeighting;

impl MEstimator for NoWeighting {
    fn weight(&self, _u: f64) -> f64 {
        1.0
    }

    fn compute_weights(&self, residuals: &[f64]) -> Vec<f64> {
        vec![1.0; residuals.len()]
    }
}

/// Huber estimator: quadratic for `|u| <= k`, linear beyond.
#[derive(Debug, Clone, Copy)]
pub struct Huber {
    k: f64,
}

impl Huber {
    /// Create a Huber estimator with threshold `k` (in robust standard deviations).
    pub fn new(k: f64) -> Result<Self, IcpError> {
        check_positive("huber.k", k)?;
        Ok(Self { k })
    }

    /// The inlier threshold.
    pub fn k(&self) -> f64 {
        self.k
    }
}

impl Default for Huber {
    /// 95% asymptotic efficiency on normal data.
    fn default() -> Self {
        Self { k: 1.345 }
    }
}

impl MEstimator for Huber {
    fn weight(&self, u: f64) -> f64 {
        let u = u.abs();
        if u <= self.k {
            1.0
        } else {
            self.k / u
        }
    }
}

/// Tukey biweight estimator: residuals beyond `c` get a zero weight.
#[derive(Debug, Clone, Copy)]
pub struct Tukey {
    c: f64,
}

impl Tukey {
    /// Create a Tukey estimator with rejection threshold `c`.
    pub fn new(c: f64) -> Result<Self, IcpError> {
        check_positive("tukey.c", c)?;
        Ok(Self { c })
    }

    /// The rejection threshold.
    pub fn c(&self) -> f64 {
        self.c
    }
}

impl Default for Tukey {
    fn default() -> Self {
        Self { c: 4.685 }
    }
}

impl MEstimator for Tukey {
    fn weight(&self, u: f64) -> f64 {
        let u = u.abs();
        if u <= self.c {
            let t = 1.0 - (u / self.c).powi(2);
            t * t
        } else {
            0.0
        }
    }
}

/// Cauchy estimator: `1 / (1 + (u / c)^2)`.
#[derive(Debug, Clone, Copy)]
pub struct Cauchy {
    c: f64,
}

impl Cauchy {
    /// Create a Cauchy estimator with scale `c`.
    pub fn new(c: f64) -> Result<Self, IcpError> {
        check_positive("cauchy.c", c)?;
        Ok(Self { c })
    }

    /// The scale parameter.
    pub fn c(&self) -> f64 {
        self.c
    }
}

impl Default for Cauchy {
    fn default() -> Self {
        Self { c: 2.3849 }
    }
}

impl MEstimator for Cauchy {
    fn weight(&self, u: f64) -> f64 {
        1.0 / (1.0 + (u / self.c).powi(2))
    }
}

impl<M: MEstimator + ?Sized> MEstimator for Box<M> {
    fn weight(&self, u: f64) -> f64 {
        (**self).weight(u)
    }

    fn compute_weights(&self, residuals: &[f64]) -> Vec<f64> {
        (**self).compute_weights(residuals)
    }
}
