use std::fmt;
use std::time::Instant;

use icp_lie::se3::Se3;
use serde::{Deserialize, Serialize};

use crate::correspondence::find_correspondences;
use crate::error::IcpError;
use crate::error_model::ErrorModel;
use crate::mestimator::MEstimator;
use crate::ops::{build_normal_equations, rms, solve_normal_equations};
use crate::params::IcpParameters;
use crate::pointcloud::PointCloud;
use crate::spatial::{KdTreeIndex, SpatialIndex};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IcpStatus {
    /// `run` was never called or its inputs changed since.
    #[default]
    NotRun,
    /// The error changed by less than `min_variation`.
    Converged,
    /// `max_iter` iterations were executed.
    MaxIterationsReached,
    /// The run aborted on a numerical or correspondence failure.
    Failed,
}

/// Lifecycle of an [`Icp`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpState {
    /// The target or the source is missing.
    Uninitialized,
    /// Both inputs are set and no result is available.
    Ready,
    /// A run finished with the given status.
    Finished(IcpStatus),
}

/// Result of the ICP registration.
///
/// The transformation maps the source frame onto the target frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpResult {
    /// The source cloud transformed by the final pose.
    pub registered: PointCloud,
    /// RMS error before registration, then after every iteration.
    pub registration_error: Vec<f64>,
    /// Final 4x4 homogeneous transformation, all zeros until a run starts.
    pub transformation: [[f64; 4]; 4],
    /// How the run ended.
    pub status: IcpStatus,
    /// Number of executed iterations.
    pub num_iterations: usize,
    /// Correspondences kept at the last evaluation.
    pub num_correspondences: usize,
}

impl Default for IcpResult {
    fn default() -> Self {
        Self {
            registered: PointCloud::default(),
            registration_error: Vec::new(),
            transformation: [[0.0; 4]; 4],
            status: IcpStatus::NotRun,
            num_iterations: 0,
            num_correspondences: 0,
        }
    }
}

impl IcpResult {
    /// Error after the last executed iteration.
    pub fn final_error(&self) -> Option<f64> {
        self.registration_error.last().copied()
    }

    /// Whether the run stopped on one of its stopping criteria.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            IcpStatus::Converged | IcpStatus::MaxIterationsReached
        )
    }

    /// Reset to the empty result.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn record(&mut self, pose: &Se3, evaluation: Evaluation) {
        self.registration_error.push(evaluation.error);
        self.transformation = pose.matrix();
        self.registered = evaluation.current;
        self.num_correspondences = evaluation.num_correspondences;
    }
}

impl fmt::Display for IcpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(initial), Some(last)) = (
            self.registration_error.first(),
            self.registration_error.last(),
        ) else {
            return write!(f, "Icp: No Results!");
        };

        writeln!(f, "Status: {:?}", self.status)?;
        writeln!(f, "Iterations: {}", self.num_iterations)?;
        writeln!(f, "Initial error: {initial}")?;
        writeln!(f, "Final error: {last}")?;
        writeln!(f, "Final transformation:")?;
        for row in &self.transformation {
            writeln!(
                f,
                "  {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                row[0], row[1], row[2], row[3]
            )?;
        }
        write!(f, "Error history: ")?;
        for e in &self.registration_error {
            write!(f, "{e}, ")?;
        }
        Ok(())
    }
}

/// Outcome of evaluating one pose against the target.
struct Evaluation {
    current: PointCloud,
    num_correspondences: usize,
    error: f64,
}

/// Iterative Closest Point registration.
///
/// Generic over the error model `E`, the M-estimator `M` and the spatial
/// index `S` built over the target points.
///
/// # Example
///
/// ```rust
/// use icp_registration::{Icp, IcpParameters, NoWeighting, PointCloud, PointToPlane};
///
/// let points = vec![
///     [0.2, 0.2, 0.0], [0.8, 0.5, 0.0], [0.5, 0.8, 0.0],
///     [0.2, 0.0, 0.2], [0.8, 0.0, 0.5], [0.5, 0.0, 0.8],
///     [0.0, 0.2, 0.2], [0.0, 0.8, 0.5], [0.0, 0.5, 0.8],
/// ];
/// let normals = [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]
///     .iter()
///     .flat_map(|n| [*n; 3])
///     .collect::<Vec<_>>();
/// let cloud = PointCloud::with_normals(points, normals)?;
///
/// let mut icp = Icp::new(PointToPlane::new(), NoWeighting);
/// icp.set_input_target(cloud.clone());
/// icp.set_input_source(cloud);
/// icp.set_parameters(IcpParameters::default());
///
/// let result = icp.run()?;
/// assert!(result.final_error().unwrap_or(f64::MAX) < 1e-9);
/// # Ok::<(), icp_registration::IcpError>(())
/// ```
pub struct Icp<E, M, S = KdTreeIndex> {
    error_model: E,
    m_estimator: M,
    params: IcpParameters,
    target: Option<PointCloud>,
    source: Option<PointCloud>,
    index: Option<S>,
    result: IcpResult,
}

impl<E: ErrorModel, M: MEstimator> Icp<E, M, KdTreeIndex> {
    /// Create an ICP instance searching correspondences with a kd-tree.
    pub fn new(error_model: E, m_estimator: M) -> Self {
        Self::with_spatial_index(error_model, m_estimator)
    }
}

impl<E: ErrorModel, M: MEstimator, S: SpatialIndex> Icp<E, M, S> {
    /// Create an ICP instance with a custom spatial index type.
    pub fn with_spatial_index(error_model: E, m_estimator: M) -> Self {
        Self {
            error_model,
            m_estimator,
            params: IcpParameters::default(),
            target: None,
            source: None,
            index: None,
            result: IcpResult::default(),
        }
    }

    /// Set the reference cloud and rebuild the spatial index over it.
    ///
    /// An empty cloud leaves no index and makes `run` fail.
    pub fn set_input_target(&mut self, target: PointCloud) {
        self.index = (!target.is_empty()).then(|| S::build(target.points()));
        self.target = Some(target);
        self.result.clear();
    }

    /// Set the cloud to align onto the target.
    pub fn set_input_source(&mut self, source: PointCloud) {
        self.source = Some(source);
        self.result.clear();
    }

    /// Set the parameters used by the next run.
    pub fn set_parameters(&mut self, params: IcpParameters) {
        self.params = params;
    }

    /// The parameters used by the next run.
    pub fn parameters(&self) -> &IcpParameters {
        &self.params
    }

    /// The result of the last run, empty if `run` was never called.
    pub fn results(&self) -> &IcpResult {
        &self.result
    }

    /// The error model, holding the buffers of the last evaluation.
    pub fn error_model(&self) -> &E {
        &self.error_model
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IcpState {
        if self.target.is_none() || self.source.is_none() {
            IcpState::Uninitialized
        } else if self.result.status == IcpStatus::NotRun {
            IcpState::Ready
        } else {
            IcpState::Finished(self.result.status)
        }
    }

    /// Run the registration.
    ///
    /// Configuration errors leave the result empty. Numerical and
    /// correspondence failures keep the partial error history and the last
    /// pose reached in the result, with [`IcpStatus::Failed`], and are
    /// returned as errors.
    pub fn run(&mut self) -> Result<&IcpResult, IcpError> {
        self.result.clear();

        self.params.validate()?;
        let target = self.target.as_ref().ok_or(IcpError::TargetNotSet)?;
        let source = self.source.as_ref().ok_or(IcpError::SourceNotSet)?;
        let index = match self.index.as_ref() {
            Some(index) if !target.is_empty() => index,
            _ => return Err(IcpError::EmptyTarget),
        };
        if source.is_empty() {
            return Err(IcpError::EmptySource);
        }
        if self.error_model.requires_normals() && !source.has_normals() {
            return Err(IcpError::MissingNormals("source"));
        }

        let now = Instant::now();
        let outcome = register(
            &mut self.error_model,
            &self.m_estimator,
            index,
            source,
            target,
            &self.params,
            &mut self.result,
        );

        match outcome {
            Ok(status) => {
                self.result.status = status;
                log::info!(
                    "ICP finished with {:?} after {} iterations, error {:?} -> {:?} in {:?}",
                    status,
                    self.result.num_iterations,
                    self.result.registration_error.first(),
                    self.result.final_error(),
                    now.elapsed()
                );
                Ok(&self.result)
            }
            Err(err) => {
                self.result.status = IcpStatus::Failed;
                log::warn!(
                    "ICP failed after {} iterations: {err}",
                    self.result.num_iterations
                );
                Err(err)
            }
        }
    }
}

/// The iteration loop; writes its progress into `result` as it goes.
fn register<E: ErrorModel, M: MEstimator, S: SpatialIndex>(
    error_model: &mut E,
    m_estimator: &M,
    index: &S,
    source: &PointCloud,
    target: &PointCloud,
    params: &IcpParameters,
    result: &mut IcpResult,
) -> Result<IcpStatus, IcpError> {
    let mut twist = params.initial_guess;
    let mut pose = Se3::exp(&twist);

    let evaluation = evaluate(error_model, index, source, target, &pose, params, 0)?;
    log::debug!(
        "Initial error: {} ({} correspondences)",
        evaluation.error,
        evaluation.num_correspondences
    );
    result.record(&pose, evaluation);

    let mut iteration = 0;
    loop {
        iteration += 1;
        let now = Instant::now();

        let weights = m_estimator.compute_weights(error_model.residuals());
        let (h, g) =
            build_normal_equations(error_model.jacobian(), error_model.residuals(), &weights);
        let dx = solve_normal_equations(&h, &g, iteration)?;

        // left update, re-expressed as a twist so the rotation always comes
        // out of the exponential map
        let step = dx.map(|v| params.lambda * v);
        twist = Se3::exp(&step).compose(&pose).log();
        pose = Se3::exp(&twist);

        let evaluation = evaluate(error_model, index, source, target, &pose, params, iteration)?;
        log::debug!(
            "Iteration: {} error: {} correspondences: {} elapsed: {:?}",
            iteration,
            evaluation.error,
            evaluation.num_correspondences,
            now.elapsed()
        );
        result.num_iterations = iteration;
        result.record(&pose, evaluation);

        if iteration >= params.max_iter {
            return Ok(IcpStatus::MaxIterationsReached);
        }

        let history = &result.registration_error;
        if let [.., previous, last] = history.as_slice() {
            if (last - previous).abs() < params.min_variation {
                return Ok(IcpStatus::Converged);
            }
        }
    }
}

/// Transform the source, match it against the target and fill the error model.
fn evaluate<E: ErrorModel, S: SpatialIndex>(
    error_model: &mut E,
    index: &S,
    source: &PointCloud,
    target: &PointCloud,
    pose: &Se3,
    params: &IcpParameters,
    iteration: usize,
) -> Result<Evaluation, IcpError> {
    // always from the untransformed source, never cumulatively
    let current = source.transform(pose);

    let correspondences =
        find_correspondences(current.points(), index, params.max_correspondence_distance);
    if correspondences.is_empty() {
        log::warn!(
            "no correspondence within {} at iteration {iteration}",
            params.max_correspondence_distance
        );
        return Err(IcpError::NoCorrespondences { iteration });
    }

    let (source_indices, target_indices): (Vec<usize>, Vec<usize>) = correspondences
        .iter()
        .map(|c| (c.source_index, c.target_index))
        .unzip();

    error_model.set_input_reference(target.select(&target_indices));
    error_model.set_input_current(current.select(&source_indices));
    error_model.compute_error()?;
    error_model.compute_jacobian()?;

    Ok(Evaluation {
        error: rms(error_model.residuals()),
        num_correspondences: correspondences.len(),
        current,
    })
}
