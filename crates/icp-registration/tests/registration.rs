use approx::assert_relative_eq;
use icp_lie::se3::Se3;
use icp_registration::{
    BruteForceIndex, Cauchy, ErrorModel, Huber, Icp, IcpError, IcpErrorKind, IcpParameters,
    IcpStatus, MEstimator, NoWeighting, PointCloud, PointToPlane, Tukey,
};
use rand::{Rng, SeedableRng};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Three orthogonal faces of a unit cube meeting at the origin.
fn corner_cloud(grid: &[f64]) -> Result<PointCloud, IcpError> {
    let mut points = Vec::new();
    let mut normals = Vec::new();
    for &a in grid {
        for &b in grid {
            points.push([a, b, 0.0]);
            normals.push([0.0, 0.0, 1.0]);
            points.push([a, 0.0, b]);
            normals.push([0.0, 1.0, 0.0]);
            points.push([0.0, a, b]);
            normals.push([1.0, 0.0, 0.0]);
        }
    }
    Ok(PointCloud::with_normals(points, normals)?)
}

fn coarse_corner() -> Result<PointCloud, IcpError> {
    corner_cloud(&[0.2, 0.5, 0.8])
}

fn dense_corner() -> Result<PointCloud, IcpError> {
    let grid = (0..9).map(|i| 0.1 + 0.1 * i as f64).collect::<Vec<_>>();
    corner_cloud(&grid)
}

fn run_icp<M: MEstimator>(
    target: PointCloud,
    source: PointCloud,
    m_estimator: M,
    params: IcpParameters,
) -> Result<icp_registration::IcpResult, IcpError> {
    let mut icp = Icp::new(PointToPlane::new(), m_estimator);
    icp.set_input_target(target);
    icp.set_input_source(source);
    icp.set_parameters(params);
    icp.run().cloned()
}

fn assert_points_close(a: &PointCloud, b: &PointCloud, epsilon: f64) {
    assert_eq!(a.len(), b.len());
    for (p, q) in a.points().iter().zip(b.points()) {
        for k in 0..3 {
            assert_relative_eq!(p[k], q[k], epsilon = epsilon);
        }
    }
}

#[test]
fn test_identity_registration() -> TestResult {
    let cloud = dense_corner()?;
    let result = run_icp(cloud.clone(), cloud, NoWeighting, IcpParameters::default())?;

    assert_eq!(result.status, IcpStatus::Converged);
    assert_relative_eq!(result.final_error().unwrap_or(f64::MAX), 0.0, epsilon = 1e-12);
    let pose = Se3::from_matrix(&result.transformation)?;
    for v in pose.log() {
        assert_relative_eq!(v, 0.0, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn test_corner_translation_scenario() -> TestResult {
    let target = coarse_corner()?;
    let source = target.transform(&Se3::exp(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
    let params = IcpParameters::default();
    let result = run_icp(target, source, NoWeighting, params.clone())?;

    assert_eq!(result.status, IcpStatus::Converged);
    assert!(result.num_iterations <= params.max_iter);
    assert_relative_eq!(result.transformation[0][3], -0.1, epsilon = 1e-9);
    assert_relative_eq!(result.transformation[1][3], 0.0, epsilon = 1e-9);
    assert_relative_eq!(result.transformation[2][3], 0.0, epsilon = 1e-9);
    assert!(result.final_error().unwrap_or(f64::MAX) < params.min_variation);
    Ok(())
}

#[test]
fn test_robust_estimators_on_exact_translation() -> TestResult {
    // two faces match exactly after the shift, so most residuals are 0
    let target = coarse_corner()?;
    let source = target.transform(&Se3::exp(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
    let params = IcpParameters::default();

    for m_estimator in [
        Box::new(Huber::default()) as Box<dyn MEstimator>,
        Box::new(Tukey::default()),
        Box::new(Cauchy::default()),
    ] {
        let result = run_icp(target.clone(), source.clone(), m_estimator, params.clone())?;

        assert_eq!(result.status, IcpStatus::Converged);
        assert_relative_eq!(result.transformation[0][3], -0.1, epsilon = 1e-9);
        assert_relative_eq!(result.transformation[1][3], 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.transformation[2][3], 0.0, epsilon = 1e-9);
        assert!(result.final_error().unwrap_or(f64::MAX) < params.min_variation);
    }
    Ok(())
}

#[test]
fn test_planar_cloud_is_rank_deficient() -> TestResult {
    // every normal is (0, 0, 1): in-plane motion cannot be observed
    let points = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 0.0],
    ];
    let target = PointCloud::with_normals(points, vec![[0.0, 0.0, 1.0]; 4])?;
    let source = target.transform(&Se3::exp(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));

    let mut icp = Icp::new(PointToPlane::new(), NoWeighting);
    icp.set_input_target(target);
    icp.set_input_source(source);

    let err = icp.run().err();
    assert!(matches!(
        err,
        Some(IcpError::RankDeficient { iteration: 1, .. })
    ));
    assert_eq!(err.map(|e| e.kind()), Some(IcpErrorKind::Numerical));

    // the partial history is kept and marked as failed
    let result = icp.results();
    assert_eq!(result.status, IcpStatus::Failed);
    assert_eq!(result.registration_error.len(), 1);
    assert_eq!(result.num_iterations, 0);
    Ok(())
}

#[test]
fn test_empty_target() -> TestResult {
    let mut icp = Icp::new(PointToPlane::new(), NoWeighting);
    icp.set_input_target(PointCloud::default());
    icp.set_input_source(coarse_corner()?);

    let err = icp.run().err();
    assert!(matches!(err, Some(IcpError::EmptyTarget)));
    assert_eq!(err.map(|e| e.kind()), Some(IcpErrorKind::Configuration));
    assert!(icp.results().registration_error.is_empty());
    assert_eq!(icp.results().status, IcpStatus::NotRun);
    Ok(())
}

#[test]
fn test_runs_are_reproducible() -> TestResult {
    let target = dense_corner()?;
    let source = target.transform(&Se3::exp(&[0.03, -0.02, 0.04, 0.02, -0.03, 0.05]));

    let mut icp = Icp::new(PointToPlane::new(), Huber::default());
    icp.set_input_target(target);
    icp.set_input_source(source);
    icp.set_parameters(IcpParameters::new().with_max_iter(20));

    let first = icp.run()?.clone();
    let second = icp.run()?.clone();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_error_is_non_increasing() -> TestResult {
    let target = dense_corner()?;
    let source = target.transform(&Se3::exp(&[0.01, 0.005, -0.01, 0.01, -0.01, 0.005]));
    let params = IcpParameters::new().with_max_iter(20).with_min_variation(1e-10);
    let result = run_icp(target, source, NoWeighting, params)?;

    let history = &result.registration_error;
    assert!(history.len() >= 3);
    for pair in history[1..].windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "error increased: {history:?}");
    }
    assert!(history[history.len() - 1] < 1e-6);
    Ok(())
}

#[test]
fn test_far_point_is_rejected() -> TestResult {
    let target = coarse_corner()?;
    let mut points = target.points().to_vec();
    let mut normals = target.normals().unwrap_or_default().to_vec();
    points.push([10.0, 10.0, 10.0]);
    normals.push([1.0, 0.0, 0.0]);
    let source = PointCloud::with_normals(points, normals)?;

    let mut icp = Icp::new(PointToPlane::new(), NoWeighting);
    icp.set_input_target(target.clone());
    icp.set_input_source(source);
    icp.set_parameters(IcpParameters::new().with_max_correspondence_distance(0.5));
    let result = icp.run()?.clone();

    assert_eq!(result.num_correspondences, target.len());
    assert_eq!(result.registered.len(), target.len() + 1);
    assert_eq!(icp.error_model().residuals().len(), target.len());
    assert_relative_eq!(result.final_error().unwrap_or(f64::MAX), 0.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_transformation_reproduces_registered_cloud() -> TestResult {
    let target = dense_corner()?;
    let source = target.transform(&Se3::exp(&[0.05, 0.02, -0.03, 0.03, 0.01, -0.02]));
    let params = IcpParameters::new().with_max_iter(3);
    let result = run_icp(target, source.clone(), NoWeighting, params)?;

    let pose = Se3::from_matrix(&result.transformation)?;
    let reproduced = source.transform(&pose);
    assert_points_close(&reproduced, &result.registered, 1e-12);
    Ok(())
}

#[test]
fn test_initial_guess() -> TestResult {
    let target = coarse_corner()?;
    let source = target.transform(&Se3::exp(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
    let params = IcpParameters::new().with_initial_guess([-0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let result = run_icp(target, source, NoWeighting, params)?;

    // already aligned by the guess
    assert_relative_eq!(result.registration_error[0], 0.0, epsilon = 1e-12);
    assert_eq!(result.num_iterations, 1);
    Ok(())
}

#[test]
fn test_robust_estimators_handle_outliers() -> TestResult {
    let target = dense_corner()?;
    let truth = Se3::exp(&[0.02, -0.01, 0.015, 0.01, 0.015, -0.01]);
    let clean = target.transform(&truth);

    // push a few source points off their surface along the normal
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut points = clean.points().to_vec();
    let normals = clean.normals().unwrap_or_default().to_vec();
    for _ in 0..12 {
        let i = rng.random_range(0..points.len());
        let offset = rng.random_range(0.03..0.05);
        for k in 0..3 {
            points[i][k] += offset * normals[i][k];
        }
    }
    let source = PointCloud::with_normals(points, normals)?;
    let params = IcpParameters::new().with_max_iter(30).with_min_variation(1e-9);

    let expected = truth.inverse().log();
    let huber = run_icp(target.clone(), source.clone(), Huber::default(), params.clone())?;
    let tukey = run_icp(target.clone(), source.clone(), Tukey::default(), params.clone())?;
    let plain = run_icp(target, source, NoWeighting, params)?;

    let pose_error = |m: &[[f64; 4]; 4]| -> Result<f64, Box<dyn std::error::Error>> {
        let twist = Se3::from_matrix(m)?.log();
        Ok(twist
            .iter()
            .zip(expected.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt())
    };

    let plain_error = pose_error(&plain.transformation)?;
    assert!(pose_error(&huber.transformation)? < plain_error);
    assert!(pose_error(&tukey.transformation)? < plain_error);
    Ok(())
}

#[test]
fn test_brute_force_index_matches_kdtree() -> TestResult {
    let target = dense_corner()?;
    let source = target.transform(&Se3::exp(&[0.02, 0.0, -0.01, 0.0, 0.01, 0.02]));
    let params = IcpParameters::new().with_max_iter(15);

    let kdtree = run_icp(target.clone(), source.clone(), NoWeighting, params.clone())?;

    let mut icp =
        Icp::<_, _, BruteForceIndex>::with_spatial_index(PointToPlane::new(), NoWeighting);
    icp.set_input_target(target);
    icp.set_input_source(source);
    icp.set_parameters(params);
    let brute = icp.run()?;

    assert_eq!(kdtree.num_iterations, brute.num_iterations);
    assert_eq!(kdtree.status, brute.status);
    for (a, b) in kdtree
        .registration_error
        .iter()
        .zip(brute.registration_error.iter())
    {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn test_boxed_strategies() -> TestResult {
    let cloud = coarse_corner()?;
    let error_model: Box<dyn ErrorModel> = Box::new(PointToPlane::new());
    let m_estimator: Box<dyn MEstimator> = Box::new(Tukey::default());

    let mut icp = Icp::new(error_model, m_estimator);
    icp.set_input_target(cloud.clone());
    icp.set_input_source(cloud);
    assert_eq!(icp.run()?.status, IcpStatus::Converged);
    Ok(())
}

#[test]
fn test_parameters_from_json() -> TestResult {
    let json = r#"{
        "lambda": 0.5,
        "max_iter": 25,
        "max_correspondance_distance": 0.3
    }"#;
    let params: IcpParameters = serde_json::from_str(json)?;
    assert_eq!(params.lambda, 0.5);
    assert_eq!(params.max_iter, 25);
    assert_eq!(params.max_correspondence_distance, 0.3);
    assert_eq!(params.min_variation, 1e-4);
    assert_eq!(params.initial_guess, [0.0; 6]);

    let roundtrip: IcpParameters = serde_json::from_str(&serde_json::to_string(&params)?)?;
    assert_eq!(roundtrip, params);
    Ok(())
}
