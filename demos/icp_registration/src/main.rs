use argh::FromArgs;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use icp_lie::se3::Se3;
use icp_registration::{
    normals::estimate_normals, Cauchy, Huber, Icp, IcpParameters, MEstimator, NoWeighting,
    PointCloud, PointToPlane, Tukey,
};

#[derive(FromArgs)]
/// Register a perturbed synthetic corner onto itself with point-to-plane ICP
struct Args {
    /// number of samples per axis on each face of the corner
    #[argh(option, default = "20")]
    grid_size: usize,

    /// translation applied to the source, as x,y,z
    #[argh(option, default = "[0.05, -0.02, 0.03]", from_str_fn(parse_vec3))]
    translation: [f64; 3],

    /// rotation vector (axis * angle in radians) applied to the source, as x,y,z
    #[argh(option, default = "[0.02, 0.03, -0.04]", from_str_fn(parse_vec3))]
    rotation: [f64; 3],

    /// number of source points pushed off their surface
    #[argh(option, default = "0")]
    outliers: usize,

    /// m-estimator: none, huber, tukey or cauchy
    #[argh(option, default = "String::from(\"huber\")")]
    estimator: String,

    /// path to a JSON file with the ICP parameters
    #[argh(option)]
    params_path: Option<PathBuf>,

    /// estimate the normals with PCA instead of using the exact ones
    #[argh(switch)]
    estimate_normals: bool,

    /// seed of the random generator
    #[argh(option, default = "0")]
    seed: u64,
}

fn parse_vec3(value: &str) -> Result<[f64; 3], String> {
    let values = value
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected 3 comma separated values, got `{value}`")),
    }
}

fn m_estimator(name: &str) -> Result<Box<dyn MEstimator>, Box<dyn std::error::Error>> {
    let estimator: Box<dyn MEstimator> = match name {
        "none" => Box::new(NoWeighting),
        "huber" => Box::new(Huber::default()),
        "tukey" => Box::new(Tukey::default()),
        "cauchy" => Box::new(Cauchy::default()),
        _ => return Err(format!("unknown estimator `{name}`").into()),
    };
    Ok(estimator)
}

/// Three faces of a unit cube meeting at the origin, with their normals.
fn corner_cloud(grid_size: usize) -> Result<PointCloud, Box<dyn std::error::Error>> {
    let step = 1.0 / grid_size as f64;
    let mut points = Vec::with_capacity(3 * grid_size * grid_size);
    let mut normals = Vec::with_capacity(3 * grid_size * grid_size);
    for i in 0..grid_size {
        for j in 0..grid_size {
            let a = (i as f64 + 0.5) * step;
            let b = (j as f64 + 0.5) * step;
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

fn add_outliers(
    cloud: &PointCloud,
    num_outliers: usize,
    rng: &mut StdRng,
) -> Result<PointCloud, Box<dyn std::error::Error>> {
    let mut points = cloud.points().to_vec();
    let normals = cloud.normals().ok_or("source cloud has no normals")?.to_vec();
    for _ in 0..num_outliers {
        let i = rng.random_range(0..points.len());
        let offset = rng.random_range(0.05..0.2);
        for k in 0..3 {
            points[i][k] += offset * normals[i][k];
        }
    }
    Ok(PointCloud::with_normals(points, normals)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let params = match &args.params_path {
        Some(path) => serde_json::from_str::<IcpParameters>(&std::fs::read_to_string(path)?)?,
        None => IcpParameters::new().with_max_iter(50).with_min_variation(1e-8),
    };
    println!("{params}");

    let target = corner_cloud(args.grid_size)?;
    println!("Target cloud: #{} points", target.len());

    let [tx, ty, tz] = args.translation;
    let [rx, ry, rz] = args.rotation;
    let perturbation = Se3::exp(&[tx, ty, tz, rx, ry, rz]);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let source = add_outliers(&target.transform(&perturbation), args.outliers, &mut rng)?;
    let source = if args.estimate_normals {
        estimate_normals(&source, 10, [1.0, 1.0, 1.0])
    } else {
        source
    };
    println!(
        "Source cloud: #{} points ({} outliers)",
        source.len(),
        args.outliers
    );

    let mut icp = Icp::new(PointToPlane::new(), m_estimator(&args.estimator)?);
    icp.set_input_target(target);
    icp.set_input_source(source);
    icp.set_parameters(params);

    match icp.run().map(|result| result.to_string()) {
        Ok(report) => println!("{report}"),
        Err(err) => {
            log::error!("registration failed: {err}");
            println!("{}", icp.results());
            return Err(err.into());
        }
    }

    let expected = perturbation.inverse().matrix();
    println!("Expected transformation:");
    for row in &expected {
        println!(
            "  {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            row[0], row[1], row[2], row[3]
        );
    }

    Ok(())
}
