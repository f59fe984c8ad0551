use crate::error::IcpError;

/// Singular value ratio under which the normal equations are rank deficient.
const RCOND_THRESHOLD: f64 = 1e-12;

/// Accumulate the weighted normal equations `H = J^T W J` and `g = J^T W r`.
pub(crate) fn build_normal_equations(
    jacobian: &[[f64; 6]],
    residuals: &[f64],
    weights: &[f64],
) -> ([[f64; 6]; 6], [f64; 6]) {
    let mut h = [[0.0; 6]; 6];
    let mut g = [0.0; 6];

    for ((row, r), w) in jacobian.iter().zip(residuals).zip(weights) {
        for i in 0..6 {
            let wj = w * row[i];
            g[i] += wj * r;
            // upper triangle only, mirrored below
            for j in i..6 {
                h[i][j] += wj * row[j];
            }
        }
    }

    for i in 0..6 {
        for j in 0..i {
            h[i][j] = h[j][i];
        }
    }

    (h, g)
}

/// Solve `H dx = -g` with the SVD pseudo-inverse of `H`.
///
/// Fails with [`IcpError::RankDeficient`] if the largest singular value is 0
/// or the ratio of the smallest to the largest is below `1e-12`.
pub(crate) fn solve_normal_equations(
    h: &[[f64; 6]; 6],
    g: &[f64; 6],
    iteration: usize,
) -> Result<[f64; 6], IcpError> {
    let mat = faer::Mat::<f64>::from_fn(6, 6, |i, j| h[i][j]);
    let svd = mat.svd();
    let s = svd.s_diagonal();

    // singular values are sorted in decreasing order
    let smax = s.read(0);
    let smin = s.read(5);
    let rcond = if smax > 0.0 { smin / smax } else { 0.0 };
    if !smax.is_finite() || !(rcond >= RCOND_THRESHOLD) {
        log::warn!("rank deficient normal equations at iteration {iteration}: rcond {rcond:e}");
        return Err(IcpError::RankDeficient { iteration, rcond });
    }

    let u = svd.u();
    let v = svd.v();

    let mut dx = [0.0; 6];
    for k in 0..6 {
        let proj = (0..6).map(|i| u.read(i, k) * g[i]).sum::<f64>() / s.read(k);
        for (j, x) in dx.iter_mut().enumerate() {
            *x -= v.read(j, k) * proj;
        }
    }

    Ok(dx)
}

/// Root mean square of the residuals, 0 for an empty slice.
pub(crate) fn rms(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
}
