/// Consistency constant turning the MAD into a standard deviation estimate
/// for normally distributed data.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Sort values in ascending order, NaNs last.
pub fn sort(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Median of the values, taken as the element at `len / 2` once sorted.
///
/// For an even number of values this is the upper of the two middle elements.
/// Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    let mid = sorted.len() / 2;
    let (_, m, _) = sorted.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}

/// Median absolute deviation around the median.
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations = values.iter().map(|v| (v - med).abs()).collect::<Vec<_>>();
    median(&deviations)
}

/// Robust standard deviation estimate, `1.4826 * MAD`.
pub fn robust_scale(values: &[f64]) -> Option<f64> {
    median_absolute_deviation(values).map(|mad| MAD_TO_SIGMA * mad)
}
