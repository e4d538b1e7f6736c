//! Linear trend fallback: OLS of value on day index, extrapolated.

use super::stats;

/// Extrapolate the least-squares line through `values` for the `horizon`
/// indices immediately after the series.
pub fn extrapolate(values: &[f64], horizon: usize) -> Vec<f64> {
    let (intercept, slope) = stats::linear_fit(values);
    let n = values.len();
    (n..n + horizon).map(|x| intercept + slope * x as f64).collect()
}
