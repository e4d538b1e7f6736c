//! Numeric helpers used by cleaning, order search and the trend fallback.

use statrs::statistics::Statistics;

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample standard deviation (n - 1 denominator). NaN below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    values.iter().std_dev()
}

/// Absolute z-score of every value against the series mean and sample
/// standard deviation. `None` when the spread is undefined or zero.
pub fn abs_z_scores(values: &[f64]) -> Option<Vec<f64>> {
    let mu = mean(values);
    let sigma = std_dev(values);
    if !sigma.is_finite() || sigma <= 0.0 {
        return None;
    }
    Some(values.iter().map(|v| ((v - mu) / sigma).abs()).collect())
}

/// Centered rolling mean with a shrinking window at the edges.
///
/// Point `i` averages indices `[i - w/2, i + (w-1)/2]`, clamped to the
/// series, so even windows lean one step into the past.
pub fn centered_rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let window = window.max(1);
    let behind = window / 2;
    let ahead = (window - 1) / 2;

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(behind);
            let hi = (i + ahead).min(n - 1);
            let slice = &values[lo..=hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Ordinary least squares of `values` against a zero-based index.
/// Returns `(intercept, slope)`; a single point gives a flat line.
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (y_mean - slope * x_mean, slope)
}

/// First differences applied `order` times.
pub fn difference(values: &[f64], order: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..order {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Biased autocovariances `r[0..=max_lag]` of the demeaned series.
pub fn autocovariances(values: &[f64], max_lag: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return vec![0.0; max_lag + 1];
    }
    let mu = mean(values);
    (0..=max_lag)
        .map(|k| {
            if k >= n {
                return 0.0;
            }
            let sum: f64 = (k..n).map(|t| (values[t] - mu) * (values[t - k] - mu)).sum();
            sum / n as f64
        })
        .collect()
}

/// Yule-Walker AR coefficients via Levinson-Durbin recursion.
/// Falls back to zeros for a flat series.
pub fn yule_walker(values: &[f64], order: usize) -> Vec<f64> {
    let mut phi = vec![0.0; order];
    if order == 0 {
        return phi;
    }

    let r = autocovariances(values, order);
    let mut err = r[0];
    if err <= f64::EPSILON {
        return phi;
    }

    for k in 0..order {
        let mut acc = r[k + 1];
        for j in 0..k {
            acc -= phi[j] * r[k - j];
        }
        let reflection = acc / err;
        let prev = phi.clone();
        phi[k] = reflection;
        for j in 0..k {
            phi[j] = prev[j] - reflection * prev[k - 1 - j];
        }
        err *= 1.0 - reflection * reflection;
        if err <= f64::EPSILON {
            break;
        }
    }

    phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        // sample std: sqrt(32 / 7)
        assert_relative_eq!(std_dev(&values), (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert!(std_dev(&[1.0]).is_nan());
    }

    #[test]
    fn test_abs_z_scores_constant_is_none() {
        assert!(abs_z_scores(&[3.0, 3.0, 3.0]).is_none());
        assert!(abs_z_scores(&[3.0]).is_none());
        let z = abs_z_scores(&[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(z[1], 0.0);
        assert_relative_eq!(z[0], 1.0);
    }

    #[test]
    fn test_rolling_mean_shrinks_at_edges() {
        let smoothed = centered_rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_relative_eq!(smoothed[0], 1.5);
        assert_relative_eq!(smoothed[1], 2.0);
        assert_relative_eq!(smoothed[2], 3.0);
        assert_relative_eq!(smoothed[3], 3.5);
    }

    #[test]
    fn test_rolling_mean_even_window_leans_back() {
        // window 4 covers [i-2, i+1]
        let smoothed = centered_rolling_mean(&[0.0, 4.0, 8.0, 12.0, 16.0], 4);
        assert_relative_eq!(smoothed[2], (0.0 + 4.0 + 8.0 + 12.0) / 4.0);
        assert_relative_eq!(smoothed[4], (8.0 + 12.0 + 16.0) / 3.0);
    }

    #[test]
    fn test_rolling_mean_window_one_is_identity() {
        let values = [5.0, -1.0, 2.5];
        assert_eq!(centered_rolling_mean(&values, 1), values.to_vec());
    }

    #[test]
    fn test_linear_fit() {
        let (intercept, slope) = linear_fit(&[1.0, 3.0, 5.0, 7.0]);
        assert_relative_eq!(intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(slope, 2.0, epsilon = 1e-12);

        let (intercept, slope) = linear_fit(&[4.2]);
        assert_relative_eq!(intercept, 4.2);
        assert_relative_eq!(slope, 0.0);
    }

    #[test]
    fn test_difference_twice() {
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 1), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 2), vec![2.0, 2.0]);
    }

    #[test]
    fn test_yule_walker_recovers_ar1() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut x = vec![0.0f64];
        for t in 1..2000 {
            let shock: f64 = rng.gen_range(-1.0..1.0);
            x.push(0.6 * x[t - 1] + shock);
        }
        let phi = yule_walker(&x, 1);
        assert!((phi[0] - 0.6).abs() < 0.1, "phi = {}", phi[0]);
        assert_eq!(yule_walker(&[2.0; 10], 2), vec![0.0, 0.0]);
    }
}
