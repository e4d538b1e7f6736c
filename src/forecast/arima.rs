//! Non-seasonal ARIMA(p, d, q) fitted by conditional sum of squares.
//!
//! The series is differenced `d` times, a mean (drift when `d = 1`) is
//! removed for `d < 2`, and the ARMA coefficients are found with an
//! argmin Nelder-Mead search started from Yule-Walker AR estimates. No
//! stationarity or invertibility constraint is imposed on the search.
//!
//! Residuals are taken over every differenced point with zero pre-sample
//! lags, so all orders of a given `d` are scored on the same sample.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use super::error::ModelError;
use super::stats;

const SIMPLEX_STEP: f64 = 0.1;
const TOLERANCE: f64 = 1e-10;
const EXPLOSION_LIMIT: f64 = 1e150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Shortest input that leaves more residuals than free parameters.
    pub fn min_observations(&self) -> usize {
        self.d + 2 * self.p + self.q + 2
    }

    fn has_mean(&self) -> bool {
        self.d < 2
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone)]
pub struct FittedArima {
    pub order: ArimaOrder,
    pub mean: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub aic: f64,
    /// Differenced, demeaned series the ARMA part was fitted on
    centered: Vec<f64>,
    residuals: Vec<f64>,
    /// Last observed value at each differencing level `0..d`
    level_tails: Vec<f64>,
}

/// Fit `order` to `values` with at most `max_iter` optimizer iterations.
pub fn fit(values: &[f64], order: ArimaOrder, max_iter: usize) -> Result<FittedArima, ModelError> {
    let needed = order.min_observations();
    if values.len() < needed {
        return Err(ModelError::TooShort { needed, got: values.len() });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("input series".to_string()));
    }

    let level_tails: Vec<f64> = (0..order.d)
        .map(|k| *stats::difference(values, k).last().unwrap_or(&0.0))
        .collect();

    let differenced = stats::difference(values, order.d);
    let mean = if order.has_mean() { stats::mean(&differenced) } else { 0.0 };
    let centered: Vec<f64> = differenced.iter().map(|v| v - mean).collect();

    let scale = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let spread = centered.iter().map(|v| v * v).sum::<f64>() / centered.len() as f64;
    if spread <= 1e-12 * (1.0 + scale * scale) {
        return Err(ModelError::DegenerateVariance);
    }

    let (p, q) = (order.p, order.q);
    let mut start = stats::yule_walker(&centered, p);
    start.extend(std::iter::repeat(0.0).take(q));

    let minimum = minimize_css(&centered, p, start, max_iter)?;
    if !minimum.sse.is_finite() {
        return Err(ModelError::NonFinite(format!("ARIMA{} objective", order)));
    }

    let ar = minimum.params[..p].to_vec();
    let ma = minimum.params[p..].to_vec();
    let residuals = css_residuals(&centered, &ar, &ma);

    let effective = centered.len() as f64;
    let sigma2 = minimum.sse / effective;
    if sigma2 <= 1e-12 * spread {
        return Err(ModelError::DegenerateVariance);
    }

    let log_likelihood = -0.5 * effective * ((2.0 * PI * sigma2).ln() + 1.0);
    let params = p + q + 1 + usize::from(order.has_mean());
    let aic = -2.0 * log_likelihood + 2.0 * params as f64;
    if !aic.is_finite() {
        return Err(ModelError::NonFinite(format!("ARIMA{} AIC", order)));
    }

    debug!(
        "ARIMA{} fit: aic={:.2} sigma2={:.4} iterations={} converged={}",
        order, aic, sigma2, minimum.iterations, minimum.converged
    );

    Ok(FittedArima {
        order,
        mean,
        ar,
        ma,
        aic,
        centered,
        residuals,
        level_tails,
    })
}

/// Conditional sum of squares of an ARMA(p, q) on a centered series.
/// Parameters are the AR coefficients followed by the MA coefficients.
struct CssObjective {
    z: Vec<f64>,
    p: usize,
}

impl CostFunction for CssObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(conditional_sse(&self.z, &param[..self.p], &param[self.p..]))
    }
}

struct CssMinimum {
    params: Vec<f64>,
    sse: f64,
    iterations: u64,
    converged: bool,
}

fn minimize_css(z: &[f64], p: usize, start: Vec<f64>, max_iter: usize) -> Result<CssMinimum, ModelError> {
    let objective = CssObjective { z: z.to_vec(), p };

    // A simplex needs at least one dimension
    if start.is_empty() {
        let sse = objective
            .cost(&start)
            .map_err(|e| ModelError::Optimizer(e.to_string()))?;
        return Ok(CssMinimum { params: start, sse, iterations: 0, converged: true });
    }

    let mut simplex = vec![start.clone()];
    for i in 0..start.len() {
        let mut vertex = start.clone();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(TOLERANCE)
        .map_err(|e| ModelError::Optimizer(e.to_string()))?;
    let result = Executor::new(objective, solver)
        .configure(|state| state.max_iters(max_iter as u64))
        .run()
        .map_err(|e| ModelError::Optimizer(e.to_string()))?;

    let state = &result.state;
    let params = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| ModelError::Optimizer("no parameters returned from optimizer".to_string()))?;
    let converged = matches!(state.get_termination_reason(), Some(TerminationReason::SolverConverged));

    Ok(CssMinimum {
        params,
        sse: state.get_best_cost(),
        iterations: state.get_iter(),
        converged,
    })
}

impl FittedArima {
    /// Point forecasts `horizon` steps past the end of the fitted series,
    /// on the original (undifferenced) scale.
    pub fn forecast(&self, horizon: usize) -> Result<Vec<f64>, ModelError> {
        let mut history = self.centered.clone();
        let mut shocks = self.residuals.clone();

        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let n = history.len();
            let mut next = 0.0;
            for (i, phi) in self.ar.iter().enumerate() {
                next += phi * history[n - 1 - i];
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(e) = shocks.len().checked_sub(j + 1).map(|idx| shocks[idx]) {
                    next += theta * e;
                }
            }
            history.push(next);
            shocks.push(0.0);
            out.push(next + self.mean);
        }

        for tail in self.level_tails.iter().rev() {
            let mut running = *tail;
            for v in out.iter_mut() {
                running += *v;
                *v = running;
            }
        }

        if out.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite(format!("ARIMA{} forecast", self.order)));
        }
        Ok(out)
    }
}

/// One-step prediction errors over the whole series, with pre-sample
/// values and shocks taken as zero.
fn css_residuals(z: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut e = vec![0.0; z.len()];
    for t in 0..z.len() {
        let mut pred = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            if t > i {
                pred += phi * z[t - 1 - i];
            }
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                pred += theta * e[t - 1 - j];
            }
        }
        e[t] = z[t] - pred;
    }
    e
}

fn conditional_sse(z: &[f64], ar: &[f64], ma: &[f64]) -> f64 {
    let e = css_residuals(z, ar, ma);
    let mut sse = 0.0;
    for v in &e {
        if !v.is_finite() || v.abs() > EXPLOSION_LIMIT {
            return f64::INFINITY;
        }
        sse += v * v;
    }
    sse
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn ar1_series(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = vec![0.0f64];
        for t in 1..n {
            let shock: f64 = rng.gen_range(-1.0..1.0);
            x.push(phi * x[t - 1] + shock);
        }
        x.iter().map(|v| v + 20.0).collect()
    }

    #[test]
    fn test_order_display() {
        assert_eq!(ArimaOrder::new(2, 1, 0).to_string(), "(2, 1, 0)");
    }

    #[test]
    fn test_fit_recovers_ar_coefficient() {
        let series = ar1_series(0.7, 400, 11);
        let fitted = fit(&series, ArimaOrder::new(1, 0, 0), 200).unwrap();

        assert!((fitted.ar[0] - 0.7).abs() < 0.1, "phi = {}", fitted.ar[0]);
        assert!((fitted.mean - 20.0).abs() < 0.5, "mean = {}", fitted.mean);
        assert!(fitted.aic.is_finite());
    }

    #[test]
    fn test_every_order_is_scored_on_the_full_sample() {
        let series = ar1_series(0.2, 90, 7);
        for order in [ArimaOrder::new(0, 0, 0), ArimaOrder::new(3, 0, 0), ArimaOrder::new(2, 0, 2)] {
            let fitted = fit(&series, order, 100).unwrap();
            assert_eq!(fitted.residuals.len(), series.len());

            let n = series.len() as f64;
            let sse: f64 = fitted.residuals.iter().map(|e| e * e).sum();
            let k = (order.p + order.q + 2) as f64;
            let expected = n * ((2.0 * PI * sse / n).ln() + 1.0) + 2.0 * k;
            assert_relative_eq!(fitted.aic, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forecast_length_and_mean_reversion() {
        let series = ar1_series(0.5, 300, 3);
        let fitted = fit(&series, ArimaOrder::new(1, 0, 1), 200).unwrap();
        let fc = fitted.forecast(30).unwrap();

        assert_eq!(fc.len(), 30);
        assert!((fc[29] - fitted.mean).abs() < 0.5);
    }

    #[test]
    fn test_integration_continues_random_walk_with_drift() {
        // Drift 0.5 per step plus bounded noise
        let mut rng = StdRng::seed_from_u64(5);
        let mut level = 0.0;
        let series: Vec<f64> = (0..200)
            .map(|_| {
                level += 0.5 + rng.gen_range(-0.3..0.3);
                level
            })
            .collect();
        let fitted = fit(&series, ArimaOrder::new(0, 1, 0), 50).unwrap();
        let fc = fitted.forecast(4).unwrap();

        let last = *series.last().unwrap();
        assert!((fc[0] - (last + fitted.mean)).abs() < 1e-9);
        assert!(fc[3] > fc[0]);
    }

    #[test]
    fn test_second_difference_forecast_extends_quadratic_curvature() {
        let mut rng = StdRng::seed_from_u64(9);
        let series: Vec<f64> = (0..120)
            .map(|t| {
                let t = t as f64;
                0.01 * t * t + rng.gen_range(-0.05..0.05)
            })
            .collect();
        let fitted = fit(&series, ArimaOrder::new(0, 2, 1), 100).unwrap();
        let fc = fitted.forecast(3).unwrap();
        assert_eq!(fc.len(), 3);
        assert!(fc.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        let err = fit(&[0.0; 40], ArimaOrder::new(1, 0, 1), 50).unwrap_err();
        assert_eq!(err, ModelError::DegenerateVariance);

        let err = fit(&[5.0; 40], ArimaOrder::new(0, 1, 0), 50).unwrap_err();
        assert_eq!(err, ModelError::DegenerateVariance);
    }

    #[test]
    fn test_short_series_is_rejected() {
        let order = ArimaOrder::new(3, 1, 3);
        let err = fit(&[1.0, 2.0, 3.0], order, 50).unwrap_err();
        assert_eq!(err, ModelError::TooShort { needed: order.min_observations(), got: 3 });
    }
}
