//! Automatic ARIMA order selection.
//!
//! `d` comes from repeated KPSS level-stationarity tests; `(p, q)` from a
//! stepwise walk that starts at a few small orders and keeps moving to the
//! lowest-AIC neighbour until none improves or the fit budget runs out.

use std::collections::HashMap;
use tracing::debug;

use super::arima::{self, ArimaOrder};
use super::error::ModelError;
use super::stats;

/// 5% critical value of the KPSS level-stationarity statistic.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub start_p: usize,
    pub start_q: usize,
    pub max_p: usize,
    pub max_q: usize,
    pub max_d: usize,
    /// Optimizer iterations per candidate fit
    pub search_maxiter: usize,
    /// Optimizer iterations for the final fit of the chosen order
    pub fit_maxiter: usize,
    /// Upper bound on candidate fits across the whole walk
    pub max_fits: usize,
    /// Below this length the search is not attempted
    pub min_observations: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            start_p: 1,
            start_q: 1,
            max_p: 3,
            max_q: 3,
            max_d: 2,
            search_maxiter: 25,
            fit_maxiter: 100,
            max_fits: 30,
            min_observations: 16,
        }
    }
}

/// Outcome of a successful search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSearch {
    pub order: ArimaOrder,
    pub aic: f64,
    pub fits: usize,
}

/// KPSS level-stationarity statistic with a Bartlett long-run variance
/// over `floor(3 * sqrt(n) / 13)` lags. `None` for flat or tiny series.
pub fn kpss_statistic(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let mu = stats::mean(values);
    let resid: Vec<f64> = values.iter().map(|v| v - mu).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for e in &resid {
        partial += e;
        eta += partial * partial;
    }
    eta /= (n * n) as f64;

    let lags = (3.0 * (n as f64).sqrt() / 13.0).floor() as usize;
    let mut long_run = resid.iter().map(|e| e * e).sum::<f64>() / n as f64;
    for lag in 1..=lags.min(n - 1) {
        let weight = 1.0 - lag as f64 / (lags as f64 + 1.0);
        let cov: f64 = (lag..n).map(|t| resid[t] * resid[t - lag]).sum();
        long_run += 2.0 * weight * cov / n as f64;
    }

    if long_run <= f64::EPSILON {
        return None;
    }
    Some(eta / long_run)
}

/// Number of differences needed before KPSS stops rejecting stationarity.
pub fn differencing_order(values: &[f64], max_d: usize) -> usize {
    let mut current = values.to_vec();
    let mut d = 0;
    while d < max_d {
        match kpss_statistic(&current) {
            Some(stat) if stat > KPSS_CRITICAL_5PCT => {
                current = stats::difference(&current, 1);
                d += 1;
            }
            _ => break,
        }
    }
    d
}

/// Stepwise AIC search over `(p, q)` for the differencing order chosen by
/// [`differencing_order`].
pub fn search_order(values: &[f64], options: &SearchOptions) -> Result<OrderSearch, ModelError> {
    if values.len() < options.min_observations {
        return Err(ModelError::TooShort {
            needed: options.min_observations,
            got: values.len(),
        });
    }

    let d = differencing_order(values, options.max_d);
    debug!("Order search: d={} over {} observations", d, values.len());

    let mut tried: HashMap<(usize, usize), Option<f64>> = HashMap::new();
    let mut fits = 0;
    let mut best: Option<(usize, usize, f64)> = None;

    let attempt = |p: usize, q: usize, tried: &mut HashMap<(usize, usize), Option<f64>>, fits: &mut usize| {
        if tried.contains_key(&(p, q)) || *fits >= options.max_fits {
            return None;
        }
        *fits += 1;
        let order = ArimaOrder::new(p, d, q);
        let aic = match arima::fit(values, order, options.search_maxiter) {
            Ok(fitted) => Some(fitted.aic),
            Err(e) => {
                debug!("  ARIMA{} skipped: {}", order, e);
                None
            }
        };
        tried.insert((p, q), aic);
        aic
    };

    let seeds = [
        (options.start_p.min(options.max_p), options.start_q.min(options.max_q)),
        (0, 0),
        (1.min(options.max_p), 0),
        (0, 1.min(options.max_q)),
    ];
    for (p, q) in seeds {
        if let Some(aic) = attempt(p, q, &mut tried, &mut fits) {
            if best.map_or(true, |(_, _, b)| aic < b) {
                best = Some((p, q, aic));
            }
        }
    }

    let Some(mut current) = best else {
        return Err(ModelError::NoCandidate);
    };

    while fits < options.max_fits {
        let (p, q, _) = current;
        let mut improved = false;
        for dp in -1i64..=1 {
            for dq in -1i64..=1 {
                if dp == 0 && dq == 0 {
                    continue;
                }
                let (np, nq) = (p as i64 + dp, q as i64 + dq);
                if np < 0 || nq < 0 || np as usize > options.max_p || nq as usize > options.max_q {
                    continue;
                }
                let (np, nq) = (np as usize, nq as usize);
                if let Some(aic) = attempt(np, nq, &mut tried, &mut fits) {
                    if aic < current.2 {
                        current = (np, nq, aic);
                        improved = true;
                    }
                }
            }
        }
        if !improved {
            break;
        }
    }

    let (p, q, aic) = current;
    Ok(OrderSearch {
        order: ArimaOrder::new(p, d, q),
        aic,
        fits,
    })
}
