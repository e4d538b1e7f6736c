//! Stage A of the pipeline: calendar reindexing, gap filling, outlier
//! replacement and optional smoothing.

use chrono::NaiveDate;
use tracing::debug;

use super::error::{ForecastError, Result};
use super::series::TimeSeries;
use super::stats;

/// Cleaning knobs. Defaults: smoothing on, 3-day window, |z| > 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleaningOptions {
    pub smooth: bool,
    pub window: usize,
    pub outlier_z_threshold: f64,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            smooth: true,
            window: 3,
            outlier_z_threshold: 3.0,
        }
    }
}

impl CleaningOptions {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(ForecastError::invalid("window", self.window, "must be at least 1"));
        }
        if !self.outlier_z_threshold.is_finite() || self.outlier_z_threshold <= 0.0 {
            return Err(ForecastError::invalid(
                "outlier_z_threshold",
                self.outlier_z_threshold,
                "must be a positive finite number",
            ));
        }
        Ok(())
    }
}

/// Gap-free daily series: one known value per day from `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub start: NaiveDate,
    pub values: Vec<f64>,
}

impl DailySeries {
    pub fn last_date(&self) -> NaiveDate {
        self.start + chrono::Duration::days(self.values.len().saturating_sub(1) as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleaningResult {
    pub series: DailySeries,
    pub outliers: usize,
}

/// Run the whole cleaning stage.
pub fn clean(series: &TimeSeries, options: &CleaningOptions) -> Result<CleaningResult> {
    options.validate()?;

    let (start, raw) = reindex_daily(series)?;
    let mut values = fill_missing(&raw).ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;

    let outliers = replace_outliers(&mut values, options.outlier_z_threshold)?;

    if options.smooth {
        values = stats::centered_rolling_mean(&values, options.window);
    }

    debug!(
        "Cleaned series: {} days from {}, {} filled, {} outliers",
        values.len(),
        start,
        raw.iter().filter(|v| v.is_none()).count(),
        outliers
    );

    Ok(CleaningResult {
        series: DailySeries { start, values },
        outliers,
    })
}

/// Spread observations onto a strict daily grid covering
/// `[first date, last date]`; absent days become `None`.
pub fn reindex_daily(series: &TimeSeries) -> Result<(NaiveDate, Vec<Option<f64>>)> {
    let (first, last) = match (series.first_date(), series.last_date()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(ForecastError::InsufficientData { needed: 1, got: 0 }),
    };

    let span = (last - first).num_days() as usize + 1;
    let mut grid: Vec<Option<f64>> = vec![None; span];
    let mut seen = vec![false; span];

    for point in series.points() {
        let idx = (point.date - first).num_days() as usize;
        if seen[idx] {
            return Err(ForecastError::DuplicateDate(point.date));
        }
        seen[idx] = true;
        grid[idx] = point.value;
    }

    Ok((first, grid))
}

/// Linear interpolation between known neighbours, then back-fill of the
/// head and forward-fill of the tail. `None` when nothing is known.
pub fn fill_missing(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().position(|v| v.is_some())?;
    let last = values.iter().rposition(|v| v.is_some())?;

    let mut out = vec![0.0; values.len()];
    let mut prev_idx = first;
    let mut prev_val = values[first]?;
    out[first] = prev_val;

    for i in (first + 1)..=last {
        if let Some(v) = values[i] {
            let gap = i - prev_idx;
            let slope = (v - prev_val) / gap as f64;
            for j in 1..gap {
                out[prev_idx + j] = prev_val + slope * j as f64;
            }
            out[i] = v;
            prev_idx = i;
            prev_val = v;
        }
    }

    let head = out[first];
    out[..first].fill(head);
    let tail = out[last];
    out[last + 1..].fill(tail);

    Some(out)
}

/// Blank out values whose |z| exceeds `threshold` and refill them.
/// Returns the number replaced; a flat or single-point series has none.
fn replace_outliers(values: &mut Vec<f64>, threshold: f64) -> Result<usize> {
    let Some(z) = stats::abs_z_scores(values) else {
        return Ok(0);
    };

    let masked: Vec<Option<f64>> = values
        .iter()
        .zip(&z)
        .map(|(v, z)| if *z > threshold { None } else { Some(*v) })
        .collect();
    let count = masked.iter().filter(|v| v.is_none()).count();
    if count == 0 {
        return Ok(0);
    }

    *values = fill_missing(&masked).ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;
    Ok(count)
}
