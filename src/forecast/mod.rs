//! Forecast pipeline: clean a raw daily series, try an automatically
//! ordered ARIMA model, fall back to a linear trend, and return a
//! fixed-horizon table with a one-line summary.

pub mod arima;
pub mod auto;
pub mod cache;
pub mod clean;
pub mod error;
pub mod series;
pub mod stats;
pub mod trend;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub use arima::ArimaOrder;
pub use auto::SearchOptions;
pub use cache::ForecastCache;
pub use clean::CleaningOptions;
pub use error::{ForecastError, Result};
pub use series::TimeSeries;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastOptions {
    pub horizon: usize,
    pub cleaning: CleaningOptions,
    pub search: SearchOptions,
}

#[cfg(test)]
impl ForecastOptions {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            cleaning: CleaningOptions::default(),
            search: SearchOptions::default(),
        }
    }
}

/// Which tier produced the forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelOutcome {
    Arima { order: ArimaOrder, aic: f64 },
    LinearTrend,
}

#[cfg(test)]
impl ModelOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ModelOutcome::LinearTrend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSummary {
    pub model: ModelOutcome,
    pub outliers: usize,
}

impl std::fmt::Display for ForecastSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.model {
            ModelOutcome::Arima { order, aic } => write!(
                f,
                "ARIMA order={}, AIC={:.2}, Outliers handled={}.",
                order, aic, self.outliers
            ),
            ModelOutcome::LinearTrend => write!(
                f,
                "Fallback Linear Regression used. Outliers handled={}.",
                self.outliers
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    pub summary: ForecastSummary,
}

#[cfg(test)]
impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// Run the full pipeline on `series`.
///
/// Primary-model failures are logged and absorbed; only invalid options
/// and inputs with nothing to forecast from are returned as errors.
pub fn forecast(series: &TimeSeries, options: &ForecastOptions) -> Result<ForecastResult> {
    if options.horizon == 0 {
        return Err(ForecastError::invalid("horizon", options.horizon, "must be at least 1"));
    }

    let cleaned = clean::clean(series, &options.cleaning)?;
    let values = &cleaned.series.values;

    let (model, predicted) = match primary(values, options) {
        Some(found) => found,
        None => (ModelOutcome::LinearTrend, trend::extrapolate(values, options.horizon)),
    };

    if predicted.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::NonFiniteForecast);
    }

    let points = series::following_days(cleaned.series.last_date(), options.horizon)
        .into_iter()
        .zip(predicted)
        .map(|(date, value)| ForecastPoint { date, value })
        .collect();

    let summary = ForecastSummary { model, outliers: cleaned.outliers };
    info!("{}", summary);

    Ok(ForecastResult { points, summary })
}

/// Order search followed by the final fit. `None` means "use the fallback".
fn primary(values: &[f64], options: &ForecastOptions) -> Option<(ModelOutcome, Vec<f64>)> {
    let found = match auto::search_order(values, &options.search) {
        Ok(found) => found,
        Err(e) => {
            warn!("Auto ARIMA failed: {}. Using fallback model.", e);
            return None;
        }
    };

    debug!(
        "Selected ARIMA{} with search aic={:.2} after {} fits",
        found.order, found.aic, found.fits
    );

    let fitted = arima::fit(values, found.order, options.search.fit_maxiter)
        .and_then(|fitted| fitted.forecast(options.horizon).map(|fc| (fitted.aic, fc)));

    match fitted {
        Ok((aic, fc)) => Some((ModelOutcome::Arima { order: found.order, aic }, fc)),
        Err(e) => {
            warn!("ARIMA{} fit failed: {}. Switching to fallback model.", found.order, e);
            None
        }
    }
}
