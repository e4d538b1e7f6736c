pub mod open_meteo;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::forecast::TimeSeries;

/// Point of interest. The label is display-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.4}, {:.4})", self.label, self.lat, self.lon)
    }
}

/// One day of observations. Missing API values stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub temperature_2m_max: Option<f64>,
    pub temperature_2m_min: Option<f64>,
    pub precipitation_sum: Option<f64>,
    /// Mean of max and min
    pub temperature_2m: Option<f64>,
}

/// Daily history sorted ascending by date. Empty means "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherTable {
    pub rows: Vec<DailyWeather>,
}

impl WeatherTable {
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn from_rows(mut rows: Vec<DailyWeather>) -> Self {
        rows.sort_by_key(|r| r.date);
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Average temperature column as a pipeline input.
    pub fn temperature_series(&self) -> TimeSeries {
        TimeSeries::from_pairs(self.rows.iter().map(|r| (r.date, r.temperature_2m)))
    }
}

/// Mean of whichever of `max`/`min` are present.
pub fn mean_temperature(max: Option<f64>, min: Option<f64>) -> Option<f64> {
    match (max, min) {
        (Some(hi), Some(lo)) => Some((hi + lo) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}
