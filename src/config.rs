use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::forecast::{CleaningOptions, ForecastOptions, SearchOptions};
use crate::weather::Location;

const CONFIG_FILE: &str = "meteocast.toml";
const CONFIG_ENV: &str = "METEOCAST_CONFIG";

/// Control ranges exposed to the user
pub const LOOKBACK_RANGE: std::ops::RangeInclusive<u32> = 7..=365;
pub const HORIZON_RANGE: std::ops::RangeInclusive<usize> = 1..=365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

fn default_label() -> String { "Mumbai".to_string() }
fn default_latitude() -> f64 { 19.0760 }
fn default_longitude() -> f64 { 72.8777 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            timeout_secs: default_timeout_secs(),
            archive_url: default_archive_url(),
            forecast_url: default_forecast_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_lookback_days() -> u32 { 90 }
fn default_timeout_secs() -> u64 { 30 }
fn default_archive_url() -> String { "https://archive-api.open-meteo.com/v1/archive".to_string() }
fn default_forecast_url() -> String { "https://api.open-meteo.com/v1/forecast".to_string() }
fn default_user_agent() -> String { format!("meteocast/{}", env!("CARGO_PKG_VERSION")) }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_true")]
    pub smooth: bool,
    #[serde(default = "default_window")]
    pub window: usize,
    /// Values with |z| above this are treated as missing
    #[serde(default = "default_z_threshold")]
    pub outlier_z_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            smooth: true,
            window: default_window(),
            outlier_z_threshold: default_z_threshold(),
        }
    }
}

fn default_true() -> bool { true }
fn default_horizon() -> usize { 7 }
fn default_window() -> usize { 3 }
fn default_z_threshold() -> f64 { 3.0 }

/// ARIMA order search bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_start_order")]
    pub start_p: usize,
    #[serde(default = "default_start_order")]
    pub start_q: usize,
    #[serde(default = "default_max_order")]
    pub max_p: usize,
    #[serde(default = "default_max_order")]
    pub max_q: usize,
    #[serde(default = "default_max_d")]
    pub max_d: usize,
    #[serde(default = "default_search_maxiter")]
    pub search_maxiter: usize,
    #[serde(default = "default_fit_maxiter")]
    pub fit_maxiter: usize,
    #[serde(default = "default_max_fits")]
    pub max_fits: usize,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

impl Default for SearchConfig {
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

fn default_start_order() -> usize { 1 }
fn default_max_order() -> usize { 3 }
fn default_max_d() -> usize { 2 }
fn default_search_maxiter() -> usize { 25 }
fn default_fit_maxiter() -> usize { 100 }
fn default_max_fits() -> usize { 30 }
fn default_min_observations() -> usize { 16 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: default_capacity() }
    }
}

fn default_capacity() -> usize { 32 }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DashboardConfig {
    /// Load from `path`, else `$METEOCAST_CONFIG`, else `meteocast.toml`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE)),
        };

        let config = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Self::from_toml(&data)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOOKBACK_RANGE.contains(&self.fetch.lookback_days) {
            bail!("lookback_days must be within 7-365, got {}", self.fetch.lookback_days);
        }
        if !HORIZON_RANGE.contains(&self.pipeline.horizon) {
            bail!("horizon must be within 1-365, got {}", self.pipeline.horizon);
        }
        if self.pipeline.window == 0 {
            bail!("window must be at least 1");
        }
        let z = self.pipeline.outlier_z_threshold;
        if !z.is_finite() || z <= 0.0 {
            bail!("outlier_z_threshold must be positive, got {}", z);
        }
        if self.search.max_p > 5 || self.search.max_q > 5 || self.search.max_d > 2 {
            bail!("search orders are limited to max_p/max_q <= 5 and max_d <= 2");
        }
        if self.search.max_fits == 0 {
            bail!("max_fits must be at least 1");
        }
        if self.cache.capacity == 0 {
            bail!("cache capacity must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn default_location(&self) -> Location {
        Location {
            label: self.location.label.clone(),
            lat: self.location.latitude,
            lon: self.location.longitude,
        }
    }

    /// Pipeline options for a given horizon.
    pub fn forecast_options(&self, horizon: usize) -> ForecastOptions {
        let s = &self.search;
        ForecastOptions {
            horizon,
            cleaning: CleaningOptions {
                smooth: self.pipeline.smooth,
                window: self.pipeline.window,
                outlier_z_threshold: self.pipeline.outlier_z_threshold,
            },
            search: SearchOptions {
                start_p: s.start_p,
                start_q: s.start_q,
                max_p: s.max_p,
                max_q: s.max_q,
                max_d: s.max_d,
                search_maxiter: s.search_maxiter,
                fit_maxiter: s.fit_maxiter,
                max_fits: s.max_fits,
                min_observations: s.min_observations,
            },
        }
    }
}
