//! Bounded LRU memo of pipeline results, keyed by a SHA-256 digest of the
//! input series and every option that influences the output.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::error::Result;
use super::series::TimeSeries;
use super::{forecast, ForecastOptions, ForecastResult};

pub struct ForecastCache {
    capacity: usize,
    entries: HashMap<String, ForecastResult>,
    /// Keys from least to most recently used
    recency: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl ForecastCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the memoised result for these inputs, running the pipeline
    /// on a miss. Errors are not cached.
    pub fn get_or_compute(&mut self, series: &TimeSeries, options: &ForecastOptions) -> Result<ForecastResult> {
        let key = cache_key(series, options);

        if let Some(hit) = self.entries.get(&key).cloned() {
            self.hits += 1;
            self.touch(&key);
            debug!("Forecast cache hit {} ({} entries)", &key[..12], self.entries.len());
            return Ok(hit);
        }

        self.misses += 1;
        debug!("Forecast cache miss {}", &key[..12]);
        let result = forecast(series, options)?;
        self.insert(key, result.clone());
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn insert(&mut self, key: String, result: ForecastResult) {
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.recency.pop_front() else { break };
            debug!("Forecast cache evicting {}", &oldest[..12]);
            self.entries.remove(&oldest);
        }
        self.recency.push_back(key.clone());
        self.entries.insert(key, result);
    }
}

/// Hex SHA-256 over a fixed binary encoding of the inputs.
pub fn cache_key(series: &TimeSeries, options: &ForecastOptions) -> String {
    let mut hasher = Sha256::new();

    hasher.update((series.len() as u64).to_le_bytes());
    for point in series.points() {
        hasher.update(chrono::Datelike::num_days_from_ce(&point.date).to_le_bytes());
        match point.value {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update(v.to_bits().to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
    }

    let cleaning = &options.cleaning;
    hasher.update((options.horizon as u64).to_le_bytes());
    hasher.update([u8::from(cleaning.smooth)]);
    hasher.update((cleaning.window as u64).to_le_bytes());
    hasher.update(cleaning.outlier_z_threshold.to_bits().to_le_bytes());

    let search = &options.search;
    for field in [
        search.start_p,
        search.start_q,
        search.max_p,
        search.max_q,
        search.max_d,
        search.search_maxiter,
        search.fit_maxiter,
        search.max_fits,
        search.min_observations,
    ] {
        hasher.update((field as u64).to_le_bytes());
    }

    hex::encode(hasher.finalize())
}
