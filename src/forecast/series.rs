//! Daily time series container shared by the fetcher, the file reader and
//! the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One `(date, value)` pair. `None` marks a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Observations ordered ascending by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: Vec<Observation>,
}

impl TimeSeries {
    /// Build a series from unordered pairs. Non-finite values count as
    /// missing. The sort is stable, so duplicate dates keep input order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut points: Vec<Observation> = pairs
            .into_iter()
            .map(|(date, value)| Observation {
                date,
                value: value.filter(|v| v.is_finite()),
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn missing_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_none()).count()
    }
}

#[cfg(test)]
impl TimeSeries {
    /// Fully observed, parallel date/value slices.
    pub fn from_values(dates: &[NaiveDate], values: &[f64]) -> Self {
        Self::from_pairs(dates.iter().copied().zip(values.iter().map(|v| Some(*v))))
    }
}

/// `count` consecutive days starting the day after `last`.
pub fn following_days(last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    last.iter_days().skip(1).take(count).collect()
}
