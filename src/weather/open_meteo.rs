use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{mean_temperature, DailyWeather, Location, WeatherTable};
use crate::config::FetchConfig;

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";

/// Open-Meteo daily history client.
/// One GET per fetch, no retries; failures come back as an empty table.
pub struct OpenMeteoClient {
    http: reqwest::Client,
    archive_url: String,
    forecast_url: String,
}

/// Which Open-Meteo service a date range is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Archive,
    Forecast,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<String>,
    temperature_2m_max: Option<Vec<Option<f64>>>,
    temperature_2m_min: Option<Vec<Option<f64>>>,
    precipitation_sum: Option<Vec<Option<f64>>>,
}

/// `[today - lookback_days, today]`
pub fn date_range(today: NaiveDate, lookback_days: u32) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(lookback_days as i64), today)
}

/// Ranges starting today or later only exist on the forecast service.
pub fn select_endpoint(start: NaiveDate, today: NaiveDate) -> Endpoint {
    if start >= today {
        Endpoint::Forecast
    } else {
        Endpoint::Archive
    }
}

impl OpenMeteoClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            archive_url: config.archive_url.clone(),
            forecast_url: config.forecast_url.clone(),
        })
    }

    /// Fetch daily history ending today (UTC). Never fails: transport or
    /// format problems are logged and yield an empty table.
    pub async fn fetch_history(&self, location: &Location, lookback_days: u32) -> WeatherTable {
        let today = Utc::now().date_naive();
        let (start, end) = date_range(today, lookback_days);

        match self.fetch_range(location, start, end, today).await {
            Ok(table) => {
                info!("Fetched {} days of weather for {}", table.len(), location);
                table
            }
            Err(e) => {
                warn!("Error fetching weather for {}: {:#}", location, e);
                WeatherTable::empty()
            }
        }
    }

    async fn fetch_range(
        &self,
        location: &Location,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Result<WeatherTable> {
        let url = self.request_url(location, start, end, today);
        debug!("Open-Meteo request for {}: {}", location.label, url);

        let data: DailyResponse = self.http
            .get(&url)
            .send()
            .await
            .context("Open-Meteo request failed")?
            .error_for_status()
            .context("Open-Meteo returned an error status")?
            .json()
            .await
            .context("Failed to parse Open-Meteo response")?;

        parse_daily(data)
    }

    fn request_url(&self, location: &Location, start: NaiveDate, end: NaiveDate, today: NaiveDate) -> String {
        let base = match select_endpoint(start, today) {
            Endpoint::Archive => &self.archive_url,
            Endpoint::Forecast => &self.forecast_url,
        };
        format!(
            "{}?latitude={:.6}&longitude={:.6}&start_date={}&end_date={}&daily={}&timezone=UTC",
            base,
            location.lat,
            location.lon,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            DAILY_FIELDS
        )
    }
}

/// Map the parallel daily arrays into rows sorted by date.
fn parse_daily(data: DailyResponse) -> Result<WeatherTable> {
    let Some(daily) = data.daily else {
        warn!("No daily data in Open-Meteo response");
        return Ok(WeatherTable::empty());
    };
    if daily.time.is_empty() {
        return Ok(WeatherTable::empty());
    }

    let n = daily.time.len();
    let max = daily.temperature_2m_max.context("Missing temperature_2m_max")?;
    let min = daily.temperature_2m_min.context("Missing temperature_2m_min")?;
    let precip = daily.precipitation_sum.context("Missing precipitation_sum")?;
    if max.len() != n || min.len() != n || precip.len() != n {
        bail!(
            "Daily arrays differ in length: time={} max={} min={} precipitation={}",
            n,
            max.len(),
            min.len(),
            precip.len()
        );
    }

    let mut rows = Vec::with_capacity(n);
    for (i, raw) in daily.time.iter().enumerate() {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date in daily.time: {}", raw))?;
        rows.push(DailyWeather {
            date,
            temperature_2m_max: max[i],
            temperature_2m_min: min[i],
            precipitation_sum: precip[i],
            temperature_2m: mean_temperature(max[i], min[i]),
        });
    }

    Ok(WeatherTable::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn parse(json: &str) -> Result<WeatherTable> {
        parse_daily(serde_json::from_str(json).unwrap())
    }

    fn unreachable_config() -> FetchConfig {
        FetchConfig {
            timeout_secs: 2,
            archive_url: "http://127.0.0.1:9/v1/archive".to_string(),
            forecast_url: "http://127.0.0.1:9/v1/forecast".to_string(),
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_endpoint_selection() {
        let today = day("2025-06-10");
        let (start, end) = date_range(today, 90);
        assert_eq!(end, today);
        assert_eq!(start, day("2025-03-12"));
        assert_eq!(select_endpoint(start, today), Endpoint::Archive);
        assert_eq!(select_endpoint(today, today), Endpoint::Forecast);
        assert_eq!(select_endpoint(day("2025-06-11"), today), Endpoint::Forecast);
    }

    #[test]
    fn test_request_url() {
        let client = OpenMeteoClient::new(&FetchConfig::default()).unwrap();
        let loc = Location { label: "Mumbai".into(), lat: 19.076, lon: 72.8777 };
        let today = day("2025-06-10");

        let url = client.request_url(&loc, day("2025-06-01"), today, today);
        assert!(url.starts_with("https://archive-api.open-meteo.com/v1/archive?"));
        assert!(url.contains("latitude=19.076000&longitude=72.877700"));
        assert!(url.contains("start_date=2025-06-01&end_date=2025-06-10"));
        assert!(url.contains("daily=temperature_2m_max,temperature_2m_min,precipitation_sum"));
        assert!(url.ends_with("timezone=UTC"));

        let url = client.request_url(&loc, today, today, today);
        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?"));
    }

    #[test]
    fn test_parse_daily_sorts_and_derives_mean() {
        let table = parse(
            r#"{"daily": {
                "time": ["2025-06-02", "2025-06-01", "2025-06-03"],
                "temperature_2m_max": [31.0, 30.0, null],
                "temperature_2m_min": [25.0, 24.0, null],
                "precipitation_sum": [0.0, 1.2, 3.4]
            }}"#,
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0].date, day("2025-06-01"));
        assert_eq!(table.rows[0].temperature_2m, Some(27.0));
        assert_eq!(table.rows[1].temperature_2m, Some(28.0));
        // missing values stay in the table
        assert_eq!(table.rows[2].temperature_2m, None);
        assert_eq!(table.rows[2].precipitation_sum, Some(3.4));
    }

    #[test]
    fn test_parse_without_daily_is_empty() {
        assert!(parse(r#"{"error": false}"#).unwrap().is_empty());
        assert!(parse(r#"{"daily": {"time": []}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_arrays() {
        assert!(parse(
            r#"{"daily": {"time": ["2025-06-01", "2025-06-02"],
                "temperature_2m_max": [1.0],
                "temperature_2m_min": [0.0, 0.5],
                "precipitation_sum": [0.0, 0.0]}}"#
        )
        .is_err());

        assert!(parse(r#"{"daily": {"time": ["2025-06-01"], "temperature_2m_max": [1.0]}}"#).is_err());

        assert!(parse(
            r#"{"daily": {"time": ["June 1"],
                "temperature_2m_max": [1.0],
                "temperature_2m_min": [0.0],
                "precipitation_sum": [0.0]}}"#
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_network_failure_returns_empty_table() {
        let client = OpenMeteoClient::new(&unreachable_config()).unwrap();
        let loc = Location { label: "nowhere".into(), lat: 0.0, lon: 0.0 };

        let table = client.fetch_history(&loc, 30).await;
        assert!(table.is_empty());
        assert!(table.temperature_series().is_empty());
    }
}
