//! Interactive dashboard session: the controls, the "Load & Forecast"
//! trigger, and the result cache that lives for the whole process.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::{DashboardConfig, HORIZON_RANGE, LOOKBACK_RANGE};
use crate::forecast::{ForecastCache, ForecastResult, TimeSeries};
use crate::table;
use crate::weather::open_meteo::OpenMeteoClient;
use crate::weather::{Location, WeatherTable};

const HELP: &str = "\
Commands:
  location <lat> <lon> [label]   set the point of interest
  days <n>                       history window in days (7-365)
  horizon <n>                    forecast horizon in days (1-365)
  upload <path> | upload off     forecast a time,value CSV instead of fetching
  run                            load data and forecast
  show                           print the current controls and last result
  clear                          reset controls to their defaults
  help                           this text
  quit                           leave the session";

/// User-adjustable inputs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub location: Location,
    pub lookback_days: u32,
    pub horizon: usize,
    /// When set, the file replaces the fetched history
    pub upload: Option<PathBuf>,
}

impl Controls {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            location: config.default_location(),
            lookback_days: config.fetch.lookback_days,
            horizon: config.pipeline.horizon,
            upload: None,
        }
    }
}

impl std::fmt::Display for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Location: {}", self.location)?;
        writeln!(f, "History:  {} days", self.lookback_days)?;
        writeln!(f, "Horizon:  {} days", self.horizon)?;
        match &self.upload {
            Some(path) => write!(f, "Upload:   {}", path.display()),
            None => write!(f, "Upload:   none (fetching from Open-Meteo)"),
        }
    }
}

/// The data a forecast was computed from.
#[derive(Debug, Clone, PartialEq)]
pub enum History {
    Fetched(WeatherTable),
    Uploaded(TimeSeries),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub history: History,
    pub result: ForecastResult,
}

impl RunReport {
    /// History table, summary, forecast table and download link.
    pub fn render(&self) -> Result<String> {
        let history = match &self.history {
            History::Fetched(weather) => table::render_weather(weather),
            History::Uploaded(series) => table::render_series(series),
        };
        let csv = table::forecast_csv(&self.result)?;
        Ok(format!(
            "{}\n{}\n\n{}\n{}",
            history,
            self.result.summary,
            table::render_forecast(&self.result),
            table::download_link(&csv, "forecast.csv")
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The fetch came back empty
    NoData,
    Report(RunReport),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Location { lat: f64, lon: f64, label: Option<String> },
    Days(u32),
    Horizon(usize),
    Upload(Option<PathBuf>),
    Run,
    Clear,
    Show,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        bail!("empty command");
    };
    let rest: Vec<&str> = words.collect();

    let cmd = match (name.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("location", [lat, lon, label @ ..]) => Command::Location {
            lat: lat.parse().with_context(|| format!("invalid latitude {:?}", lat))?,
            lon: lon.parse().with_context(|| format!("invalid longitude {:?}", lon))?,
            label: (!label.is_empty()).then(|| label.join(" ")),
        },
        ("days", [n]) => Command::Days(n.parse().with_context(|| format!("invalid day count {:?}", n))?),
        ("horizon", [n]) => Command::Horizon(n.parse().with_context(|| format!("invalid horizon {:?}", n))?),
        ("upload", ["off"]) => Command::Upload(None),
        ("upload", [path]) => Command::Upload(Some(PathBuf::from(path))),
        ("run", []) => Command::Run,
        ("clear", []) => Command::Clear,
        ("show", []) => Command::Show,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => bail!("unrecognised command {:?} (try `help`)", line.trim()),
    };
    Ok(cmd)
}

pub struct Dashboard {
    config: DashboardConfig,
    client: OpenMeteoClient,
    cache: ForecastCache,
    controls: Controls,
    last: Option<RunReport>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Result<Self> {
        let client = OpenMeteoClient::new(&config.fetch)?;
        let cache = ForecastCache::new(config.cache.capacity);
        let controls = Controls::from_config(&config);
        Ok(Self { config, client, cache, controls, last: None })
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last.as_ref()
    }

    pub fn set_location(&mut self, lat: f64, lon: f64, label: Option<String>) -> Result<()> {
        if !(-90.0..=90.0).contains(&lat) {
            bail!("latitude must be within -90..90, got {}", lat);
        }
        if !(-180.0..=180.0).contains(&lon) {
            bail!("longitude must be within -180..180, got {}", lon);
        }
        let label = label.unwrap_or_else(|| format!("{:.4}, {:.4}", lat, lon));
        self.controls.location = Location { label, lat, lon };
        Ok(())
    }

    pub fn set_lookback(&mut self, days: u32) -> Result<()> {
        if !LOOKBACK_RANGE.contains(&days) {
            bail!("days must be within 7-365, got {}", days);
        }
        self.controls.lookback_days = days;
        Ok(())
    }

    pub fn set_horizon(&mut self, horizon: usize) -> Result<()> {
        if !HORIZON_RANGE.contains(&horizon) {
            bail!("horizon must be within 1-365, got {}", horizon);
        }
        self.controls.horizon = horizon;
        Ok(())
    }

    pub fn set_upload(&mut self, path: Option<PathBuf>) {
        self.controls.upload = path;
    }

    /// Load & Forecast with the current controls.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let (history, series) = match &self.controls.upload {
            Some(path) => {
                let series = table::read_series_file(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                info!(
                    "Loaded {} rows from {} ({} missing)",
                    series.len(),
                    path.display(),
                    series.missing_count()
                );
                (History::Uploaded(series.clone()), series)
            }
            None => {
                let weather = self
                    .client
                    .fetch_history(&self.controls.location, self.controls.lookback_days)
                    .await;
                if weather.is_empty() {
                    self.last = None;
                    return Ok(RunOutcome::NoData);
                }
                let series = weather.temperature_series();
                (History::Fetched(weather), series)
            }
        };

        let options = self.config.forecast_options(self.controls.horizon);
        let result = self.cache.get_or_compute(&series, &options)?;
        debug!("Cache: {} entries, {} hits, {} misses", self.cache.len(), self.cache.hits(), self.cache.misses());

        let report = RunReport { history, result };
        self.last = Some(report.clone());
        Ok(RunOutcome::Report(report))
    }

    /// Reset the controls and drop the last result. The cache survives.
    pub fn clear(&mut self) {
        self.controls = Controls::from_config(&self.config);
        self.last = None;
    }

    /// Execute one command. Returns `false` once the session should end.
    pub async fn apply<W: Write>(&mut self, command: Command, out: &mut W) -> Result<bool> {
        match command {
            Command::Location { lat, lon, label } => {
                self.set_location(lat, lon, label)?;
                writeln!(out, "📍 {}", self.controls.location)?;
            }
            Command::Days(days) => {
                self.set_lookback(days)?;
                writeln!(out, "History window: {} days", days)?;
            }
            Command::Horizon(horizon) => {
                self.set_horizon(horizon)?;
                writeln!(out, "Forecast horizon: {} days", horizon)?;
            }
            Command::Upload(path) => {
                match &path {
                    Some(p) => writeln!(out, "📄 Using {}", p.display())?,
                    None => writeln!(out, "Upload cleared, fetching from Open-Meteo")?,
                }
                self.set_upload(path);
            }
            Command::Run => match self.run().await? {
                RunOutcome::NoData => {
                    writeln!(out, "⚠️  No data available for {}.", self.controls.location)?
                }
                RunOutcome::Report(report) => writeln!(out, "{}", report.render()?)?,
            },
            Command::Clear => {
                self.clear();
                writeln!(out, "🧹 Controls reset.")?;
            }
            Command::Show => {
                writeln!(out, "{}", self.controls)?;
                if let Some(report) = self.last_report() {
                    writeln!(out, "Last result: {}", report.result.summary)?;
                }
                let cache = self.cache();
                writeln!(
                    out,
                    "Cache:    {} entries, {} hits, {} misses",
                    cache.len(),
                    cache.hits(),
                    cache.misses()
                )?;
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Read commands line by line until `quit` or end of input. Failing
/// commands are reported and the session carries on.
pub async fn run_session<R: BufRead, W: Write>(dashboard: &mut Dashboard, input: R, mut out: W) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match parse_command(&line) {
            Ok(command) => dashboard.apply(command, &mut out).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => writeln!(out, "❌ {:#}", e)?,
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn offline_config() -> DashboardConfig {
        let mut config = DashboardConfig::default();
        config.fetch.timeout_secs = 2;
        config.fetch.archive_url = "http://127.0.0.1:9/v1/archive".to_string();
        config.fetch.forecast_url = "http://127.0.0.1:9/v1/forecast".to_string();
        config
    }

    fn upload_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,value").unwrap();
        for i in 0..30 {
            let value = 20.0 + 0.1 * i as f64 + if i % 2 == 0 { 0.4 } else { -0.4 };
            writeln!(file, "2025-01-{:02},{}", i + 1, value).unwrap();
        }
        file
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("location 51.5 -0.12 London City").unwrap(),
            Command::Location { lat: 51.5, lon: -0.12, label: Some("London City".into()) }
        );
        assert_eq!(
            parse_command("location 1 2").unwrap(),
            Command::Location { lat: 1.0, lon: 2.0, label: None }
        );
        assert_eq!(parse_command("days 30").unwrap(), Command::Days(30));
        assert_eq!(parse_command("HORIZON 14").unwrap(), Command::Horizon(14));
        assert_eq!(parse_command("upload off").unwrap(), Command::Upload(None));
        assert_eq!(parse_command("upload data.csv").unwrap(), Command::Upload(Some("data.csv".into())));
        assert_eq!(parse_command("  run ").unwrap(), Command::Run);
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);

        assert!(parse_command("days many").is_err());
        assert!(parse_command("location 1").is_err());
        assert!(parse_command("forecast").is_err());
    }

    #[test]
    fn test_control_ranges() {
        let mut dashboard = Dashboard::new(offline_config()).unwrap();
        assert!(dashboard.set_lookback(6).is_err());
        assert!(dashboard.set_lookback(365).is_ok());
        assert!(dashboard.set_horizon(0).is_err());
        assert!(dashboard.set_horizon(366).is_err());
        assert!(dashboard.set_location(91.0, 0.0, None).is_err());
        assert!(dashboard.set_location(-33.87, 151.21, Some("Sydney".into())).is_ok());
        assert_eq!(dashboard.controls().location.label, "Sydney");
    }

    #[tokio::test]
    async fn test_upload_run_uses_cache() {
        let file = upload_file();
        let mut dashboard = Dashboard::new(offline_config()).unwrap();
        dashboard.set_horizon(5).unwrap();
        dashboard.set_upload(Some(file.path().to_path_buf()));

        let RunOutcome::Report(first) = dashboard.run().await.unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(first.result.len(), 5);
        assert_eq!(first.result.points[0].date.to_string(), "2025-01-31");
        assert!(matches!(first.history, History::Uploaded(ref s) if s.len() == 30));

        let RunOutcome::Report(second) = dashboard.run().await.unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(first, second);
        assert_eq!(dashboard.cache().hits(), 1);
        assert_eq!(dashboard.cache().misses(), 1);

        let text = first.render().unwrap();
        assert!(text.contains("Outliers handled="));
        assert!(text.contains("data:file/csv;base64,"));
    }

    #[tokio::test]
    async fn test_clear_resets_controls_but_keeps_cache() {
        let file = upload_file();
        let config = offline_config();
        let mut dashboard = Dashboard::new(config.clone()).unwrap();
        dashboard.set_upload(Some(file.path().to_path_buf()));
        dashboard.set_lookback(30).unwrap();
        dashboard.run().await.unwrap();
        assert!(dashboard.last_report().is_some());

        dashboard.clear();
        assert_eq!(dashboard.controls(), &Controls::from_config(&config));
        assert!(dashboard.last_report().is_none());
        assert_eq!(dashboard.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_fetch_reports_no_data() {
        let mut dashboard = Dashboard::new(offline_config()).unwrap();
        let outcome = dashboard.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::NoData);
        assert_eq!(dashboard.cache().misses(), 0);
    }

    #[tokio::test]
    async fn test_session_survives_errors() {
        let file = upload_file();
        let script = format!(
            "help\ndays 3\nbogus\nupload /nonexistent/input.csv\nrun\nupload {}\nhorizon 3\nrun\nshow\nquit\nrun\n",
            file.path().display()
        );
        let mut dashboard = Dashboard::new(offline_config()).unwrap();
        let mut out = Vec::new();
        run_session(&mut dashboard, Cursor::new(script), &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Commands:"));
        assert!(text.contains("days must be within 7-365"));
        assert!(text.contains("unrecognised command"));
        assert!(text.contains("Failed to read /nonexistent/input.csv"));
        assert!(text.contains("Last result:"));
        assert!(text.contains("Cache:    1 entries, 0 hits, 1 misses"));
        // quit stops before the trailing run
        assert_eq!(dashboard.cache().misses(), 1);
        assert_eq!(dashboard.last_report().map(|r| r.result.len()), Some(3));
    }
}
