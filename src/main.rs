mod config;
mod dashboard;
mod forecast;
mod table;
mod weather;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::DashboardConfig;
use dashboard::Dashboard;
use weather::open_meteo::OpenMeteoClient;

#[derive(Parser)]
#[command(name = "meteocast", version, about = "Open-Meteo weather history and short-horizon forecasts")]
struct Cli {
    /// Config file (default: $METEOCAST_CONFIG or ./meteocast.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LocationArgs {
    /// Latitude in degrees
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    /// Longitude in degrees
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
    /// Display name for the location
    #[arg(long)]
    label: Option<String>,
    /// Days of history to fetch (7-365)
    #[arg(short, long)]
    days: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily weather history and print it
    Fetch {
        #[command(flatten)]
        location: LocationArgs,
        /// Also write the table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Forecast an uploaded time,value CSV or the fetched mean temperature
    Forecast {
        #[command(flatten)]
        location: LocationArgs,
        /// time,value CSV to forecast instead of fetching
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Days to forecast (1-365)
        #[arg(long)]
        horizon: Option<usize>,
        /// Skip the centered rolling mean
        #[arg(long)]
        no_smooth: bool,
        /// Write the forecast as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print an HTML download link for the forecast CSV
        #[arg(long)]
        link: bool,
    },
    /// Interactive dashboard reading commands from stdin
    Session,
}

impl LocationArgs {
    fn apply(&self, config: &mut DashboardConfig) {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            config.location.latitude = lat;
            config.location.longitude = lon;
            config.location.label = self
                .label
                .clone()
                .unwrap_or_else(|| format!("{:.4}, {:.4}", lat, lon));
        } else if let Some(label) = &self.label {
            config.location.label = label.clone();
        }
        if let Some(days) = self.days {
            config.fetch.lookback_days = days;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meteocast=info".into()),
        )
        .init();

    // Load .env if present (override system env vars)
    dotenvy::dotenv_override().ok();

    let cli = Cli::parse();
    let mut config = DashboardConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch { location, output } => {
            location.apply(&mut config);
            config.validate()?;

            let client = OpenMeteoClient::new(&config.fetch)?;
            let loc = config.default_location();
            let weather = client.fetch_history(&loc, config.fetch.lookback_days).await;
            if weather.is_empty() {
                println!("⚠️  No data available for {}.", loc);
                return Ok(());
            }

            let missing = weather.temperature_series().missing_count();
            println!("\n🌤️  {} days for {} ({} missing)\n", weather.len(), loc, missing);
            print!("{}", table::render_weather(&weather));
            if let Some(path) = output {
                table::write_weather_file(&weather, &path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("\n💾 Saved to {}", path.display());
            }
        }

        Commands::Forecast { location, input, horizon, no_smooth, output, link } => {
            location.apply(&mut config);
            if let Some(h) = horizon {
                config.pipeline.horizon = h;
            }
            if no_smooth {
                config.pipeline.smooth = false;
            }
            config.validate()?;

            let series = match &input {
                Some(path) => {
                    let series = table::read_series_file(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    info!("Loaded {} rows from {}", series.len(), path.display());
                    series
                }
                None => {
                    let client = OpenMeteoClient::new(&config.fetch)?;
                    let loc = config.default_location();
                    let weather = client.fetch_history(&loc, config.fetch.lookback_days).await;
                    if weather.is_empty() {
                        println!("⚠️  No data available for {}.", loc);
                        return Ok(());
                    }
                    weather.temperature_series()
                }
            };

            let options = config.forecast_options(config.pipeline.horizon);
            let result = forecast::forecast(&series, &options)?;

            println!("\n📈 {}\n", result.summary);
            print!("{}", table::render_forecast(&result));

            if let Some(path) = output {
                table::write_forecast_file(&result, &path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("\n💾 Saved to {}", path.display());
            }
            if link {
                let csv = table::forecast_csv(&result)?;
                println!("\n{}", table::download_link(&csv, "forecast.csv"));
            }
        }

        Commands::Session => {
            let mut dashboard = Dashboard::new(config)?;
            println!("🌦️  meteocast session. Type `help` for commands.\n");
            println!("{}\n", dashboard.controls());

            let stdin = std::io::stdin();
            dashboard::run_session(&mut dashboard, stdin.lock(), std::io::stdout()).await?;
        }
    }

    Ok(())
}
