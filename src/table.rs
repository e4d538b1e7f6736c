//! Tabular files: the two-column upload, forecast CSV output, the inline
//! download link, and plain-text table rendering.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::forecast::{ForecastResult, TimeSeries};
use crate::weather::WeatherTable;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV must have exactly 2 columns: time,value (found {0})")]
    ColumnCount(usize),

    #[error("row {row}: invalid timestamp {value:?}")]
    InvalidTimestamp { row: usize, value: String },

    #[error("row {row}: invalid value {value:?}")]
    InvalidValue { row: usize, value: String },

    #[error("file contains no data rows")]
    Empty,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TableError>;

/// Read a `time,value` file into a series sorted by date.
/// Header names are not checked, only the column count.
pub fn read_series<R: io::Read>(reader: R) -> Result<TimeSeries> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = rdr.headers()?.len();
    if columns != 2 {
        return Err(TableError::ColumnCount(columns));
    }

    let mut pairs = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let row = i + 1;
        if record.len() != 2 {
            return Err(TableError::ColumnCount(record.len()));
        }
        let date = parse_timestamp(&record[0]).ok_or_else(|| TableError::InvalidTimestamp {
            row,
            value: record[0].to_string(),
        })?;
        let value = parse_value(&record[1]).ok_or_else(|| TableError::InvalidValue {
            row,
            value: record[1].to_string(),
        })?;
        pairs.push((date, value));
    }

    let series = TimeSeries::from_pairs(pairs);
    if series.is_empty() {
        return Err(TableError::Empty);
    }
    Ok(series)
}

pub fn read_series_file(path: &Path) -> Result<TimeSeries> {
    let file = std::fs::File::open(path)?;
    read_series(io::BufReader::new(file))
}

/// Calendar date of a timestamp cell. Time of day is dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

/// `Some(None)` for a missing cell, `None` when the cell is not a number.
fn parse_value(raw: &str) -> Option<Option<f64>> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "nan" | "null" | "na" | "none" => Some(None),
        s => s.parse::<f64>().ok().map(|v| v.is_finite().then_some(v)),
    }
}

/// Write the forecast as `time,forecast` rows.
pub fn write_forecast<W: io::Write>(result: &ForecastResult, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["time", "forecast"])?;
    for p in &result.points {
        wtr.write_record([p.date.format("%Y-%m-%d").to_string(), p.value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_forecast_file(result: &ForecastResult, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_forecast(result, io::BufWriter::new(file))
}

/// Forecast CSV as a string, for the download link.
pub fn forecast_csv(result: &ForecastResult) -> Result<String> {
    let mut buf = Vec::new();
    write_forecast(result, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read back a file produced by [`write_forecast`].
#[cfg(test)]
pub fn read_forecast<R: io::Read>(reader: R) -> Result<Vec<crate::forecast::ForecastPoint>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut points = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let (Some(time), Some(raw)) = (record.get(0), record.get(1)) else {
            return Err(TableError::ColumnCount(record.len()));
        };
        let date = parse_timestamp(time).ok_or_else(|| TableError::InvalidTimestamp {
            row,
            value: time.to_string(),
        })?;
        let value = raw.parse::<f64>().map_err(|_| TableError::InvalidValue {
            row,
            value: raw.to_string(),
        })?;
        points.push(crate::forecast::ForecastPoint { date, value });
    }
    Ok(points)
}

/// Write the fetched history with missing cells left empty.
pub fn write_weather<W: io::Write>(table: &WeatherTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "time",
        "temperature_2m_max",
        "temperature_2m_min",
        "precipitation_sum",
        "temperature_2m",
    ])?;
    let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for r in &table.rows {
        wtr.write_record([
            r.date.format("%Y-%m-%d").to_string(),
            cell(r.temperature_2m_max),
            cell(r.temperature_2m_min),
            cell(r.precipitation_sum),
            cell(r.temperature_2m),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_weather_file(table: &WeatherTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_weather(table, io::BufWriter::new(file))
}

/// HTML anchor embedding `csv` as a base64 data URI.
pub fn download_link(csv: &str, filename: &str) -> String {
    format!(
        "<a href=\"data:file/csv;base64,{}\" download=\"{}\">Download CSV</a>",
        BASE64.encode(csv.as_bytes()),
        filename
    )
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string())
}

pub fn render_weather(table: &WeatherTable) -> String {
    let mut out = format!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}\n",
        "Date", "Max", "Min", "Precip", "Mean"
    );
    for r in &table.rows {
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            r.date.format("%Y-%m-%d"),
            fmt_opt(r.temperature_2m_max),
            fmt_opt(r.temperature_2m_min),
            fmt_opt(r.precipitation_sum),
            fmt_opt(r.temperature_2m),
        );
    }
    out
}

pub fn render_series(series: &TimeSeries) -> String {
    let mut out = format!("{:<12} {:>10}\n", "Date", "Value");
    for p in series.points() {
        let _ = writeln!(out, "{:<12} {:>10}", p.date.format("%Y-%m-%d"), fmt_opt(p.value));
    }
    out
}

pub fn render_forecast(result: &ForecastResult) -> String {
    let mut out = format!("{:<12} {:>10}\n", "Date", "Forecast");
    for p in &result.points {
        let _ = writeln!(out, "{:<12} {:>10.2}", p.date.format("%Y-%m-%d"), p.value);
    }
    out
}
