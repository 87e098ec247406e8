//! Readers for historical price files
//!
//! Two layouts are supported:
//! - Yahoo-style CSV: a header row, ISO dates, and a `Close` column
//! - Investing.com-style tab-separated text: no header, dates like
//!   `Oct 24, 2014`, the value in the second column (thousands separators
//!   allowed), newest row first
//!
//! Both produce a [`TimeSeries`] sorted ascending with no duplicate dates.

use crate::error::{Result, RiskError};
use crate::series::TimeSeries;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const YAHOO_DATE_FORMAT: &str = "%Y-%m-%d";
const INVESTING_DATE_FORMAT: &str = "%b %d, %Y";

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or_default()
}

fn parse_error(name: &str, record: &StringRecord, reason: impl Into<String>) -> RiskError {
    RiskError::Parse {
        source_name: name.to_string(),
        line: line_of(record),
        reason: reason.into(),
    }
}

fn field<'r>(name: &str, record: &'r StringRecord, index: usize) -> Result<&'r str> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| {
            let reason = format!("missing column {}", index + 1);
            parse_error(name, record, reason)
        })
}

fn parse_value(name: &str, record: &StringRecord, raw: &str) -> Result<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .map_err(|e| {
            let reason = format!("invalid value '{}': {}", raw, e);
            parse_error(name, record, reason)
        })
}

fn parse_date(name: &str, record: &StringRecord, raw: &str, format: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, format)
        .map_err(|e| {
            let reason = format!("invalid date '{}': {}", raw, e);
            parse_error(name, record, reason)
        })
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Name a series after its file stem
pub fn series_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a Yahoo-style CSV history
///
/// Rows whose close is `null` are skipped.
pub fn read_yahoo_history<R: Read>(name: &str, reader: R) -> Result<TimeSeries> {
    let mut csv = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = csv.headers()?.clone();
    let close = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("close"))
        .ok_or_else(|| RiskError::Parse {
            source_name: name.to_string(),
            line: 1,
            reason: "no Close column in header".to_string(),
        })?;

    let mut points = Vec::new();
    let mut skipped = 0usize;
    for record in csv.records() {
        let record = record?;
        let raw_date = field(name, &record, 0)?;
        let raw_value = field(name, &record, close)?;
        if raw_value.eq_ignore_ascii_case("null") {
            skipped += 1;
            continue;
        }
        let date = parse_date(name, &record, raw_date, YAHOO_DATE_FORMAT)?;
        points.push((date, parse_value(name, &record, raw_value)?));
    }

    debug!(
        series = name,
        points = points.len(),
        skipped,
        "read yahoo history"
    );
    TimeSeries::from_unsorted(name, points)
}

/// Read an Investing.com-style tab-separated history
pub fn read_investing_history<R: Read>(name: &str, reader: R) -> Result<TimeSeries> {
    let mut csv = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);

    let mut points = Vec::new();
    for record in csv.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let raw_date = field(name, &record, 0)?;
        let date = parse_date(name, &record, raw_date, INVESTING_DATE_FORMAT)?;
        let value = parse_value(name, &record, field(name, &record, 1)?)?;
        points.push((date, value));
    }

    debug!(
        series = name,
        points = points.len(),
        "read investing.com history"
    );
    TimeSeries::from_unsorted(name, points)
}

pub fn read_yahoo_file(path: &Path) -> Result<TimeSeries> {
    read_yahoo_history(&series_name(path), File::open(path)?)
}

pub fn read_investing_file(path: &Path) -> Result<TimeSeries> {
    read_investing_history(&series_name(path), File::open(path)?)
}

/// Read every `.csv` file in a directory as a Yahoo history, sorted by file name
pub fn read_yahoo_dir(dir: &Path) -> Result<Vec<TimeSeries>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_csv(p))
        .collect();
    paths.sort();
    paths.iter().map(|p| read_yahoo_file(p)).collect()
}
