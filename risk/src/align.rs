//! Calendar alignment of instrument and factor histories
//!
//! Every history is trimmed to the simulation window, padded at both ends and
//! gap-filled so that all series share one business-day calendar. Missing days
//! carry the last observation forward.

use crate::error::{Result, RiskError};
use crate::series::{business_days, Observation, TimeSeries};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Trim a history to `[start, end]`, synthesising boundary points
///
/// A missing first point at `start` takes the first value inside the window;
/// a missing last point at `end` takes the last value inside the window.
pub fn trim_to_window(series: &TimeSeries, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries> {
    if start > end {
        return Err(RiskError::InvalidParameter(format!(
            "window start {} is after end {}",
            start, end
        )));
    }

    let mut trimmed: Vec<Observation> = series
        .points()
        .iter()
        .copied()
        .skip_while(|(date, _)| *date < start)
        .take_while(|(date, _)| *date <= end)
        .collect();

    let (first_date, first_value) = match trimmed.first() {
        Some(point) => *point,
        None => {
            return Err(RiskError::insufficient(
                series.name(),
                format!("no observations between {} and {}", start, end),
            ))
        }
    };
    if first_date != start {
        trimmed.insert(0, (start, first_value));
    }

    // trimmed is non-empty here
    let (last_date, last_value) = trimmed[trimmed.len() - 1];
    if last_date != end {
        trimmed.push((end, last_value));
    }

    let name = series.name().to_string();
    Ok(TimeSeries::from_parts_unchecked(name, trimmed))
}

/// Fill a trimmed history so it has exactly one point per business day
///
/// Source points are consumed as the calendar reaches them; a day with no
/// fresh observation repeats the most recent value.
pub fn fill_business_days(trimmed: &TimeSeries) -> Result<TimeSeries> {
    let points = trimmed.points();
    let (start, end) = match (trimmed.first_date(), trimmed.last_date()) {
        (Some(s), Some(e)) => (s, e),
        _ => return Err(RiskError::insufficient(trimmed.name(), "empty history")),
    };

    let mut cursor = 0;
    let mut filled = Vec::with_capacity(points.len());
    for day in business_days(start, end) {
        while cursor + 1 < points.len() && points[cursor + 1].0 <= day {
            cursor += 1;
        }
        filled.push((day, points[cursor].1));
    }

    debug!(
        series = trimmed.name(),
        source_points = points.len(),
        filled_points = filled.len(),
        "gap-filled history"
    );

    let name = trimmed.name().to_string();
    Ok(TimeSeries::from_parts_unchecked(name, filled))
}

/// Trim, pad and gap-fill a history onto the business days of `[start, end]`
pub fn align(series: &TimeSeries, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries> {
    let trimmed = trim_to_window(series, start, end)?;
    fill_business_days(&trimmed)
}

/// Align many histories onto the same calendar, aborting on the first failure
pub fn align_all(
    series: &[TimeSeries],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<TimeSeries>> {
    series.iter().map(|s| align(s, start, end)).collect()
}

/// Drop histories with fewer than `min_points` raw observations
pub fn retain_sufficient(series: Vec<TimeSeries>, min_points: usize) -> Vec<TimeSeries> {
    series
        .into_iter()
        .filter(|s| {
            let keep = s.len() >= min_points;
            if !keep {
                warn!(
                    series = s.name(),
                    observations = s.len(),
                    required = min_points,
                    "dropping history with too few observations"
                );
            }
            keep
        })
        .collect()
}
