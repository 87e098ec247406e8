//! Time series containers
//!
//! A [`TimeSeries`] is a named sequence of dated observations with strictly
//! increasing dates. A [`ReturnSeries`] is the windowed return sequence derived
//! from an aligned price history.

use crate::error::{Result, RiskError};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One dated observation
pub type Observation = (NaiveDate, f64);

/// Named price or level history, strictly ascending by date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    name: String,
    points: Vec<Observation>,
}

impl TimeSeries {
    /// Build a series from points already sorted ascending
    ///
    /// Rejects unsorted input and duplicate dates.
    pub fn new(name: impl Into<String>, points: Vec<Observation>) -> Result<Self> {
        let name = name.into();
        if let Some(w) = points.windows(2).find(|w| w[0].0 >= w[1].0) {
            let reason = if w[0].0 == w[1].0 {
                format!("duplicate date {}", w[0].0)
            } else {
                format!("dates out of order: {} before {}", w[0].0, w[1].0)
            };
            return Err(RiskError::InvalidParameter(format!("{}: {}", name, reason)));
        }
        Ok(Self { name, points })
    }

    /// Build a series from points in any order
    pub fn from_unsorted(name: impl Into<String>, mut points: Vec<Observation>) -> Result<Self> {
        points.sort_by_key(|(date, _)| *date);
        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }

    /// Observation values in date order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }

    pub(crate) fn from_parts_unchecked(name: String, points: Vec<Observation>) -> Self {
        Self { name, points }
    }
}

/// Windowed returns of a single instrument or factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub name: String,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Whether the date falls on Monday through Friday
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Iterate the business days in `[start, end]`
pub fn business_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let mut next = Some(start);
    std::iter::from_fn(move || {
        while let Some(current) = next.filter(|d| *d <= end) {
            next = current.succ_opt();
            if is_business_day(current) {
                return Some(current);
            }
        }
        None
    })
}

/// Number of business days in `[start, end]`
pub fn count_business_days(start: NaiveDate, end: NaiveDate) -> usize {
    business_days(start, end).count()
}
