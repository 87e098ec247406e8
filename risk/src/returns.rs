//! Windowed returns over aligned histories

use crate::error::{Result, RiskError};
use crate::series::{ReturnSeries, TimeSeries};

/// Ten business days, i.e. two calendar weeks
pub const TWO_WEEK_WINDOW: usize = 10;

/// Sliding-window returns with stride one
///
/// Each value is the change between the last and first observation of a
/// `window`-long slice, so an input of length N yields N - window + 1 returns.
pub fn windowed_returns(series: &TimeSeries, window: usize) -> Result<ReturnSeries> {
    if window < 2 {
        return Err(RiskError::InvalidParameter(format!(
            "return window must be at least 2, got {}",
            window
        )));
    }
    if series.len() < window {
        return Err(RiskError::insufficient(
            series.name(),
            format!("{} points for a {}-day window", series.len(), window),
        ));
    }

    let values: Vec<f64> = series
        .points()
        .windows(window)
        .map(|w| w[window - 1].1 - w[0].1)
        .collect();

    Ok(ReturnSeries::new(series.name(), values))
}

/// Two-week returns of an aligned history
pub fn two_week_returns(series: &TimeSeries) -> Result<ReturnSeries> {
    windowed_returns(series, TWO_WEEK_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::business_days;
    use chrono::NaiveDate;

    fn aligned(values: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2014, 1, 6).unwrap();
        let end = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap();
        let points = business_days(start, end)
            .zip(values.iter().copied())
            .collect();
        TimeSeries::new("aligned", points).unwrap()
    }

    #[test]
    fn test_constant_prices_have_zero_returns() {
        let series = aligned(&[42.0; 30]);
        let returns = two_week_returns(&series).unwrap();
        assert_eq!(returns.len(), 21);
        assert!(returns.values.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_length_is_input_minus_nine() {
        for n in [10, 11, 50, 263] {
            let values: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
            let returns = two_week_returns(&aligned(&values)).unwrap();
            assert_eq!(returns.len(), n - 9);
        }
    }

    #[test]
    fn test_returns_are_window_differences() {
        let values: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
        let returns = two_week_returns(&aligned(&values)).unwrap();
        assert_eq!(returns.values, vec![81.0, 99.0, 117.0]);
        assert_eq!(returns.name, "aligned");
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let result = two_week_returns(&aligned(&[1.0; 9]));
        assert!(matches!(result, Err(RiskError::InsufficientHistory { .. })));
    }
}
