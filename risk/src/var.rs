//! Value at Risk statistics over simulated trial returns
//!
//! Provides:
//! - VaR: the return at rank ⌈T·α⌉ of the ascending trial returns
//! - Conditional VaR (Expected Shortfall): mean of the ⌈T·α⌉ worst returns
//! - Bootstrapped confidence intervals for either statistic
//! - Kupiec proportion-of-failures backtest against historical portfolio returns

use crate::error::{Result, RiskError};
use crate::series::ReturnSeries;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Number of tail observations for `n` returns at tail probability `alpha`
///
/// `max(1, ceil(n * alpha))`, with products within 1e-9 of an integer taken as exact.
pub fn tail_count(n: usize, tail_probability: f64) -> usize {
    let raw = n as f64 * tail_probability;
    let k = if (raw - raw.round()).abs() < 1e-9 {
        raw.round()
    } else {
        raw.ceil()
    };
    (k as usize).clamp(1, n.max(1))
}

fn validate(returns: &[f64], tail_probability: f64) -> Result<()> {
    if returns.is_empty() {
        return Err(RiskError::EmptyTrialSet {
            num_trials: 0,
            parallelism: 0,
        });
    }
    if !(tail_probability > 0.0 && tail_probability < 1.0) {
        return Err(RiskError::InvalidParameter(format!(
            "tail probability must be in (0, 1), got {}",
            tail_probability
        )));
    }
    Ok(())
}

/// Reorder `returns` in place so its first `k` entries are the `k` smallest,
/// with the `k`-th smallest at index `k - 1`
fn select_worst(returns: &mut [f64], k: usize) -> &[f64] {
    if k < returns.len() {
        returns.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
    }
    &returns[..k]
}

/// Value at Risk: the `k`-th smallest return, `k = max(1, ceil(T * alpha))`
///
/// Losses are negative returns, so a 5% VaR is typically negative.
pub fn value_at_risk(returns: &[f64], tail_probability: f64) -> Result<f64> {
    value_at_risk_in_place(&mut returns.to_vec(), tail_probability)
}

/// [`value_at_risk`] without the copy; `returns` is left partially ordered
pub fn value_at_risk_in_place(returns: &mut [f64], tail_probability: f64) -> Result<f64> {
    validate(returns, tail_probability)?;
    let k = tail_count(returns.len(), tail_probability);
    Ok(select_worst(returns, k)[k - 1])
}

/// Conditional VaR: mean of the `k` smallest returns
pub fn conditional_value_at_risk(returns: &[f64], tail_probability: f64) -> Result<f64> {
    conditional_value_at_risk_in_place(&mut returns.to_vec(), tail_probability)
}

/// [`conditional_value_at_risk`] without the copy; `returns` is left partially ordered
pub fn conditional_value_at_risk_in_place(
    returns: &mut [f64],
    tail_probability: f64,
) -> Result<f64> {
    validate(returns, tail_probability)?;
    let k = tail_count(returns.len(), tail_probability);
    Ok(select_worst(returns, k).iter().sum::<f64>() / k as f64)
}

/// Bootstrapped `(lower, upper)` interval of a statistic
///
/// Each resample draws `returns.len()` values with replacement from a
/// ChaCha20 stream seeded `seed + resample index`; the interval bounds are the
/// `probability / 2` and `1 - probability / 2` empirical quantiles of the
/// resampled statistics. Every worker reuses one resample buffer, which the
/// statistic may reorder.
pub fn bootstrapped_confidence_interval<F>(
    returns: &[f64],
    statistic: F,
    num_resamples: usize,
    probability: f64,
    seed: u64,
) -> Result<(f64, f64)>
where
    F: Fn(&mut [f64]) -> Result<f64> + Sync,
{
    if returns.is_empty() || num_resamples == 0 {
        return Err(RiskError::InvalidParameter(
            "bootstrap needs returns and at least one resample".to_string(),
        ));
    }
    if !(probability > 0.0 && probability < 1.0) {
        return Err(RiskError::InvalidParameter(format!(
            "interval probability must be in (0, 1), got {}",
            probability
        )));
    }

    let n = returns.len();
    let mut stats = (0..num_resamples)
        .into_par_iter()
        .map_init(
            || vec![0.0; n],
            |resample, i| {
                let mut rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(i as u64));
                for slot in resample.iter_mut() {
                    *slot = returns[rng.gen_range(0..n)];
                }
                statistic(resample.as_mut_slice())
            },
        )
        .collect::<Result<Vec<f64>>>()?;
    stats.sort_by(|a, b| a.total_cmp(b));

    let last = (stats.len() - 1) as f64;
    let lower = stats[((probability / 2.0) * last).floor() as usize];
    let upper = stats[((1.0 - probability / 2.0) * last).ceil() as usize];
    Ok((lower, upper))
}

/// Historical portfolio return per time step: the sum across instruments
pub fn historical_portfolio_returns(instruments: &[ReturnSeries]) -> Result<Vec<f64>> {
    let first = match instruments.first() {
        Some(first) => first,
        None => return Ok(Vec::new()),
    };
    let mut totals = vec![0.0; first.len()];
    for instrument in instruments {
        if instrument.len() != totals.len() {
            return Err(RiskError::AlignmentMismatch {
                series: instrument.name.clone(),
                expected: totals.len(),
                actual: instrument.len(),
            });
        }
        for (total, r) in totals.iter_mut().zip(&instrument.values) {
            *total += r;
        }
    }
    Ok(totals)
}

/// Number of historical returns worse than the VaR
pub fn count_failures(historical_returns: &[f64], value_at_risk: f64) -> usize {
    historical_returns
        .iter()
        .filter(|r| **r < value_at_risk)
        .count()
}

fn x_ln_y(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

/// Kupiec proportion-of-failures likelihood ratio statistic
///
/// LR = -2 ln[(1-p)^(T-x) p^x / (1-x/T)^(T-x) (x/T)^x]
pub fn kupiec_test_statistic(total: usize, failures: usize, tail_probability: f64) -> f64 {
    let t = total as f64;
    let x = failures as f64;
    let ratio = x / t;
    let log_null = x_ln_y(t - x, 1.0 - tail_probability) + x_ln_y(x, tail_probability);
    let log_alt = x_ln_y(t - x, 1.0 - ratio) + x_ln_y(x, ratio);
    -2.0 * (log_null - log_alt)
}

/// p-value of the Kupiec statistic under a chi-squared(1) distribution
pub fn kupiec_p_value(total: usize, failures: usize, tail_probability: f64) -> Result<f64> {
    let statistic = kupiec_test_statistic(total, failures, tail_probability);
    let chi = ChiSquared::new(1.0).map_err(|e| RiskError::InvalidParameter(e.to_string()))?;
    Ok(1.0 - chi.cdf(statistic.max(0.0)))
}

/// Kupiec backtest outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarBacktest {
    /// Number of historical observations
    pub num_observations: usize,

    /// Observations with a return below VaR
    pub num_failures: usize,

    /// num_failures / num_observations
    pub failure_rate: f64,

    /// Expected failure rate (the tail probability)
    pub expected_failure_rate: f64,

    pub test_statistic: f64,

    pub p_value: f64,
}

/// Compare a VaR estimate with realised historical portfolio returns
pub fn backtest(
    historical_returns: &[f64],
    value_at_risk: f64,
    tail_probability: f64,
) -> Result<VarBacktest> {
    if historical_returns.is_empty() {
        return Err(RiskError::InvalidParameter(
            "no historical returns to backtest".to_string(),
        ));
    }
    let total = historical_returns.len();
    let failures = count_failures(historical_returns, value_at_risk);
    Ok(VarBacktest {
        num_observations: total,
        num_failures: failures,
        failure_rate: failures as f64 / total as f64,
        expected_failure_rate: tail_probability,
        test_statistic: kupiec_test_statistic(total, failures, tail_probability),
        p_value: kupiec_p_value(total, failures, tail_probability)?,
    })
}

/// Summary of one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarReport {
    pub tail_probability: f64,
    pub num_trials: usize,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
    pub var_confidence_interval: (f64, f64),
    pub cvar_confidence_interval: (f64, f64),
    pub backtest: Option<VarBacktest>,
    pub timestamp: DateTime<Utc>,
}

impl VarReport {
    /// Compute every statistic for a set of trial returns
    ///
    /// Confidence intervals are 95% bootstrap intervals.
    pub fn build(
        trials: &[f64],
        tail_probability: f64,
        bootstrap_resamples: usize,
        seed: u64,
        historical_returns: Option<&[f64]>,
    ) -> Result<Self> {
        let var = value_at_risk(trials, tail_probability)?;
        let cvar = conditional_value_at_risk(trials, tail_probability)?;
        let var_ci = bootstrapped_confidence_interval(
            trials,
            |r| value_at_risk_in_place(r, tail_probability),
            bootstrap_resamples,
            0.05,
            seed,
        )?;
        let cvar_ci = bootstrapped_confidence_interval(
            trials,
            |r| conditional_value_at_risk_in_place(r, tail_probability),
            bootstrap_resamples,
            0.05,
            seed,
        )?;
        let backtest = match historical_returns {
            Some(h) if !h.is_empty() => Some(backtest(h, var, tail_probability)?),
            _ => None,
        };

        Ok(Self {
            tail_probability,
            num_trials: trials.len(),
            value_at_risk: var,
            conditional_value_at_risk: cvar,
            var_confidence_interval: var_ci,
            cvar_confidence_interval: cvar_ci,
            backtest,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[rustfmt::skip]
    fn create_test_returns() -> Vec<f64> {
        vec![
            -0.05, -0.03, -0.02, -0.01, 0.00,
            0.01, 0.02, 0.03, 0.04, 0.05,
            -0.04, 0.01, 0.02, -0.01, 0.03,
            0.00, -0.02, 0.01, 0.02, -0.01,
        ]
    }

    #[test]
    fn test_tail_count() {
        assert_eq!(tail_count(20, 0.05), 1);
        assert_eq!(tail_count(100, 0.05), 5);
        assert_eq!(tail_count(101, 0.05), 6);
        assert_eq!(tail_count(10_000_000, 0.05), 500_000);
        assert_eq!(tail_count(3, 0.01), 1);
    }

    #[test]
    fn test_value_at_risk() {
        let returns = create_test_returns();
        assert_eq!(value_at_risk(&returns, 0.05).unwrap(), -0.05);
        // k = 4: -0.05, -0.04, -0.03, -0.02
        assert_eq!(value_at_risk(&returns, 0.2).unwrap(), -0.02);
    }

    #[test]
    fn test_value_at_risk_is_rank_k_ascending() {
        let returns: Vec<f64> = (0..1000)
            .map(|i| ((i * 7919) % 1000) as f64 - 500.0)
            .collect();
        let mut sorted = returns.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(value_at_risk(&returns, 0.05).unwrap(), sorted[49]);
    }

    #[test]
    fn test_cvar() {
        let returns = create_test_returns();
        let cvar = conditional_value_at_risk(&returns, 0.2).unwrap();
        assert_abs_diff_eq!(cvar, -0.035, epsilon = 1e-12);
        assert!(cvar <= value_at_risk(&returns, 0.2).unwrap());
    }

    #[test]
    fn test_invalid_inputs() {
        let err = value_at_risk(&[], 0.05).unwrap_err();
        assert!(matches!(err, RiskError::EmptyTrialSet { .. }));
        assert!(value_at_risk(&[1.0], 1.5).is_err());
        assert!(conditional_value_at_risk(&[1.0], -0.1).is_err());
    }

    #[test]
    fn test_bootstrap_interval_brackets_estimate() {
        let returns: Vec<f64> = (0..2000).map(|i| (i as f64 * 0.37).sin()).collect();
        let estimate = value_at_risk(&returns, 0.05).unwrap();
        let var_5 = |r: &mut [f64]| value_at_risk_in_place(r, 0.05);

        let interval = bootstrapped_confidence_interval(&returns, var_5, 200, 0.05, 11);
        let (lower, upper) = interval.unwrap();
        assert!(lower <= upper);
        assert!(lower <= estimate + 0.05 && estimate - 0.05 <= upper);

        let again = bootstrapped_confidence_interval(&returns, var_5, 200, 0.05, 11).unwrap();
        assert_eq!((lower, upper), again);
    }

    #[test]
    fn test_in_place_statistics_match_copies() {
        let returns = create_test_returns();
        let mut buffer = returns.clone();
        let var = value_at_risk_in_place(&mut buffer, 0.2).unwrap();
        assert_eq!(var, value_at_risk(&returns, 0.2).unwrap());

        let mut buffer = returns.clone();
        let cvar = conditional_value_at_risk_in_place(&mut buffer, 0.2).unwrap();
        assert_eq!(cvar, conditional_value_at_risk(&returns, 0.2).unwrap());
    }

    #[test]
    fn test_bootstrap_statistic_sees_full_length_resample() {
        let returns: Vec<f64> = (0..500).map(|i| i as f64).collect();
        let (lower, upper) = bootstrapped_confidence_interval(
            &returns,
            |r| {
                assert_eq!(r.len(), 500);
                r.sort_by(|a, b| a.total_cmp(b));
                Ok(r[0])
            },
            64,
            0.1,
            3,
        )
        .unwrap();
        assert!(0.0 <= lower && lower <= upper && upper < 500.0);
    }

    #[test]
    fn test_kupiec_statistic_zero_at_expected_rate() {
        assert_abs_diff_eq!(kupiec_test_statistic(100, 5, 0.05), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kupiec_p_value(100, 5, 0.05).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kupiec_rejects_excess_failures() {
        let p = kupiec_p_value(250, 30, 0.05).unwrap();
        assert!(p < 0.01);
        // No failures at all is finite
        assert!(kupiec_test_statistic(250, 0, 0.05).is_finite());
    }

    #[test]
    fn test_backtest() {
        let mut historical = vec![0.01; 100];
        for r in historical.iter_mut().take(5) {
            *r = -0.2;
        }
        let result = backtest(&historical, -0.1, 0.05).unwrap();
        assert_eq!(result.num_observations, 100);
        assert_eq!(result.num_failures, 5);
        assert_eq!(result.failure_rate, 0.05);
        assert!(result.p_value > 0.99);
    }

    #[test]
    fn test_historical_portfolio_returns() {
        let a = ReturnSeries::new("a", vec![1.0, 2.0, 3.0]);
        let b = ReturnSeries::new("b", vec![-1.0, 0.5, 0.0]);
        let totals = historical_portfolio_returns(&[a.clone(), b]).unwrap();
        assert_eq!(totals, vec![0.0, 2.5, 3.0]);

        let short = ReturnSeries::new("short", vec![1.0]);
        assert!(matches!(
            historical_portfolio_returns(&[a, short]),
            Err(RiskError::AlignmentMismatch { .. })
        ));
    }

    #[test]
    fn test_report() {
        let returns = create_test_returns();
        let report = VarReport::build(&returns, 0.05, 50, 1, Some(&returns)).unwrap();
        assert_eq!(report.num_trials, 20);
        assert_eq!(report.value_at_risk, -0.05);
        let backtest = report.backtest.unwrap();
        assert_eq!(backtest.num_failures, 0);
    }
}
