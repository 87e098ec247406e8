//! Simulation configuration
//!
//! Loaded from YAML or JSON documents; every field has a default so a
//! document only needs to name what it overrides.

use crate::error::{Result, RiskError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Parameters of one VaR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// First day of the aligned history
    pub start_date: NaiveDate,

    /// Last day of the aligned history (inclusive)
    pub end_date: NaiveDate,

    /// Total number of Monte Carlo trials
    pub num_trials: u64,

    /// Number of independently seeded trial partitions
    pub parallelism: usize,

    /// Seed of partition 0; partition i uses `base_seed + i`
    pub base_seed: u64,

    /// Tail probability of the VaR quantile (0.05 = 95% VaR)
    pub tail_probability: f64,

    /// Return window in business days
    pub return_window: usize,

    /// Instruments with fewer raw observations are dropped before alignment
    pub min_history_points: usize,

    /// Reseeded retries of a failed partition before the run aborts
    pub max_chunk_retries: usize,

    /// Size of the worker pool (None = one per core)
    pub worker_threads: Option<usize>,

    /// Resamples for bootstrapped confidence intervals
    pub bootstrap_resamples: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2009, 10, 23).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2014, 10, 23).unwrap_or_default(),
            num_trials: 1_000_000,
            parallelism: 1_000,
            base_seed: 1496,
            tail_probability: 0.05,
            return_window: 10,
            min_history_points: 1270,
            max_chunk_retries: 3,
            worker_threads: None,
            bootstrap_resamples: 100,
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a YAML document
    ///
    /// # Example
    ///
    /// ```
    /// use ag_mcvar::SimulationConfig;
    ///
    /// let yaml = r#"
    /// num_trials: 50000
    /// parallelism: 10
    /// tail_probability: 0.01
    /// "#;
    ///
    /// let config = SimulationConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.num_trials, 50_000);
    /// assert_eq!(config.base_seed, 1496);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SimulationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.num_trials == 0 || self.parallelism == 0 {
            return Err(RiskError::EmptyTrialSet {
                num_trials: self.num_trials,
                parallelism: self.parallelism,
            });
        }
        if self.start_date > self.end_date {
            return Err(RiskError::InvalidParameter(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if !(self.tail_probability > 0.0 && self.tail_probability < 1.0) {
            return Err(RiskError::InvalidParameter(format!(
                "tail_probability must be in (0, 1), got {}",
                self.tail_probability
            )));
        }
        if self.return_window < 2 {
            return Err(RiskError::InvalidParameter(format!(
                "return_window must be at least 2, got {}",
                self.return_window
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(RiskError::InvalidParameter(
                "worker_threads must be positive".to_string(),
            ));
        }
        if self.bootstrap_resamples == 0 {
            return Err(RiskError::InvalidParameter(
                "bootstrap_resamples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
