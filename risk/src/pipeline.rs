//! End-to-end run: histories in, trial returns and report out
//!
//! Every estimation step completes before the first trial chunk is
//! dispatched, so a bad history or a degenerate model aborts the run without
//! any simulation work.

use crate::align::{align_all, retain_sufficient};
use crate::config::SimulationConfig;
use crate::coordinator::{SimulationCoordinator, SimulationModel, TrialReturns};
use crate::distribution::FactorDistribution;
use crate::error::Result;
use crate::model::{FactorMatrix, FactorModelFitter};
use crate::returns::windowed_returns;
use crate::sampler::MultivariateNormal;
use crate::series::{ReturnSeries, TimeSeries};
use crate::var::{historical_portfolio_returns, VarReport};
use tracing::info;

/// Model estimated from history, ready to simulate
#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub model: SimulationModel,
    pub factor_returns: Vec<ReturnSeries>,
    pub instrument_returns: Vec<ReturnSeries>,
}

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub trials: TrialReturns,
    pub report: VarReport,
}

/// Align histories, compute returns, fit weights and estimate the factor distribution
///
/// Instruments with fewer than `min_history_points` raw observations are
/// dropped first. Factors are never dropped: a short factor history fails
/// alignment and aborts the run.
pub fn prepare(
    config: &SimulationConfig,
    factors: &[TimeSeries],
    instruments: Vec<TimeSeries>,
) -> Result<PreparedModel> {
    config.validate()?;
    let instruments = retain_sufficient(instruments, config.min_history_points);
    info!(
        factors = factors.len(),
        instruments = instruments.len(),
        start = %config.start_date,
        end = %config.end_date,
        "preparing factor model"
    );

    let (start, end) = (config.start_date, config.end_date);
    let to_returns = |series: &[TimeSeries]| -> Result<Vec<ReturnSeries>> {
        align_all(series, start, end)?
            .iter()
            .map(|s| windowed_returns(s, config.return_window))
            .collect()
    };

    let factor_returns = to_returns(factors)?;
    let instrument_returns = to_returns(&instruments)?;

    let factor_matrix = FactorMatrix::from_returns(&factor_returns)?;
    let fitter = FactorModelFitter::new(&factor_matrix);
    let weights = fitter.fit_all(&instrument_returns)?;
    let distribution = FactorDistribution::estimate(&factor_matrix)?;
    let sampler = MultivariateNormal::new(&distribution)?;
    info!(factorization = ?sampler.factorization(), "factor distribution ready");

    Ok(PreparedModel {
        model: SimulationModel::new(weights, sampler)?,
        factor_returns,
        instrument_returns,
    })
}

/// Simulate a prepared model and summarise the result
pub fn simulate(config: &SimulationConfig, prepared: &PreparedModel) -> Result<SimulationOutcome> {
    let trials = SimulationCoordinator::from_config(config).run(&prepared.model)?;
    let historical = historical_portfolio_returns(&prepared.instrument_returns)?;
    let report = VarReport::build(
        trials.as_slice(),
        config.tail_probability,
        config.bootstrap_resamples,
        config.base_seed,
        Some(&historical),
    )?;
    info!(
        value_at_risk = report.value_at_risk,
        conditional_value_at_risk = report.conditional_value_at_risk,
        "simulation complete"
    );
    Ok(SimulationOutcome { trials, report })
}

/// [`prepare`] followed by [`simulate`]
pub fn run(
    config: &SimulationConfig,
    factors: &[TimeSeries],
    instruments: Vec<TimeSeries>,
) -> Result<SimulationOutcome> {
    let prepared = prepare(config, factors, instruments)?;
    simulate(config, &prepared)
}
