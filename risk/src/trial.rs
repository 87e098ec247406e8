//! Mapping scenarios to portfolio returns

use crate::error::Result;
use crate::features::{feature_count, featurize_into};
use crate::model::FactorWeights;
use crate::sampler::ScenarioSampler;

/// Portfolio return for one featurized scenario: the sum of every
/// instrument's modelled return
///
/// Weights are not checked here. Callers pass weights already validated
/// against the factor count, as [`SimulationModel::new`] does.
///
/// [`SimulationModel::new`]: crate::SimulationModel::new
#[inline]
pub fn trial_return(features: &[f64], instruments: &[FactorWeights]) -> f64 {
    instruments.iter().map(|w| w.predict(features)).sum()
}

/// Portfolio return for one raw factor scenario
///
/// Fails with `AlignmentMismatch` if any weight vector does not fit the
/// scenario's factor count.
pub fn scenario_return(scenario: &[f64], instruments: &[FactorWeights]) -> Result<f64> {
    for w in instruments {
        w.ensure_factor_count(scenario.len())?;
    }
    let mut features = vec![0.0; feature_count(scenario.len())];
    featurize_into(scenario, &mut features);
    Ok(trial_return(&features, instruments))
}

/// Run `num_trials` consecutive scenarios from one sampler
pub fn run_trials(
    sampler: &mut ScenarioSampler<'_>,
    num_trials: usize,
    num_factors: usize,
    instruments: &[FactorWeights],
) -> Vec<f64> {
    let mut scenario = vec![0.0; num_factors];
    let mut features = vec![0.0; feature_count(num_factors)];
    let mut returns = Vec::with_capacity(num_trials);

    for _ in 0..num_trials {
        sampler.sample_into(&mut scenario);
        featurize_into(&scenario, &mut features);
        returns.push(trial_return(&features, instruments));
    }

    returns
}
