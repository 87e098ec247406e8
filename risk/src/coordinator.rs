//! Partitioned, reproducible trial execution
//!
//! The total trial count is split into equally sized chunks, each with its own
//! seed derived from the base seed and the chunk index. Chunks share nothing
//! but the read-only [`SimulationModel`], run on a rayon pool, and are merged
//! into one [`TrialReturns`] collection. A chunk that produces non-finite
//! returns is rerun with a fresh seed rather than dropped.

use crate::config::SimulationConfig;
use crate::error::{Result, RiskError};
use crate::model::FactorWeights;
use crate::sampler::MultivariateNormal;
use crate::trial::run_trials;
use crate::var;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Immutable inputs broadcast to every chunk
#[derive(Debug, Clone)]
pub struct SimulationModel {
    weights: Vec<FactorWeights>,
    factors: MultivariateNormal,
}

impl SimulationModel {
    /// Pair fitted instrument weights with the factor distribution
    ///
    /// Every weight vector must have one intercept plus three coefficients per factor.
    pub fn new(weights: Vec<FactorWeights>, factors: MultivariateNormal) -> Result<Self> {
        for w in &weights {
            w.ensure_factor_count(factors.dimension())?;
        }
        Ok(Self { weights, factors })
    }

    pub fn weights(&self) -> &[FactorWeights] {
        &self.weights
    }

    pub fn factors(&self) -> &MultivariateNormal {
        &self.factors
    }

    pub fn num_factors(&self) -> usize {
        self.factors.dimension()
    }
}

/// One independently seeded unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialChunk {
    pub index: usize,
    pub seed: u64,
    pub num_trials: usize,
}

/// Split `num_trials` into `parallelism` chunks seeded `base_seed + index`
///
/// The first `num_trials % parallelism` chunks carry one extra trial.
pub fn partition(num_trials: u64, parallelism: usize, base_seed: u64) -> Result<Vec<TrialChunk>> {
    if num_trials == 0 || parallelism == 0 {
        return Err(RiskError::EmptyTrialSet {
            num_trials,
            parallelism,
        });
    }
    let total = usize::try_from(num_trials).map_err(|_| {
        RiskError::InvalidParameter(format!("{} trials do not fit in memory", num_trials))
    })?;

    let base = total / parallelism;
    let extra = total % parallelism;
    Ok((0..parallelism)
        .map(|index| TrialChunk {
            index,
            seed: base_seed.wrapping_add(index as u64),
            num_trials: base + usize::from(index < extra),
        })
        .collect())
}

/// Seed of a chunk's `attempt`-th retry; never collides with first-attempt seeds
fn retry_seed(chunk: &TrialChunk, attempt: usize, parallelism: usize) -> u64 {
    chunk
        .seed
        .wrapping_add((attempt as u64).wrapping_mul(parallelism as u64))
}

/// Run one chunk's trials, failing on any non-finite return
pub fn run_chunk(model: &SimulationModel, chunk: &TrialChunk) -> Result<Vec<f64>> {
    let mut sampler = model.factors.sampler(chunk.seed);
    let returns = run_trials(
        &mut sampler,
        chunk.num_trials,
        model.num_factors(),
        &model.weights,
    );
    if let Some(bad) = returns.iter().position(|r| !r.is_finite()) {
        return Err(RiskError::degenerate(
            format!("chunk {} (seed {})", chunk.index, chunk.seed),
            format!("non-finite trial return at trial {}", bad),
        ));
    }
    Ok(returns)
}

/// Collected trial returns of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReturns {
    returns: Vec<f64>,
}

impl TrialReturns {
    pub fn new(returns: Vec<f64>) -> Self {
        Self { returns }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.returns
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.returns
    }

    /// Return at rank `max(1, ceil(T * alpha))` in ascending order
    pub fn value_at_risk(&self, tail_probability: f64) -> Result<f64> {
        var::value_at_risk(&self.returns, tail_probability)
    }

    /// Mean of the `max(1, ceil(T * alpha))` worst returns
    pub fn conditional_value_at_risk(&self, tail_probability: f64) -> Result<f64> {
        var::conditional_value_at_risk(&self.returns, tail_probability)
    }
}

/// Dispatches trial chunks across a worker pool
#[derive(Debug, Clone)]
pub struct SimulationCoordinator {
    num_trials: u64,
    parallelism: usize,
    base_seed: u64,
    max_chunk_retries: usize,
    worker_threads: Option<usize>,
}

impl SimulationCoordinator {
    pub fn new(num_trials: u64, parallelism: usize, base_seed: u64) -> Self {
        Self {
            num_trials,
            parallelism,
            base_seed,
            max_chunk_retries: 3,
            worker_threads: None,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            num_trials: config.num_trials,
            parallelism: config.parallelism,
            base_seed: config.base_seed,
            max_chunk_retries: config.max_chunk_retries,
            worker_threads: config.worker_threads,
        }
    }

    pub fn with_max_chunk_retries(mut self, retries: usize) -> Self {
        self.max_chunk_retries = retries;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn chunks(&self) -> Result<Vec<TrialChunk>> {
        partition(self.num_trials, self.parallelism, self.base_seed)
    }

    /// Run every chunk against the model and merge the results
    pub fn run(&self, model: &SimulationModel) -> Result<TrialReturns> {
        self.run_with(|chunk| run_chunk(model, chunk))
    }

    /// Run every chunk through `runner`, retrying failed chunks with fresh seeds
    pub fn run_with<F>(&self, runner: F) -> Result<TrialReturns>
    where
        F: Fn(&TrialChunk) -> Result<Vec<f64>> + Sync,
    {
        let chunks = self.chunks()?;
        info!(
            trials = self.num_trials,
            chunks = chunks.len(),
            base_seed = self.base_seed,
            "dispatching trial chunks"
        );
        let started = Instant::now();

        let execute = || {
            chunks
                .par_iter()
                .map(|chunk| self.run_chunk_with_retry(chunk, &runner))
                .collect::<Result<Vec<Vec<f64>>>>()
        };
        let per_chunk = match self.worker_threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| RiskError::InvalidParameter(format!("worker pool: {}", e)))?
                .install(execute)?,
            None => execute()?,
        };

        let mut returns = Vec::with_capacity(chunks.iter().map(|c| c.num_trials).sum());
        for chunk_returns in per_chunk {
            returns.extend(chunk_returns);
        }

        info!(
            trials = returns.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "trial chunks complete"
        );
        Ok(TrialReturns::new(returns))
    }

    fn run_chunk_with_retry<F>(&self, chunk: &TrialChunk, runner: &F) -> Result<Vec<f64>>
    where
        F: Fn(&TrialChunk) -> Result<Vec<f64>> + Sync,
    {
        let mut last_error = None;
        for attempt in 0..=self.max_chunk_retries {
            let unit = TrialChunk {
                seed: retry_seed(chunk, attempt, self.parallelism),
                ..*chunk
            };
            match runner(&unit) {
                Ok(returns) if returns.len() == unit.num_trials => {
                    debug!(
                        chunk = unit.index,
                        seed = unit.seed,
                        trials = returns.len(),
                        "chunk done"
                    );
                    return Ok(returns);
                }
                Ok(returns) => {
                    last_error = Some(format!(
                        "produced {} of {} trials",
                        returns.len(),
                        unit.num_trials
                    ));
                }
                Err(e) => last_error = Some(e.to_string()),
            }
            warn!(
                chunk = unit.index,
                seed = unit.seed,
                attempt,
                error = last_error.as_deref().unwrap_or_default(),
                "trial chunk failed"
            );
        }

        Err(RiskError::ChunkFailed {
            chunk: chunk.index,
            attempts: self.max_chunk_retries + 1,
            reason: last_error.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::FactorDistribution;
    use nalgebra::{DMatrix, DVector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model() -> SimulationModel {
        let dist = FactorDistribution::new(
            DVector::from_vec(vec![0.0, 0.01]),
            DMatrix::from_row_slice(2, 2, &[0.02, 0.005, 0.005, 0.03]),
        )
        .unwrap();
        let weights = vec![
            FactorWeights::new("A", vec![0.01, 0.1, 0.02, 1.2, 0.0, 0.0, 0.4]),
            FactorWeights::new("B", vec![-0.02, 0.0, 0.05, -0.3, 0.2, 0.0, 0.9]),
        ];
        SimulationModel::new(weights, MultivariateNormal::new(&dist).unwrap()).unwrap()
    }

    #[test]
    fn test_partition_sizes_and_seeds() {
        let chunks = partition(10, 4, 100).unwrap();
        let sizes: Vec<_> = chunks.iter().map(|c| c.num_trials).collect();
        let seeds: Vec<_> = chunks.iter().map(|c| c.seed).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(seeds, vec![100, 101, 102, 103]);
    }

    #[test]
    fn test_partition_ten_million_over_thousand() {
        let chunks = partition(10_000_000, 1_000, 0).unwrap();
        assert_eq!(chunks.len(), 1_000);
        assert!(chunks.iter().all(|c| c.num_trials == 10_000));
        let total: usize = chunks.iter().map(|c| c.num_trials).sum();
        assert_eq!(total, 10_000_000);
    }

    #[test]
    fn test_partition_more_chunks_than_trials() {
        let chunks = partition(3, 5, 0).unwrap();
        assert_eq!(chunks.iter().map(|c| c.num_trials).sum::<usize>(), 3);
    }

    #[test]
    fn test_empty_trial_set() {
        for (num_trials, num_chunks) in [(0, 4), (10, 0)] {
            let err = partition(num_trials, num_chunks, 0).unwrap_err();
            assert!(matches!(err, RiskError::EmptyTrialSet { .. }));
        }

        let result = SimulationCoordinator::new(0, 8, 1).run(&model());
        assert!(matches!(result, Err(RiskError::EmptyTrialSet { .. })));
    }

    #[test]
    fn test_run_collects_every_trial() {
        let trials = SimulationCoordinator::new(10_007, 13, 1496)
            .run(&model())
            .unwrap();
        assert_eq!(trials.len(), 10_007);
        assert!(trials.as_slice().iter().all(|r| r.is_finite()));
    }

    #[test]
    fn test_run_is_reproducible() {
        let coordinator = SimulationCoordinator::new(5_000, 7, 42);
        let a = coordinator.run(&model()).unwrap();
        let b = coordinator
            .clone()
            .with_worker_threads(2)
            .run(&model())
            .unwrap();
        assert_eq!(a, b);

        let other_seed = SimulationCoordinator::new(5_000, 7, 43);
        let c = other_seed.run(&model()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_chunks_match_independent_samplers() {
        let model = model();
        let trials = SimulationCoordinator::new(20, 2, 5).run(&model).unwrap();
        let mut expected = Vec::new();
        for (index, seed) in [(0, 5), (1, 6)] {
            let chunk = TrialChunk {
                index,
                seed,
                num_trials: 10,
            };
            expected.extend(run_chunk(&model, &chunk).unwrap());
        }
        assert_eq!(trials.into_vec(), expected);
    }

    #[test]
    fn test_failed_chunk_is_retried_with_fresh_seed() {
        let attempts = AtomicUsize::new(0);
        let coordinator = SimulationCoordinator::new(100, 4, 10);

        let trials = coordinator
            .run_with(|chunk| {
                if chunk.index == 1 {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if chunk.seed == 11 {
                        return Err(RiskError::degenerate("test", "transient"));
                    }
                    assert_eq!(chunk.seed, 15);
                }
                Ok(vec![chunk.seed as f64; chunk.num_trials])
            })
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(trials.len(), 100);
        assert_eq!(trials.as_slice()[25], 15.0);
    }

    #[test]
    fn test_short_chunk_counts_as_failure() {
        let result = SimulationCoordinator::new(10, 2, 0)
            .with_max_chunk_retries(1)
            .run_with(|chunk| Ok(vec![0.0; chunk.num_trials - 1]));
        match result {
            Err(RiskError::ChunkFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected ChunkFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_model_rejects_wrong_weight_length() {
        let dist = FactorDistribution::new(DVector::zeros(2), DMatrix::identity(2, 2)).unwrap();
        let mvn = MultivariateNormal::new(&dist).unwrap();
        let result = SimulationModel::new(vec![FactorWeights::new("X", vec![0.0; 4])], mvn);
        assert!(matches!(result, Err(RiskError::AlignmentMismatch { .. })));
    }

    #[test]
    fn test_value_at_risk_rank() {
        let coordinator = SimulationCoordinator::new(20_000, 8, 3);
        let trials = coordinator.run(&model()).unwrap();
        let var = trials.value_at_risk(0.05).unwrap();

        let mut sorted = trials.as_slice().to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(var, sorted[999]);
        assert!(trials.conditional_value_at_risk(0.05).unwrap() <= var);
    }

    /// Run `num_trials` over 1,000 chunks and check the merge and the VaR rank
    fn check_thousand_chunk_run(num_trials: u64) {
        let model = model();
        let trials = SimulationCoordinator::new(num_trials, 1_000, 1496)
            .run(&model)
            .unwrap();
        assert_eq!(trials.len() as u64, num_trials);

        // The last chunk lands at the end of the merged collection
        let last = partition(num_trials, 1_000, 1496).unwrap()[999];
        let tail = run_chunk(&model, &last).unwrap();
        assert_eq!(&trials.as_slice()[trials.len() - tail.len()..], &tail[..]);

        let var = trials.value_at_risk(0.05).unwrap();
        let rank = (num_trials / 20) as usize;
        let mut sorted = trials.into_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(var, sorted[rank - 1]);
    }

    #[test]
    fn test_one_million_trials_over_thousand_chunks() {
        check_thousand_chunk_run(1_000_000);
    }

    #[test]
    #[ignore = "ten million trials; run with --ignored --release"]
    fn test_ten_million_trials_over_thousand_chunks() {
        check_thousand_chunk_run(10_000_000);
    }
}
