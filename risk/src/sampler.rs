//! Seeded multivariate normal scenario generation
//!
//! [`MultivariateNormal`] factorises the factor covariance once; every
//! [`ScenarioSampler`] borrows it and owns a ChaCha20 generator seeded from a
//! single `u64`, so a seed fully determines its scenario stream on any machine.

use crate::distribution::FactorDistribution;
use crate::error::{Result, RiskError};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::warn;

/// Relative size of a negative eigenvalue that is treated as rounding noise
const EIGEN_TOLERANCE: f64 = 1e-8;

/// How the covariance square root was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorization {
    Cholesky,
    /// Eigendecomposition with small negative eigenvalues clipped to zero
    ClippedEigen,
}

/// Factorised N(means, covariance), shared read-only across samplers
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    means: DVector<f64>,
    transform: DMatrix<f64>,
    factorization: Factorization,
}

impl MultivariateNormal {
    /// Factorise the covariance as `L Lᵀ`
    ///
    /// Falls back to a clipped eigendecomposition when Cholesky fails. A
    /// covariance with a materially negative eigenvalue is rejected.
    pub fn new(distribution: &FactorDistribution) -> Result<Self> {
        let covariance = &distribution.covariance;
        let non_finite = |v: &f64| !v.is_finite();
        if covariance.iter().any(non_finite) || distribution.means.iter().any(non_finite) {
            return Err(RiskError::degenerate(
                "factor distribution",
                "non-finite mean or covariance entry",
            ));
        }

        if let Some(chol) = covariance.clone().cholesky() {
            return Ok(Self {
                means: distribution.means.clone(),
                transform: chol.l(),
                factorization: Factorization::Cholesky,
            });
        }

        let eigen = SymmetricEigen::new(covariance.clone());
        let max_eigen = eigen.eigenvalues.max();
        let min_eigen = eigen.eigenvalues.min();
        let floor = -EIGEN_TOLERANCE * max_eigen.abs().max(1.0);
        if min_eigen < floor {
            return Err(RiskError::degenerate(
                "factor covariance",
                format!(
                    "not positive semi-definite (smallest eigenvalue {:.3e})",
                    min_eigen
                ),
            ));
        }

        if min_eigen < 0.0 {
            warn!(
                smallest_eigenvalue = min_eigen,
                "clipping negative covariance eigenvalues to zero"
            );
        }

        let roots = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
        let transform = &eigen.eigenvectors * DMatrix::from_diagonal(&roots);

        Ok(Self {
            means: distribution.means.clone(),
            transform,
            factorization: Factorization::ClippedEigen,
        })
    }

    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    pub fn factorization(&self) -> Factorization {
        self.factorization
    }

    /// Start an independent scenario stream
    pub fn sampler(&self, seed: u64) -> ScenarioSampler<'_> {
        ScenarioSampler::new(self, seed)
    }
}

/// Deterministic, infinite stream of correlated factor scenarios
pub struct ScenarioSampler<'a> {
    distribution: &'a MultivariateNormal,
    rng: ChaCha20Rng,
    normals: Vec<f64>,
}

impl<'a> ScenarioSampler<'a> {
    pub fn new(distribution: &'a MultivariateNormal, seed: u64) -> Self {
        Self {
            distribution,
            rng: ChaCha20Rng::seed_from_u64(seed),
            normals: vec![0.0; distribution.dimension()],
        }
    }

    /// Draw the next scenario into `out` without allocating
    pub fn sample_into(&mut self, out: &mut [f64]) {
        let dim = self.distribution.dimension();
        debug_assert_eq!(out.len(), dim);

        for z in self.normals.iter_mut() {
            *z = StandardNormal.sample(&mut self.rng);
        }

        let transform = &self.distribution.transform;
        for (i, slot) in out.iter_mut().enumerate() {
            let mut value = self.distribution.means[i];
            for (j, z) in self.normals.iter().enumerate() {
                value += transform[(i, j)] * z;
            }
            *slot = value;
        }
    }
}

impl Iterator for ScenarioSampler<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut scenario = vec![0.0; self.distribution.dimension()];
        self.sample_into(&mut scenario);
        Some(scenario)
    }
}
