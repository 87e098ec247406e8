//! Factor return distribution estimation
//!
//! Summarises historical factor returns as a mean vector and an unbiased
//! sample covariance matrix. Both are computed once and shared read-only by
//! every scenario sampler.

use crate::error::{Result, RiskError};
use crate::model::FactorMatrix;
use nalgebra::{DMatrix, DVector};

/// Mean vector and covariance matrix of factor returns
#[derive(Debug, Clone, PartialEq)]
pub struct FactorDistribution {
    pub means: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

impl FactorDistribution {
    /// Build from explicit moments
    pub fn new(means: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let n = means.len();
        if n == 0 {
            return Err(RiskError::InvalidParameter(
                "factor distribution needs at least one factor".to_string(),
            ));
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(RiskError::InvalidParameter(format!(
                "covariance is {}x{} for {} factors",
                covariance.nrows(),
                covariance.ncols(),
                n
            )));
        }
        Ok(Self { means, covariance })
    }

    /// Estimate from historical factor returns
    ///
    /// Uses the unbiased estimator (divisor T - 1) and symmetrises the result.
    pub fn estimate(factors: &FactorMatrix) -> Result<Self> {
        let data = factors.as_matrix();
        let (t, n) = data.shape();
        if t < 2 {
            let series = factors.names().join(", ");
            return Err(RiskError::insufficient(
                series,
                format!("{} observations, need at least 2 for a covariance", t),
            ));
        }

        let means = DVector::from_fn(n, |c, _| data.column(c).mean());

        let mut centered = data.clone();
        for (c, mut column) in centered.column_iter_mut().enumerate() {
            column.add_scalar_mut(-means[c]);
        }

        let covariance = centered.transpose() * &centered / (t - 1) as f64;
        let covariance = (&covariance + covariance.transpose()) * 0.5;

        Ok(Self { means, covariance })
    }

    pub fn num_factors(&self) -> usize {
        self.means.len()
    }
}
