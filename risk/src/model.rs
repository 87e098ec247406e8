//! Linear factor model
//!
//! Regresses each instrument's returns on the featurized factor returns,
//! producing one [`FactorWeights`] vector per instrument. Fits are independent
//! and run in parallel over a shared, read-only design matrix.

use crate::error::{Result, RiskError};
use crate::features::{feature_count, featurize_into};
use crate::series::ReturnSeries;
use nalgebra::{DMatrix, DVector, Dyn, SVD};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Ratio of smallest to largest singular value below which a design is rank-deficient
const RANK_TOLERANCE: f64 = 1e-12;

/// Historical factor returns, one row per time step and one column per factor
#[derive(Debug, Clone, PartialEq)]
pub struct FactorMatrix {
    names: Vec<String>,
    data: DMatrix<f64>,
}

impl FactorMatrix {
    /// Stack factor return series as columns
    ///
    /// All series must have the length of the first one.
    pub fn from_returns(factors: &[ReturnSeries]) -> Result<Self> {
        let first = factors
            .first()
            .ok_or_else(|| RiskError::InvalidParameter("no factor series provided".to_string()))?;
        let rows = first.len();

        for factor in factors {
            if factor.len() != rows {
                return Err(RiskError::AlignmentMismatch {
                    series: factor.name.clone(),
                    expected: rows,
                    actual: factor.len(),
                });
            }
        }

        let data = DMatrix::from_fn(rows, factors.len(), |r, c| factors[c].values[r]);
        Ok(Self {
            names: factors.iter().map(|f| f.name.clone()).collect(),
            data,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn num_factors(&self) -> usize {
        self.data.ncols()
    }

    pub fn num_observations(&self) -> usize {
        self.data.nrows()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Design matrix `[1, features(row)]` for every time step
    pub fn design_matrix(&self) -> DMatrix<f64> {
        let factors = self.num_factors();
        let cols = 1 + feature_count(factors);
        let mut design = DMatrix::zeros(self.num_observations(), cols);
        let mut row_factors = vec![0.0; factors];
        let mut row_features = vec![0.0; feature_count(factors)];

        for r in 0..self.num_observations() {
            for (c, slot) in row_factors.iter_mut().enumerate() {
                *slot = self.data[(r, c)];
            }
            featurize_into(&row_factors, &mut row_features);
            design[(r, 0)] = 1.0;
            for (c, value) in row_features.iter().enumerate() {
                design[(r, c + 1)] = *value;
            }
        }

        design
    }
}

/// Regression coefficients of one instrument: intercept, then one per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub instrument: String,
    pub coefficients: Vec<f64>,
}

impl FactorWeights {
    pub fn new(instrument: impl Into<String>, coefficients: Vec<f64>) -> Self {
        Self {
            instrument: instrument.into(),
            coefficients,
        }
    }

    /// Intercept, or zero for an empty weight vector
    pub fn intercept(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(0.0)
    }

    /// Weights aligned with the featurized scenario
    pub fn feature_weights(&self) -> &[f64] {
        self.coefficients.get(1..).unwrap_or(&[])
    }

    /// Check that there is one intercept plus three coefficients per factor
    pub fn ensure_factor_count(&self, num_factors: usize) -> Result<()> {
        let expected = 1 + feature_count(num_factors);
        if self.coefficients.len() != expected {
            return Err(RiskError::AlignmentMismatch {
                series: self.instrument.clone(),
                expected,
                actual: self.coefficients.len(),
            });
        }
        Ok(())
    }

    /// Modelled return for an already featurized factor vector
    ///
    /// The weights must match the feature count; see [`Self::ensure_factor_count`].
    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        debug_assert_eq!(self.feature_weights().len(), features.len());
        self.feature_weights()
            .iter()
            .zip(features)
            .fold(self.intercept(), |acc, (w, f)| acc + w * f)
    }
}

/// Ordinary least squares fitter over a fixed factor history
///
/// The design matrix is decomposed once; each instrument fit is a solve
/// against the shared decomposition.
pub struct FactorModelFitter {
    design: DMatrix<f64>,
    svd: SVD<f64, Dyn, Dyn>,
    num_features: usize,
}

impl FactorModelFitter {
    pub fn new(factors: &FactorMatrix) -> Self {
        let design = factors.design_matrix();
        let svd = design.clone().svd(true, true);
        Self {
            design,
            svd,
            num_features: feature_count(factors.num_factors()),
        }
    }

    pub fn design(&self) -> &DMatrix<f64> {
        &self.design
    }

    /// Fit one instrument
    pub fn fit(&self, instrument: &ReturnSeries) -> Result<FactorWeights> {
        let (rows, cols) = self.design.shape();
        if instrument.len() != rows {
            return Err(RiskError::AlignmentMismatch {
                series: instrument.name.clone(),
                expected: rows,
                actual: instrument.len(),
            });
        }
        if rows < cols {
            return Err(RiskError::degenerate(
                instrument.name.as_str(),
                format!("{} observations for {} coefficients", rows, cols),
            ));
        }

        let max_sv = self.svd.singular_values.max();
        let min_sv = self.svd.singular_values.min();
        if max_sv <= 0.0 || min_sv / max_sv < RANK_TOLERANCE {
            return Err(RiskError::degenerate(
                instrument.name.as_str(),
                format!(
                    "rank-deficient design (singular values {:.3e}..{:.3e})",
                    min_sv, max_sv
                ),
            ));
        }

        let y = DVector::from_column_slice(&instrument.values);
        let beta = self
            .svd
            .solve(&y, max_sv * RANK_TOLERANCE)
            .map_err(|e| RiskError::degenerate(instrument.name.as_str(), e))?;

        debug!(
            instrument = instrument.name.as_str(),
            intercept = beta[0],
            "fitted factor weights"
        );
        debug_assert_eq!(beta.len(), 1 + self.num_features);

        let coefficients = beta.iter().copied().collect();
        Ok(FactorWeights::new(instrument.name.clone(), coefficients))
    }

    /// Fit every instrument in parallel; any failure aborts the whole fit
    pub fn fit_all(&self, instruments: &[ReturnSeries]) -> Result<Vec<FactorWeights>> {
        info!(
            instruments = instruments.len(),
            observations = self.design.nrows(),
            coefficients = self.design.ncols(),
            "fitting factor model"
        );
        instruments.par_iter().map(|i| self.fit(i)).collect()
    }
}
