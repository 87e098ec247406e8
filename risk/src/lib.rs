//! # ag-mcvar: Factor-Model Monte Carlo Value at Risk
//!
//! This library estimates portfolio VaR by simulating factor scenarios and
//! mapping them through per-instrument linear factor models.
//!
//! ## Core Components
//!
//! - **align / returns**: business-day alignment and two-week windowed returns
//! - **FactorModelFitter**: one OLS regression per instrument on featurized factors
//! - **FactorDistribution**: factor means and covariance
//! - **ScenarioSampler**: seeded multivariate normal scenario stream
//! - **SimulationCoordinator**: partitioned, reproducible trial execution
//! - **var**: VaR, CVaR, bootstrap intervals, Kupiec backtest
//!
//! ## Example Usage
//!
//! ```rust
//! use ag_mcvar::{FactorDistribution, FactorWeights, MultivariateNormal,
//!     SimulationCoordinator, SimulationModel};
//! use nalgebra::{DMatrix, DVector};
//!
//! // One factor with mean 0 and variance 0.04
//! let dist = FactorDistribution::new(
//!     DVector::from_vec(vec![0.0]),
//!     DMatrix::from_row_slice(1, 1, &[0.04]),
//! ).unwrap();
//!
//! // intercept, signed square, signed square root, identity
//! let weights = vec![FactorWeights::new("XYZ", vec![0.0, 0.0, 0.0, 1.0])];
//! let model = SimulationModel::new(weights, MultivariateNormal::new(&dist).unwrap()).unwrap();
//!
//! let trials = SimulationCoordinator::new(10_000, 4, 1496).run(&model).unwrap();
//! assert_eq!(trials.len(), 10_000);
//!
//! let var = trials.value_at_risk(0.05).unwrap();
//! assert!(var < 0.0); // roughly -1.645 * 0.2
//! ```

pub mod align;
mod config;
mod coordinator;
mod distribution;
mod error;
pub mod features;
pub mod history;
mod model;
pub mod pipeline;
pub mod returns;
mod sampler;
mod series;
pub mod trial;
pub mod var;

pub use align::{align, align_all, retain_sufficient};
pub use config::SimulationConfig;
pub use coordinator::{
    partition, run_chunk, SimulationCoordinator, SimulationModel, TrialChunk, TrialReturns,
};
pub use distribution::FactorDistribution;
pub use error::{Result, RiskError};
pub use features::{featurize, FeatureKind};
pub use model::{FactorMatrix, FactorModelFitter, FactorWeights};
pub use returns::{two_week_returns, windowed_returns};
pub use sampler::{Factorization, MultivariateNormal, ScenarioSampler};
pub use series::{business_days, count_business_days, is_business_day, ReturnSeries, TimeSeries};
pub use var::{VarBacktest, VarReport};
