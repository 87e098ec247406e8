//! Error types for the Monte Carlo VaR engine

use thiserror::Error;

/// Errors that can occur while building the factor model or running trials
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Insufficient history for {series}: {reason}")]
    InsufficientHistory { series: String, reason: String },

    #[error("Alignment mismatch for {series}: expected {expected} observations, got {actual}")]
    AlignmentMismatch {
        series: String,
        expected: usize,
        actual: usize,
    },

    #[error("Empty trial set: {num_trials} trials across {parallelism} partitions")]
    EmptyTrialSet { num_trials: u64, parallelism: usize },

    #[error("Numerical degeneracy in {context}: {reason}")]
    NumericalDegeneracy { context: String, reason: String },

    #[error("Chunk {chunk} failed after {attempts} attempts: {reason}")]
    ChunkFailed {
        chunk: usize,
        attempts: usize,
        reason: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Parse error in {source_name} at line {line}: {reason}")]
    Parse {
        source_name: String,
        line: u64,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RiskError {
    pub(crate) fn insufficient(series: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InsufficientHistory {
            series: series.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(context: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::NumericalDegeneracy {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_series() {
        let err = RiskError::AlignmentMismatch {
            series: "crude-oil".to_string(),
            expected: 1296,
            actual: 1290,
        };
        let msg = err.to_string();
        assert!(msg.contains("crude-oil"));
        assert!(msg.contains("1296"));

        let err = RiskError::insufficient("AAPL", "no observations in window");
        assert!(err.to_string().contains("AAPL"));
    }
}
