use ag_mcvar::SimulationConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub data: DataConfig,
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    /// Directory of Yahoo-style CSV instrument histories
    pub stocks_dir: PathBuf,
    #[serde(default)]
    pub yahoo_factors: Vec<PathBuf>,
    #[serde(default)]
    pub investing_factors: Vec<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        if config.data.yahoo_factors.is_empty() && config.data.investing_factors.is_empty() {
            anyhow::bail!("config lists no factor histories");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_config() {
        let yaml = include_str!("../config.example.yaml");
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.simulation.num_trials, 10_000_000);
        assert_eq!(config.simulation.parallelism, 1_000);
        assert_eq!(config.data.yahoo_factors.len(), 2);
        assert_eq!(config.data.investing_factors.len(), 2);
    }

    #[test]
    fn test_simulation_section_is_optional() {
        let yaml = "data:\n  stocks_dir: stocks\n  yahoo_factors: [a.csv]\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = concat!(
            "simulation:\n  num_trials: 5000\n",
            "data:\n  stocks_dir: stocks\n  investing_factors: [gspc.tsv]\n",
        );
        fs::write(&path, yaml).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.simulation.num_trials, 5_000);
        assert_eq!(config.data.stocks_dir, PathBuf::from("stocks"));
        assert_eq!(config.data.investing_factors, vec![PathBuf::from("gspc.tsv")]);

        let missing = dir.path().join("missing.yaml");
        let err = Config::load(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn test_requires_factors() {
        let yaml = "data:\n  stocks_dir: stocks\n";
        assert!(Config::parse(yaml).is_err());
    }
}
