use ag_mcvar::history::{read_investing_file, read_yahoo_dir, read_yahoo_file};
use ag_mcvar::{pipeline, TimeSeries};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[clap(name = "mcvar", about = "Factor-model Monte Carlo Value at Risk")]
struct Args {
    #[clap(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Write all trial returns as a JSON array
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Override the number of trials
    #[clap(long)]
    trials: Option<u64>,

    /// Override the number of trial partitions
    #[clap(long)]
    parallelism: Option<usize>,

    /// Override the base seed
    #[clap(long)]
    seed: Option<u64>,
}

fn load_factors(config: &Config) -> Result<Vec<TimeSeries>> {
    let mut factors = Vec::new();
    for path in &config.data.investing_factors {
        let reading = || format!("reading {}", path.display());
        factors.push(read_investing_file(path).with_context(reading)?);
    }
    for path in &config.data.yahoo_factors {
        let reading = || format!("reading {}", path.display());
        factors.push(read_yahoo_file(path).with_context(reading)?);
    }
    Ok(factors)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Loading configuration from {:?}", args.config);
    let mut config = Config::load(&args.config)?;
    if let Some(trials) = args.trials {
        config.simulation.num_trials = trials;
    }
    if let Some(parallelism) = args.parallelism {
        config.simulation.parallelism = parallelism;
    }
    if let Some(seed) = args.seed {
        config.simulation.base_seed = seed;
    }
    config.simulation.validate()?;

    let factors = load_factors(&config)?;
    info!("Loaded {} factor histories", factors.len());

    let stocks_dir = &config.data.stocks_dir;
    let instruments = read_yahoo_dir(stocks_dir)
        .with_context(|| format!("reading instruments from {}", stocks_dir.display()))?;
    info!("Loaded {} instrument histories", instruments.len());

    let sim = &config.simulation;
    let prepared = pipeline::prepare(sim, &factors, instruments).context("building factor model")?;
    let outcome = pipeline::simulate(sim, &prepared).context("running simulation")?;
    let report = &outcome.report;

    println!("Instruments: {}", prepared.model.weights().len());
    println!("Trials: {}", report.num_trials);
    println!(
        "VaR ({:.1}%): {:.6}  [{:.6}, {:.6}]",
        sim.tail_probability * 100.0,
        report.value_at_risk,
        report.var_confidence_interval.0,
        report.var_confidence_interval.1
    );
    println!(
        "CVaR ({:.1}%): {:.6}  [{:.6}, {:.6}]",
        sim.tail_probability * 100.0,
        report.conditional_value_at_risk,
        report.cvar_confidence_interval.0,
        report.cvar_confidence_interval.1
    );
    if let Some(backtest) = &report.backtest {
        println!(
            "Kupiec: {} failures in {} periods, statistic {:.4}, p-value {:.4}",
            backtest.num_failures,
            backtest.num_observations,
            backtest.test_statistic,
            backtest.p_value
        );
    }

    if let Some(path) = &args.output {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), outcome.trials.as_slice())?;
        info!("Wrote {} trials to {:?}", outcome.trials.len(), path);
    }

    Ok(())
}
