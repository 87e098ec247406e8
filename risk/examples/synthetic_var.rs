//! Monte Carlo VaR on synthetic histories
//!
//! Builds two factor histories and three instruments that load on them,
//! fits the factor model and simulates the portfolio return distribution.
//!
//! Run with: cargo run --example synthetic_var

use ag_mcvar::{business_days, pipeline, SimulationConfig, TimeSeries};
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn random_walk(
    name: &str,
    seed: u64,
    start: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> TimeSeries {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut level = start;
    let points = business_days(start_date, end_date)
        .map(|d| {
            level += rng.gen_range(-1.0..1.0) * start * 0.01;
            (d, level)
        })
        .collect();
    TimeSeries::from_unsorted(name, points).expect("business days are ascending")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Factor-Model Monte Carlo VaR Example ===\n");

    let from = NaiveDate::from_ymd_opt(2009, 1, 2).ok_or("bad date")?;
    let to = NaiveDate::from_ymd_opt(2014, 12, 31).ok_or("bad date")?;

    // 1. Factor histories (an index and a commodity)
    let index = random_walk("INDEX", 1, 1000.0, from, to);
    let commodity = random_walk("COMMODITY", 2, 80.0, from, to);

    // 2. Instruments that load linearly on the factors
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let instruments: Vec<TimeSeries> = [(0.05, 0.0), (0.02, 0.5), (0.0, -0.3)]
        .iter()
        .enumerate()
        .map(|(i, (a, b))| {
            let points = index
                .points()
                .iter()
                .zip(commodity.points())
                .map(|((d, x), (_, y))| (*d, 50.0 + a * x + b * y + rng.gen_range(-0.2..0.2)))
                .collect();
            TimeSeries::new(format!("STOCK{}", i), points)
        })
        .collect::<Result<_, _>>()?;

    // 3. Run
    let config = SimulationConfig {
        num_trials: 200_000,
        parallelism: 100,
        ..Default::default()
    };
    println!("Window: {} .. {}", config.start_date, config.end_date);
    println!(
        "Trials: {} in {} partitions",
        config.num_trials, config.parallelism
    );
    println!();

    let outcome = pipeline::run(&config, &[index, commodity], instruments)?;
    let report = &outcome.report;

    println!("--- Results ---");
    let tail = config.tail_probability * 100.0;
    println!("VaR ({}% tail):  {:.4}", tail, report.value_at_risk);
    println!(
        "  95% bootstrap interval: [{:.4}, {:.4}]",
        report.var_confidence_interval.0, report.var_confidence_interval.1
    );
    println!("CVaR:            {:.4}", report.conditional_value_at_risk);
    println!(
        "  95% bootstrap interval: [{:.4}, {:.4}]",
        report.cvar_confidence_interval.0, report.cvar_confidence_interval.1
    );

    if let Some(backtest) = &report.backtest {
        println!();
        println!("--- Kupiec Backtest ---");
        println!(
            "Failures: {} of {} ({:.2}% vs {:.2}% expected)",
            backtest.num_failures,
            backtest.num_observations,
            backtest.failure_rate * 100.0,
            backtest.expected_failure_rate * 100.0
        );
        println!(
            "Statistic: {:.4}, p-value: {:.4}",
            backtest.test_statistic, backtest.p_value
        );
    }

    Ok(())
}
