// src/main.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, info_span};

mod analysis;
mod config;
mod error;
mod file;
mod logging;

use crate::analysis::{density, monte_carlo, ModelSelector, PooledSummary};
use crate::config::{read_run_config, DistributionParams, RunConfig, DEFAULT_INPUT_FILE};
use crate::file::{ResultsFileManager, RunResults};

fn main() {
    logging::init("warn");

    let input = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_FILE));

    if let Err(e) = run(input) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(input: PathBuf) -> Result<()> {
    let config = read_run_config(&input, &DistributionParams::default())?;
    init_thread_pool(config.workers);

    let span = info_span!(
        "run",
        model = %config.params.model,
        n = config.params.n,
        l = config.params.l,
        trials = config.params.monte_carlo_experiments_number,
    );
    let _guard = span.enter();

    simulate(&config)
}

/// Configure the global rayon pool; a pool that already exists is kept.
fn init_thread_pool(workers: usize) {
    let built = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .is_ok();
    info!(workers, built, "thread pool configured");
}

fn simulate(config: &RunConfig) -> Result<()> {
    let params = &config.params;

    let run = monte_carlo::run(params, &config.settings).context("Monte Carlo run failed")?;
    info!(seed = run.seed, pooled = run.masses.len(), "trials finished");

    let pooled = PooledSummary::from_masses(&run.masses);
    let mut masses = run.masses;
    let density = density::build(&mut masses, config.accuracy).context("Failed to build density")?;
    info!(points = density.len(), "density built");

    let selection = ModelSelector::default()
        .select(density)
        .context("No candidate model could be fitted")?;

    let results = RunResults::new(params, run.seed, config.accuracy, pooled, &selection);
    let saved = ResultsFileManager::new(&config.output_dir).save_run(&results, &selection)?;

    let fitted = selection
        .best
        .model
        .param_names()
        .iter()
        .zip(&selection.best.params)
        .map(|(name, value)| format!("{}={:.6}", name, value))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "{} masses, best fit: {} ({}), AIC {:.4}, saved to {}",
        params.model,
        selection.best.model,
        fitted,
        selection.best.aic,
        saved.results_path.display()
    );

    Ok(())
}
