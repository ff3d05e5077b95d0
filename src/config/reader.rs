// src/config/reader.rs
//
// Reads the flat `key: value` input file. Missing or malformed values fall
// back to defaults with a warning; only an unreadable file or a missing or
// unknown model key is fatal.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ::config::{Config, ConfigError, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::params::{DistributionParams, MassModel};
use crate::analysis::density::DEFAULT_TOLERANCE;
use crate::analysis::monte_carlo::MonteCarloSettings;

pub const DEFAULT_INPUT_FILE: &str = "inputFile.txt";
pub const ENV_PREFIX: &str = "MASSMERGE";
pub const DEFAULT_WORKERS: usize = 4;

const N_RANGE: (i64, i64) = (1_000, 10_000_000);
const SURVIVOR_RANGE: (i64, i64) = (100, 1_000_000);
const BETA_RANGE: (f64, f64) = (2.0, 3.0);

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub params: DistributionParams,
    pub settings: MonteCarloSettings,
    pub workers: usize,
    pub accuracy: f64,
    pub output_dir: PathBuf,
}

pub fn read_run_config(path: &Path, defaults: &DistributionParams) -> Result<RunConfig> {
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }

    let source = Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .add_source(Environment::with_prefix(ENV_PREFIX))
        .build()
        .with_context(|| format!("Failed to parse input file: {}", path.display()))?;

    let model_key: String = lookup(&source, "model")
        .with_context(|| format!("Can't read model key from {}", path.display()))?;
    let model = MassModel::from_key(&model_key)
        .ok_or_else(|| anyhow!("Incorrect model key: {}", model_key))?;

    Ok(RunConfig {
        params: read_params(&source, model, defaults),
        settings: MonteCarloSettings {
            seed: read_seed(&source),
        },
        workers: read_workers(&source),
        accuracy: read_accuracy(&source),
        output_dir: value_or_default(&source, "output_dir", ".".to_string()).into(),
    })
}

/// Reads only the keys the selected model uses; everything else keeps its default.
pub fn read_params(
    source: &Config,
    model: MassModel,
    defaults: &DistributionParams,
) -> DistributionParams {
    let mut params = DistributionParams {
        model,
        ..defaults.clone()
    };

    match model {
        MassModel::Uniform => {
            params.m0 = value_or_default(source, "M0", defaults.m0);
        }
        MassModel::PowerLaw => {
            params.m1 = value_or_default(source, "M1", defaults.m1);
            params.m2 = value_or_default(source, "M2", defaults.m2);
            let beta = value_or_default(source, "beta", defaults.beta);
            params.beta = clamp_beta(beta, defaults.beta);
        }
        MassModel::LogNormal => {
            params.m1 = value_or_default(source, "M1", defaults.m1);
            params.m2 = value_or_default(source, "M2", defaults.m2);
            params.x0 = value_or_default(source, "x0", defaults.x0);
            params.sigma = value_or_default(source, "sigma", defaults.sigma);
        }
    }

    params.n = clamp_population(value_or_default(source, "N", defaults.n as i64), defaults.n);
    params.l = clamp_merges(params.n, value_or_default(source, "L", defaults.l as i64));

    let trials: i64 = value_or_default(
        source,
        "monte_carlo_experiments_number",
        defaults.monte_carlo_experiments_number as i64,
    );
    params.monte_carlo_experiments_number = if trials < 1 {
        warn!(
            parameter = "monte_carlo_experiments_number",
            value = trials,
            default = defaults.monte_carlo_experiments_number,
            "invalid trial count, using default value"
        );
        defaults.monte_carlo_experiments_number
    } else {
        trials as usize
    };

    params
}

pub fn clamp_population(n: i64, default: usize) -> usize {
    if n < N_RANGE.0 || n > N_RANGE.1 {
        warn!(parameter = "N", value = n, default, "invalid N value, using default value");
        default
    } else {
        n as usize
    }
}

/// Keeps `N - L` inside the survivor range; out-of-range or negative `L`
/// becomes `N - 100`.
pub fn clamp_merges(n: usize, l: i64) -> usize {
    let survivors = n as i64 - l;
    if l < 0 || survivors < SURVIVOR_RANGE.0 || survivors > SURVIVOR_RANGE.1 {
        let fallback = n.saturating_sub(SURVIVOR_RANGE.0 as usize);
        warn!(parameter = "L", value = l, fallback, "invalid L value, using N - 100");
        fallback
    } else {
        l as usize
    }
}

pub fn clamp_beta(beta: f64, default: f64) -> f64 {
    if !(BETA_RANGE.0..=BETA_RANGE.1).contains(&beta) {
        warn!(parameter = "beta", value = beta, default, "invalid beta value, using default value");
        default
    } else {
        beta
    }
}

fn read_seed(source: &Config) -> Option<u64> {
    match lookup::<u64>(source, "seed") {
        Ok(seed) => Some(seed),
        Err(ConfigError::NotFound(_)) => None,
        Err(e) => {
            warn!(parameter = "seed", error = %e, "seed has wrong format, seeding from entropy");
            None
        }
    }
}

fn read_workers(source: &Config) -> usize {
    let workers: i64 = value_or_default(source, "workers", DEFAULT_WORKERS as i64);
    if workers < 1 {
        warn!(
            parameter = "workers",
            value = workers,
            default = DEFAULT_WORKERS,
            "invalid worker count, using default value"
        );
        DEFAULT_WORKERS
    } else {
        workers as usize
    }
}

fn read_accuracy(source: &Config) -> f64 {
    let accuracy = value_or_default(source, "accuracy", DEFAULT_TOLERANCE);
    if !accuracy.is_finite() || accuracy <= 0.0 {
        warn!(
            parameter = "accuracy",
            value = accuracy,
            default = DEFAULT_TOLERANCE,
            "invalid accuracy, using default value"
        );
        DEFAULT_TOLERANCE
    } else {
        accuracy
    }
}

fn value_or_default<T>(source: &Config, key: &str, default: T) -> T
where
    T: DeserializeOwned + Display,
{
    match lookup(source, key) {
        Ok(value) => value,
        Err(ConfigError::NotFound(_)) => {
            warn!(
                parameter = key,
                default = %default,
                "parameter wasn't read, using default value"
            );
            default
        }
        Err(e) => {
            warn!(
                parameter = key,
                error = %e,
                default = %default,
                "input file has wrong format, using default value"
            );
            default
        }
    }
}

// Keys may come back lowercased depending on the source, so try both spellings.
fn lookup<T: DeserializeOwned>(source: &Config, key: &str) -> std::result::Result<T, ConfigError> {
    match source.get::<T>(key) {
        Err(ConfigError::NotFound(_)) if key != key.to_ascii_lowercase() => {
            source.get::<T>(&key.to_ascii_lowercase())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn write_input(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("massmerge-input-{}.txt", Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_power_law_file() {
        let path = write_input(
            "model: B\nM1: 0.5\nM2: 20.0\nbeta: 2.5\nN: 5000\nL: 4000\n\
             monte_carlo_experiments_number: 12\nseed: 7\n",
        );
        let config = read_run_config(&path, &DistributionParams::default()).unwrap();
        fs::remove_file(&path).ok();

        let params = &config.params;
        assert_eq!(params.model, MassModel::PowerLaw);
        assert_eq!(params.m1, 0.5);
        assert_eq!(params.m2, 20.0);
        assert_eq!(params.beta, 2.5);
        assert_eq!(params.n, 5000);
        assert_eq!(params.l, 4000);
        assert_eq!(params.monte_carlo_experiments_number, 12);
        assert_eq!(config.settings.seed, Some(7));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.accuracy, DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let path = write_input("model: B\nbeta: 4.0\nN: 50\nL: 10\n");
        let defaults = DistributionParams::default();
        let config = read_run_config(&path, &defaults).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.params.beta, defaults.beta);
        assert_eq!(config.params.n, defaults.n);
        // N - L = 990 is in range, so L is kept
        assert_eq!(config.params.l, 10);
    }

    #[test]
    fn test_malformed_value_uses_default() {
        let path = write_input("model: uniform\nM0: heavy\nN: 2000\nL: 1950\n");
        let defaults = DistributionParams::default();
        let config = read_run_config(&path, &defaults).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.params.model, MassModel::Uniform);
        assert_eq!(config.params.m0, defaults.m0);
        assert_eq!(config.params.n, 2000);
        // N - L = 50 is below the survivor range
        assert_eq!(config.params.l, 1900);
        assert_eq!(config.settings.seed, None);
    }

    #[test]
    fn test_unknown_model_is_fatal() {
        let path = write_input("model: Z\nN: 2000\n");
        let result = read_run_config(&path, &DistributionParams::default());
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let path = std::env::temp_dir().join(format!("massmerge-missing-{}.txt", Uuid::new_v4()));
        assert!(read_run_config(&path, &DistributionParams::default()).is_err());
    }

    #[test]
    fn test_clamp_merges() {
        assert_eq!(clamp_merges(1000, 10), 10);
        assert_eq!(clamp_merges(1000, -5), 900);
        assert_eq!(clamp_merges(1000, 950), 900);
        assert_eq!(clamp_merges(2_000_000, 0), 1_999_900);
        assert_eq!(clamp_merges(1000, 900), 900);
    }

    #[test]
    fn test_clamp_population_and_beta() {
        assert_eq!(clamp_population(999, 1000), 1000);
        assert_eq!(clamp_population(10_000_000, 1000), 10_000_000);
        assert_eq!(clamp_beta(2.0, 2.35), 2.0);
        assert_eq!(clamp_beta(1.0, 2.35), 2.35);
        assert_eq!(clamp_beta(f64::NAN, 2.35), 2.35);
    }
}
