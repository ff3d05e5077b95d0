// src/file/results.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::prelude::*;
use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FileHandler;
use crate::analysis::{FitResult, PooledSummary, Selection};
use crate::config::DistributionParams;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub model: String,
    pub reason: String,
}

/// Everything a renderer needs to redraw the histogram and the fitted curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResults {
    pub version: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub params: DistributionParams,
    pub seed: u64,
    pub accuracy: f64,
    pub pooled: PooledSummary,
    pub best_model: String,
    pub best_params: Vec<f64>,
    pub candidates: Vec<FitResult>,
    pub failures: Vec<FailureRecord>,
    pub density_file: Option<String>,
}

impl RunResults {
    pub fn new(
        params: &DistributionParams,
        seed: u64,
        accuracy: f64,
        pooled: PooledSummary,
        selection: &Selection,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            params: params.clone(),
            seed,
            accuracy,
            pooled,
            best_model: selection.best.model.name().to_string(),
            best_params: selection.best.params.clone(),
            candidates: selection.candidates.clone(),
            failures: selection
                .failures
                .iter()
                .map(|failure| FailureRecord {
                    model: failure.model.name().to_string(),
                    reason: failure.error.to_string(),
                })
                .collect(),
            density_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityRow {
    pub mass: f64,
    pub probability: f64,
    pub fitted: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityTable {
    pub rows: Vec<DensityRow>,
}

impl DensityTable {
    pub fn from_selection(selection: &Selection) -> Self {
        let rows = selection
            .density
            .points()
            .zip(selection.fitted_curve())
            .map(|((mass, probability), fitted)| DensityRow { mass, probability, fitted })
            .collect();
        Self { rows }
    }
}

#[derive(Debug)]
pub struct ResultsFileHandler;

impl ResultsFileHandler {
    pub fn new() -> Self {
        Self
    }
}

impl FileHandler<RunResults> for ResultsFileHandler {
    fn load(&self, path: &Path) -> Result<RunResults> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file: {}", path.display()))?;
        ron::from_str(&content).context("Failed to parse results file")
    }

    fn save(&self, data: &RunResults, path: &Path) -> Result<()> {
        let content = ron::ser::to_string_pretty(
            data,
            ron::ser::PrettyConfig::new()
                .new_line("\n".to_string())
                .depth_limit(4)
                .separate_tuple_members(true)
        )?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct DensityFileHandler;

impl DensityFileHandler {
    pub fn new() -> Self {
        Self
    }
}

impl FileHandler<DensityTable> for DensityFileHandler {
    fn load(&self, path: &Path) -> Result<DensityTable> {
        let mut reader = Reader::from_path(path)
            .with_context(|| format!("Failed to open density file: {}", path.display()))?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<DensityRow>, _>>()
            .context("Failed to parse density file")?;
        Ok(DensityTable { rows })
    }

    fn save(&self, data: &DensityTable, path: &Path) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        for row in &data.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SavedRun {
    pub results_path: PathBuf,
    pub density_path: PathBuf,
}

#[derive(Debug)]
pub struct ResultsFileManager {
    base_path: PathBuf,
    results_handler: ResultsFileHandler,
    density_handler: DensityFileHandler,
}

impl ResultsFileManager {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            base_path: output_dir.to_path_buf(),
            results_handler: ResultsFileHandler::new(),
            density_handler: DensityFileHandler::new(),
        }
    }

    /// Write `results_<timestamp>.ron` and `density_<timestamp>.csv` into the output directory.
    pub fn save_run(&self, results: &RunResults, selection: &Selection) -> Result<SavedRun> {
        fs::create_dir_all(&self.base_path)
            .with_context(|| {
                format!("Failed to create output directory: {}", self.base_path.display())
            })?;

        let timestamp_str = results.timestamp.format("%Y%m%d_%H%M%S").to_string();
        let short_id = results.run_id.split('-').next().unwrap_or("run");

        let density_name = format!("density_{}_{}.csv", timestamp_str, short_id);
        let density_path = self.base_path.join(&density_name);
        self.density_handler
            .save(&DensityTable::from_selection(selection), &density_path)
            .with_context(|| format!("Failed to write density file: {}", density_path.display()))?;

        let mut results = results.clone();
        results.density_file = Some(density_name);

        let results_path = self
            .base_path
            .join(format!("results_{}_{}.ron", timestamp_str, short_id));
        self.results_handler
            .save(&results, &results_path)
            .with_context(|| format!("Failed to write results file: {}", results_path.display()))?;

        Ok(SavedRun {
            results_path,
            density_path,
        })
    }

    /// Load a results file together with the density table it points to.
    pub fn load_run(&self, results_path: &Path) -> Result<(RunResults, DensityTable)> {
        if !results_path.exists() {
            return Err(anyhow!("Results file not found: {}", results_path.display()));
        }
        let results = self.results_handler.load(results_path)?;

        let density_name = results.density_file.as_ref().ok_or_else(|| {
            anyhow!("Results file has no density table: {}", results_path.display())
        })?;
        let density_dir = results_path.parent().unwrap_or(&self.base_path);
        let density = self.density_handler.load(&density_dir.join(density_name))?;

        Ok((results, density))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::density::EmpiricalDensity;
    use crate::analysis::fitting::{FitError, FitModel};
    use crate::analysis::selection::ModelFailure;

    fn sample_selection() -> Selection {
        let best = FitResult {
            model: FitModel::Exponential,
            params: vec![0.5, 2.0],
            rss: 1e-4,
            aic: -40.0,
            iterations: 12,
        };
        Selection {
            best: best.clone(),
            candidates: vec![best],
            failures: vec![ModelFailure {
                model: FitModel::LogNormal,
                error: FitError::NonFinite,
            }],
            density: EmpiricalDensity {
                values: vec![0.0, 0.5, 1.0],
                probabilities: vec![0.5, 0.3, 0.2],
                sample_count: 10,
            },
        }
    }

    #[test]
    fn test_save_and_load_run() {
        let dir = std::env::temp_dir().join(format!("massmerge-results-{}", Uuid::new_v4()));
        let manager = ResultsFileManager::new(&dir);
        let selection = sample_selection();
        let params = DistributionParams::new_uniform(1.0, 1000, 10, 3);
        let pooled = PooledSummary::from_masses(&[1.0, 2.0, 3.0]);
        let results = RunResults::new(&params, 42, 1e-5, pooled, &selection);

        let saved = manager.save_run(&results, &selection).unwrap();
        assert!(saved.results_path.exists());
        assert!(saved.density_path.exists());

        let (loaded, density) = manager.load_run(&saved.results_path).unwrap();
        assert_eq!(loaded.run_id, results.run_id);
        assert_eq!(loaded.best_model, "exponential");
        assert_eq!(loaded.best_params, vec![0.5, 2.0]);
        assert_eq!(loaded.params, params);
        assert_eq!(loaded.failures[0].model, "lognormal");
        assert_eq!(density.rows.len(), 3);
        assert_eq!(density.rows[1].mass, 0.5);
        assert_eq!(density.rows[1].probability, 0.3);
        assert!((density.rows[0].fitted - 0.5).abs() < 1e-12);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_results_file() {
        let manager = ResultsFileManager::new(&std::env::temp_dir());
        let missing =
            std::env::temp_dir().join(format!("massmerge-missing-{}.ron", Uuid::new_v4()));
        assert!(manager.load_run(&missing).is_err());
    }
}
