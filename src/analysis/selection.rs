// src/analysis/selection.rs
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::density::EmpiricalDensity;
use super::fitting::{FitError, FitModel, LevenbergMarquardt};
use crate::error::{Error, Result};

/// Probabilities smaller than this get zero weight in the fit.
pub const NEGLIGIBLE_PROBABILITY: f64 = 1e-20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitResult {
    pub model: FitModel,
    pub params: Vec<f64>,
    pub rss: f64,
    pub aic: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model: FitModel,
    pub error: FitError,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub best: FitResult,
    /// Every candidate that fitted, in candidate order.
    pub candidates: Vec<FitResult>,
    pub failures: Vec<ModelFailure>,
    pub density: EmpiricalDensity,
}

impl Selection {
    pub fn fitted_curve(&self) -> Vec<f64> {
        self.density
            .values
            .iter()
            .map(|&x| self.best.model.evaluate(x, &self.best.params))
            .collect()
    }
}

pub fn calculate_aic(n: usize, rss: f64, num_params: usize) -> f64 {
    2.0 * num_params as f64 + n as f64 * (rss / n as f64).ln()
}

/// Unit weight for every point except near-zero probabilities, which are
/// treated as having infinite uncertainty.
pub fn fit_weights(probabilities: &[f64]) -> Vec<f64> {
    probabilities
        .iter()
        .map(|p| if p.abs() < NEGLIGIBLE_PROBABILITY { 0.0 } else { 1.0 })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    models: Vec<FitModel>,
    solver: LevenbergMarquardt,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(FitModel::ALL.to_vec())
    }
}

impl ModelSelector {
    pub fn new(models: Vec<FitModel>) -> Self {
        Self {
            models,
            solver: LevenbergMarquardt::default(),
        }
    }

    pub fn fit_model(
        &self,
        model: FitModel,
        density: &EmpiricalDensity,
    ) -> std::result::Result<FitResult, FitError> {
        let weights = fit_weights(&density.probabilities);
        let guess = model.initial_guess(density);
        let fit = self.solver.fit_with_gradient(
            |x, p| model.evaluate(x, p),
            |x, p| model.gradient(x, p),
            &density.values,
            &density.probabilities,
            &weights,
            &guess,
        )?;

        let rss: f64 = density
            .points()
            .map(|(x, y)| (y - model.evaluate(x, &fit.params)).powi(2))
            .sum();
        let aic = calculate_aic(density.len(), rss, model.param_count());
        if aic.is_nan() {
            return Err(FitError::NonFinite);
        }

        Ok(FitResult {
            model,
            params: fit.params,
            rss,
            aic,
            iterations: fit.iterations,
        })
    }

    /// Fit every candidate and keep the one with the lowest AIC.
    ///
    /// Candidates are fitted in parallel but compared in candidate order with
    /// a strict `<`, so the earlier model wins a tie. Failed fits are logged
    /// and excluded; if none succeed the selection fails.
    pub fn select(&self, density: EmpiricalDensity) -> Result<Selection> {
        let outcomes: Vec<(FitModel, std::result::Result<FitResult, FitError>)> = self
            .models
            .par_iter()
            .map(|&model| (model, self.fit_model(model, &density)))
            .collect();

        let mut best: Option<FitResult> = None;
        let mut candidates = Vec::new();
        let mut failures = Vec::new();

        for (model, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    info!(model = %model, aic = result.aic, rss = result.rss, "model fitted");
                    if best.as_ref().map_or(true, |b| result.aic < b.aic) {
                        best = Some(result.clone());
                    }
                    candidates.push(result);
                }
                Err(error) => {
                    warn!(model = %model, %error, "fitting was not successful, excluding model");
                    failures.push(ModelFailure { model, error });
                }
            }
        }

        match best {
            Some(best) => Ok(Selection {
                best,
                candidates,
                failures,
                density,
            }),
            None => Err(Error::SelectionExhausted { failures }),
        }
    }
}
