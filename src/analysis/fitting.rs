// src/analysis/fitting.rs
use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::density::EmpiricalDensity;

/// Closed-form density models the selector can fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FitModel {
    Normal,
    LogNormal,
    Exponential,
}

impl FitModel {
    pub const ALL: [FitModel; 3] = [FitModel::Normal, FitModel::LogNormal, FitModel::Exponential];

    pub fn name(&self) -> &'static str {
        match self {
            FitModel::Normal => "normal",
            FitModel::LogNormal => "lognormal",
            FitModel::Exponential => "exponential",
        }
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            FitModel::Normal | FitModel::LogNormal => &["mu", "sigma"],
            FitModel::Exponential => &["a", "b"],
        }
    }

    pub fn param_count(&self) -> usize {
        self.param_names().len()
    }

    pub fn default_guess(&self) -> Vec<f64> {
        match self {
            FitModel::Normal | FitModel::LogNormal => vec![0.0, 1.0],
            FitModel::Exponential => vec![1.0, 1.0],
        }
    }

    /// Starting point derived from the density's moments, falling back to
    /// [`FitModel::default_guess`] when the moments are unusable.
    pub fn initial_guess(&self, density: &EmpiricalDensity) -> Vec<f64> {
        if density.is_empty() {
            return self.default_guess();
        }

        let guess = match self {
            FitModel::Normal => {
                let (mean, std_dev) = density.moments();
                vec![mean, std_dev]
            }
            FitModel::LogNormal => {
                if density.values.iter().any(|&x| x <= 0.0) {
                    return self.default_guess();
                }
                let logs = EmpiricalDensity {
                    values: density.values.iter().map(|x| x.ln()).collect(),
                    probabilities: density.probabilities.clone(),
                    sample_count: density.sample_count,
                };
                let (mean, std_dev) = logs.moments();
                vec![mean, std_dev]
            }
            FitModel::Exponential => {
                let (mean, _) = density.moments();
                let rate = 1.0 / mean;
                let (x0, y0) = (density.values[0], density.probabilities[0]);
                vec![y0 * (rate * x0).exp(), rate]
            }
        };

        let usable = guess.iter().all(|g| g.is_finite()) && guess[1] > 0.0;
        if usable {
            guess
        } else {
            self.default_guess()
        }
    }

    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            FitModel::Normal => {
                let (mu, sigma) = (params[0], params[1]);
                (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * PI).sqrt())
            }
            FitModel::LogNormal => {
                let (mu, sigma) = (params[0], params[1]);
                let z = (x.ln() - mu) / sigma;
                (-z * z / 2.0).exp() / (x * sigma * (2.0 * PI).sqrt())
            }
            FitModel::Exponential => {
                let (a, b) = (params[0], params[1]);
                a * (-b * x).exp()
            }
        }
    }

    /// Partial derivatives of [`FitModel::evaluate`] with respect to each parameter.
    pub fn gradient(&self, x: f64, params: &[f64]) -> Vec<f64> {
        match self {
            FitModel::Normal | FitModel::LogNormal => {
                let (mu, sigma) = (params[0], params[1]);
                let z = match self {
                    FitModel::LogNormal => (x.ln() - mu) / sigma,
                    _ => (x - mu) / sigma,
                };
                let value = self.evaluate(x, params);
                vec![value * z / sigma, value * (z * z - 1.0) / sigma]
            }
            FitModel::Exponential => {
                let (a, b) = (params[0], params[1]);
                let decay = (-b * x).exp();
                vec![decay, -a * x * decay]
            }
        }
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("{points} data points cannot determine {params} free parameters")]
    InsufficientPoints { points: usize, params: usize },

    #[error("normal equations are singular")]
    Singular,

    #[error("did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("model evaluated to a non-finite value")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresFit {
    pub params: Vec<f64>,
    /// Weighted sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
}

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;
const MIN_DIAGONAL: f64 = 1e-12;
const GRADIENT_TOLERANCE: f64 = 1e-15;

/// Levenberg-Marquardt solver for weighted curve fitting with a
/// forward-difference Jacobian.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative reduction of the cost below which the fit is converged.
    pub ftol: f64,
    /// Relative step size below which the fit is converged.
    pub xtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 600,
            ftol: 1.49e-8,
            xtol: 1.49e-8,
        }
    }
}

impl LevenbergMarquardt {
    /// Minimize `Σ wᵢ (yᵢ - f(xᵢ, p))²` starting from `initial`, with a
    /// forward-difference Jacobian.
    pub fn fit<F>(
        &self,
        f: F,
        x: &[f64],
        y: &[f64],
        weights: &[f64],
        initial: &[f64],
    ) -> Result<LeastSquaresFit, FitError>
    where
        F: Fn(f64, &[f64]) -> f64,
    {
        self.fit_with_gradient(&f, |xi, p| forward_difference(&f, xi, p), x, y, weights, initial)
    }

    /// Same objective as [`LevenbergMarquardt::fit`], with the parameter
    /// gradient of `f` supplied by the caller.
    ///
    /// Points with zero weight contribute nothing to the objective but stay
    /// in the data set. A rank-deficient Jacobian with a non-zero residual
    /// fails with [`FitError::Singular`].
    pub fn fit_with_gradient<F, G>(
        &self,
        f: F,
        gradient: G,
        x: &[f64],
        y: &[f64],
        weights: &[f64],
        initial: &[f64],
    ) -> Result<LeastSquaresFit, FitError>
    where
        F: Fn(f64, &[f64]) -> f64,
        G: Fn(f64, &[f64]) -> Vec<f64>,
    {
        debug_assert_eq!(x.len(), y.len());
        debug_assert_eq!(x.len(), weights.len());

        let k = initial.len();
        let effective_points = weights.iter().filter(|&&w| w > 0.0).count();
        if effective_points < k || k == 0 {
            return Err(FitError::InsufficientPoints { points: effective_points, params: k });
        }

        let scale: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();
        let residuals_at = |params: &[f64]| -> Option<DVector<f64>> {
            let mut r = DVector::zeros(x.len());
            for i in 0..x.len() {
                if scale[i] == 0.0 {
                    continue;
                }
                let value = scale[i] * (y[i] - f(x[i], params));
                if !value.is_finite() {
                    return None;
                }
                r[i] = value;
            }
            Some(r)
        };
        let jacobian_at = |params: &[f64]| -> Option<DMatrix<f64>> {
            let mut jacobian = DMatrix::zeros(x.len(), k);
            for i in 0..x.len() {
                if scale[i] == 0.0 {
                    continue;
                }
                for (j, slope) in gradient(x[i], params).into_iter().enumerate().take(k) {
                    if !slope.is_finite() {
                        return None;
                    }
                    jacobian[(i, j)] = scale[i] * slope;
                }
            }
            Some(jacobian)
        };

        let mut params = DVector::from_column_slice(initial);
        let mut residuals = residuals_at(params.as_slice()).ok_or(FitError::NonFinite)?;
        let mut cost = residuals.norm_squared();
        let mut jacobian = jacobian_at(params.as_slice()).ok_or(FitError::NonFinite)?;
        let mut damping = INITIAL_DAMPING;
        let mut iterations = 0;

        let finished = |params: &DVector<f64>, cost: f64, iterations: usize| LeastSquaresFit {
            params: params.iter().copied().collect(),
            cost,
            iterations,
        };

        'outer: while iterations < self.max_iterations {
            if cost == 0.0 {
                return Ok(finished(&params, cost, iterations));
            }
            if is_rank_deficient(&jacobian) {
                return Err(FitError::Singular);
            }

            let normal = jacobian.transpose() * &jacobian;
            let gradient = jacobian.transpose() * &residuals;
            if gradient.amax() <= GRADIENT_TOLERANCE {
                return Ok(finished(&params, cost, iterations));
            }

            loop {
                if iterations >= self.max_iterations {
                    break 'outer;
                }
                iterations += 1;

                let mut damped = normal.clone();
                for d in 0..k {
                    damped[(d, d)] += damping * normal[(d, d)].max(MIN_DIAGONAL);
                }
                let step = match damped.cholesky() {
                    Some(cholesky) => cholesky.solve(&gradient),
                    None => {
                        damping *= 10.0;
                        if damping > MAX_DAMPING {
                            return Err(FitError::Singular);
                        }
                        continue;
                    }
                };

                let candidate = &params + &step;
                let step_small = step.norm() <= self.xtol * (params.norm() + self.xtol);

                if let Some(candidate_residuals) = residuals_at(candidate.as_slice()) {
                    let candidate_cost = candidate_residuals.norm_squared();
                    if candidate_cost < cost {
                        let actual = cost - candidate_cost;
                        let predicted = 2.0 * step.dot(&gradient) - step.dot(&(&normal * &step));
                        let reduction_small =
                            actual <= self.ftol * cost && predicted.abs() <= self.ftol * cost;

                        params = candidate;
                        residuals = candidate_residuals;
                        cost = candidate_cost;
                        damping = (damping / 10.0).max(MIN_DAMPING);

                        if step_small || reduction_small {
                            return Ok(finished(&params, cost, iterations));
                        }
                        jacobian = jacobian_at(params.as_slice()).ok_or(FitError::NonFinite)?;
                        continue 'outer;
                    }
                }

                // Rejected step: a vanishing step means we are already at the minimum
                if step_small {
                    return Ok(finished(&params, cost, iterations));
                }
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break 'outer;
                }
            }
        }

        Err(FitError::NotConverged { iterations })
    }
}

fn forward_difference<F>(f: &F, x: f64, params: &[f64]) -> Vec<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let base = f(x, params);
    let mut shifted = params.to_vec();
    (0..params.len())
        .map(|j| {
            let h = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
            shifted[j] = params[j] + h;
            let slope = (f(x, &shifted) - base) / h;
            shifted[j] = params[j];
            slope
        })
        .collect()
}

// Numerical rank test with the usual `max(m, n) * eps` cutoff on the singular values.
fn is_rank_deficient(jacobian: &DMatrix<f64>) -> bool {
    let singular_values = jacobian.singular_values();
    let largest = singular_values.max();
    let cutoff = largest * jacobian.nrows().max(jacobian.ncols()) as f64 * f64::EPSILON;
    largest == 0.0 || singular_values.min() <= cutoff
}
