// src/analysis/sampler.rs
use rand::Rng;
use rand_distr::{Distribution, LogNormal};

use crate::config::{DistributionParams, MassModel};
use crate::error::{Error, Result};

/// Draw the initial population of `params.n` masses.
///
/// Power-law and log-normal draws are always min-max rescaled into
/// `[params.m1, params.m2]`; the uniform model returns `n` copies of `m0`.
pub fn sample<R: Rng + ?Sized>(params: &DistributionParams, rng: &mut R) -> Result<Vec<f64>> {
    let masses = match params.model {
        MassModel::Uniform => sample_uniform(params.m0, params.n),
        MassModel::PowerLaw => {
            let mut masses = sample_power_law(params.beta, params.n, rng)?;
            rescale_into(&mut masses, params.model, params.m1, params.m2)?;
            masses
        }
        MassModel::LogNormal => {
            let mut masses = sample_lognormal(params.x0, params.sigma, params.n, rng)?;
            rescale_into(&mut masses, params.model, params.m1, params.m2)?;
            masses
        }
    };

    if let Some(bad) = masses.iter().find(|m| !m.is_finite()) {
        return Err(Error::sampling(params.model, format!("produced non-finite mass {}", bad)));
    }
    Ok(masses)
}

pub fn sample_uniform(m0: f64, n: usize) -> Vec<f64> {
    vec![m0; n]
}

/// Inverse-transform sampling of p(x) ∝ x^(-β) on [1, ∞):
/// `x = (1 - U)^(1 / (1 - β))`.
pub fn sample_power_law<R: Rng + ?Sized>(beta: f64, n: usize, rng: &mut R) -> Result<Vec<f64>> {
    if !beta.is_finite() || (beta - 1.0).abs() < f64::EPSILON {
        return Err(Error::sampling(
            MassModel::PowerLaw,
            format!("exponent beta = {} makes the inverse CDF undefined", beta),
        ));
    }

    let exponent = 1.0 / (1.0 - beta);
    Ok((0..n)
        .map(|_| {
            let u: f64 = rng.gen();
            (1.0 - u).powf(exponent)
        })
        .collect())
}

/// `x0` and `sigma` parameterize the underlying normal: ln(X) ~ N(x0, sigma²).
pub fn sample_lognormal<R: Rng + ?Sized>(
    x0: f64,
    sigma: f64,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if !x0.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::sampling(
            MassModel::LogNormal,
            format!("x0 = {} and sigma = {} do not define a log-normal", x0, sigma),
        ));
    }
    let lognormal = LogNormal::new(x0, sigma)
        .map_err(|e| Error::sampling(MassModel::LogNormal, e.to_string()))?;

    Ok(lognormal.sample_iter(rng).take(n).collect())
}

/// Min-max normalize `masses` and map them onto `[low, high]`.
/// A degenerate range (all masses equal) maps every mass to `low`.
pub fn rescale_into(masses: &mut [f64], model: MassModel, low: f64, high: f64) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || high < low {
        return Err(Error::sampling(
            model,
            format!("rescale bounds [{}, {}] are not a valid interval", low, high),
        ));
    }

    let min = masses.iter().copied().fold(f64::INFINITY, f64::min);
    let max = masses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !range.is_finite() || range <= 0.0 {
        masses.iter_mut().for_each(|m| *m = low);
        return Ok(());
    }

    for mass in masses.iter_mut() {
        *mass = low + (high - low) * (*mass - min) / range;
    }
    Ok(())
}
