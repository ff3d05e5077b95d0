// src/config/params.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mass distribution the initial population is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MassModel {
    Uniform,
    PowerLaw,
    LogNormal,
}

impl MassModel {
    pub const ALL: [MassModel; 3] = [MassModel::Uniform, MassModel::PowerLaw, MassModel::LogNormal];

    pub fn key(&self) -> &'static str {
        match self {
            MassModel::Uniform => "uniform",
            MassModel::PowerLaw => "power-law",
            MassModel::LogNormal => "log-normal",
        }
    }

    /// Accepts the short input-file keys (A, B, C) as well as the long names.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "a" | "uniform" => Some(MassModel::Uniform),
            "b" | "power-law" | "powerlaw" | "power_law" => Some(MassModel::PowerLaw),
            "c" | "log-normal" | "lognormal" | "log_normal" => Some(MassModel::LogNormal),
            _ => None,
        }
    }
}

impl Default for MassModel {
    fn default() -> Self {
        MassModel::Uniform
    }
}

impl fmt::Display for MassModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionParams {
    pub model: MassModel,
    pub m0: f64,    // Used for Uniform
    pub m1: f64,    // Lower rescale bound for PowerLaw, LogNormal
    pub m2: f64,    // Upper rescale bound for PowerLaw, LogNormal
    pub beta: f64,  // Used for PowerLaw
    pub x0: f64,    // Mean of the underlying normal for LogNormal
    pub sigma: f64, // Std dev of the underlying normal for LogNormal
    pub n: usize,
    pub l: usize,
    pub monte_carlo_experiments_number: usize,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            model: MassModel::Uniform,
            m0: 1.0,
            m1: 0.1,
            m2: 10.0,
            beta: 2.35,
            x0: 0.0,
            sigma: 1.0,
            n: 1000,
            l: 10,
            monte_carlo_experiments_number: 10000,
        }
    }
}

impl DistributionParams {
    pub fn new_uniform(m0: f64, n: usize, l: usize, trials: usize) -> Self {
        Self {
            model: MassModel::Uniform,
            m0,
            n,
            l,
            monte_carlo_experiments_number: trials,
            ..Default::default()
        }
    }

    pub fn new_power_law(m1: f64, m2: f64, beta: f64, n: usize, l: usize, trials: usize) -> Self {
        Self {
            model: MassModel::PowerLaw,
            m1,
            m2,
            beta,
            n,
            l,
            monte_carlo_experiments_number: trials,
            ..Default::default()
        }
    }

    pub fn new_lognormal(
        m1: f64,
        m2: f64,
        x0: f64,
        sigma: f64,
        n: usize,
        l: usize,
        trials: usize,
    ) -> Self {
        Self {
            model: MassModel::LogNormal,
            m1,
            m2,
            x0,
            sigma,
            n,
            l,
            monte_carlo_experiments_number: trials,
            ..Default::default()
        }
    }

    /// Population size left in each trial once all merges have run.
    pub fn survivors(&self) -> usize {
        self.n.saturating_sub(self.l).max(1)
    }

    /// Structural checks the core relies on, regardless of what the reader enforced.
    pub fn validate(&self) -> Result<()> {
        if self.n < 1 {
            return Err(Error::configuration("N", self.n, "population size must be at least 1"));
        }
        if self.l >= self.n {
            return Err(Error::configuration(
                "L",
                self.l,
                format!("merge count must be less than N = {}", self.n),
            ));
        }
        if self.monte_carlo_experiments_number < 1 {
            return Err(Error::configuration(
                "monte_carlo_experiments_number",
                self.monte_carlo_experiments_number,
                "at least one trial is required",
            ));
        }
        Ok(())
    }
}
