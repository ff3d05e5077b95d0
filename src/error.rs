// src/error.rs
use crate::analysis::selection::ModelFailure;
use crate::config::MassModel;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Simulation parameters are out of range or inconsistent with each other.
    #[error("invalid configuration: {parameter} = {value} ({reason})")]
    Configuration {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    /// Distribution parameters that make the sampler produce undefined values.
    #[error("sampling failed for {model} model: {reason}")]
    Sampling { model: MassModel, reason: String },

    /// A pooled sample that cannot be turned into a density (NaN or infinite masses).
    #[error("invalid sample: mass at position {index} is {value}")]
    InvalidSample { index: usize, value: f64 },

    /// Every candidate model failed to fit.
    #[error("no candidate model could be fitted ({})", summarize(.failures))]
    SelectionExhausted { failures: Vec<ModelFailure> },
}

impl Error {
    pub fn configuration(
        parameter: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::Configuration {
            parameter,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn sampling(model: MassModel, reason: impl Into<String>) -> Self {
        Error::Sampling {
            model,
            reason: reason.into(),
        }
    }
}

fn summarize(failures: &[ModelFailure]) -> String {
    if failures.is_empty() {
        return "no candidates were given".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.model, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fitting::{FitError, FitModel};

    #[test]
    fn test_exhausted_message_names_every_model() {
        let err = Error::SelectionExhausted {
            failures: vec![
                ModelFailure { model: FitModel::Normal, error: FitError::Singular },
                ModelFailure {
                    model: FitModel::Exponential,
                    error: FitError::InsufficientPoints { points: 1, params: 2 },
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("normal: normal equations are singular"));
        assert!(message.contains("exponential: 1 data points"));
    }

    #[test]
    fn test_configuration_message() {
        let err = Error::configuration("L", 1000, "must be less than N = 1000");
        assert_eq!(
            err.to_string(),
            "invalid configuration: L = 1000 (must be less than N = 1000)"
        );
    }
}
