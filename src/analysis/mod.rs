// src/analysis/mod.rs
pub mod density;
pub mod fitting;
pub mod merge;
pub mod monte_carlo;
pub mod sampler;
pub mod selection;

// Re-export commonly used types
pub use monte_carlo::PooledSummary;
pub use selection::{FitResult, ModelSelector, Selection};
