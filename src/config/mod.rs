// src/config/mod.rs
pub mod params;
pub mod reader;

// Re-export commonly used types
pub use params::{DistributionParams, MassModel};
pub use reader::{read_run_config, RunConfig, DEFAULT_INPUT_FILE};
