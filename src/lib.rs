pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::pipelines::{FitPipeline, RecoveryPipeline};
pub use config::{cli::LocalStorage, toml_config::RecoveryConfig, CliConfig};
pub use core::engine::FitEngine;
pub use utils::error::{FitError, Result};
