pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
use crate::domain::model::{FitOptions, ModelKind, ParamBounds, Utility};
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty, validate_ordered, validate_output_formats, validate_path,
    validate_positive_number, validate_range, Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "choice-fit"))]
#[cfg_attr(
    feature = "cli",
    command(about = "Fit reinforcement-learning choice models to two-option task data")
)]
pub struct CliConfig {
    /// Trial-level CSV: participant, block, opt1_rewarded, mag_opt1, mag_opt2, choice1
    #[cfg_attr(feature = "cli", arg(long))]
    pub input: String,

    #[cfg_attr(feature = "cli", arg(long, default_value = "./output"))]
    pub output_path: String,

    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = ModelKind::SameAlpha))]
    pub model: ModelKind,

    /// Number of random starting points per participant
    #[cfg_attr(feature = "cli", arg(long, default_value = "10"))]
    pub n_inits: usize,

    #[cfg_attr(feature = "cli", arg(long, default_value = "100"))]
    pub max_iter: usize,

    #[cfg_attr(feature = "cli", arg(long, default_value = "0.001"))]
    pub tol: f64,

    #[cfg_attr(feature = "cli", arg(long, default_value = "0.5"))]
    pub starting_prob: f64,

    #[cfg_attr(feature = "cli", arg(long, default_value = "0"))]
    pub alpha_min: f64,

    #[cfg_attr(feature = "cli", arg(long, default_value = "1"))]
    pub alpha_max: f64,

    #[cfg_attr(feature = "cli", arg(long, default_value = "0"))]
    pub beta_min: f64,

    #[cfg_attr(feature = "cli", arg(long, default_value = "1"))]
    pub beta_max: f64,

    /// Use the additive utility with this magnitude weight instead of expected value
    #[cfg_attr(feature = "cli", arg(long))]
    pub omega: Option<f64>,

    /// Participants fitted concurrently
    #[cfg_attr(feature = "cli", arg(long, default_value = "4"))]
    pub workers: usize,

    #[cfg_attr(feature = "cli", arg(long, value_delimiter = ',', default_value = "csv"))]
    pub output_formats: Vec<String>,

    /// Also pack every output file into a zip archive
    #[cfg_attr(feature = "cli", arg(long))]
    pub bundle: bool,

    #[cfg_attr(feature = "cli", arg(long, help = "Enable verbose output"))]
    pub verbose: bool,

    #[cfg_attr(feature = "cli", arg(long, help = "Log CPU and memory usage per phase"))]
    pub monitor: bool,
}

impl CliConfig {
    /// Config with the same defaults as the command line, for a given input file.
    pub fn with_input(input: impl Into<String>, output_path: impl Into<String>) -> Self {
        let defaults = FitOptions::default();
        Self {
            input: input.into(),
            output_path: output_path.into(),
            model: ModelKind::SameAlpha,
            n_inits: defaults.n_inits,
            max_iter: defaults.max_iter,
            tol: defaults.tol,
            starting_prob: defaults.starting_prob,
            alpha_min: defaults.bounds.alpha_min,
            alpha_max: defaults.bounds.alpha_max,
            beta_min: defaults.bounds.beta_min,
            beta_max: defaults.bounds.beta_max,
            omega: None,
            workers: 4,
            output_formats: vec!["csv".to_string()],
            bundle: false,
            verbose: false,
            monitor: false,
        }
    }
}

pub fn utility_from_omega(omega: Option<f64>) -> Utility {
    match omega {
        Some(omega) => Utility::Additive { omega },
        None => Utility::ExpectedValue,
    }
}

/// Checks that fit options describe a well-posed optimization problem.
pub fn validate_fit_options(prefix: &str, options: &FitOptions) -> Result<()> {
    let field = |name: &str| format!("{}{}", prefix, name);

    validate_positive_number(&field("n_inits"), options.n_inits, 1)?;
    validate_positive_number(&field("max_iter"), options.max_iter, 1)?;
    validate_positive_number(&field("history"), options.history, 1)?;
    validate_range(&field("tol"), options.tol, 0.0, f64::MAX)?;
    validate_range(&field("starting_prob"), options.starting_prob, 0.0, 1.0)?;

    let b = options.bounds;
    validate_ordered(&field("alpha"), b.alpha_min, b.alpha_max)?;
    validate_ordered(&field("beta"), b.beta_min, b.beta_max)?;
    validate_range(&field("alpha_min"), b.alpha_min, 0.0, 1.0)?;
    validate_range(&field("alpha_max"), b.alpha_max, 0.0, 1.0)?;
    validate_range(&field("beta_min"), b.beta_min, 0.0, f64::MAX)?;

    if let Some(omega) = options.utility.omega() {
        validate_range(&field("omega"), omega, 0.0, 1.0)?;
    }
    Ok(())
}

impl ConfigProvider for CliConfig {
    fn input_path(&self) -> &str {
        &self.input
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn model_kind(&self) -> ModelKind {
        self.model
    }

    fn fit_options(&self) -> FitOptions {
        FitOptions {
            starting_prob: self.starting_prob,
            bounds: ParamBounds {
                alpha_min: self.alpha_min,
                alpha_max: self.alpha_max,
                beta_min: self.beta_min,
                beta_max: self.beta_max,
            },
            utility: utility_from_omega(self.omega),
            max_iter: self.max_iter,
            tol: self.tol,
            n_inits: self.n_inits,
            ..FitOptions::default()
        }
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn output_formats(&self) -> &[String] {
        &self.output_formats
    }

    fn bundle(&self) -> bool {
        self.bundle
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("input", &self.input)?;
        validate_path("output_path", &self.output_path)?;
        validate_positive_number("workers", self.workers, 1)?;
        validate_non_empty("output_formats", &self.output_formats)?;
        validate_output_formats("output_formats", &self.output_formats)?;
        validate_fit_options("", &self.fit_options())
    }
}
