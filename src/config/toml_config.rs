use crate::config::{utility_from_omega, validate_fit_options};
use crate::core::schedule::{stable_probabilities, volatile_probabilities};
use crate::domain::model::{FitOptions, ParamBounds};
use crate::utils::error::{FitError, Result};
use crate::utils::validation::{
    validate_non_empty, validate_output_formats, validate_path, validate_positive_number,
    validate_range, validate_required_field, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub study: StudyConfig,
    pub schedule: ScheduleConfig,
    pub volatile_schedule: Option<ScheduleConfig>,
    pub grid: Option<GridConfig>,
    pub difference: Option<DifferenceConfig>,
    #[serde(default)]
    pub fit: FitSection,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyKind {
    /// Every (alpha, beta) pair of a grid, fitted with one learning rate
    Grid,
    /// Per-subject stable and volatile learning rates, fitted with two
    Difference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    pub name: String,
    pub description: Option<String>,
    pub kind: StudyKind,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Stable,
    Volatile,
    Explicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub kind: ScheduleKind,
    pub n_trials: Option<usize>,
    pub probability: Option<f64>,
    pub block_length: Option<usize>,
    pub probabilities: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub alphas: Vec<f64>,
    pub betas: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceConfig {
    pub stable_alphas: Vec<f64>,
    pub volatile_alphas: Vec<f64>,
    pub betas: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitSection {
    pub n_inits: Option<usize>,
    pub max_iter: Option<usize>,
    pub tol: Option<f64>,
    pub starting_prob: Option<f64>,
    pub alpha_min: Option<f64>,
    pub alpha_max: Option<f64>,
    pub beta_min: Option<f64>,
    pub beta_max: Option<f64>,
    pub omega: Option<f64>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub bundle: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl ScheduleConfig {
    /// 依設定產生每個試次的真實獎勵機率
    pub fn probabilities(&self, section: &str) -> Result<Vec<f64>> {
        let probs = match self.kind {
            ScheduleKind::Explicit => {
                let field = format!("{}.probabilities", section);
                validate_required_field(&field, &self.probabilities)?.clone()
            }
            ScheduleKind::Stable => {
                let n = *validate_required_field(&format!("{}.n_trials", section), &self.n_trials)?;
                let probability = format!("{}.probability", section);
                let p = *validate_required_field(&probability, &self.probability)?;
                stable_probabilities(n, p)
            }
            ScheduleKind::Volatile => {
                let n = *validate_required_field(&format!("{}.n_trials", section), &self.n_trials)?;
                let probability = format!("{}.probability", section);
                let p = *validate_required_field(&probability, &self.probability)?;
                let block_length = *validate_required_field(
                    &format!("{}.block_length", section),
                    &self.block_length,
                )?;
                validate_positive_number(&format!("{}.block_length", section), block_length, 1)?;
                volatile_probabilities(n, p, block_length)
            }
        };

        validate_non_empty(&format!("{}.probabilities", section), &probs)?;
        for &p in &probs {
            validate_range(&format!("{}.probability", section), p, 0.0, 1.0)?;
        }
        Ok(probs)
    }
}

impl RecoveryConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let config = toml::from_str(&processed_content)?;
        Ok(config)
    }

    /// 替換環境變數 (例如 ${OUTPUT_DIR})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FitError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn fit_options(&self) -> FitOptions {
        let defaults = FitOptions::default();
        let fit = &self.fit;
        FitOptions {
            starting_prob: fit.starting_prob.unwrap_or(defaults.starting_prob),
            bounds: ParamBounds {
                alpha_min: fit.alpha_min.unwrap_or(defaults.bounds.alpha_min),
                alpha_max: fit.alpha_max.unwrap_or(defaults.bounds.alpha_max),
                beta_min: fit.beta_min.unwrap_or(defaults.bounds.beta_min),
                beta_max: fit.beta_max.unwrap_or(defaults.bounds.beta_max),
            },
            utility: utility_from_omega(fit.omega),
            max_iter: fit.max_iter.unwrap_or(defaults.max_iter),
            tol: fit.tol.unwrap_or(defaults.tol),
            n_inits: fit.n_inits.unwrap_or(defaults.n_inits),
            history: defaults.history,
        }
    }

    pub fn workers(&self) -> usize {
        self.fit.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }

    pub fn bundle(&self) -> bool {
        self.load.bundle.unwrap_or(false)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// Number of artificial participants the study will simulate.
    pub fn n_subjects(&self) -> usize {
        match self.study.kind {
            StudyKind::Grid => self
                .grid
                .as_ref()
                .map(|g| g.alphas.len() * g.betas.len())
                .unwrap_or(0),
            StudyKind::Difference => self.difference.as_ref().map(|d| d.betas.len()).unwrap_or(0),
        }
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_path("load.output_path", &self.load.output_path)?;
        validate_output_formats("load.output_formats", &self.load.output_formats)?;
        validate_positive_number("fit.workers", self.workers(), 1)?;
        validate_fit_options("fit.", &self.fit_options())?;

        self.schedule.probabilities("schedule")?;

        match self.study.kind {
            StudyKind::Grid => {
                let grid = validate_required_field("grid", &self.grid)?;
                validate_non_empty("grid.alphas", &grid.alphas)?;
                validate_non_empty("grid.betas", &grid.betas)?;
                for &alpha in &grid.alphas {
                    validate_range("grid.alphas", alpha, 0.0, 1.0)?;
                }
                for &beta in &grid.betas {
                    validate_range("grid.betas", beta, 0.0, f64::MAX)?;
                }
            }
            StudyKind::Difference => {
                let diff = validate_required_field("difference", &self.difference)?;
                validate_non_empty("difference.betas", &diff.betas)?;
                if diff.stable_alphas.len() != diff.betas.len()
                    || diff.volatile_alphas.len() != diff.betas.len()
                {
                    return Err(FitError::ConfigValidationError {
                        field: "difference".to_string(),
                        message:
                            "stable_alphas, volatile_alphas and betas must have the same length"
                                .to_string(),
                    });
                }
                for &alpha in diff.stable_alphas.iter().chain(&diff.volatile_alphas) {
                    validate_range("difference.alphas", alpha, 0.0, 1.0)?;
                }
                let volatile =
                    validate_required_field("volatile_schedule", &self.volatile_schedule)?;
                volatile.probabilities("volatile_schedule")?;
            }
        }

        Ok(())
    }
}

impl Validate for RecoveryConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
