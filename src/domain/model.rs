use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::{FitError, Result};

/// Outcomes and choices of consecutive trials, stored column-wise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialBlock {
    pub opt1_rewarded: Vec<bool>,
    pub mag_opt1: Vec<f64>,
    pub mag_opt2: Vec<f64>,
    pub choice1: Vec<bool>,
}

impl TrialBlock {
    pub fn len(&self) -> usize {
        self.opt1_rewarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opt1_rewarded.is_empty()
    }

    pub fn push(&mut self, opt1_rewarded: bool, mag_opt1: f64, mag_opt2: f64, choice1: bool) {
        self.opt1_rewarded.push(opt1_rewarded);
        self.mag_opt1.push(mag_opt1);
        self.mag_opt2.push(mag_opt2);
        self.choice1.push(choice1);
    }

    /// 所有欄位長度必須一致，且至少有一個試次
    pub fn check(&self) -> Result<()> {
        let n = self.opt1_rewarded.len();
        if self.mag_opt1.len() != n || self.mag_opt2.len() != n || self.choice1.len() != n {
            return Err(FitError::ValidationError {
                message: format!(
                    "trial columns differ in length (rewarded={}, mag1={}, mag2={}, choice={})",
                    n,
                    self.mag_opt1.len(),
                    self.mag_opt2.len(),
                    self.choice1.len()
                ),
            });
        }
        if n == 0 {
            return Err(FitError::ValidationError {
                message: "block contains no trials".to_string(),
            });
        }
        if let Some(bad) = self
            .mag_opt1
            .iter()
            .chain(self.mag_opt2.iter())
            .find(|m| !m.is_finite())
        {
            return Err(FitError::ValidationError {
                message: format!("reward magnitude {} is not finite", bad),
            });
        }
        Ok(())
    }
}

/// The environment side of a block: what was rewarded and how much each option offered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialOutcomes {
    pub opt1_rewarded: Vec<bool>,
    pub mag_opt1: Vec<f64>,
    pub mag_opt2: Vec<f64>,
}

impl TrialOutcomes {
    pub fn len(&self) -> usize {
        self.opt1_rewarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opt1_rewarded.is_empty()
    }

    pub fn with_choices(self, choice1: Vec<bool>) -> TrialBlock {
        TrialBlock {
            opt1_rewarded: self.opt1_rewarded,
            mag_opt1: self.mag_opt1,
            mag_opt2: self.mag_opt2,
            choice1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskData {
    Single(TrialBlock),
    Split {
        stable: TrialBlock,
        volatile: TrialBlock,
    },
}

impl TaskData {
    pub fn model_kind(&self) -> ModelKind {
        match self {
            TaskData::Single(_) => ModelKind::SameAlpha,
            TaskData::Split { .. } => ModelKind::AlphaDifference,
        }
    }

    pub fn n_trials(&self) -> usize {
        match self {
            TaskData::Single(block) => block.len(),
            TaskData::Split { stable, volatile } => stable.len() + volatile.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub data: TaskData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ModelKind {
    /// One learning rate shared by every trial
    #[default]
    SameAlpha,
    /// Separate learning rates for the stable and volatile blocks
    AlphaDifference,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::SameAlpha => write!(f, "same-alpha"),
            ModelKind::AlphaDifference => write!(f, "alpha-difference"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum Params {
    SameAlpha {
        alpha: f64,
        beta: f64,
    },
    AlphaDifference {
        alpha_stable: f64,
        alpha_volatile: f64,
        beta: f64,
    },
}

impl Params {
    pub fn beta(&self) -> f64 {
        match self {
            Params::SameAlpha { beta, .. } | Params::AlphaDifference { beta, .. } => *beta,
        }
    }

    pub fn model_kind(&self) -> ModelKind {
        match self {
            Params::SameAlpha { .. } => ModelKind::SameAlpha,
            Params::AlphaDifference { .. } => ModelKind::AlphaDifference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub alpha_min: f64,
    pub alpha_max: f64,
    pub beta_min: f64,
    pub beta_max: f64,
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            alpha_min: 0.0,
            alpha_max: 1.0,
            beta_min: 0.0,
            beta_max: 1.0,
        }
    }
}

/// How reward magnitude and probability combine into the value of an option.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Utility {
    #[default]
    ExpectedValue,
    /// Weighted sum of magnitude (rescaled from 1..100 to 0..1) and probability.
    Additive { omega: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub starting_prob: f64,
    pub bounds: ParamBounds,
    pub utility: Utility,
    pub max_iter: usize,
    pub tol: f64,
    pub n_inits: usize,
    pub history: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            starting_prob: 0.5,
            bounds: ParamBounds::default(),
            utility: Utility::default(),
            max_iter: 100,
            tol: 1e-3,
            n_inits: 10,
            history: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    pub params: Params,
    pub loss: f64,
    pub iterations: usize,
    pub grad_norm: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantFit {
    pub participant: String,
    pub n_trials: usize,
    pub outcome: FitOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRow {
    pub simulated_alpha: f64,
    pub simulated_beta: f64,
    pub recovered_alpha: f64,
    pub recovered_beta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferenceRow {
    pub simulated_alpha_stable: f64,
    pub simulated_alpha_volatile: f64,
    pub simulated_beta: f64,
    pub alpha_stable: f64,
    pub alpha_volatile: f64,
    pub inverse_temperature: f64,
}

/// A rendered result table plus the structured records behind it.
#[derive(Debug, Clone, Default)]
pub struct TableOutput {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub records: serde_json::Value,
    pub summary: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: usize) -> TrialBlock {
        let mut block = TrialBlock::default();
        for t in 0..n {
            block.push(t % 2 == 0, 10.0, 20.0, t % 3 == 0);
        }
        block
    }

    #[test]
    fn test_trial_block_check() {
        assert!(block(5).check().is_ok());
        assert!(TrialBlock::default().check().is_err());

        let mut ragged = block(3);
        ragged.choice1.pop();
        assert!(ragged.check().is_err());

        let mut nan = block(3);
        nan.mag_opt2[1] = f64::NAN;
        assert!(nan.check().is_err());
    }

    #[test]
    fn test_task_data_kind_and_length() {
        let single = TaskData::Single(block(4));
        assert_eq!(single.model_kind(), ModelKind::SameAlpha);
        assert_eq!(single.n_trials(), 4);

        let split = TaskData::Split {
            stable: block(3),
            volatile: block(5),
        };
        assert_eq!(split.model_kind(), ModelKind::AlphaDifference);
        assert_eq!(split.n_trials(), 8);
    }

    #[test]
    fn test_params_serialize_with_model_tag() {
        let params = Params::SameAlpha {
            alpha: 0.3,
            beta: 0.2,
        };
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["model"], "same-alpha");
        assert_eq!(json["alpha"], 0.3);
    }
}
