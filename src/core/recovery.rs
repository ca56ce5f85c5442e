//! Parameter recovery: simulate artificial participants with known parameters,
//! fit them, and compare what comes back with what went in.

use rand::Rng;
use serde::Serialize;

use crate::core::fitting::fit_multiple_participants;
use crate::core::rl_model::{sample_choices, simulate};
use crate::core::schedule::generate_schedule;
use crate::domain::model::{
    DifferenceRow, FitOptions, Params, Participant, ParticipantFit, RecoveryRow, TaskData,
    TrialBlock,
};
use crate::utils::error::{FitError, Result};

fn simulate_block<R: Rng>(
    true_probability: &[f64],
    alpha: f64,
    beta: f64,
    options: &FitOptions,
    rng: &mut R,
) -> TrialBlock {
    let outcomes = generate_schedule(true_probability, rng);
    let sim = simulate(&outcomes, alpha, beta, options.utility, options.starting_prob);
    let choices = sample_choices(&sim.choice_prob1, rng);
    outcomes.with_choices(choices)
}

/// Simulates one participant per (alpha, beta) pair, alpha-major, and fits them all
/// with the same-alpha model.
pub async fn run_parameter_recovery<R: Rng>(
    alphas: &[f64],
    betas: &[f64],
    true_probability: &[f64],
    options: FitOptions,
    workers: usize,
    rng: &mut R,
) -> Result<Vec<RecoveryRow>> {
    if true_probability.is_empty() {
        return Err(FitError::data("the reward schedule has no trials"));
    }

    let mut simulated = Vec::with_capacity(alphas.len() * betas.len());
    let mut participants = Vec::with_capacity(alphas.len() * betas.len());
    for &alpha in alphas {
        for &beta in betas {
            let block = simulate_block(true_probability, alpha, beta, &options, rng);
            participants.push(Participant {
                id: format!("sim-{}", participants.len()),
                data: TaskData::Single(block),
            });
            simulated.push((alpha, beta));
        }
    }
    tracing::info!("🧪 Simulated {} participants", participants.len());

    let fits = fit_multiple_participants(participants, options, workers).await?;

    simulated
        .into_iter()
        .zip(fits)
        .map(|((simulated_alpha, simulated_beta), fit)| match fit.outcome.params {
            Params::SameAlpha { alpha, beta } => Ok(RecoveryRow {
                simulated_alpha,
                simulated_beta,
                recovered_alpha: alpha,
                recovered_beta: beta,
            }),
            other => Err(unexpected_params(&fit, other)),
        })
        .collect()
}

/// Simulates each subject with its own stable and volatile learning rates and
/// fits them with the alpha-difference model.
#[allow(clippy::too_many_arguments)]
pub async fn run_parameter_recovery_with_difference<R: Rng>(
    stable_alphas: &[f64],
    volatile_alphas: &[f64],
    betas: &[f64],
    stable_probability: &[f64],
    volatile_probability: &[f64],
    options: FitOptions,
    workers: usize,
    rng: &mut R,
) -> Result<Vec<DifferenceRow>> {
    if stable_alphas.len() != betas.len() || volatile_alphas.len() != betas.len() {
        return Err(FitError::ConfigValidationError {
            field: "difference".to_string(),
            message: format!(
                "stable_alphas ({}), volatile_alphas ({}) and betas ({}) must have the same length",
                stable_alphas.len(),
                volatile_alphas.len(),
                betas.len()
            ),
        });
    }
    if stable_probability.is_empty() || volatile_probability.is_empty() {
        return Err(FitError::data("the reward schedule has no trials"));
    }

    let mut participants = Vec::with_capacity(betas.len());
    for (p, ((&alpha_stable, &alpha_volatile), &beta)) in
        stable_alphas.iter().zip(volatile_alphas).zip(betas).enumerate()
    {
        let stable = simulate_block(stable_probability, alpha_stable, beta, &options, rng);
        let volatile = simulate_block(volatile_probability, alpha_volatile, beta, &options, rng);
        participants.push(Participant {
            id: format!("sim-{}", p),
            data: TaskData::Split { stable, volatile },
        });
    }
    tracing::info!(
        "🧪 Simulated {} participants with stable/volatile blocks",
        participants.len()
    );

    let fits = fit_multiple_participants(participants, options, workers).await?;

    fits.into_iter()
        .enumerate()
        .map(|(p, fit)| match fit.outcome.params {
            Params::AlphaDifference {
                alpha_stable,
                alpha_volatile,
                beta,
            } => Ok(DifferenceRow {
                simulated_alpha_stable: stable_alphas[p],
                simulated_alpha_volatile: volatile_alphas[p],
                simulated_beta: betas[p],
                alpha_stable,
                alpha_volatile,
                inverse_temperature: beta,
            }),
            other => Err(unexpected_params(&fit, other)),
        })
        .collect()
}

fn unexpected_params(fit: &ParticipantFit, params: Params) -> FitError {
    FitError::optimization(format!(
        "participant {} was fitted with the {} model",
        fit.participant,
        params.model_kind()
    ))
}

/// Pearson correlation, or `None` when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoverySummary {
    pub n_subjects: usize,
    pub alpha_correlation: Option<f64>,
    pub beta_correlation: Option<f64>,
}

impl RecoverySummary {
    pub fn from_rows(rows: &[RecoveryRow]) -> Self {
        let column = |f: fn(&RecoveryRow) -> f64| rows.iter().map(f).collect::<Vec<_>>();
        Self {
            n_subjects: rows.len(),
            alpha_correlation: pearson(
                &column(|r| r.simulated_alpha),
                &column(|r| r.recovered_alpha),
            ),
            beta_correlation: pearson(
                &column(|r| r.simulated_beta),
                &column(|r| r.recovered_beta),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockSummary {
    pub mean: f64,
    pub median: f64,
}

fn summarize(values: &[f64]) -> Option<BlockSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    Some(BlockSummary {
        mean: values.iter().sum::<f64>() / values.len() as f64,
        median,
    })
}

/// How the fitted stable and volatile learning rates compare across subjects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifferenceSummary {
    pub n_subjects: usize,
    pub stable: Option<BlockSummary>,
    pub volatile: Option<BlockSummary>,
    pub share_volatile_higher: Option<f64>,
}

impl DifferenceSummary {
    pub fn from_rows(rows: &[DifferenceRow]) -> Self {
        let stable: Vec<f64> = rows.iter().map(|r| r.alpha_stable).collect();
        let volatile: Vec<f64> = rows.iter().map(|r| r.alpha_volatile).collect();
        let higher = rows.iter().filter(|r| r.alpha_volatile > r.alpha_stable).count();

        Self {
            n_subjects: rows.len(),
            stable: summarize(&stable),
            volatile: summarize(&volatile),
            share_volatile_higher: (!rows.is_empty()).then(|| higher as f64 / rows.len() as f64),
        }
    }
}
