use serde::Serialize;

use crate::core::rl_model::log_likelihood;
use crate::domain::model::{TrialBlock, Utility};
use crate::utils::error::Result;

pub const AXIS_START: f64 = 0.01;
pub const AXIS_END: f64 = 1.0;
pub const AXIS_STEP: f64 = 0.005;

/// Log likelihood over an (alpha, beta) grid; rows follow `alphas`, columns `betas`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Landscape {
    pub alphas: Vec<f64>,
    pub betas: Vec<f64>,
    pub log_likelihood: Vec<Vec<f64>>,
    pub normalised_likelihood: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPeak {
    pub alpha: f64,
    pub beta: f64,
    pub log_likelihood: f64,
}

/// `0.01, 0.015, ..., 0.995`
pub fn default_axis() -> Vec<f64> {
    let n = ((AXIS_END - AXIS_START) / AXIS_STEP).round() as usize;
    (0..n).map(|i| AXIS_START + AXIS_STEP * i as f64).collect()
}

pub fn likelihood_landscape(
    block: &TrialBlock,
    alphas: &[f64],
    betas: &[f64],
    utility: Utility,
    starting_prob: f64,
) -> Result<Landscape> {
    block.check()?;

    let log_likelihood: Vec<Vec<f64>> = alphas
        .iter()
        .map(|&alpha| {
            betas
                .iter()
                .map(|&beta| log_likelihood(block, alpha, beta, utility, starting_prob))
                .collect()
        })
        .collect();

    // 先減去最大值再取指數，避免下溢
    let max = log_likelihood
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<Vec<f64>> = log_likelihood
        .iter()
        .map(|row| {
            row.iter()
                .map(|&ll| if ll.is_finite() { (ll - max).exp() } else { 0.0 })
                .collect()
        })
        .collect();
    let total: f64 = weights.iter().flatten().sum();
    let normalised_likelihood = weights
        .into_iter()
        .map(|row| row.into_iter().map(|w| if total > 0.0 { w / total } else { 0.0 }).collect())
        .collect();

    Ok(Landscape {
        alphas: alphas.to_vec(),
        betas: betas.to_vec(),
        log_likelihood,
        normalised_likelihood,
    })
}

impl Landscape {
    pub fn argmax(&self) -> Option<GridPeak> {
        let mut best: Option<GridPeak> = None;
        for (a, row) in self.log_likelihood.iter().enumerate() {
            for (b, &ll) in row.iter().enumerate() {
                if ll.is_finite() && best.map_or(true, |peak| ll > peak.log_likelihood) {
                    best = Some(GridPeak {
                        alpha: self.alphas[a],
                        beta: self.betas[b],
                        log_likelihood: ll,
                    });
                }
            }
        }
        best
    }

    /// One `(alpha, beta, log_likelihood, normalised_likelihood)` tuple per grid cell.
    pub fn cells(&self) -> impl Iterator<Item = (f64, f64, f64, f64)> + '_ {
        self.alphas.iter().enumerate().flat_map(move |(a, &alpha)| {
            self.betas.iter().enumerate().map(move |(b, &beta)| {
                (
                    alpha,
                    beta,
                    self.log_likelihood[a][b],
                    self.normalised_likelihood[a][b],
                )
            })
        })
    }
}
