//! Delta-rule learner with a logistic choice rule.
//!
//! On trial `t` the learner believes option 1 is rewarded with probability
//! `p[t]`. After seeing the outcome it updates `p[t+1] = p[t] + alpha * (r[t] - p[t])`.
//! Choices follow `P(choose 1) = sigmoid(beta * (U(m1, p) - U(m2, 1 - p)))`.

use rand::Rng;

use crate::domain::model::{TrialBlock, TrialOutcomes, Utility};

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub prob_opt1: Vec<f64>,
    pub choice_prob1: Vec<f64>,
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable `-[z ln σ(x) + (1 - z) ln(1 - σ(x))]`.
fn sigmoid_bce(logit: f64, target: f64) -> f64 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

/// Estimates used on each trial, before that trial's outcome is seen.
pub fn estimate_probabilities(opt1_rewarded: &[bool], alpha: f64, starting_prob: f64) -> Vec<f64> {
    let mut prob = Vec::with_capacity(opt1_rewarded.len());
    let mut p = starting_prob;
    for &rewarded in opt1_rewarded {
        prob.push(p);
        p += alpha * (f64::from(u8::from(rewarded)) - p);
    }
    prob
}

pub fn simulate(
    outcomes: &TrialOutcomes,
    alpha: f64,
    beta: f64,
    utility: Utility,
    starting_prob: f64,
) -> Simulation {
    let prob_opt1 = estimate_probabilities(&outcomes.opt1_rewarded, alpha, starting_prob);
    let choice_prob1 = prob_opt1
        .iter()
        .zip(outcomes.mag_opt1.iter().zip(&outcomes.mag_opt2))
        .map(|(&p, (&m1, &m2))| sigmoid(beta * (utility.value(m1, p) - utility.value(m2, 1.0 - p))))
        .collect();

    Simulation {
        prob_opt1,
        choice_prob1,
    }
}

/// Turns choice probabilities into binary choices.
/// Option 1 is chosen when its probability beats a uniform draw.
pub fn sample_choices<R: Rng>(choice_prob1: &[f64], rng: &mut R) -> Vec<bool> {
    choice_prob1
        .iter()
        .map(|&p| p > rng.random::<f64>())
        .collect()
}

/// Mean cross-entropy of the observed choices under the model.
pub fn loss(
    block: &TrialBlock,
    alpha: f64,
    beta: f64,
    utility: Utility,
    starting_prob: f64,
) -> f64 {
    let n = block.len();
    if n == 0 {
        return f64::NAN;
    }

    let mut total = 0.0;
    let mut p = starting_prob;
    for t in 0..n {
        let diff = utility.value(block.mag_opt1[t], p) - utility.value(block.mag_opt2[t], 1.0 - p);
        let logit = beta * diff;
        total += sigmoid_bce(logit, f64::from(u8::from(block.choice1[t])));
        p += alpha * (f64::from(u8::from(block.opt1_rewarded[t])) - p);
    }
    total / n as f64
}

/// [`loss`] together with its gradient `[d/dalpha, d/dbeta]`.
///
/// The sensitivity `dp/dalpha` is propagated forward alongside the estimate:
/// `dp[t+1] = (1 - alpha) * dp[t] + (r[t] - p[t])`, starting from zero.
pub fn loss_and_gradient(
    block: &TrialBlock,
    alpha: f64,
    beta: f64,
    utility: Utility,
    starting_prob: f64,
) -> (f64, [f64; 2]) {
    let n = block.len();
    if n == 0 {
        return (f64::NAN, [f64::NAN, f64::NAN]);
    }

    let mut total = 0.0;
    let mut d_alpha = 0.0;
    let mut d_beta = 0.0;
    let mut p = starting_prob;
    let mut dp = 0.0;

    for t in 0..n {
        let (m1, m2) = (block.mag_opt1[t], block.mag_opt2[t]);
        let diff = utility.value(m1, p) - utility.value(m2, 1.0 - p);
        let logit = beta * diff;
        let target = f64::from(u8::from(block.choice1[t]));

        total += sigmoid_bce(logit, target);

        let residual = sigmoid(logit) - target;
        d_beta += residual * diff;
        d_alpha += residual * beta * (utility.d_prob(m1, p) + utility.d_prob(m2, 1.0 - p)) * dp;

        let reward = f64::from(u8::from(block.opt1_rewarded[t]));
        dp = (1.0 - alpha) * dp + (reward - p);
        p += alpha * (reward - p);
    }

    let n = n as f64;
    (total / n, [d_alpha / n, d_beta / n])
}

pub fn log_likelihood(
    block: &TrialBlock,
    alpha: f64,
    beta: f64,
    utility: Utility,
    starting_prob: f64,
) -> f64 {
    -loss(block, alpha, beta, utility, starting_prob) * block.len() as f64
}
