use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::validate_fit_options;
use crate::core::optimizer::{minimize, OptimizeOptions, OptimizeResult};
use crate::core::rl_model::loss_and_gradient;
use crate::domain::model::{
    FitOptions, FitOutcome, Params, Participant, ParticipantFit, TaskData, TrialBlock,
};
use crate::utils::error::{FitError, Result};

/// Work item for [`run_bounded`]: a label for logs and a blocking closure.
pub type BlockingJob<T> = (String, Box<dyn FnOnce() -> Result<T> + Send + 'static>);

fn uniform<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * rng.random::<f64>()
}

fn optimize_options(options: &FitOptions) -> OptimizeOptions {
    OptimizeOptions {
        max_iter: options.max_iter,
        tol: options.tol,
        history: options.history,
    }
}

fn outcome(result: OptimizeResult, params: Params) -> FitOutcome {
    FitOutcome {
        params,
        loss: result.value,
        iterations: result.iterations,
        grad_norm: result.grad_norm,
        converged: result.converged,
    }
}

/// Fits one learning rate and one inverse temperature, starting from a random point
/// drawn with `seed`.
pub fn fit_same_alpha(block: &TrialBlock, seed: u64, options: &FitOptions) -> FitOutcome {
    let b = options.bounds;
    let mut rng = StdRng::seed_from_u64(seed);
    let alpha0 = uniform(&mut rng, b.alpha_min, b.alpha_max);
    let beta0 = uniform(&mut rng, b.beta_min, b.beta_max);

    let objective = |x: &[f64]| {
        let (value, grad) =
            loss_and_gradient(block, x[0], x[1], options.utility, options.starting_prob);
        (value, grad.to_vec())
    };

    let result = minimize(
        objective,
        &[alpha0, beta0],
        &[(b.alpha_min, b.alpha_max), (b.beta_min, b.beta_max)],
        &optimize_options(options),
    );
    let params = Params::SameAlpha {
        alpha: result.x[0],
        beta: result.x[1],
    };
    outcome(result, params)
}

/// Fits separate learning rates for the stable and volatile blocks with a shared
/// inverse temperature. The objective is the sum of the two block losses.
pub fn fit_alpha_difference(
    stable: &TrialBlock,
    volatile: &TrialBlock,
    seed: u64,
    options: &FitOptions,
) -> FitOutcome {
    let b = options.bounds;
    let mut rng = StdRng::seed_from_u64(seed);
    let alpha_stable0 = uniform(&mut rng, b.alpha_min, b.alpha_max);
    let alpha_volatile0 = uniform(&mut rng, b.alpha_min, b.alpha_max);
    let beta0 = uniform(&mut rng, b.beta_min, b.beta_max);

    let objective = |x: &[f64]| {
        let (loss_stable, g_stable) =
            loss_and_gradient(stable, x[0], x[2], options.utility, options.starting_prob);
        let (loss_volatile, g_volatile) =
            loss_and_gradient(volatile, x[1], x[2], options.utility, options.starting_prob);
        (
            loss_stable + loss_volatile,
            vec![g_stable[0], g_volatile[0], g_stable[1] + g_volatile[1]],
        )
    };

    let result = minimize(
        objective,
        &[alpha_stable0, alpha_volatile0, beta0],
        &[
            (b.alpha_min, b.alpha_max),
            (b.alpha_min, b.alpha_max),
            (b.beta_min, b.beta_max),
        ],
        &optimize_options(options),
    );
    let params = Params::AlphaDifference {
        alpha_stable: result.x[0],
        alpha_volatile: result.x[1],
        beta: result.x[2],
    };
    outcome(result, params)
}

fn fit_once(data: &TaskData, seed: u64, options: &FitOptions) -> FitOutcome {
    match data {
        TaskData::Single(block) => fit_same_alpha(block, seed, options),
        TaskData::Split { stable, volatile } => {
            fit_alpha_difference(stable, volatile, seed, options)
        }
    }
}

fn check_data(data: &TaskData) -> Result<()> {
    match data {
        TaskData::Single(block) => block.check(),
        TaskData::Split { stable, volatile } => {
            stable.check()?;
            volatile.check()
        }
    }
}

/// Lowest-loss outcome, skipping NaN losses. Ties keep the earliest candidate.
pub fn best_finite<I>(candidates: I) -> Option<FitOutcome>
where
    I: IntoIterator<Item = FitOutcome>,
{
    let mut best: Option<FitOutcome> = None;
    for candidate in candidates {
        if candidate.loss.is_nan() {
            continue;
        }
        // 只有嚴格較小時才取代，維持與 argmin 相同的「第一個最小值」語意
        if best.as_ref().map_or(true, |b| candidate.loss < b.loss) {
            best = Some(candidate);
        }
    }
    best
}

/// Runs the fit from `n_inits` seeded starting points (seeds `0..n_inits`) and
/// keeps the one with the lowest loss, ignoring NaN losses.
pub fn fit_with_multiple_initial_values(
    data: &TaskData,
    options: &FitOptions,
) -> Result<FitOutcome> {
    validate_fit_options("", options)?;
    check_data(data)?;

    let candidates = (0..options.n_inits as u64).map(|seed| {
        let candidate = fit_once(data, seed, options);
        tracing::trace!(seed, loss = candidate.loss, "fit from initial value finished");
        candidate
    });

    best_finite(candidates).ok_or_else(|| {
        FitError::optimization(format!(
            "all {} initial values produced a NaN loss",
            options.n_inits
        ))
    })
}

/// Runs blocking jobs with at most `workers` in flight and returns their results in
/// job order. The first failure aborts the rest; a panicking job surfaces as
/// [`FitError::TaskError`].
pub async fn run_bounded<T: Send + 'static>(
    jobs: Vec<BlockingJob<T>>,
    workers: usize,
) -> Result<Vec<T>> {
    let total = jobs.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for (index, (label, job)) in jobs.into_iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FitError::optimization(format!("worker pool closed: {}", e)))?;

        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, label, job())
        });
    }

    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, label, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Worker task failed: {}", e);
                tasks.abort_all();
                return Err(e.into());
            }
        };
        match result {
            Ok(value) => {
                tracing::debug!("Finished {} ({}/{})", label, index + 1, total);
                results[index] = Some(value);
            }
            Err(e) => {
                tracing::error!("{} failed: {}", label, e);
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}

/// Fits every participant on the blocking pool, keeping at most `workers` fits in
/// flight. Results are returned in the order of `participants`.
pub async fn fit_multiple_participants(
    participants: Vec<Participant>,
    options: FitOptions,
    workers: usize,
) -> Result<Vec<ParticipantFit>> {
    validate_fit_options("", &options)?;

    let jobs: Vec<BlockingJob<ParticipantFit>> = participants
        .into_iter()
        .map(|participant| {
            let label = format!("participant {}", participant.id);
            let job = move || {
                let outcome = fit_with_multiple_initial_values(&participant.data, &options)?;
                tracing::debug!("Participant {} loss={:.4}", participant.id, outcome.loss);
                Ok(ParticipantFit {
                    n_trials: participant.data.n_trials(),
                    participant: participant.id,
                    outcome,
                })
            };
            (label, Box::new(job) as Box<dyn FnOnce() -> Result<ParticipantFit> + Send>)
        })
        .collect();

    run_bounded(jobs, workers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rl_model::{sample_choices, simulate};
    use crate::core::schedule::{
        generate_schedule, stable_probabilities, volatile_probabilities,
    };
    use crate::domain::model::{ParamBounds, Utility};

    fn simulated_block(alpha: f64, beta: f64, probs: &[f64], seed: u64) -> TrialBlock {
        let mut rng = StdRng::seed_from_u64(seed);
        let outcomes = generate_schedule(probs, &mut rng);
        let sim = simulate(&outcomes, alpha, beta, Utility::ExpectedValue, 0.5);
        let choices = sample_choices(&sim.choice_prob1, &mut rng);
        outcomes.with_choices(choices)
    }

    #[test]
    fn test_fit_stays_within_bounds() {
        let block = simulated_block(0.3, 0.2, &volatile_probabilities(100, 0.8, 25), 11);
        let options = FitOptions::default();
        for seed in 0..4 {
            let outcome = fit_same_alpha(&block, seed, &options);
            let Params::SameAlpha { alpha, beta } = outcome.params else {
                panic!("unexpected params {:?}", outcome.params);
            };
            assert!((0.0..=1.0).contains(&alpha));
            assert!((0.0..=1.0).contains(&beta));
            assert!(outcome.loss.is_finite());
        }
    }

    #[test]
    fn test_multi_start_is_deterministic() {
        let block = simulated_block(0.25, 0.15, &volatile_probabilities(120, 0.8, 30), 5);
        let data = TaskData::Single(block);
        let options = FitOptions {
            n_inits: 4,
            ..FitOptions::default()
        };
        let a = fit_with_multiple_initial_values(&data, &options).unwrap();
        let b = fit_with_multiple_initial_values(&data, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multi_start_never_worse_than_single_start() {
        let block = simulated_block(0.4, 0.1, &stable_probabilities(80, 0.7), 9);
        let data = TaskData::Single(block.clone());
        let options = FitOptions {
            n_inits: 5,
            ..FitOptions::default()
        };
        let best = fit_with_multiple_initial_values(&data, &options).unwrap();
        for seed in 0..5 {
            assert!(best.loss <= fit_same_alpha(&block, seed, &options).loss + 1e-12);
        }
    }

    #[test]
    fn test_recovers_learning_rate_from_long_session() {
        let block = simulated_block(0.35, 0.3, &volatile_probabilities(2000, 0.85, 40), 21);
        let data = TaskData::Single(block);
        let fit = fit_with_multiple_initial_values(&data, &FitOptions::default()).unwrap();
        let Params::SameAlpha { alpha, beta } = fit.params else {
            panic!("unexpected params");
        };
        assert!((alpha - 0.35).abs() < 0.1, "alpha={}", alpha);
        assert!((beta - 0.3).abs() < 0.1, "beta={}", beta);
    }

    #[test]
    fn test_alpha_difference_separates_blocks() {
        let stable = simulated_block(0.1, 0.3, &stable_probabilities(1500, 0.75), 31);
        let volatile = simulated_block(0.6, 0.3, &volatile_probabilities(1500, 0.85, 25), 32);
        let data = TaskData::Split { stable, volatile };
        let fit = fit_with_multiple_initial_values(&data, &FitOptions::default()).unwrap();
        let Params::AlphaDifference {
            alpha_stable,
            alpha_volatile,
            ..
        } = fit.params
        else {
            panic!("unexpected params");
        };
        assert!(alpha_volatile > alpha_stable);
    }

    #[test]
    fn test_zero_inits_is_rejected() {
        let block = simulated_block(0.3, 0.2, &stable_probabilities(10, 0.7), 1);
        let data = TaskData::Single(block);
        let options = FitOptions {
            n_inits: 0,
            ..FitOptions::default()
        };
        assert!(fit_with_multiple_initial_values(&data, &options).is_err());
    }

    fn outcome_with_loss(loss: f64, alpha: f64) -> FitOutcome {
        FitOutcome {
            params: Params::SameAlpha { alpha, beta: 0.5 },
            loss,
            iterations: 1,
            grad_norm: 0.0,
            converged: true,
        }
    }

    #[test]
    fn test_best_finite_skips_nan_and_keeps_first_minimum() {
        let candidates = vec![
            outcome_with_loss(f64::NAN, 0.1),
            outcome_with_loss(0.7, 0.2),
            outcome_with_loss(f64::NAN, 0.3),
            outcome_with_loss(0.4, 0.4),
            outcome_with_loss(0.4, 0.5),
        ];
        let best = best_finite(candidates).unwrap();
        assert_eq!(best.loss, 0.4);
        assert_eq!(best.params, Params::SameAlpha { alpha: 0.4, beta: 0.5 });
    }

    #[test]
    fn test_best_finite_with_only_nan_losses_is_none() {
        let candidates = vec![outcome_with_loss(f64::NAN, 0.1), outcome_with_loss(f64::NAN, 0.2)];
        assert!(best_finite(candidates).is_none());
        assert!(best_finite(Vec::new()).is_none());
    }

    #[test]
    fn test_nan_starting_prob_is_a_config_error() {
        let block = simulated_block(0.3, 0.2, &stable_probabilities(10, 0.7), 1);
        let options = FitOptions {
            starting_prob: f64::NAN,
            n_inits: 3,
            ..FitOptions::default()
        };
        let err = fit_with_multiple_initial_values(&TaskData::Single(block), &options).unwrap_err();
        assert!(matches!(err, FitError::InvalidConfigValueError { .. }));
    }

    #[test]
    fn test_inverted_or_nan_bounds_are_rejected() {
        let data = TaskData::Single(simulated_block(0.3, 0.2, &stable_probabilities(20, 0.7), 4));
        let inverted = FitOptions {
            bounds: ParamBounds {
                alpha_min: 0.8,
                alpha_max: 0.2,
                ..ParamBounds::default()
            },
            ..FitOptions::default()
        };
        let err = fit_with_multiple_initial_values(&data, &inverted).unwrap_err();
        assert!(matches!(err, FitError::ConfigValidationError { .. }));

        let nan_beta = FitOptions {
            bounds: ParamBounds {
                beta_max: f64::NAN,
                ..ParamBounds::default()
            },
            ..FitOptions::default()
        };
        let err = fit_with_multiple_initial_values(&data, &nan_beta).unwrap_err();
        assert!(matches!(err, FitError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_empty_block_is_a_validation_error() {
        let data = TaskData::Single(TrialBlock::default());
        let err = fit_with_multiple_initial_values(&data, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_multiple_participants_keep_input_order() {
        let participants: Vec<Participant> = (0..6)
            .map(|i| Participant {
                id: format!("p{}", i),
                data: TaskData::Single(simulated_block(
                    0.2 + 0.1 * i as f64,
                    0.2,
                    &volatile_probabilities(60 + 10 * i, 0.8, 20),
                    i as u64,
                )),
            })
            .collect();

        let options = FitOptions {
            n_inits: 2,
            ..FitOptions::default()
        };
        let fits = fit_multiple_participants(participants, options, 3).await.unwrap();

        let ids: Vec<&str> = fits.iter().map(|f| f.participant.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4", "p5"]);
        assert_eq!(fits[2].n_trials, 80);
    }

    #[tokio::test]
    async fn test_multiple_participants_propagates_failure() {
        let participants = vec![
            Participant {
                id: "ok".to_string(),
                data: TaskData::Single(simulated_block(
                    0.3,
                    0.2,
                    &stable_probabilities(30, 0.7),
                    2,
                )),
            },
            Participant {
                id: "empty".to_string(),
                data: TaskData::Single(TrialBlock::default()),
            },
        ];
        let result = fit_multiple_participants(participants, FitOptions::default(), 2).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pool_rejects_inverted_bounds_as_config_error() {
        let participants = vec![Participant {
            id: "p".to_string(),
            data: TaskData::Single(simulated_block(0.3, 0.2, &stable_probabilities(20, 0.7), 3)),
        }];
        let options = FitOptions {
            bounds: ParamBounds {
                alpha_min: 0.8,
                alpha_max: 0.2,
                ..ParamBounds::default()
            },
            ..FitOptions::default()
        };
        let err = fit_multiple_participants(participants, options, 2).await.unwrap_err();
        assert!(matches!(err, FitError::ConfigValidationError { .. }));
    }

    #[tokio::test]
    async fn test_panicking_job_surfaces_as_task_error() {
        let jobs: Vec<BlockingJob<u32>> = vec![
            ("fine".to_string(), Box::new(|| -> Result<u32> { Ok(1) })),
            (
                "broken".to_string(),
                Box::new(|| -> Result<u32> { panic!("worker blew up") }),
            ),
        ];
        let err = run_bounded(jobs, 2).await.unwrap_err();
        assert!(matches!(err, FitError::TaskError(_)));
    }

    #[tokio::test]
    async fn test_run_bounded_keeps_job_order() {
        let jobs: Vec<BlockingJob<usize>> = (0..5)
            .map(|i| {
                let job: Box<dyn FnOnce() -> Result<usize> + Send> = Box::new(move || {
                    std::thread::sleep(std::time::Duration::from_millis((5 - i) as u64 * 3));
                    Ok(i * 10)
                });
                (format!("job {}", i), job)
            })
            .collect();
        assert_eq!(run_bounded(jobs, 3).await.unwrap(), vec![0, 10, 20, 30, 40]);
    }
}
