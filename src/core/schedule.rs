use rand::Rng;

use crate::domain::model::TrialOutcomes;

pub const MIN_MAGNITUDE: u32 = 1;
pub const MAX_MAGNITUDE: u32 = 100;

/// Option 1 is rewarded with the same probability on every trial.
pub fn stable_probabilities(n_trials: usize, probability: f64) -> Vec<f64> {
    vec![probability; n_trials]
}

/// Reward probability flips between `probability` and `1 - probability`
/// every `block_length` trials.
pub fn volatile_probabilities(n_trials: usize, probability: f64, block_length: usize) -> Vec<f64> {
    let block_length = block_length.max(1);
    (0..n_trials)
        .map(|t| {
            if (t / block_length) % 2 == 0 {
                probability
            } else {
                1.0 - probability
            }
        })
        .collect()
}

/// Draws reward outcomes from the true probabilities and independent magnitudes for both options.
pub fn generate_schedule<R: Rng>(true_probability: &[f64], rng: &mut R) -> TrialOutcomes {
    let n = true_probability.len();
    let mut outcomes = TrialOutcomes {
        opt1_rewarded: Vec::with_capacity(n),
        mag_opt1: Vec::with_capacity(n),
        mag_opt2: Vec::with_capacity(n),
    };

    for &p in true_probability {
        outcomes.opt1_rewarded.push(rng.random::<f64>() < p);
        outcomes
            .mag_opt1
            .push(f64::from(rng.random_range(MIN_MAGNITUDE..=MAX_MAGNITUDE)));
        outcomes
            .mag_opt2
            .push(f64::from(rng.random_range(MIN_MAGNITUDE..=MAX_MAGNITUDE)));
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_volatile_blocks_alternate() {
        let probs = volatile_probabilities(8, 0.8, 2);
        let expected = [0.8, 0.8, 0.2, 0.2, 0.8, 0.8, 0.2, 0.2];
        for (p, e) in probs.iter().zip(expected) {
            assert!((p - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_volatile_with_zero_block_length_flips_every_trial() {
        let probs = volatile_probabilities(3, 0.9, 0);
        assert!((probs[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_schedule_shapes_and_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        let outcomes = generate_schedule(&stable_probabilities(500, 0.75), &mut rng);

        assert_eq!(outcomes.len(), 500);
        assert_eq!(outcomes.mag_opt1.len(), 500);
        assert!(outcomes
            .mag_opt1
            .iter()
            .chain(&outcomes.mag_opt2)
            .all(|&m| (1.0..=100.0).contains(&m) && m.fract() == 0.0));

        let share = outcomes.opt1_rewarded.iter().filter(|&&r| r).count() as f64 / 500.0;
        assert!((share - 0.75).abs() < 0.06);
    }

    #[test]
    fn test_schedule_is_reproducible_for_a_seed() {
        let probs = volatile_probabilities(40, 0.8, 10);
        let a = generate_schedule(&probs, &mut StdRng::seed_from_u64(3));
        let b = generate_schedule(&probs, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_probabilities() {
        let mut rng = StdRng::seed_from_u64(1);
        let always = generate_schedule(&stable_probabilities(50, 1.0), &mut rng);
        assert!(always.opt1_rewarded.iter().all(|&r| r));
        let never = generate_schedule(&stable_probabilities(50, 0.0), &mut rng);
        assert!(never.opt1_rewarded.iter().all(|&r| !r));
    }
}
