use crate::domain::model::Utility;

/// Magnitudes run from 1 to 100 points; the additive utility works on a 0..1 scale.
const MAGNITUDE_SCALE: f64 = 100.0;

impl Utility {
    pub fn value(&self, mag: f64, prob: f64) -> f64 {
        match *self {
            Utility::ExpectedValue => mag * prob,
            Utility::Additive { omega } => omega * mag / MAGNITUDE_SCALE + (1.0 - omega) * prob,
        }
    }

    /// Partial derivative of [`Utility::value`] with respect to `prob`.
    pub fn d_prob(&self, mag: f64, _prob: f64) -> f64 {
        match *self {
            Utility::ExpectedValue => mag,
            Utility::Additive { omega } => 1.0 - omega,
        }
    }

    pub fn omega(&self) -> Option<f64> {
        match *self {
            Utility::ExpectedValue => None,
            Utility::Additive { omega } => Some(omega),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_value() {
        let u = Utility::ExpectedValue;
        assert_eq!(u.value(40.0, 0.25), 10.0);
        assert_eq!(u.d_prob(40.0, 0.25), 40.0);
    }

    #[test]
    fn test_additive_extremes() {
        // omega = 1 ignores probability entirely, omega = 0 ignores magnitude
        let mag_only = Utility::Additive { omega: 1.0 };
        assert!((mag_only.value(50.0, 0.9) - 0.5).abs() < 1e-12);
        assert_eq!(mag_only.d_prob(50.0, 0.9), 0.0);

        let prob_only = Utility::Additive { omega: 0.0 };
        assert!((prob_only.value(80.0, 0.3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_d_prob_matches_finite_difference() {
        let h = 1e-6;
        for utility in [Utility::ExpectedValue, Utility::Additive { omega: 0.4 }] {
            let numeric = (utility.value(37.0, 0.6 + h) - utility.value(37.0, 0.6 - h)) / (2.0 * h);
            assert!((numeric - utility.d_prob(37.0, 0.6)).abs() < 1e-5);
        }
    }
}
