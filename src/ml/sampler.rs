// ============================================================
// Layer 5 — Temperature Sampler
// ============================================================
// Converts a score vector over the vocabulary into one sampled
// token id:
//
//   p_i = exp((s_i - max s) / T) / Σ_j exp((s_j - max s) / T)
//
// Subtracting the max first keeps every exponent <= 0, so large
// scores cannot overflow. The max element always maps to exp(0)
// = 1, so the normaliser is never zero.
//
//   T → ∞   p approaches uniform
//   T → 0   p concentrates on arg max (small entries underflow)
//
// T must be finite and > 0; T == 0 is rejected, not clamped.
//
// Reference: Hinton et al. (2015) "Distilling the Knowledge in a
//            Neural Network" — softmax temperature

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::domain::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSampler {
    temperature: f64,
}

impl TemperatureSampler {
    pub fn new(temperature: f64) -> Result<Self, EngineError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(EngineError::InvalidTemperature(temperature));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// The sampling distribution for `scores` at this temperature.
    pub fn probabilities(&self, scores: &[f32]) -> Result<Vec<f64>, EngineError> {
        if scores.is_empty() {
            return Err(EngineError::InvalidScores("empty score vector".into()));
        }
        if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
            return Err(EngineError::InvalidScores(format!("score {i} is not finite")));
        }

        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        let exps: Vec<f64> = scores
            .iter()
            .map(|&s| ((s as f64 - max) / self.temperature).exp())
            .collect();
        let total: f64 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| e / total).collect())
    }

    /// Draw one vocabulary index from the tempered distribution.
    pub fn sample<R: Rng + ?Sized>(&self, scores: &[f32], rng: &mut R) -> Result<u32, EngineError> {
        let probs = self.probabilities(scores)?;
        let dist = WeightedIndex::new(&probs)
            .map_err(|e| EngineError::InvalidScores(e.to_string()))?;
        Ok(dist.sample(rng) as u32)
    }
}

/// Index of the first maximum.
pub fn argmax<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Shannon entropy in nats.
#[cfg(test)]
pub fn entropy(probs: &[f64]) -> f64 {
    probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_and_negative_temperature_rejected() {
        assert_eq!(TemperatureSampler::new(0.0), Err(EngineError::InvalidTemperature(0.0)));
        assert!(TemperatureSampler::new(-1.0).is_err());
        assert!(TemperatureSampler::new(f64::NAN).is_err());
        assert!(TemperatureSampler::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_large_scores_do_not_overflow() {
        let s = TemperatureSampler::new(1.0).unwrap();
        let p = s.probabilities(&[1.0e30, 1.0e30 - 1.0e24, -1.0e30]).unwrap();
        assert!(p.iter().all(|x| x.is_finite()));
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_and_nan_scores_rejected() {
        let s = TemperatureSampler::new(1.0).unwrap();
        assert!(s.probabilities(&[]).is_err());
        assert!(s.probabilities(&[0.0, f32::NAN]).is_err());
    }

    #[test]
    fn test_tiny_temperature_is_near_deterministic() {
        let s = TemperatureSampler::new(1e-3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(s.sample(&[0.1, 2.0, 1.9, -4.0], &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_huge_temperature_is_near_uniform() {
        let s = TemperatureSampler::new(1e9).unwrap();
        let p = s.probabilities(&[5.0, -5.0, 0.0, 1.0]).unwrap();
        for x in p {
            assert_relative_eq!(x, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_empirical_frequencies_follow_distribution() {
        let s = TemperatureSampler::new(1.0).unwrap();
        let scores = [0.0f32, (3.0f32).ln()];
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let ones = (0..n).filter(|_| s.sample(&scores, &mut rng).unwrap() == 1).count();
        let freq = ones as f64 / n as f64;
        assert!((freq - 0.75).abs() < 0.02, "freq = {freq}");
    }

    #[test]
    fn test_argmax_takes_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 0.0]), Some(1));
        assert_eq!(argmax::<f32>(&[]), None);
    }

    fn scores_strategy() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-50.0f32..50.0, 2..40)
    }

    proptest! {
        #[test]
        fn prop_probabilities_form_a_simplex(scores in scores_strategy(), t in 0.05f64..20.0) {
            let p = TemperatureSampler::new(t).unwrap().probabilities(&scores).unwrap();
            let sum: f64 = p.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            prop_assert!(p.iter().all(|&x| (0.0..=1.0).contains(&x)));
        }

        #[test]
        fn prop_argmax_is_preserved(scores in scores_strategy(), t in 0.05f64..20.0) {
            let p = TemperatureSampler::new(t).unwrap().probabilities(&scores).unwrap();
            prop_assert_eq!(argmax(&p), argmax(&scores));
        }

        #[test]
        fn prop_lower_temperature_has_lower_entropy(
            scores in scores_strategy(),
            t1 in 0.05f64..10.0,
            dt in 0.01f64..10.0,
        ) {
            let t2 = t1 + dt;
            let h1 = entropy(&TemperatureSampler::new(t1).unwrap().probabilities(&scores).unwrap());
            let h2 = entropy(&TemperatureSampler::new(t2).unwrap().probabilities(&scores).unwrap());
            prop_assert!(h1 <= h2 + 1e-9, "H({t1}) = {h1} > H({t2}) = {h2}");
        }
    }
}
