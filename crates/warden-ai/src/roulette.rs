//! Weighted random selection by cumulative-probability sampling.

use std::fmt::Debug;
use tracing::debug;
use warden_common::{ConfigError, ConfigResult};

/// Roulette wheel over labels of type `L`.
///
/// Entries keep their insertion order. Each draw samples one uniform value in
/// `[0, total)` and binary-searches the prefix sums.
#[derive(Debug, Clone)]
pub struct RouletteWheel<L> {
    labels: Vec<L>,
    weights: Vec<f32>,
    cumulative: Vec<f32>,
    total: f32,
}

impl<L: Clone + Debug> RouletteWheel<L> {
    /// Builds a wheel, validating every weight.
    pub fn new<W>(weights: W) -> ConfigResult<Self>
    where
        W: IntoIterator<Item = (L, f32)>,
    {
        let mut wheel = Self {
            labels: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            total: 0.0,
        };
        wheel.set_weights(weights)?;
        Ok(wheel)
    }

    /// Replaces every entry and rebuilds the cumulative table.
    ///
    /// Fails on an empty mapping or any weight that is not finite and positive.
    /// The wheel is left unchanged on failure.
    pub fn set_weights<W>(&mut self, weights: W) -> ConfigResult<()>
    where
        W: IntoIterator<Item = (L, f32)>,
    {
        let mut labels = Vec::new();
        let mut raw = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0f32;

        for (label, weight) in weights {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(ConfigError::InvalidWeight {
                    label: format!("{label:?}"),
                    weight,
                });
            }
            total += weight;
            labels.push(label);
            raw.push(weight);
            cumulative.push(total);
        }
        if labels.is_empty() {
            return Err(ConfigError::EmptyWeights);
        }

        self.labels = labels;
        self.weights = raw;
        self.cumulative = cumulative;
        self.total = total;
        Ok(())
    }

    /// Draws one label.
    #[must_use]
    pub fn draw(&self, rng: &mut fastrand::Rng) -> L {
        let u = rng.f32() * self.total;
        let index = self
            .cumulative
            .partition_point(|&threshold| threshold <= u)
            .min(self.labels.len() - 1);
        let label = self.labels[index].clone();
        debug!(?label, u, "roulette draw");
        label
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> f32 {
        self.total
    }

    /// Probability of drawing each label, in insertion order.
    pub fn probabilities(&self) -> impl Iterator<Item = (&L, f32)> + '_ {
        self.labels
            .iter()
            .zip(&self.weights)
            .map(move |(label, weight)| (label, weight / self.total))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed wheel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Pick {
        A,
        B,
        C,
        D,
    }

    #[test]
    fn test_distribution_matches_weights() {
        let wheel = RouletteWheel::new([
            (Pick::A, 70.0),
            (Pick::B, 10.0),
            (Pick::C, 15.0),
            (Pick::D, 5.0),
        ])
        .expect("valid weights");
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let mut counts = [0usize; 4];
        let draws = 100_000;
        for _ in 0..draws {
            let index = match wheel.draw(&mut rng) {
                Pick::A => 0,
                Pick::B => 1,
                Pick::C => 2,
                Pick::D => 3,
            };
            counts[index] += 1;
        }
        for (count, expected) in counts.iter().zip([70.0, 10.0, 15.0, 5.0]) {
            let percent = *count as f32 * 100.0 / draws as f32;
            assert!((percent - expected).abs() < 2.0, "{percent} vs {expected}");
        }
    }

    #[test]
    fn test_invalid_configurations() {
        assert_eq!(
            RouletteWheel::<Pick>::new([]).err(),
            Some(ConfigError::EmptyWeights)
        );
        assert!(matches!(
            RouletteWheel::new([(Pick::A, 1.0), (Pick::B, 0.0)]),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(RouletteWheel::new([(Pick::A, f32::NAN)]).is_err());
        assert!(RouletteWheel::new([(Pick::A, -3.0)]).is_err());
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_table() {
        let mut wheel = RouletteWheel::new([(Pick::A, 1.0)]).expect("valid weights");
        assert!(wheel.set_weights([(Pick::B, -1.0)]).is_err());
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(wheel.draw(&mut rng), Pick::A);
        assert_eq!(wheel.total_weight(), 1.0);
    }

    #[test]
    fn test_probabilities() {
        let wheel = RouletteWheel::new([(Pick::A, 3.0), (Pick::B, 1.0)]).expect("valid weights");
        let probs: Vec<_> = wheel.probabilities().map(|(l, p)| (*l, p)).collect();
        assert_eq!(probs, vec![(Pick::A, 0.75), (Pick::B, 0.25)]);
    }

    proptest! {
        #[test]
        fn test_never_draws_unconfigured_label(
            weights in proptest::collection::vec(0.001f32..1000.0, 1..8),
            seed in any::<u64>(),
        ) {
            let wheel = RouletteWheel::new(weights.iter().copied().enumerate())
                .expect("valid weights");
            let mut rng = fastrand::Rng::with_seed(seed);
            for _ in 0..64 {
                prop_assert!(wheel.draw(&mut rng) < weights.len());
            }
        }
    }
}
