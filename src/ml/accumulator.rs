// ============================================================
// Layer 5 — Metrics Accumulator
// ============================================================
// Running totals for one epoch (training) or one split pass
// (evaluation):
//
//   confusion   vocabulary × vocabulary, element-wise sum of the
//               per-batch increments
//   accuracies  one scalar per batch, recorded for eval runs only
//
// Addition is commutative and associative, so the order batches
// arrive in never changes the summary.
//
// reset() is called by the orchestrator once per epoch; nothing
// resets implicitly.

use std::fmt;

use crate::domain::confusion::ConfusionMatrix;
use crate::domain::error::EngineError;

/// Mean per-batch accuracy, with "no data" kept distinct from 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccuracySummary {
    /// Training runs do not record per-batch accuracy.
    NotTracked,
    /// Accuracy was tracked but zero batches were recorded.
    NoData,
    Mean(f64),
}

impl fmt::Display for AccuracySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccuracySummary::NotTracked => f.write_str("not tracked"),
            AccuracySummary::NoData     => f.write_str("no data"),
            AccuracySummary::Mean(m)    => write!(f, "{m}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub confusion: ConfusionMatrix,
    pub accuracy:  AccuracySummary,
    pub batches:   usize,
    /// Mean per-batch loss, `None` when no batch was folded.
    pub mean_loss: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    confusion:      ConfusionMatrix,
    accuracies:     Vec<f64>,
    track_accuracy: bool,
    batches:        usize,
    loss_sum:       f64,
}

impl MetricsAccumulator {
    pub fn new(vocab_size: usize, track_accuracy: bool) -> Self {
        Self {
            confusion: ConfusionMatrix::zeros(vocab_size),
            accuracies: Vec::new(),
            track_accuracy,
            batches: 0,
            loss_sum: 0.0,
        }
    }

    /// Fold one batch's confusion increment and, for eval runs, its
    /// accuracy into the running totals.
    pub fn fold(
        &mut self,
        increment: &ConfusionMatrix,
        accuracy:  Option<f64>,
    ) -> Result<(), EngineError> {
        if let Some(acc) = accuracy {
            if !acc.is_finite() {
                return Err(EngineError::InvalidScores(format!("batch accuracy {acc}")));
            }
        }
        self.confusion.add_assign(increment)?;
        if self.track_accuracy {
            if let Some(acc) = accuracy {
                self.accuracies.push(acc);
            }
        }
        self.batches += 1;
        Ok(())
    }

    /// Loss is reported alongside the metrics but plays no part in them.
    pub fn note_loss(&mut self, loss: f64) {
        self.loss_sum += loss;
    }

    #[cfg(test)]
    pub fn batches(&self) -> usize {
        self.batches
    }

    #[cfg(test)]
    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    /// Arithmetic mean of the recorded batch accuracies.
    pub fn mean_accuracy(&self) -> Result<f64, EngineError> {
        if self.accuracies.is_empty() {
            return Err(EngineError::EmptyAccumulator);
        }
        Ok(self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64)
    }

    pub fn epoch_summary(&self) -> EpochSummary {
        let accuracy = if !self.track_accuracy {
            AccuracySummary::NotTracked
        } else {
            match self.mean_accuracy() {
                Ok(mean) => AccuracySummary::Mean(mean),
                Err(_)   => AccuracySummary::NoData,
            }
        };
        let mean_loss = (self.batches > 0).then(|| self.loss_sum / self.batches as f64);
        EpochSummary {
            confusion: self.confusion.clone(),
            accuracy,
            batches: self.batches,
            mean_loss,
        }
    }

    pub fn reset(&mut self) {
        self.confusion = ConfusionMatrix::zeros(self.confusion.size());
        self.accuracies.clear();
        self.batches  = 0;
        self.loss_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn increment(size: usize, pairs: &[(u32, u32)]) -> ConfusionMatrix {
        let mut m = ConfusionMatrix::zeros(size);
        for &(t, p) in pairs {
            m.record(t, p).unwrap();
        }
        m
    }

    #[test]
    fn test_zero_batches_reports_no_data() {
        let acc = MetricsAccumulator::new(4, true);
        assert_eq!(acc.mean_accuracy(), Err(EngineError::EmptyAccumulator));
        let summary = acc.epoch_summary();
        assert_eq!(summary.accuracy, AccuracySummary::NoData);
        assert_eq!(summary.accuracy.to_string(), "no data");
        assert_eq!(summary.mean_loss, None);
    }

    #[test]
    fn test_training_does_not_track_accuracy() {
        let mut acc = MetricsAccumulator::new(2, false);
        acc.fold(&increment(2, &[(0, 0)]), None).unwrap();
        assert_eq!(acc.epoch_summary().accuracy, AccuracySummary::NotTracked);
        assert_eq!(acc.confusion().get(0, 0), 1);
    }

    #[test]
    fn test_mean_of_batch_accuracies() {
        let mut acc = MetricsAccumulator::new(2, true);
        acc.fold(&increment(2, &[(0, 0)]), Some(0.5)).unwrap();
        acc.fold(&increment(2, &[(1, 0)]), Some(1.0)).unwrap();
        acc.note_loss(2.0);
        acc.note_loss(4.0);
        let summary = acc.epoch_summary();
        assert_eq!(summary.accuracy, AccuracySummary::Mean(0.75));
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.mean_loss, Some(3.0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut acc = MetricsAccumulator::new(2, true);
        acc.fold(&increment(2, &[(1, 1)]), Some(1.0)).unwrap();
        acc.reset();
        assert!(acc.confusion().is_zero());
        assert_eq!(acc.batches(), 0);
        assert_eq!(acc.epoch_summary().accuracy, AccuracySummary::NoData);
    }

    #[test]
    fn test_wrong_size_increment_rejected() {
        let mut acc = MetricsAccumulator::new(2, true);
        assert!(acc.fold(&ConfusionMatrix::zeros(3), Some(1.0)).is_err());
        assert_eq!(acc.batches(), 0);
    }

    fn batch_strategy() -> impl Strategy<Value = (Vec<(u32, u32)>, u8)> {
        (prop::collection::vec((0u32..5, 0u32..5), 0..10), 0u8..=8)
    }

    proptest! {
        #[test]
        fn prop_fold_order_does_not_matter(
            (batches, shuffled) in prop::collection::vec(batch_strategy(), 1..8)
                .prop_flat_map(|b| (Just(b.clone()), Just(b).prop_shuffle()))
        ) {
            let run = |input: &[(Vec<(u32, u32)>, u8)]| {
                let mut acc = MetricsAccumulator::new(5, true);
                for (pairs, eighths) in input {
                    // multiples of 1/8 add exactly in binary floating point
                    acc.fold(&increment(5, pairs), Some(*eighths as f64 / 8.0)).unwrap();
                }
                acc.epoch_summary()
            };
            let a = run(&batches);
            let b = run(&shuffled);
            prop_assert_eq!(a.confusion, b.confusion);
            prop_assert_eq!(a.accuracy, b.accuracy);
        }
    }
}
