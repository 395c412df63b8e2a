// ============================================================
// Layer 3 — Engine Errors
// ============================================================
// Every failure the engine can name on its own. Pure components
// (frame builder, sampler, state threader, accumulator) return
// these directly; the orchestration layers wrap them in anyhow
// so callers can still downcast and match on the variant.
//
//   ConfigMismatch     — a frame or state disagrees with the
//                        negotiated batch/window/layer shape
//   MissingCheckpoint  — eval/sample run with nothing to load
//   InvalidTemperature — T <= 0 (or not finite)
//   InvalidScores      — empty or non-finite logits
//   EmptyAccumulator   — mean accuracy over zero batches
//   CheckpointWrite    — artifact or manifest write failed
//   CorruptCheckpoint  — artifact fails its length/CRC check
//   CheckpointDirBusy  — another run holds the directory lock
//   MalformedRecord    — a dataset record cannot be used

use std::fmt;
use std::path::PathBuf;

/// Errors raised by the sequence-generation and training engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A shape disagrees with the run's negotiated configuration.
    ConfigMismatch {
        field:    &'static str,
        expected: usize,
        found:    usize,
    },

    /// No usable checkpoint exists for a run that requires one.
    MissingCheckpoint { dir: PathBuf },

    /// Sampling temperature must be finite and strictly positive.
    InvalidTemperature(f64),

    /// The score vector handed to the sampler cannot form a distribution.
    InvalidScores(String),

    /// Mean accuracy was requested but no batch was recorded.
    EmptyAccumulator,

    /// Persisting the checkpoint for `epoch` failed; nothing was published.
    CheckpointWrite { epoch: usize, reason: String },

    /// A published checkpoint artifact does not match its manifest entry.
    CorruptCheckpoint { epoch: usize, reason: String },

    /// The checkpoint directory is locked by another run.
    CheckpointDirBusy { dir: PathBuf },

    /// A dataset record is unusable.
    MalformedRecord {
        source: String,
        index:  usize,
        reason: String,
    },
}

impl EngineError {
    pub fn mismatch(field: &'static str, expected: usize, found: usize) -> Self {
        EngineError::ConfigMismatch { field, expected, found }
    }

    pub fn malformed(source: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        EngineError::MalformedRecord {
            source: source.into(),
            index,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConfigMismatch { field, expected, found } => write!(
                f,
                "config mismatch on {field}: negotiated {expected}, got {found}"
            ),
            EngineError::MissingCheckpoint { dir } => write!(
                f,
                "no valid checkpoint in '{}'; train a model first",
                dir.display()
            ),
            EngineError::InvalidTemperature(t) => {
                write!(f, "temperature must be finite and > 0, got {t}")
            }
            EngineError::InvalidScores(m) => write!(f, "invalid score vector: {m}"),
            EngineError::EmptyAccumulator => write!(f, "no data: zero batches were recorded"),
            EngineError::CheckpointWrite { epoch, reason } => {
                write!(f, "failed to write checkpoint for epoch {epoch}: {reason}")
            }
            EngineError::CorruptCheckpoint { epoch, reason } => {
                write!(f, "checkpoint for epoch {epoch} is corrupt: {reason}")
            }
            EngineError::CheckpointDirBusy { dir } => write!(
                f,
                "checkpoint directory '{}' is in use by another run",
                dir.display()
            ),
            EngineError::MalformedRecord { source, index, reason } => {
                write!(f, "malformed record #{index} in '{source}': {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_field() {
        let e = EngineError::mismatch("batch_size", 100, 7);
        let msg = e.to_string();
        assert!(msg.contains("batch_size"));
        assert!(msg.contains("100"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_empty_accumulator_reads_as_no_data() {
        assert!(EngineError::EmptyAccumulator.to_string().starts_with("no data"));
    }

    #[test]
    fn test_survives_anyhow_round_trip() {
        let err: anyhow::Error = EngineError::InvalidTemperature(0.0).into();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::InvalidTemperature(0.0))
        );
    }
}
