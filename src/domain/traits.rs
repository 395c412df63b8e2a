// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The engine talks to three external collaborators, all through
// traits so any implementation can be plugged in:
//
//   SequenceModel — the network itself (recurrent, encoder-decoder
//                   or bag-of-context). One call per step.
//   RecordSource  — lists the source files of a split and reads
//                   the records out of one file.
//   MetaEncoder   — turns raw tune metadata into numeric vectors.
//
// The orchestrator never branches on a model name. It asks the
// model for its Capabilities and shapes frames accordingly.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::confusion::ConfusionMatrix;
use crate::domain::error::EngineError;
use crate::domain::frame::FeedFrame;
use crate::domain::record::{RawMeta, Record};
use crate::domain::state::ReturnedState;

// ─── Model variants ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Plain recurrent next-token model.
    Char,
    /// Encoder-decoder model.
    Seq2Seq,
    /// Bag-of-context model over a fixed window.
    Cbow,
}

impl ModelVariant {
    pub fn is_encoder_decoder(self) -> bool {
        self == ModelVariant::Seq2Seq
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelVariant::Char    => "char",
            ModelVariant::Seq2Seq => "seq2seq",
            ModelVariant::Cbow    => "cbow",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char"    => Ok(ModelVariant::Char),
            "seq2seq" => Ok(ModelVariant::Seq2Seq),
            "cbow"    => Ok(ModelVariant::Cbow),
            other     => Err(format!("unknown model '{other}' (expected char, seq2seq or cbow)")),
        }
    }
}

/// Recurrent cell family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Lstm,
    Gru,
    Rnn,
}

impl CellKind {
    /// LSTM cells carry a (visible output, internal accumulator) pair per layer.
    pub fn is_layered_memory(self) -> bool {
        self == CellKind::Lstm
    }
}

impl FromStr for CellKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lstm" => Ok(CellKind::Lstm),
            "gru"  => Ok(CellKind::Gru),
            "rnn"  => Ok(CellKind::Rnn),
            other  => Err(format!("unknown cell '{other}' (expected lstm, gru or rnn)")),
        }
    }
}

// ─── Capabilities ─────────────────────────────────────────────────────────────
/// What a model consumes and produces; queried by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// One sample call decodes a whole sequence.
    pub supports_encoder_decoder: bool,
    /// State is one (visible, accumulator) pair per layer.
    pub supports_layered_state:   bool,
    /// The model threads recurrent state at all.
    pub stateful:                 bool,
    /// The model conditions on encoded metadata.
    pub consumes_metadata:        bool,
}

impl Capabilities {
    /// The capability set a standard implementation of `variant` built
    /// on `cell` exposes.
    pub fn for_variant(variant: ModelVariant, cell: CellKind) -> Self {
        match variant {
            ModelVariant::Char | ModelVariant::Seq2Seq => Self {
                supports_encoder_decoder: variant.is_encoder_decoder(),
                supports_layered_state:   cell.is_layered_memory(),
                stateful:                 true,
                consumes_metadata:        true,
            },
            ModelVariant::Cbow => Self {
                supports_encoder_decoder: false,
                supports_layered_state:   false,
                stateful:                 false,
                consumes_metadata:        false,
            },
        }
    }
}

// ─── Step results ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub loss:        f64,
    pub global_step: u64,
}

/// Result of one training/evaluation step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub summary:   StepSummary,
    pub confusion: ConfusionMatrix,
    pub accuracy:  f64,
}

/// Result of one sampling call.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutput {
    /// Next-token scores (rows × vocabulary) plus the state to thread
    /// into the following step, if the model is stateful.
    Step {
        logits: Vec<Vec<f32>>,
        state:  Option<ReturnedState>,
    },
    /// A fully decoded sequence per row (encoder-decoder models).
    Decoded(Vec<Vec<u32>>),
}

// ─── SequenceModel ────────────────────────────────────────────────────────────
/// The network collaborator. Whether a handle trains is fixed when it
/// is created; `run` updates parameters only on training handles.
pub trait SequenceModel {
    fn capabilities(&self) -> Capabilities;

    /// Attach accuracy/confusion outputs. Called once after construction.
    fn attach_metrics(&mut self);

    /// One training or evaluation step over a full frame.
    fn run(&mut self, frame: &FeedFrame) -> Result<StepOutput>;

    /// One generation call.
    fn sample(&mut self, frame: &FeedFrame) -> Result<SampleOutput>;

    /// Serialized parameters plus optimizer progress.
    fn export_parameters(&self) -> Result<Vec<u8>>;

    /// Replace parameters with a previously exported blob.
    fn import_parameters(&mut self, bytes: &[u8]) -> Result<()>;

    /// Number of optimizer steps applied so far.
    fn global_step(&self) -> u64;
}

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can serve the records of one dataset split.
///
/// Implementations:
///   - DatasetReader → JSON files in a split directory
///   - in-memory sources in tests
pub trait RecordSource {
    /// Identifiers of every source file in the split.
    fn source_files(&self) -> Result<Vec<String>>;

    /// All records of one source file, in file order.
    fn read_records(&self, source: &str) -> Result<Vec<Record>>;
}

// ─── MetaEncoder ──────────────────────────────────────────────────────────────
pub trait MetaEncoder {
    /// Width of one encoded metadata vector.
    fn width(&self) -> usize;

    fn encode_meta_batch(&self, raw: &[RawMeta]) -> Result<Vec<Vec<f32>>, EngineError>;
}
