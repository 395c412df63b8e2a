// ============================================================
// Layer 5 — Feed-Frame Builder
// ============================================================
// Turns a batch (or a single warm-start/generation step) into a
// FeedFrame that matches the negotiated RunShape.
//
// Fields the caller leaves out are filled, never dropped:
//   labels      → zeros (batch × label_len)
//   metadata    → zeros (batch × meta_width) if the model reads it,
//                 Slot::Unused otherwise
//   state       → all-zero state if the model is stateful,
//                 Slot::Unused otherwise
//   lengths     → [input_len] * rows
//
// Anything supplied with the wrong shape is a ConfigMismatch.
// Nothing is truncated or padded to make it fit.

use crate::application::run_config::RunShape;
use crate::domain::error::EngineError;
use crate::domain::frame::{FeedFrame, SeqLengths, Slot};
use crate::domain::state::RecurrentState;
use crate::domain::traits::Capabilities;

/// The raw pieces of one step, before shaping.
#[derive(Debug, Clone, Default)]
pub struct FrameRequest {
    pub inputs:         Vec<Vec<u32>>,
    pub labels:         Option<Vec<Vec<u32>>>,
    pub metadata:       Option<Vec<Vec<f32>>>,
    pub state:          Option<RecurrentState>,
    pub apply_metadata: bool,
    pub lengths:        Option<SeqLengths>,
}

impl FrameRequest {
    pub fn new(inputs: Vec<Vec<u32>>) -> Self {
        Self { inputs, ..Self::default() }
    }

    pub fn labels(mut self, labels: Vec<Vec<u32>>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn metadata(mut self, metadata: Vec<Vec<f32>>, apply: bool) -> Self {
        self.metadata       = Some(metadata);
        self.apply_metadata = apply;
        self
    }

    pub fn state(mut self, state: RecurrentState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn lengths(mut self, lengths: SeqLengths) -> Self {
        self.lengths = Some(lengths);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrameBuilder {
    shape: RunShape,
    caps:  Capabilities,
}

impl FrameBuilder {
    pub fn new(shape: RunShape, caps: Capabilities) -> Self {
        Self { shape, caps }
    }

    pub fn shape(&self) -> &RunShape {
        &self.shape
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn build(&self, req: FrameRequest) -> Result<FeedFrame, EngineError> {
        let shape = &self.shape;
        let rows  = req.inputs.len();

        // Only the final batch of a file may come up short.
        if rows == 0 || rows > shape.batch_size {
            return Err(EngineError::mismatch("batch_size", shape.batch_size, rows));
        }
        check_rows("window_length", &req.inputs, shape.input_len)?;

        let labels = match req.labels {
            Some(labels) => {
                expect_len("label_rows", rows, labels.len())?;
                check_rows("label_length", &labels, shape.label_len)?;
                labels
            }
            None => vec![vec![0; shape.label_len]; rows],
        };

        let metadata = match (self.caps.consumes_metadata, req.metadata) {
            (true, Some(meta)) => {
                expect_len("metadata_rows", rows, meta.len())?;
                check_rows("meta_width", &meta, shape.meta_width)?;
                Slot::Used(meta)
            }
            (true, None) => Slot::Used(vec![vec![0.0; shape.meta_width]; rows]),
            (false, Some(meta)) => {
                let width = meta.first().map_or(0, Vec::len);
                return Err(EngineError::mismatch("meta_width", 0, width));
            }
            (false, None) => Slot::Unused,
        };

        let initial_state = match (self.caps.stateful, req.state) {
            (true, Some(state)) => {
                self.check_state(&state, rows)?;
                Slot::Used(state)
            }
            (true, None) => Slot::Used(RecurrentState::zeros(
                shape.layered,
                shape.layers,
                rows,
                shape.hidden,
            )),
            (false, Some(state)) => {
                return Err(EngineError::mismatch("state_layers", 0, state.layer_count()));
            }
            (false, None) => Slot::Unused,
        };

        let lengths = match req.lengths {
            Some(lengths) => {
                if !self.caps.supports_encoder_decoder {
                    return Err(EngineError::mismatch("encoder_lengths", 0, lengths.encoder.len()));
                }
                expect_len("encoder_lengths", rows, lengths.encoder.len())?;
                expect_len("decoder_lengths", rows, lengths.decoder.len())?;
                if let Some(&too_long) = lengths.encoder.iter().find(|&&l| l > shape.input_len) {
                    return Err(EngineError::mismatch("encoder_length", shape.input_len, too_long));
                }
                lengths
            }
            None => SeqLengths::fixed(shape.input_len, rows),
        };

        Ok(FeedFrame {
            inputs: req.inputs,
            labels,
            metadata,
            initial_state,
            apply_metadata: req.apply_metadata && self.caps.consumes_metadata,
            lengths,
        })
    }

    fn check_state(&self, state: &RecurrentState, rows: usize) -> Result<(), EngineError> {
        let shape = &self.shape;
        if state.is_layered() != shape.layered {
            return Err(EngineError::mismatch(
                "state_layered",
                shape.layered as usize,
                state.is_layered() as usize,
            ));
        }
        expect_len("state_layers", shape.layers, state.layer_count())?;
        for layer in state.layers() {
            expect_len("state_batch", rows, layer.len())?;
            check_rows("hidden_width", layer, shape.hidden)?;
        }
        Ok(())
    }
}

fn expect_len(field: &'static str, expected: usize, found: usize) -> Result<(), EngineError> {
    if expected == found {
        Ok(())
    } else {
        Err(EngineError::mismatch(field, expected, found))
    }
}

fn check_rows<T>(field: &'static str, rows: &[Vec<T>], width: usize) -> Result<(), EngineError> {
    match rows.iter().find(|r| r.len() != width) {
        Some(bad) => Err(EngineError::mismatch(field, width, bad.len())),
        None      => Ok(()),
    }
}
