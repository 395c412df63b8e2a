// ============================================================
// Layer 3 — Recurrent State
// ============================================================
// Two shapes of hidden state travel between steps:
//
//   Layered (LSTM-style memory cells)
//     fed in:    layers × batch × hidden   (visible outputs)
//     returned:  one LayerState per layer, each holding the
//                visible output AND the internal accumulator
//
//   Single (GRU / plain RNN cells)
//     fed in / returned: batch × hidden
//
// Only the visible output of a layered cell is ever fed back.
// The accumulator is carried in the returned value so the
// threading rule is explicit rather than "take element 0".

use serde::{Deserialize, Serialize};

/// batch × hidden
pub type StateRows = Vec<Vec<f32>>;

/// What a memory cell layer hands back after one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    /// The cell's externally visible output; this is what gets fed back.
    pub visible_output: StateRows,
    /// The cell's internal memory; never fed back by the threader.
    pub internal_accumulator: StateRows,
}

/// State as returned by the model after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnedState {
    Layered(Vec<LayerState>),
    Single(StateRows),
}

/// State as fed into the model for a step.
#[derive(Debug, Clone, PartialEq)]
pub enum RecurrentState {
    Layered(Vec<StateRows>),
    Single(StateRows),
}

impl RecurrentState {
    /// All-zero state of the given shape.
    pub fn zeros(layered: bool, layers: usize, batch: usize, hidden: usize) -> Self {
        let rows = || vec![vec![0.0f32; hidden]; batch];
        if layered {
            RecurrentState::Layered((0..layers).map(|_| rows()).collect())
        } else {
            RecurrentState::Single(rows())
        }
    }

    pub fn is_layered(&self) -> bool {
        matches!(self, RecurrentState::Layered(_))
    }

    /// Number of layers (1 for a single-vector state).
    pub fn layer_count(&self) -> usize {
        match self {
            RecurrentState::Layered(layers) => layers.len(),
            RecurrentState::Single(_)       => 1,
        }
    }

    /// Per-layer rows, uniformly viewed.
    pub fn layers(&self) -> Vec<&StateRows> {
        match self {
            RecurrentState::Layered(layers) => layers.iter().collect(),
            RecurrentState::Single(rows)    => vec![rows],
        }
    }

    #[cfg(test)]
    pub fn is_zero(&self) -> bool {
        self.layers()
            .iter()
            .all(|rows| rows.iter().flatten().all(|&x| x == 0.0))
    }
}

impl ReturnedState {
    /// Project a returned state onto what the next step consumes.
    /// For layered cells this keeps each layer's visible output only.
    pub fn into_feed(self) -> RecurrentState {
        match self {
            ReturnedState::Layered(layers) => RecurrentState::Layered(
                layers.into_iter().map(|l| l.visible_output).collect(),
            ),
            ReturnedState::Single(rows) => RecurrentState::Single(rows),
        }
    }
}
