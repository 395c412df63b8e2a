// ============================================================
// Layer 3 — Feed Frame
// ============================================================
// The single call contract handed to the model for one step.
// Every model variant receives the same shape; fields a variant
// does not consume are present as `Slot::Unused` rather than
// missing, so the model never has to guess what was omitted.
//
//   inputs           batch × input_len token ids
//   labels           batch × label_len token ids (zeros when sampling)
//   metadata         batch × meta_width, or Unused (bag-of-context)
//   initial_state    zero or threaded state, or Unused (bag-of-context)
//   apply_metadata   whether the model should condition on metadata now
//   encoder_lengths  per-row encoder length
//   decoder_lengths  per-row decoder length

use crate::domain::state::RecurrentState;

/// A frame field that is either in use or explicitly unused.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Used(T),
    Unused,
}

impl<T> Slot<T> {
    #[cfg(test)]
    pub fn as_used(&self) -> Option<&T> {
        match self {
            Slot::Used(v) => Some(v),
            Slot::Unused  => None,
        }
    }
}

/// Encoder/decoder lengths, one entry per batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqLengths {
    pub encoder: Vec<usize>,
    pub decoder: Vec<usize>,
}

impl SeqLengths {
    /// Fixed-window lengths: `[window] * rows` for both sides.
    pub fn fixed(window: usize, rows: usize) -> Self {
        Self {
            encoder: vec![window; rows],
            decoder: vec![window; rows],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedFrame {
    pub inputs:         Vec<Vec<u32>>,
    pub labels:         Vec<Vec<u32>>,
    pub metadata:       Slot<Vec<Vec<f32>>>,
    pub initial_state:  Slot<RecurrentState>,
    pub apply_metadata: bool,
    pub lengths:        SeqLengths,
}

impl FeedFrame {
    /// Number of rows in this frame.
    pub fn rows(&self) -> usize {
        self.inputs.len()
    }
}
