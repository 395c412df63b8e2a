// ============================================================
// Layer 5 — Hidden-State Threader
// ============================================================
// Owns the recurrent state of ONE sequence (a sampling session
// or a training batch). Lifecycle:
//
//   begin_sequence()   → state = zeros(layers × batch × hidden)
//   current()          → the state to feed into the next step
//   advance(returned)  → state replaced wholesale by what the model
//                        returned; layered cells contribute only
//                        their visible output
//
// A threader is never shared: every session/batch constructs its
// own, so state from one sequence cannot leak into another.

use crate::application::run_config::RunShape;
use crate::domain::error::EngineError;
use crate::domain::state::{RecurrentState, ReturnedState};

#[derive(Debug)]
pub struct StateThreader {
    layered: bool,
    layers:  usize,
    batch:   usize,
    hidden:  usize,
    state:   RecurrentState,
    steps:   usize,
}

impl StateThreader {
    /// A threader for `batch` rows, starting from a zero state.
    pub fn new(shape: &RunShape, batch: usize) -> Self {
        let state = RecurrentState::zeros(shape.layered, shape.layers, batch, shape.hidden);
        Self {
            layered: shape.layered,
            layers:  shape.layers,
            batch,
            hidden:  shape.hidden,
            state,
            steps:   0,
        }
    }

    /// Reset to all-zero for the first step of a new sequence.
    pub fn begin_sequence(&mut self) -> &RecurrentState {
        self.state = RecurrentState::zeros(self.layered, self.layers, self.batch, self.hidden);
        self.steps = 0;
        &self.state
    }

    pub fn current(&self) -> &RecurrentState {
        &self.state
    }

    /// Steps advanced since the sequence began.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Replace the state with the model's output for the previous step.
    pub fn advance(&mut self, returned: ReturnedState) -> Result<(), EngineError> {
        let next = returned.into_feed();
        if next.is_layered() != self.layered {
            return Err(EngineError::mismatch(
                "state_layered",
                self.layered as usize,
                next.is_layered() as usize,
            ));
        }
        if next.layer_count() != self.layers {
            return Err(EngineError::mismatch("state_layers", self.layers, next.layer_count()));
        }
        for rows in next.layers() {
            if rows.len() != self.batch {
                return Err(EngineError::mismatch("state_batch", self.batch, rows.len()));
            }
            if let Some(bad) = rows.iter().find(|r| r.len() != self.hidden) {
                return Err(EngineError::mismatch("hidden_width", self.hidden, bad.len()));
            }
        }
        self.state = next;
        self.steps += 1;
        Ok(())
    }
}
