// ============================================================
// Layer 5 — Sequence Engine
// ============================================================
// Everything between a batch of records and the model call,
// and everything between the model's scores and the next token.
// The network itself is an external collaborator reached only
// through the SequenceModel trait.
//
//   frame_builder.rs   — shapes batches / single steps into FeedFrames
//   sampler.rs         — temperature soft-max sampling
//   state_threader.rs  — owns recurrent state for one sequence
//   accumulator.rs     — epoch confusion / accuracy totals
//   generator.rs       — warm start + autoregressive decode loop
//   trainer.rs         — the train / eval / sample orchestrator
//   reference_model.rs — count-based stand-in for the network

pub mod accumulator;
pub mod frame_builder;
pub mod generator;
pub mod reference_model;
pub mod sampler;
pub mod state_threader;
pub mod trainer;

#[cfg(test)]
pub mod testing;
