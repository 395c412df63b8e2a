// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per command. Each loads what its run needs,
// builds the model and hands control to the orchestrator.
//
// Rules for this layer:
//   - No sampling or metrics math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

/// The explicit run configuration and shape negotiation
pub mod run_config;

/// Train (or resume training) a model
pub mod train_use_case;

/// Score a trained model on the test / dev split
pub mod eval_use_case;

/// Generate tunes from a trained model
pub mod sample_use_case;
