// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// engine works with. No file I/O, no model internals.
//
//   record      — dataset records and batches
//   vocabulary  — symbol ↔ id map with reserved tokens
//   frame       — the uniform model-call contract
//   state       — recurrent hidden state shapes
//   confusion   — vocabulary × vocabulary counts
//   traits      — model / dataset / metadata collaborators
//   error       — the engine's error taxonomy

pub mod confusion;
pub mod error;
pub mod frame;
pub mod record;
pub mod state;
pub mod traits;
pub mod vocabulary;
