// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Pre-tokenized tunes on disk → shuffled fixed-size batches.
//
//   split dir (*.json)
//       │
//       ▼
//   DatasetReader     → source files, records per file
//       │
//       ▼
//   shuffle           → seeded per-epoch file and record order
//       │
//       ▼
//   into_batches      → fixed-size batches, last one may be short
//
// Metadata encoding and warm-start selection sit beside the
// pipeline; the orchestrator calls them per batch / per session.

/// Split directory reader and vocabulary loading
pub mod reader;

/// Seeded epoch shuffling
pub mod shuffle;

/// Record → batch grouping
pub mod batcher;

/// Categorical metadata → numeric vectors
pub mod meta;

/// Warm-start seeds for sampling
pub mod warm_start;
