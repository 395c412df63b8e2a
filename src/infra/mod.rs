// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches persistent files:
//
//   checkpoint.rs       — per-epoch model checkpoints behind a
//                         manifest, plus the saved run config
//   metrics.rs          — metrics CSV and the hyperparameter-
//                         selection accuracy log
//   confusion_export.rs — confusion matrices as JSON for plotting

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Epoch metrics CSV and accuracy log
pub mod metrics;

/// Confusion matrix reports
pub mod confusion_export;
