// ============================================================
// Layer 6 — Confusion Export
// ============================================================
// Hands the accumulated confusion matrix to whatever renders it.
// Two JSON reports per label (an epoch index or a split name):
//
//   confusion_<label>_all.json       every vocabulary symbol
//   confusion_<label>_removed.json   excluded symbols' rows and
//                                    columns dropped
//
// Separators and special tokens dominate the counts, so the
// "removed" view is the readable one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::confusion::ConfusionMatrix;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::atomic_write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionReport {
    pub label:   String,
    pub symbols: Vec<String>,
    pub matrix:  Vec<Vec<u64>>,
}

#[derive(Debug, Clone)]
pub struct ConfusionExporter {
    dir:      PathBuf,
    symbols:  Vec<String>,
    excluded: Vec<usize>,
}

impl ConfusionExporter {
    /// Excluded symbols missing from the vocabulary are ignored.
    pub fn new(dir: impl Into<PathBuf>, vocab: &Vocabulary, excluded: &[String]) -> Self {
        let excluded = excluded
            .iter()
            .filter_map(|s| vocab.id_of(s))
            .map(|id| id as usize)
            .collect();
        Self {
            dir: dir.into(),
            symbols: vocab.symbols().to_vec(),
            excluded,
        }
    }

    /// Write both reports for `label`; returns (all, removed) paths.
    pub fn export(&self, label: &str, confusion: &ConfusionMatrix) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let all = ConfusionReport {
            label:   label.to_string(),
            symbols: self.symbols.clone(),
            matrix:  confusion.rows(),
        };
        let kept: Vec<String> = self
            .symbols
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.excluded.contains(i))
            .map(|(_, s)| s.clone())
            .collect();
        let removed = ConfusionReport {
            label:   label.to_string(),
            symbols: kept,
            matrix:  confusion.without(&self.excluded).rows(),
        };

        let all_path = self.dir.join(format!("confusion_{label}_all.json"));
        let removed_path = self.dir.join(format!("confusion_{label}_removed.json"));
        atomic_write(&all_path, &serde_json::to_vec(&all)?)?;
        atomic_write(&removed_path, &serde_json::to_vec(&removed)?)?;
        tracing::debug!("Exported confusion matrices for '{}'", label);
        Ok((all_path, removed_path))
    }
}
