// ============================================================
// Layer 4 — Dataset Reader
// ============================================================
// Reads one split of the pre-tokenized dataset from disk.
//
// Layout:
//   data/
//     vocab.json          ← {"symbol": id, ...}
//     meta_map.json       ← per-field category tables
//     train/
//       tune_000.json     ← [ {"meta": [...], "input": [...], "output": [...]}, ... ]
//       tune_001.json
//     dev/ ...
//     test/ ...
//
// Each *.json file in a split directory is one source file.
// Unlike a best-effort loader, a bad file stops the run: a record
// silently skipped here would quietly skew the epoch metrics.

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::EngineError;
use crate::domain::record::Record;
use crate::domain::traits::RecordSource;

/// Serves the records of one split directory.
pub struct DatasetReader {
    dir: PathBuf,
}

impl DatasetReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordSource for DatasetReader {
    fn source_files(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            bail!("Dataset directory '{}' does not exist", self.dir.display());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path.to_string_lossy().into_owned());
            }
        }
        // Directory order is platform dependent; shuffling is the only
        // intended source of order variation.
        files.sort();
        tracing::info!("Found {} source files in '{}'", files.len(), self.dir.display());
        Ok(files)
    }

    fn read_records(&self, source: &str) -> Result<Vec<Record>> {
        let bytes = fs::read(source).with_context(|| format!("Cannot read '{source}'"))?;
        let records: Vec<Record> = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::malformed(source, 0, e.to_string()))?;

        if let Some(first) = records.first() {
            let (win, lab) = (first.input.len(), first.output.len());
            for (i, r) in records.iter().enumerate() {
                if r.input.len() != win || r.output.len() != lab {
                    return Err(EngineError::malformed(
                        source,
                        i,
                        format!(
                            "windows {}/{} differ from the file's {}/{}",
                            r.input.len(),
                            r.output.len(),
                            win,
                            lab
                        ),
                    )
                    .into());
                }
            }
        }
        tracing::debug!("Read {} records from '{}'", records.len(), source);
        Ok(records)
    }
}

/// Load the dataset's symbol → id map.
pub fn load_symbol_map(path: impl AsRef<Path>) -> Result<HashMap<String, u32>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read vocabulary '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Vocabulary '{}' is not a symbol → id map", path.display()))
}
