// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Wires the training pipeline together:
//
//   Step 1: Load vocabulary + metadata map   (Layer 4 - data)
//   Step 2: Open + lock checkpoint dir       (Layer 6 - infra)
//   Step 3: Check + save run config          (Layer 6 - infra)
//   Step 4: Build model and reporters        (Layer 5 / 6)
//   Step 5: Run the epoch loop               (Layer 5 - ml)

use anyhow::{Context, Result};
use std::path::Path;

use crate::application::run_config::RunConfig;
use crate::data::meta::MetaTable;
use crate::data::reader::{load_symbol_map, DatasetReader};
use crate::domain::traits::{Capabilities, MetaEncoder};
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::confusion_export::ConfusionExporter;
use crate::infra::metrics::MetricsLogger;
use crate::ml::reference_model::CountModel;
use crate::ml::trainer::{Orchestrator, Reporters, TrainReport};

/// Vocabulary plus metadata tables for `cfg`. A model that ignores
/// metadata gets an empty table when the map file is absent.
pub(crate) fn load_vocabulary_and_meta(cfg: &RunConfig) -> Result<(Vocabulary, MetaTable)> {
    let map   = load_symbol_map(&cfg.vocab_path)?;
    let vocab = Vocabulary::from_symbol_map(&map, cfg.variant)?;
    tracing::info!("Vocabulary: {} symbols + reserved tokens = {}", map.len(), vocab.len());

    let caps = Capabilities::for_variant(cfg.variant, cfg.cell);
    let meta = if caps.consumes_metadata || Path::new(&cfg.meta_map_path).exists() {
        MetaTable::load(&cfg.meta_map_path)?
    } else {
        MetaTable::default()
    };
    Ok((vocab, meta))
}

/// Reporters writing next to the checkpoints.
pub(crate) fn file_reporters(cfg: &RunConfig, vocab: &Vocabulary) -> Result<Reporters> {
    Ok(Reporters {
        metrics:      Some(MetricsLogger::new(&cfg.checkpoint_dir)?),
        confusion:    Some(ConfusionExporter::new(
            Path::new(&cfg.checkpoint_dir).join("confusion"),
            vocab,
            &cfg.excluded_symbols,
        )),
        accuracy_log: None,
    })
}

pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let mut cfg = self.config.clone();
        cfg.validate()?;

        // ── Step 1: Vocabulary + metadata ─────────────────────────────────────
        let (vocab, meta) = load_vocabulary_and_meta(&cfg)?;
        if Capabilities::for_variant(cfg.variant, cfg.cell).consumes_metadata {
            cfg.meta_width = meta.width();
        }

        // ── Step 2-3: Checkpoint dir + config ─────────────────────────────────
        // Keep one checkpoint per configured epoch.
        let checkpoints = CheckpointManager::open(&cfg.checkpoint_dir, cfg.num_epochs)?;
        if !checkpoints.epochs()?.is_empty() {
            // Resuming: the checkpoints were trained with the saved shape.
            let saved = checkpoints
                .load_config()
                .context("Cannot verify the model shape of the run being resumed")?;
            cfg.check_same_model(&saved)?;
        }
        checkpoints.save_config(&cfg)?;

        // ── Step 4: Model + reporters ─────────────────────────────────────────
        let reader    = DatasetReader::new(cfg.split_dir());
        let reporters = file_reporters(&cfg, &vocab)?;
        let mut model = CountModel::create_model(&cfg, &vocab, true);

        // ── Step 5: Epoch loop ────────────────────────────────────────────────
        let mut orchestrator = Orchestrator::init(&cfg, &vocab, &meta, &mut model)?;
        let report = orchestrator.train(&reader, &checkpoints, &reporters)?;
        tracing::info!(
            "Training finished: {} epoch(s) run, starting at epoch {}",
            report.epochs_run(),
            report.start_epoch
        );
        Ok(report)
    }
}
