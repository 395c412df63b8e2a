// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores a trained model on the test or dev split:
//
//   Step 1: Lock checkpoint dir, reload the saved model shape;
//           no checkpoint means no evaluation
//   Step 2: Load vocabulary + metadata map
//   Step 3: One pass over the split, restoring the newest checkpoint
//   Step 4: Append "<split> set accuracy: <value>" to the
//           hyperparameter-selection log

use anyhow::Result;

use crate::application::run_config::RunConfig;
use crate::application::train_use_case::{file_reporters, load_vocabulary_and_meta};
use crate::data::reader::DatasetReader;
use crate::domain::error::EngineError;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::AccuracyLog;
use crate::ml::accumulator::EpochSummary;
use crate::ml::reference_model::CountModel;
use crate::ml::trainer::Orchestrator;

/// Open the checkpoint dir of a trained model and merge the config
/// training saved there. Without any checkpoint this is fatal.
pub(crate) fn open_trained(cli: &RunConfig) -> Result<(CheckpointManager, RunConfig)> {
    let checkpoints = CheckpointManager::open(&cli.checkpoint_dir, cli.num_epochs)?;
    if checkpoints.epochs()?.is_empty() {
        return Err(EngineError::MissingCheckpoint { dir: checkpoints.dir().to_path_buf() }.into());
    }
    let cfg = match checkpoints.load_config() {
        Ok(saved) => cli.with_model_from(&saved),
        Err(e) => {
            tracing::warn!("{:#}; using command-line model settings", e);
            cli.clone()
        }
    };
    Ok((checkpoints, cfg))
}

pub struct EvalUseCase {
    config: RunConfig,
}

impl EvalUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EpochSummary> {
        let (checkpoints, cfg) = open_trained(&self.config)?;
        let (vocab, meta) = load_vocabulary_and_meta(&cfg)?;

        let reader = DatasetReader::new(cfg.split_dir());
        let mut reporters = file_reporters(&cfg, &vocab)?;
        reporters.accuracy_log = Some(AccuracyLog::new(&cfg.hyperparam_log));

        let mut model = CountModel::create_model(&cfg, &vocab, false);
        let mut orchestrator = Orchestrator::init(&cfg, &vocab, &meta, &mut model)?;
        orchestrator.evaluate(&reader, &checkpoints, &reporters)
    }
}
