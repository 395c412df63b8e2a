// ============================================================
// Layer 2 — SampleUseCase
// ============================================================
// Generates new tunes from a trained model:
//
//   Step 1: Lock checkpoint dir, reload the saved model shape;
//           no checkpoint means no sampling
//   Step 2: Draw warm starts from the dev split, or one warm
//           start plus its metadata variations
//   Step 3: One sampling session per warm start
//   Step 4: Decode token ids back to symbols

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::application::eval_use_case::open_trained;
use crate::application::run_config::RunConfig;
use crate::application::train_use_case::load_vocabulary_and_meta;
use crate::data::reader::DatasetReader;
use crate::data::warm_start::{pick_warm_starts, vary_meta};
use crate::domain::traits::{Capabilities, RecordSource};
use crate::ml::generator::StopReason;
use crate::ml::reference_model::CountModel;
use crate::ml::trainer::Orchestrator;

/// One generated tune, as symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTune {
    /// Encoded metadata the session was primed with.
    pub meta:   Vec<f32>,
    pub warm:   Vec<String>,
    pub tokens: Vec<String>,
    pub stop:   Option<StopReason>,
}

impl GeneratedTune {
    /// Warm start followed by the generated continuation.
    pub fn text(&self) -> String {
        self.warm.iter().chain(&self.tokens).map(String::as_str).collect()
    }
}

pub struct SampleUseCase {
    config: RunConfig,
}

impl SampleUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<GeneratedTune>> {
        // ── Step 1: Trained model ────────────────────────────────────────────
        let (checkpoints, cfg) = open_trained(&self.config)?;
        let (vocab, meta) = load_vocabulary_and_meta(&cfg)?;

        // ── Step 2: Warm starts ──────────────────────────────────────────────
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };
        let reader = DatasetReader::new(cfg.split_dir());
        let mut records = Vec::new();
        for file in reader.source_files()? {
            records.extend(reader.read_records(&file)?);
        }
        let starts = if cfg.meta_edits.is_empty() {
            pick_warm_starts(&records, cfg.effective_warm_len(), cfg.sessions, &mut rng)?
        } else {
            if !Capabilities::for_variant(cfg.variant, cfg.cell).consumes_metadata {
                tracing::warn!(
                    "The {} model ignores metadata; variations will differ only by chance",
                    cfg.variant
                );
            }
            let base = pick_warm_starts(&records, cfg.effective_warm_len(), 1, &mut rng)?;
            let mut starts = Vec::new();
            for start in &base {
                starts.extend(vary_meta(start, &cfg.meta_edits)?);
            }
            tracing::info!(
                "Sampling one warm start under {} metadata variation(s)",
                cfg.meta_edits.len()
            );
            starts
        };

        // ── Step 3: Sampling sessions ────────────────────────────────────────
        let mut model = CountModel::create_model(&cfg, &vocab, false);
        let mut orchestrator = Orchestrator::init(&cfg, &vocab, &meta, &mut model)?;
        let sessions = orchestrator.sample(&checkpoints, &starts, &mut rng)?;

        // ── Step 4: Decode ───────────────────────────────────────────────────
        Ok(sessions
            .iter()
            .map(|s| GeneratedTune {
                meta:   s.meta.clone(),
                warm:   vocab.decode(&s.warm),
                tokens: vocab.decode(&s.generated),
                stop:   s.stop,
            })
            .collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::eval_use_case::EvalUseCase;
    use crate::domain::error::EngineError;
    use crate::application::run_config::{Mode, Split};
    use crate::application::train_use_case::TrainUseCase;
    use crate::ml::accumulator::AccuracySummary;
    use std::fs;
    use std::path::Path;

    /// A tiny dataset: 4 symbols, one numeric and one categorical
    /// metadata field, windows of 4.
    fn write_dataset(root: &Path) {
        fs::write(root.join("vocab.json"), r#"{"A": 0, "B": 1, "C": 2, "|": 3}"#).unwrap();
        fs::write(root.join("meta_map.json"), r#"[{"G": 0, "D": 1}, {}]"#).unwrap();
        let tunes = r#"[
            {"meta": ["G", 3], "input": [0, 1, 2, 3], "output": [1, 2, 3, 0]},
            {"meta": ["D", 4], "input": [1, 2, 3, 0], "output": [2, 3, 0, 1]},
            {"meta": ["G", 5], "input": [2, 3, 0, 1], "output": [3, 0, 1, 2]}
        ]"#;
        for split in ["train", "dev", "test"] {
            fs::create_dir_all(root.join(split)).unwrap();
            fs::write(root.join(split).join("tunes.json"), tunes).unwrap();
        }
    }

    fn config(root: &Path, mode: Mode) -> RunConfig {
        RunConfig {
            data_dir:       root.to_string_lossy().into_owned(),
            vocab_path:     root.join("vocab.json").to_string_lossy().into_owned(),
            meta_map_path:  root.join("meta_map.json").to_string_lossy().into_owned(),
            checkpoint_dir: root.join("ckpt").to_string_lossy().into_owned(),
            hyperparam_log: root.join("hyperparams.txt").to_string_lossy().into_owned(),
            mode,
            batch_size:     2,
            window_len:     4,
            label_len:      4,
            hidden_size:    3,
            num_epochs:     2,
            warm_len:       2,
            max_len:        10,
            sessions:       2,
            seed:           Some(3),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_train_eval_sample_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let report = TrainUseCase::new(config(dir.path(), Mode::Train)).execute().unwrap();
        assert_eq!(report.epochs_run(), 2);
        assert!(dir.path().join("ckpt").join("confusion").join("confusion_1_removed.json").exists());

        let summary = EvalUseCase::new(config(dir.path(), Mode::Eval(Split::Test)))
            .execute()
            .unwrap();
        assert!(matches!(summary.accuracy, AccuracySummary::Mean(_)));
        let log = fs::read_to_string(dir.path().join("hyperparams.txt")).unwrap();
        assert!(log.starts_with("test set accuracy: "));

        let tunes = SampleUseCase::new(config(dir.path(), Mode::Sample)).execute().unwrap();
        assert_eq!(tunes.len(), 2);
        for tune in &tunes {
            assert_eq!(tune.warm.len(), 2);
            assert!(!tune.tokens.is_empty() && tune.tokens.len() <= 10);
        }
    }

    #[test]
    fn test_resume_with_different_model_shape_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        TrainUseCase::new(config(dir.path(), Mode::Train)).execute().unwrap();
        let saved = fs::read_to_string(dir.path().join("ckpt").join("run_config.json")).unwrap();

        let reshaped = RunConfig {
            hidden_size: 9,
            num_layers:  4,
            num_epochs:  3,
            ..config(dir.path(), Mode::Train)
        };
        let err = TrainUseCase::new(reshaped).execute().unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::mismatch("hidden_size", 3, 9))
        );
        let after = fs::read_to_string(dir.path().join("ckpt").join("run_config.json")).unwrap();
        assert_eq!(after, saved);

        let longer = RunConfig { num_epochs: 3, ..config(dir.path(), Mode::Train) };
        let report = TrainUseCase::new(longer).execute().unwrap();
        assert_eq!(report.start_epoch, 2);
        assert_eq!(report.epochs_run(), 1);
    }

    #[test]
    fn test_metadata_variations_share_one_warm_start() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        TrainUseCase::new(config(dir.path(), Mode::Train)).execute().unwrap();

        let varied = RunConfig {
            meta_edits: vec!["0=D".parse().unwrap(), "1=30".parse().unwrap()],
            ..config(dir.path(), Mode::Sample)
        };
        let tunes = SampleUseCase::new(varied).execute().unwrap();
        assert_eq!(tunes.len(), 3);
        assert!(tunes.iter().all(|t| t.warm == tunes[0].warm));
        assert_eq!(tunes[1].meta[0], 1.0);
        assert_eq!(tunes[2].meta[1], 30.0);
        assert_eq!(tunes[2].meta[0], tunes[0].meta[0]);

        let bad = RunConfig {
            meta_edits: vec!["5=1".parse().unwrap()],
            ..config(dir.path(), Mode::Sample)
        };
        assert!(SampleUseCase::new(bad).execute().is_err());
    }

    #[test]
    fn test_sampling_an_untrained_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let err = SampleUseCase::new(config(dir.path(), Mode::Sample)).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingCheckpoint { .. })
        ));
    }

    #[test]
    fn test_evaluating_an_untrained_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let err = EvalUseCase::new(config(dir.path(), Mode::Eval(Split::Dev)))
            .execute()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingCheckpoint { .. })
        ));
    }
}
