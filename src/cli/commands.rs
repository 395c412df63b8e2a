// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands: `train`, `eval` and `sample`.
// Flags shared by all of them live in CommonArgs and are
// flattened into each subcommand.
//
// Every *Args struct converts into a RunConfig, so the
// application layer never sees clap types.

use clap::{Args, Subcommand};

use crate::application::run_config::{Mode, RunConfig, Split};
use crate::data::warm_start::MetaEdit;
use crate::domain::traits::{CellKind, ModelVariant};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model, resuming from the newest checkpoint if any
    Train(TrainArgs),

    /// Report mean accuracy of a trained model on the test or dev split
    Eval(EvalArgs),

    /// Generate tunes from a trained model
    Sample(SampleArgs),
}

/// Paths and model shape, common to every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Model variant: char, seq2seq or cbow
    #[arg(long, default_value = "char")]
    pub model: ModelVariant,

    /// Recurrent cell: lstm (layered memory), gru or rnn
    #[arg(long, default_value = "lstm")]
    pub cell: CellKind,

    /// Dataset root with train/, dev/ and test/ split directories
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Symbol → id map of the dataset
    #[arg(long, default_value = "data/vocab.json")]
    pub vocab: String,

    /// Per-field metadata category tables
    #[arg(long, default_value = "data/meta_map.json")]
    pub meta_map: String,

    /// Checkpoint directory (also holds run_config.json and metrics)
    #[arg(long, default_value = "checkpoints")]
    pub ckpt_dir: String,

    /// Number of training epochs; also the number of checkpoints kept
    #[arg(long, default_value_t = 50)]
    pub num_epochs: usize,

    /// Input window length
    #[arg(long, default_value_t = 25)]
    pub window: usize,

    /// Label window length
    #[arg(long, default_value_t = 25)]
    pub label_len: usize,

    /// Hidden width of each recurrent layer
    #[arg(long, default_value_t = 200)]
    pub hidden: usize,

    /// Number of recurrent layers
    #[arg(long, default_value_t = 2)]
    pub layers: usize,

    /// Seed for shuffling and sampling; unseeded runs are not reproducible
    #[arg(long)]
    pub seed: Option<u64>,
}

impl CommonArgs {
    fn into_config(self, mode: Mode) -> RunConfig {
        RunConfig {
            data_dir:       self.data_dir,
            vocab_path:     self.vocab,
            meta_map_path:  self.meta_map,
            checkpoint_dir: self.ckpt_dir,
            variant:        self.model,
            cell:           self.cell,
            mode,
            num_epochs:     self.num_epochs,
            window_len:     self.window,
            label_len:      self.label_len,
            hidden_size:    self.hidden,
            num_layers:     self.layers,
            seed:           self.seed,
            ..RunConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Records per training step
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,
}

impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        RunConfig {
            batch_size: a.batch_size,
            ..a.common.into_config(Mode::Train)
        }
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Split to score: test or dev
    #[arg(long, default_value = "test")]
    pub split: Split,

    /// Records per evaluation step
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Append-only hyperparameter-selection log
    #[arg(long, default_value = "hyperparam_selection.txt")]
    pub hyperparam_log: String,
}

impl From<EvalArgs> for RunConfig {
    fn from(a: EvalArgs) -> Self {
        RunConfig {
            batch_size:     a.batch_size,
            hyperparam_log: a.hyperparam_log,
            ..a.common.into_config(Mode::Eval(a.split))
        }
    }
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Sampling temperature; must be > 0
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Warm-start length (the bag-of-context model uses --window)
    #[arg(long, default_value_t = 15)]
    pub warm_len: usize,

    /// Maximum number of generated tokens
    #[arg(long, default_value_t = 100)]
    pub max_len: usize,

    /// Decoder length of the seq2seq model
    #[arg(long, default_value_t = 1000)]
    pub decode_len: usize,

    /// Number of tunes to generate
    #[arg(long, default_value_t = 1)]
    pub sessions: usize,

    /// Also sample the first warm start with metadata field FIELD set
    /// to VALUE; repeat for several variations (replaces --sessions)
    #[arg(long = "vary-meta", value_name = "FIELD=VALUE")]
    pub vary_meta: Vec<MetaEdit>,
}

impl From<SampleArgs> for RunConfig {
    fn from(a: SampleArgs) -> Self {
        RunConfig {
            temperature: a.temperature,
            warm_len:    a.warm_len,
            max_len:     a.max_len,
            decode_len:  a.decode_len,
            sessions:    a.sessions,
            meta_edits:  a.vary_meta,
            ..a.common.into_config(Mode::Sample)
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use crate::cli::Cli;
    use super::*;
    use crate::domain::record::MetaValue;
    use clap::Parser;

    fn parse(args: &[&str]) -> RunConfig {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Train(a)  => a.into(),
            Commands::Eval(a)   => a.into(),
            Commands::Sample(a) => a.into(),
        }
    }

    #[test]
    fn test_train_flags() {
        let cfg = parse(&["abc-rnn", "train", "--model", "seq2seq", "--cell", "gru", "--num-epochs", "5", "--seed", "9"]);
        assert_eq!(cfg.variant, ModelVariant::Seq2Seq);
        assert_eq!(cfg.cell, CellKind::Gru);
        assert_eq!(cfg.num_epochs, 5);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.mode, Mode::Train);
    }

    #[test]
    fn test_eval_split() {
        let cfg = parse(&["abc-rnn", "eval", "--split", "dev", "--hyperparam-log", "h.txt"]);
        assert_eq!(cfg.mode, Mode::Eval(Split::Dev));
        assert_eq!(cfg.hyperparam_log, "h.txt");
    }

    #[test]
    fn test_sample_flags() {
        let cfg = parse(&["abc-rnn", "sample", "--temperature", "0.5", "--sessions", "3"]);
        assert_eq!(cfg.mode, Mode::Sample);
        assert_eq!(cfg.temperature, 0.5);
        assert_eq!(cfg.sessions, 3);
        assert!(cfg.meta_edits.is_empty());
    }

    #[test]
    fn test_repeated_meta_variations() {
        let cfg = parse(&["abc-rnn", "sample", "--vary-meta", "4=1", "--vary-meta", "6=350"]);
        assert_eq!(cfg.meta_edits.len(), 2);
        assert_eq!(cfg.meta_edits[1], MetaEdit { field: 6, value: MetaValue::Number(350.0) });
        assert!(Cli::try_parse_from(["abc-rnn", "sample", "--vary-meta", "six"]).is_err());
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(Cli::try_parse_from(["abc-rnn", "train", "--model", "transformer"]).is_err());
    }
}
