// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// One explicit object describing a run. It is built from the
// CLI arguments, passed by reference into every component, and
// saved next to the checkpoints so eval/sample runs can rebuild
// an identically shaped model.
//
// negotiate() turns the configuration plus the model's
// capabilities into the concrete RunShape every frame must match:
//
//   mode     variant        batch   input_len   label_len
//   ─────    ───────        ─────   ─────────   ─────────
//   train/   any            B       window      label_len
//   eval
//   sample   char           1       1           1
//   sample   seq2seq        1       warm_len    1   (<go>)
//   sample   cbow           1       window      window

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::warm_start::MetaEdit;
use crate::domain::error::EngineError;
use crate::domain::traits::{Capabilities, CellKind, ModelVariant};

// ─── Mode ─────────────────────────────────────────────────────────────────────

/// Held-out evaluation split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Test,
    Dev,
}

impl Split {
    pub fn name(self) -> &'static str {
        match self {
            Split::Test => "test",
            Split::Dev  => "dev",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "test" => Ok(Split::Test),
            "dev"  => Ok(Split::Dev),
            other  => Err(format!("unknown split '{other}' (expected test or dev)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval(Split),
    Sample,
}

impl Mode {
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }

    pub fn is_sample(self) -> bool {
        self == Mode::Sample
    }
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub data_dir:         String,
    pub vocab_path:       String,
    pub meta_map_path:    String,
    pub checkpoint_dir:   String,
    pub hyperparam_log:   String,
    pub variant:          ModelVariant,
    pub cell:             CellKind,
    pub mode:             Mode,
    pub batch_size:       usize,
    pub window_len:       usize,
    pub label_len:        usize,
    pub hidden_size:      usize,
    pub num_layers:       usize,
    pub meta_width:       usize,
    pub num_epochs:       usize,
    pub temperature:      f64,
    pub warm_len:         usize,
    pub max_len:          usize,
    pub decode_len:       usize,
    pub sessions:         usize,
    /// Sample one warm start under each of these metadata edits.
    #[serde(default)]
    pub meta_edits:       Vec<MetaEdit>,
    pub seed:             Option<u64>,
    pub excluded_symbols: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir:         "data".to_string(),
            vocab_path:       "data/vocab.json".to_string(),
            meta_map_path:    "data/meta_map.json".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            hyperparam_log:   "hyperparam_selection.txt".to_string(),
            variant:          ModelVariant::Char,
            cell:             CellKind::Lstm,
            mode:             Mode::Train,
            batch_size:       100,
            window_len:       25,
            label_len:        25,
            hidden_size:      200,
            num_layers:       2,
            meta_width:       7,
            num_epochs:       50,
            temperature:      1.0,
            warm_len:         15,
            max_len:          100,
            decode_len:       1000,
            sessions:         1,
            meta_edits:       Vec::new(),
            seed:             None,
            excluded_symbols: vec!["|".to_string(), "2".to_string(), "<end>".to_string()],
        }
    }
}

/// The concrete shape every frame of a run must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunShape {
    pub batch_size: usize,
    pub input_len:  usize,
    pub label_len:  usize,
    pub layered:    bool,
    pub layers:     usize,
    pub hidden:     usize,
    pub meta_width: usize,
    pub decode_len: usize,
}

impl RunConfig {
    /// Reject configurations no run could use.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size",  self.batch_size),
            ("window_len",  self.window_len),
            ("label_len",   self.label_len),
            ("hidden_size", self.hidden_size),
            ("num_layers",  self.num_layers),
            ("warm_len",    self.warm_len),
            ("max_len",     self.max_len),
            ("decode_len",  self.decode_len),
            ("sessions",    self.sessions),
        ];
        for (name, value) in positive {
            if value == 0 {
                bail!("{name} must be at least 1");
            }
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(EngineError::InvalidTemperature(self.temperature).into());
        }
        Ok(())
    }

    /// Length of the warm-start seed: the bag-of-context model is primed
    /// with a full window, the recurrent models with `warm_len` tokens.
    pub fn effective_warm_len(&self) -> usize {
        match self.variant {
            ModelVariant::Cbow => self.window_len,
            _                  => self.warm_len,
        }
    }

    /// Split directory this run reads: training data for training,
    /// the chosen split for evaluation, dev data for warm starts.
    pub fn split_dir(&self) -> PathBuf {
        let split = match self.mode {
            Mode::Train       => "train",
            Mode::Eval(split) => split.name(),
            Mode::Sample      => Split::Dev.name(),
        };
        Path::new(&self.data_dir).join(split)
    }

    /// Merge a config saved by training with this one: the model's
    /// shape comes from `saved`, everything about the current run
    /// (mode, paths, batch size, sampling knobs) from `self`.
    pub fn with_model_from(&self, saved: &RunConfig) -> RunConfig {
        RunConfig {
            variant:     saved.variant,
            cell:        saved.cell,
            window_len:  saved.window_len,
            label_len:   saved.label_len,
            hidden_size: saved.hidden_size,
            num_layers:  saved.num_layers,
            meta_width:  saved.meta_width,
            num_epochs:  saved.num_epochs,
            ..self.clone()
        }
    }

    /// Fails when `self` would build a differently shaped model than the
    /// one `saved` describes. Run-level settings may differ freely.
    pub fn check_same_model(&self, saved: &RunConfig) -> Result<(), EngineError> {
        let fields = [
            ("variant",     saved.variant as usize, self.variant as usize),
            ("cell",        saved.cell as usize,    self.cell as usize),
            ("window_len",  saved.window_len,       self.window_len),
            ("label_len",   saved.label_len,        self.label_len),
            ("hidden_size", saved.hidden_size,      self.hidden_size),
            ("num_layers",  saved.num_layers,       self.num_layers),
            ("meta_width",  saved.meta_width,       self.meta_width),
        ];
        match fields.into_iter().find(|&(_, expected, found)| expected != found) {
            Some((field, expected, found)) => Err(EngineError::mismatch(field, expected, found)),
            None => Ok(()),
        }
    }

    pub fn negotiate(&self, caps: Capabilities) -> RunShape {
        let sampling = self.mode.is_sample();

        let (batch_size, input_len, label_len) = if !sampling {
            (self.batch_size, self.window_len, self.label_len)
        } else if caps.supports_encoder_decoder {
            (1, self.warm_len, 1)
        } else if caps.stateful {
            (1, 1, 1)
        } else {
            (1, self.window_len, self.window_len)
        };

        let layered = caps.supports_layered_state;
        RunShape {
            batch_size,
            input_len,
            label_len,
            layered,
            layers: if layered { self.num_layers } else { 1 },
            hidden: self.hidden_size,
            meta_width: self.meta_width,
            decode_len: self.decode_len,
        }
    }
}
