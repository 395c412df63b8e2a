// ============================================================
// Layer 5 — Reference Count Model
// ============================================================
// A small count-based stand-in for the external network so the
// engine can be run end to end. It is NOT a neural network.
//
// Parameters:  transition counts c[prev][next] + global step
// Scores:      log P(next | prev) = ln((c + 1) / (Σ c + V))
//
// Per variant:
//   char     next-token scores from the last fed token, nudged by
//            the recurrent state so threading is observable
//   seq2seq  greedy decode from the last encoder token
//   cbow     mean of the scores of every context token
//
// Recurrent state update per layer l (batch row b, unit k):
//   visible     = tanh(0.5 · fed[l][b][k] + [k == (tok + l) mod H] + m)
//   accumulator = fed[l][b][k] + visible
// where m is 0.01 · mean(metadata) on steps that apply metadata.
//
// Training steps score with the current counts, then add the
// step's (prev, next) pairs. Evaluation handles never update.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::run_config::RunConfig;
use crate::domain::confusion::ConfusionMatrix;
use crate::domain::frame::{FeedFrame, Slot};
use crate::domain::state::{LayerState, RecurrentState, ReturnedState, StateRows};
use crate::domain::traits::{
    Capabilities, ModelVariant, SampleOutput, SequenceModel, StepOutput, StepSummary,
};
use crate::domain::vocabulary::Vocabulary;
use crate::ml::sampler::argmax;

const STATE_WEIGHT: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CountParams {
    vocab_size:  usize,
    counts:      Vec<u64>,
    global_step: u64,
}

#[derive(Debug, Clone)]
pub struct CountModel {
    params:           CountParams,
    variant:          ModelVariant,
    caps:             Capabilities,
    end_token:        u32,
    is_train:         bool,
    metrics_attached: bool,
}

impl CountModel {
    pub fn create_model(cfg: &RunConfig, vocab: &Vocabulary, is_train: bool) -> Self {
        let v = vocab.len();
        Self {
            params: CountParams {
                vocab_size:  v,
                counts:      vec![0; v * v],
                global_step: 0,
            },
            variant:          cfg.variant,
            caps:             Capabilities::for_variant(cfg.variant, cfg.cell),
            end_token:        vocab.end(),
            is_train,
            metrics_attached: false,
        }
    }

    fn vocab_size(&self) -> usize {
        self.params.vocab_size
    }

    fn check_token(&self, token: u32) -> Result<usize> {
        let t = token as usize;
        if t >= self.vocab_size() {
            bail!("token {token} outside vocabulary of {}", self.vocab_size());
        }
        Ok(t)
    }

    fn log_probs(&self, prev: u32) -> Result<Vec<f64>> {
        let v = self.vocab_size();
        let row = &self.params.counts[self.check_token(prev)? * v..][..v];
        let denom = (row.iter().sum::<u64>() + v as u64) as f64;
        Ok(row.iter().map(|&c| ((c + 1) as f64 / denom).ln()).collect())
    }

    /// (prev, target) pairs a frame row trains or scores on.
    fn pairs(&self, input: &[u32], label: &[u32]) -> Vec<(u32, u32)> {
        match self.variant {
            ModelVariant::Seq2Seq => {
                let mut prev = input.last().copied();
                let mut out = Vec::with_capacity(label.len());
                for &target in label {
                    if let Some(p) = prev {
                        out.push((p, target));
                    }
                    prev = Some(target);
                }
                out
            }
            ModelVariant::Char | ModelVariant::Cbow => {
                input.iter().copied().zip(label.iter().copied()).collect()
            }
        }
    }

    fn step_state(
        &self,
        fed:   &RecurrentState,
        row:   usize,
        token: u32,
        meta:  f32,
    ) -> Vec<(Vec<f32>, Vec<f32>)> {
        fed.layers()
            .iter()
            .enumerate()
            .map(|(l, rows)| {
                let prev = &rows[row];
                let hot = (token as usize + l) % prev.len().max(1);
                let visible: Vec<f32> = prev
                    .iter()
                    .enumerate()
                    .map(|(k, &x)| (0.5 * x + if k == hot { 1.0 } else { 0.0 } + meta).tanh())
                    .collect();
                let acc = prev.iter().zip(&visible).map(|(a, b)| a + b).collect();
                (visible, acc)
            })
            .collect()
    }

    fn sample_recurrent(&self, frame: &FeedFrame) -> Result<SampleOutput> {
        let fed = match &frame.initial_state {
            Slot::Used(state) => state,
            Slot::Unused      => bail!("recurrent sampling needs an initial state"),
        };
        let layers = fed.layer_count();
        let mut per_layer: Vec<(StateRows, StateRows)> = vec![(Vec::new(), Vec::new()); layers];
        let mut logits = Vec::with_capacity(frame.rows());

        for (b, input) in frame.inputs.iter().enumerate() {
            let token = *input.last().context("empty input row")?;
            let meta = match (&frame.metadata, frame.apply_metadata) {
                (Slot::Used(m), true) if !m[b].is_empty() => {
                    0.01 * m[b].iter().sum::<f32>() / m[b].len() as f32
                }
                _ => 0.0,
            };
            let next = self.step_state(fed, b, token, meta);
            let top = &next[layers - 1].0;
            let row: Vec<f32> = self
                .log_probs(token)?
                .iter()
                .enumerate()
                .map(|(j, &lp)| lp as f32 + STATE_WEIGHT * top[j % top.len().max(1)])
                .collect();
            logits.push(row);
            for (l, (vis, acc)) in next.into_iter().enumerate() {
                per_layer[l].0.push(vis);
                per_layer[l].1.push(acc);
            }
        }

        let state = if fed.is_layered() {
            ReturnedState::Layered(
                per_layer
                    .into_iter()
                    .map(|(visible_output, internal_accumulator)| LayerState {
                        visible_output,
                        internal_accumulator,
                    })
                    .collect(),
            )
        } else {
            let (visible, _) = per_layer.into_iter().next().context("state has no layer")?;
            ReturnedState::Single(visible)
        };
        Ok(SampleOutput::Step { logits, state: Some(state) })
    }

    fn sample_bag(&self, frame: &FeedFrame) -> Result<SampleOutput> {
        let v = self.vocab_size();
        let mut logits = Vec::with_capacity(frame.rows());
        for input in &frame.inputs {
            if input.is_empty() {
                bail!("empty context window");
            }
            let mut sum = vec![0.0f64; v];
            for &t in input {
                for (s, lp) in sum.iter_mut().zip(self.log_probs(t)?) {
                    *s += lp;
                }
            }
            logits.push(sum.iter().map(|s| (s / input.len() as f64) as f32).collect());
        }
        Ok(SampleOutput::Step { logits, state: None })
    }

    fn decode(&self, frame: &FeedFrame) -> Result<SampleOutput> {
        let mut decoded = Vec::with_capacity(frame.rows());
        for (b, input) in frame.inputs.iter().enumerate() {
            let enc_len = frame.lengths.encoder[b].min(input.len());
            let mut prev = *input[..enc_len].last().context("empty encoder input")?;
            let mut out = Vec::new();
            for _ in 0..frame.lengths.decoder[b] {
                let next = argmax(&self.log_probs(prev)?).context("empty vocabulary")? as u32;
                out.push(next);
                if next == self.end_token {
                    break;
                }
                prev = next;
            }
            decoded.push(out);
        }
        Ok(SampleOutput::Decoded(decoded))
    }
}

impl SequenceModel for CountModel {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn attach_metrics(&mut self) {
        self.metrics_attached = true;
    }

    fn run(&mut self, frame: &FeedFrame) -> Result<StepOutput> {
        if !self.metrics_attached {
            bail!("metrics not attached; call attach_metrics() after construction");
        }
        let mut confusion = ConfusionMatrix::zeros(self.vocab_size());
        let mut seen = Vec::new();
        let mut loss = 0.0;
        let mut correct = 0usize;

        for (input, label) in frame.inputs.iter().zip(&frame.labels) {
            for (prev, target) in self.pairs(input, label) {
                let lp = self.log_probs(prev)?;
                let t = self.check_token(target)?;
                let predicted = argmax(&lp).context("empty vocabulary")? as u32;
                confusion.record(target, predicted)?;
                loss -= lp[t];
                correct += usize::from(predicted == target);
                seen.push((prev as usize, t));
            }
        }

        let total = seen.len();
        if self.is_train {
            let v = self.vocab_size();
            for (p, t) in seen {
                self.params.counts[p * v + t] += 1;
            }
            self.params.global_step += 1;
        }

        let (loss, accuracy) = if total == 0 {
            (0.0, 0.0)
        } else {
            (loss / total as f64, correct as f64 / total as f64)
        };
        Ok(StepOutput {
            summary: StepSummary { loss, global_step: self.params.global_step },
            confusion,
            accuracy,
        })
    }

    fn sample(&mut self, frame: &FeedFrame) -> Result<SampleOutput> {
        if self.caps.supports_encoder_decoder {
            self.decode(frame)
        } else if self.caps.stateful {
            self.sample_recurrent(frame)
        } else {
            self.sample_bag(frame)
        }
    }

    fn export_parameters(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.params)?)
    }

    fn import_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        let params: CountParams =
            serde_json::from_slice(bytes).context("checkpoint is not a count-model record")?;
        if params.vocab_size != self.vocab_size() {
            bail!(
                "checkpoint vocabulary is {} tokens, model expects {}",
                params.vocab_size,
                self.vocab_size()
            );
        }
        if params.counts.len() != params.vocab_size * params.vocab_size {
            bail!("checkpoint count table has {} cells", params.counts.len());
        }
        self.params = params;
        Ok(())
    }

    fn global_step(&self) -> u64 {
        self.params.global_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::SeqLengths;
    use crate::domain::traits::CellKind;
    use std::collections::HashMap;

    fn vocab(variant: ModelVariant) -> Vocabulary {
        let map: HashMap<String, u32> = (0..4).map(|i| (format!("t{i}"), i)).collect();
        Vocabulary::from_symbol_map(&map, variant).unwrap()
    }

    fn model(variant: ModelVariant, is_train: bool) -> CountModel {
        let cfg = RunConfig { variant, cell: CellKind::Lstm, ..RunConfig::default() };
        let mut m = CountModel::create_model(&cfg, &vocab(variant), is_train);
        m.attach_metrics();
        m
    }

    fn frame(inputs: Vec<Vec<u32>>, labels: Vec<Vec<u32>>, state: Slot<RecurrentState>) -> FeedFrame {
        let rows = inputs.len();
        let width = inputs[0].len();
        FeedFrame {
            inputs,
            labels,
            metadata: Slot::Unused,
            initial_state: state,
            apply_metadata: false,
            lengths: SeqLengths::fixed(width, rows),
        }
    }

    #[test]
    fn test_run_requires_attached_metrics() {
        let cfg = RunConfig::default();
        let mut m = CountModel::create_model(&cfg, &vocab(ModelVariant::Char), true);
        assert!(m.run(&frame(vec![vec![0]], vec![vec![1]], Slot::Unused)).is_err());
    }

    #[test]
    fn test_training_learns_transitions() {
        let mut m = model(ModelVariant::Char, true);
        let f = frame(vec![vec![0, 1, 2]], vec![vec![1, 2, 3]], Slot::Unused);
        let first = m.run(&f).unwrap();
        let second = m.run(&f).unwrap();
        assert_eq!(first.confusion.total(), 3);
        assert_eq!(second.accuracy, 1.0);
        assert!(second.summary.loss < first.summary.loss);
        assert_eq!(m.global_step(), 2);
    }

    #[test]
    fn test_eval_handle_never_updates() {
        let mut m = model(ModelVariant::Char, false);
        let f = frame(vec![vec![0, 1]], vec![vec![1, 2]], Slot::Unused);
        let a = m.run(&f).unwrap();
        let b = m.run(&f).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.global_step(), 0);
    }

    #[test]
    fn test_parameters_round_trip() {
        let mut m = model(ModelVariant::Char, true);
        m.run(&frame(vec![vec![0, 1]], vec![vec![1, 2]], Slot::Unused)).unwrap();
        let bytes = m.export_parameters().unwrap();
        let mut other = model(ModelVariant::Char, true);
        other.import_parameters(&bytes).unwrap();
        assert_eq!(other.params, m.params);
    }

    #[test]
    fn test_state_changes_logits() {
        let mut m = model(ModelVariant::Char, false);
        let zero = RecurrentState::zeros(true, 2, 1, 3);
        let out = m.sample(&frame(vec![vec![1]], vec![vec![0]], Slot::Used(zero.clone()))).unwrap();
        let SampleOutput::Step { logits: l0, state: Some(returned) } = out else {
            panic!("expected a recurrent step");
        };
        let fed = returned.into_feed();
        let out = m.sample(&frame(vec![vec![1]], vec![vec![0]], Slot::Used(fed))).unwrap();
        let SampleOutput::Step { logits: l1, .. } = out else {
            panic!("expected a recurrent step");
        };
        assert_ne!(l0, l1);
    }

    #[test]
    fn test_seq2seq_decode_stops_at_length() {
        let mut m = model(ModelVariant::Seq2Seq, false);
        let mut f = frame(vec![vec![0, 1]], vec![vec![6]], Slot::Unused);
        f.lengths = SeqLengths { encoder: vec![2], decoder: vec![4] };
        let SampleOutput::Decoded(rows) = m.sample(&f).unwrap() else {
            panic!("expected decoded output");
        };
        assert!(rows[0].len() <= 4);
    }

    #[test]
    fn test_out_of_vocabulary_token_is_an_error() {
        let mut m = model(ModelVariant::Char, true);
        assert!(m.run(&frame(vec![vec![99]], vec![vec![0]], Slot::Unused)).is_err());
    }
}
