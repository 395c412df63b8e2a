// ============================================================
// Layer 5 — Training & Sampling Orchestrator
// ============================================================
// Drives one run through its states:
//
//   INIT ──► RESUME | FRESH ──► EPOCH_LOOP ──► TRAIN_STEP ──► CHECKPOINT ─┐
//                                  ▲                                       │
//                                  └───────────────────────────────────────┘
//   INIT ──► RESUME (required) ──► EVAL_STEP*   ──► accuracy log ──► DONE
//   INIT ──► RESUME (required) ──► SAMPLE_STEP* ──► DONE
//
// INIT negotiates the run shape from the model's capabilities and
// attaches the metrics outputs. Training resumes at the epoch after
// the newest valid checkpoint; evaluation and sampling refuse to run
// without one.
//
// Per training epoch:
//   1. seed the epoch RNG (seed + epoch when a seed is configured)
//   2. shuffle source files, then the records of each file
//   3. batch, encode metadata, build a frame with a fresh zero state
//   4. run the step and fold its confusion increment
//   5. checkpoint, report, reset the accumulator

use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;

use crate::application::run_config::{Mode, RunConfig, RunShape};
use crate::data::batcher::into_batches;
use crate::data::shuffle::{epoch_rng, shuffled};
use crate::data::warm_start::WarmStart;
use crate::domain::error::EngineError;
use crate::domain::record::Batch;
use crate::domain::traits::{MetaEncoder, RecordSource, SequenceModel, StepOutput};
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::confusion_export::ConfusionExporter;
use crate::infra::metrics::{AccuracyLog, EpochMetrics, MetricsLogger};
use crate::ml::accumulator::{EpochSummary, MetricsAccumulator};
use crate::ml::frame_builder::{FrameBuilder, FrameRequest};
use crate::ml::generator::{Generator, SamplingSession};
use crate::ml::sampler::TemperatureSampler;

/// Where epoch and split results are written. Every sink is optional.
#[derive(Debug, Default)]
pub struct Reporters {
    pub metrics:      Option<MetricsLogger>,
    pub confusion:    Option<ConfusionExporter>,
    pub accuracy_log: Option<AccuracyLog>,
}

impl Reporters {
    fn report(&self, epoch: Option<usize>, label: &str, mode: &str, s: &EpochSummary) -> Result<()> {
        if let Some(m) = &self.metrics {
            m.log(&EpochMetrics::new(epoch, mode, s.batches, s.mean_loss, s.accuracy))?;
        }
        if let Some(c) = &self.confusion {
            c.export(label, &s.confusion)?;
        }
        Ok(())
    }
}

/// What a training run did.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// First epoch processed by this run.
    pub start_epoch: usize,
    /// Summary of every epoch processed by this run, in order.
    pub epochs:      Vec<(usize, EpochSummary)>,
}

impl TrainReport {
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }
}

/// Everything a run needs, negotiated once at INIT.
pub struct Orchestrator<'a, M: SequenceModel + ?Sized> {
    cfg:     &'a RunConfig,
    vocab:   &'a Vocabulary,
    encoder: &'a dyn MetaEncoder,
    model:   &'a mut M,
    builder: FrameBuilder,
}

impl<'a, M: SequenceModel + ?Sized> Orchestrator<'a, M> {
    /// INIT: validate, negotiate the shape, attach metrics.
    pub fn init(
        cfg:     &'a RunConfig,
        vocab:   &'a Vocabulary,
        encoder: &'a dyn MetaEncoder,
        model:   &'a mut M,
    ) -> Result<Self> {
        cfg.validate()?;
        let caps  = model.capabilities();
        let shape = cfg.negotiate(caps);
        if caps.consumes_metadata && encoder.width() != shape.meta_width {
            return Err(EngineError::mismatch("meta_width", shape.meta_width, encoder.width()).into());
        }
        model.attach_metrics();
        tracing::info!(
            "Run negotiated: {} / {:?}, batch {}, window {}, {} state layer(s) × {}",
            cfg.variant,
            cfg.mode,
            shape.batch_size,
            shape.input_len,
            shape.layers,
            shape.hidden,
        );
        Ok(Self { cfg, vocab, encoder, model, builder: FrameBuilder::new(shape, caps) })
    }

    pub fn shape(&self) -> &RunShape {
        self.builder.shape()
    }

    // ─── Training ────────────────────────────────────────────────────────────
    pub fn train(
        &mut self,
        source:      &dyn RecordSource,
        checkpoints: &CheckpointManager,
        reporters:   &Reporters,
    ) -> Result<TrainReport> {
        let resume = checkpoints.resume(&mut *self.model)?;
        let start  = resume.next_epoch();
        if resume.found {
            tracing::info!("Resuming after epoch {} at epoch {}", resume.last_completed_epoch, start);
        } else {
            tracing::info!("No checkpoint; training from scratch");
        }

        let mut acc = MetricsAccumulator::new(self.vocab.len(), false);
        let mut report = TrainReport { start_epoch: start, epochs: Vec::new() };

        for epoch in start..self.cfg.num_epochs {
            tracing::info!("Epoch {}/{}", epoch + 1, self.cfg.num_epochs);
            let mut rng = epoch_rng(self.cfg.seed, epoch);
            self.pass(source, Some(&mut rng), &mut acc)?;

            checkpoints.save(epoch, &*self.model)?;
            let summary = acc.epoch_summary();
            tracing::info!(
                "Epoch {} done: {} batches, mean loss {:?}",
                epoch,
                summary.batches,
                summary.mean_loss
            );
            reporters.report(Some(epoch), &epoch.to_string(), "train", &summary)?;
            report.epochs.push((epoch, summary));
            acc.reset();
        }
        Ok(report)
    }

    // ─── Evaluation ──────────────────────────────────────────────────────────
    /// One pass over the split in file order; no checkpointing.
    pub fn evaluate(
        &mut self,
        source:      &dyn RecordSource,
        checkpoints: &CheckpointManager,
        reporters:   &Reporters,
    ) -> Result<EpochSummary> {
        let split = match self.cfg.mode {
            Mode::Eval(split) => split.name(),
            other => anyhow::bail!("evaluate() called in {other:?} mode"),
        };
        checkpoints.require(&mut *self.model)?;

        let mut acc = MetricsAccumulator::new(self.vocab.len(), true);
        self.pass(source, None, &mut acc)?;
        let summary = acc.epoch_summary();

        if let Some(log) = &reporters.accuracy_log {
            log.append(split, summary.accuracy)?;
        }
        reporters.report(None, split, split, &summary)?;
        Ok(summary)
    }

    // ─── Sampling ────────────────────────────────────────────────────────────
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        checkpoints: &CheckpointManager,
        starts:      &[WarmStart],
        rng:         &mut R,
    ) -> Result<Vec<SamplingSession>> {
        checkpoints.require(&mut *self.model)?;
        let sampler = TemperatureSampler::new(self.cfg.temperature)?;
        let generator = Generator::new(
            &self.builder,
            sampler,
            self.vocab.end(),
            self.vocab.go(),
            self.cfg.max_len,
        );

        let mut sessions = Vec::with_capacity(starts.len());
        for (i, start) in starts.iter().enumerate() {
            let meta = if self.builder.capabilities().consumes_metadata {
                self.encoder
                    .encode_meta_batch(std::slice::from_ref(&start.meta))?
                    .pop()
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            tracing::info!("Sampling session {}/{}", i + 1, starts.len());
            let mut session = SamplingSession::new(meta, start.tokens.clone());
            generator.run(&mut *self.model, &mut session, rng)?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    // ─── Shared batch iteration ──────────────────────────────────────────────
    fn pass(
        &mut self,
        source:  &dyn RecordSource,
        mut rng: Option<&mut StdRng>,
        acc:     &mut MetricsAccumulator,
    ) -> Result<()> {
        let mut files = source.source_files()?;
        if let Some(r) = rng.as_deref_mut() {
            files = shuffled(files, r);
        }
        let track_accuracy = !self.cfg.mode.is_train();

        for file in files {
            let mut records = source.read_records(&file)?;
            if let Some(r) = rng.as_deref_mut() {
                records = shuffled(records, r);
            }
            for batch in into_batches(records, self.builder.shape().batch_size)? {
                let out = self.step(&batch)?;
                acc.fold(&out.confusion, track_accuracy.then_some(out.accuracy))?;
                acc.note_loss(out.summary.loss);
            }
        }
        Ok(())
    }

    fn step(&mut self, batch: &Batch) -> Result<StepOutput> {
        let (meta, inputs, labels) = batch.columns();
        let mut req = FrameRequest::new(inputs).labels(labels);
        if self.builder.capabilities().consumes_metadata {
            req = req.metadata(self.encoder.encode_meta_batch(&meta)?, true);
        }
        // no state supplied: the builder hands stateful models a zero state
        let frame = self.builder.build(req)?;
        let out = self.model.run(&frame)?;
        tracing::debug!(
            "step {}: loss {:.4}, accuracy {:.4}",
            out.summary.global_step,
            out.summary.loss,
            out.accuracy
        );
        Ok(out)
    }
}
