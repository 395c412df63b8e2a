// ============================================================
// Layer 5 — Sequence Generator
// ============================================================
// Autoregressive generation from a warm start. The branch is
// chosen by querying the model's capabilities, never its name:
//
//   encoder-decoder   one call: warm start → encoder, <go> → decoder,
//                     fixed decode length; the model returns the
//                     whole decoded sequence
//   stateful          prime the state with the warm start one token
//                     at a time (metadata applied at step 0 only),
//                     then sample → feed back until <end> or max_len
//   bag-of-context    slide a window of the last `window` tokens; no
//                     state, no metadata
//
// Every SamplingSession owns its own StateThreader, so nothing
// carries over from one session to the next.

use anyhow::{bail, Context, Result};
use rand::Rng;

use crate::domain::frame::SeqLengths;
use crate::domain::state::RecurrentState;
use crate::domain::traits::{SampleOutput, SequenceModel};
use crate::ml::frame_builder::{FrameBuilder, FrameRequest};
use crate::ml::sampler::TemperatureSampler;
use crate::ml::state_threader::StateThreader;

/// Why a session stopped producing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndToken,
    MaxLength,
}

/// One generation request and its progress.
#[derive(Debug)]
pub struct SamplingSession {
    pub meta:         Vec<f32>,
    pub warm:         Vec<u32>,
    pub generated:    Vec<u32>,
    /// Scores returned by the very first model call of the session.
    pub first_logits: Option<Vec<f32>>,
    pub stop:         Option<StopReason>,
    threader:         Option<StateThreader>,
}

impl SamplingSession {
    pub fn new(meta: Vec<f32>, warm: Vec<u32>) -> Self {
        Self {
            meta,
            warm,
            generated:    Vec::new(),
            first_logits: None,
            stop:         None,
            threader:     None,
        }
    }

    /// Model calls made so far (stateful sessions only).
    pub fn steps(&self) -> usize {
        self.threader.as_ref().map_or(0, StateThreader::steps)
    }
}

#[derive(Debug)]
pub struct Generator<'a> {
    builder:    &'a FrameBuilder,
    sampler:    TemperatureSampler,
    end_token:  u32,
    go_token:   Option<u32>,
    max_len:    usize,
}

impl<'a> Generator<'a> {
    pub fn new(
        builder:   &'a FrameBuilder,
        sampler:   TemperatureSampler,
        end_token: u32,
        go_token:  Option<u32>,
        max_len:   usize,
    ) -> Self {
        Self { builder, sampler, end_token, go_token, max_len }
    }

    /// Run `session` to completion.
    pub fn run<M, R>(&self, model: &mut M, session: &mut SamplingSession, rng: &mut R) -> Result<()>
    where
        M: SequenceModel + ?Sized,
        R: Rng + ?Sized,
    {
        let caps = self.builder.capabilities();
        tracing::debug!(
            "Sampling session: warm start of {} tokens, temperature {}",
            session.warm.len(),
            self.sampler.temperature()
        );
        if caps.supports_encoder_decoder {
            self.decode(model, session)?;
        } else if caps.stateful {
            self.recurrent(model, session, rng)?;
        } else {
            self.sliding(model, session, rng)?;
        }
        tracing::info!(
            "Sampling stopped ({:?}) after {} tokens, {} model calls",
            session.stop,
            session.generated.len(),
            session.steps()
        );
        Ok(())
    }

    // ─── Encoder-decoder ─────────────────────────────────────────────────────
    fn decode<M: SequenceModel + ?Sized>(
        &self,
        model:   &mut M,
        session: &mut SamplingSession,
    ) -> Result<()> {
        let go = self.go_token.context("encoder-decoder sampling needs a <go> token")?;
        let shape = self.builder.shape();
        let frame = self.builder.build(
            FrameRequest::new(vec![session.warm.clone()])
                .labels(vec![vec![go; shape.label_len]])
                .metadata(vec![session.meta.clone()], true)
                .lengths(SeqLengths {
                    encoder: vec![session.warm.len()],
                    decoder: vec![shape.decode_len],
                }),
        )?;

        let decoded = match model.sample(&frame)? {
            SampleOutput::Decoded(rows) => rows.into_iter().next().unwrap_or_default(),
            SampleOutput::Step { .. } => bail!("encoder-decoder model returned step logits"),
        };

        session.generated = match decoded.iter().position(|&t| t == self.end_token) {
            Some(i) => {
                session.stop = Some(StopReason::EndToken);
                decoded[..=i].to_vec()
            }
            None => {
                session.stop = Some(StopReason::MaxLength);
                decoded
            }
        };
        Ok(())
    }

    // ─── Stateful ────────────────────────────────────────────────────────────
    fn recurrent<M, R>(&self, model: &mut M, session: &mut SamplingSession, rng: &mut R) -> Result<()>
    where
        M: SequenceModel + ?Sized,
        R: Rng + ?Sized,
    {
        if session.warm.is_empty() {
            bail!("warm start is empty");
        }
        let mut threader = StateThreader::new(self.builder.shape(), 1);
        threader.begin_sequence();

        let mut logits = Vec::new();
        for (i, &token) in session.warm.iter().enumerate() {
            logits = self.step(model, &mut threader, token, &session.meta, i == 0)?;
            if i == 0 {
                session.first_logits = Some(logits.clone());
            }
        }

        loop {
            let next = self.sampler.sample(&logits, rng)?;
            session.generated.push(next);
            if next == self.end_token {
                session.stop = Some(StopReason::EndToken);
                break;
            }
            if session.generated.len() >= self.max_len {
                session.stop = Some(StopReason::MaxLength);
                break;
            }
            logits = self.step(model, &mut threader, next, &session.meta, false)?;
        }
        session.threader = Some(threader);
        Ok(())
    }

    /// Feed one token, thread the returned state, return the scores.
    fn step<M: SequenceModel + ?Sized>(
        &self,
        model:      &mut M,
        threader:   &mut StateThreader,
        token:      u32,
        meta:       &[f32],
        apply_meta: bool,
    ) -> Result<Vec<f32>> {
        let state: RecurrentState = threader.current().clone();
        let mut req = FrameRequest::new(vec![vec![token]]).state(state);
        if self.builder.capabilities().consumes_metadata {
            let meta = if apply_meta {
                meta.to_vec()
            } else {
                vec![0.0; meta.len()]
            };
            req = req.metadata(vec![meta], apply_meta);
        }
        let frame = self.builder.build(req)?;

        match model.sample(&frame)? {
            SampleOutput::Step { logits, state } => {
                let returned = state.context("stateful model returned no state")?;
                threader.advance(returned)?;
                logits.into_iter().next().context("model returned no scores")
            }
            SampleOutput::Decoded(_) => bail!("stateful model returned a decoded sequence"),
        }
    }

    // ─── Bag-of-context ──────────────────────────────────────────────────────
    fn sliding<M, R>(&self, model: &mut M, session: &mut SamplingSession, rng: &mut R) -> Result<()>
    where
        M: SequenceModel + ?Sized,
        R: Rng + ?Sized,
    {
        let mut context = session.warm.clone();
        loop {
            let frame = self.builder.build(FrameRequest::new(vec![context.clone()]))?;
            let logits = match model.sample(&frame)? {
                SampleOutput::Step { logits, .. } => {
                    logits.into_iter().next().context("model returned no scores")?
                }
                SampleOutput::Decoded(_) => bail!("bag-of-context model returned a decoded sequence"),
            };
            if session.first_logits.is_none() {
                session.first_logits = Some(logits.clone());
            }

            let next = self.sampler.sample(&logits, rng)?;
            session.generated.push(next);
            if next == self.end_token {
                session.stop = Some(StopReason::EndToken);
                return Ok(());
            }
            if session.generated.len() >= self.max_len {
                session.stop = Some(StopReason::MaxLength);
                return Ok(());
            }
            context.remove(0);
            context.push(next);
        }
    }
}
