//! Test doubles for the model collaborator.

use anyhow::{anyhow, bail, Result};

use crate::domain::confusion::ConfusionMatrix;
use crate::domain::frame::FeedFrame;
use crate::domain::traits::{
    Capabilities, CellKind, ModelVariant, SampleOutput, SequenceModel, StepOutput, StepSummary,
};

/// A model whose parameters are an opaque byte blob.
#[derive(Debug, Clone)]
pub struct BlobModel {
    pub params:      Vec<u8>,
    pub step:        u64,
    pub fail_export: bool,
}

impl BlobModel {
    pub fn new(params: &[u8]) -> Self {
        Self { params: params.to_vec(), step: 0, fail_export: false }
    }
}

impl SequenceModel for BlobModel {
    fn capabilities(&self) -> Capabilities {
        Capabilities::for_variant(ModelVariant::Char, CellKind::Lstm)
    }

    fn attach_metrics(&mut self) {}

    fn run(&mut self, _frame: &FeedFrame) -> Result<StepOutput> {
        self.step += 1;
        Ok(StepOutput {
            summary:   StepSummary { loss: 0.0, global_step: self.step },
            confusion: ConfusionMatrix::zeros(1),
            accuracy:  0.0,
        })
    }

    fn sample(&mut self, _frame: &FeedFrame) -> Result<SampleOutput> {
        bail!("BlobModel cannot sample")
    }

    fn export_parameters(&self) -> Result<Vec<u8>> {
        if self.fail_export {
            return Err(anyhow!("disk full"));
        }
        Ok(self.params.clone())
    }

    fn import_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        self.params = bytes.to_vec();
        Ok(())
    }

    fn global_step(&self) -> u64 {
        self.step
    }
}
