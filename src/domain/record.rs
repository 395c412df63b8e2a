// ============================================================
// Layer 3 — Record and Batch Domain Types
// ============================================================
// A record is one training example cut from a tune:
//   - the tune's metadata (key, mode, meter, length, ...)
//   - an input window of token ids
//   - the output window the model should predict
//
// For the plain recurrent and bag-of-context models the
// output window is the input window shifted by one token.
// For the encoder-decoder model it is the continuation.
//
// A batch is a run of records that all share window lengths.

use serde::{Deserialize, Serialize};

use crate::domain::error::EngineError;

/// One raw metadata field as it appears in the dataset.
/// Categorical fields (key, mode, meter) are text and get
/// mapped through the metadata table; numeric fields
/// (length in bars, complexity) pass straight through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

/// Raw metadata vector for one record, one entry per field.
pub type RawMeta = Vec<MetaValue>;

/// A single (metadata, input-window, output-window) example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub meta:   RawMeta,
    pub input:  Vec<u32>,
    pub output: Vec<u32>,
}

impl Record {
    #[cfg(test)]
    pub fn new(meta: RawMeta, input: Vec<u32>, output: Vec<u32>) -> Self {
        Self { meta, input, output }
    }
}

/// An ordered group of records handed to one model step.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    /// Wrap records into a batch, checking that every record
    /// shares the first record's input and output window lengths.
    pub fn new(records: Vec<Record>) -> Result<Self, EngineError> {
        if let Some(first) = records.first() {
            let (win, lab) = (first.input.len(), first.output.len());
            for r in &records[1..] {
                if r.input.len() != win {
                    return Err(EngineError::mismatch("window_length", win, r.input.len()));
                }
                if r.output.len() != lab {
                    return Err(EngineError::mismatch("label_length", lab, r.output.len()));
                }
            }
        }
        Ok(Self { records })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Split into column form: (metadata, input windows, output windows).
    pub fn columns(&self) -> (Vec<RawMeta>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
        let mut metas   = Vec::with_capacity(self.records.len());
        let mut inputs  = Vec::with_capacity(self.records.len());
        let mut outputs = Vec::with_capacity(self.records.len());
        for r in &self.records {
            metas.push(r.meta.clone());
            inputs.push(r.input.clone());
            outputs.push(r.output.clone());
        }
        (metas, inputs, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(input: Vec<u32>, output: Vec<u32>) -> Record {
        Record::new(vec![MetaValue::Text("D".into())], input, output)
    }

    #[test]
    fn test_uniform_batch_is_accepted() {
        let b = Batch::new(vec![rec(vec![1, 2], vec![2, 3]), rec(vec![4, 5], vec![5, 6])]).unwrap();
        assert_eq!(b.len(), 2);
        let (metas, inputs, outputs) = b.columns();
        assert_eq!(metas.len(), 2);
        assert_eq!(inputs[1], vec![4, 5]);
        assert_eq!(outputs[0], vec![2, 3]);
    }

    #[test]
    fn test_ragged_window_is_rejected() {
        let err = Batch::new(vec![rec(vec![1, 2], vec![2, 3]), rec(vec![4], vec![5, 6])]).unwrap_err();
        assert_eq!(err, EngineError::mismatch("window_length", 2, 1));
    }

    #[test]
    fn test_meta_values_parse_untagged() {
        let r: Record =
            serde_json::from_str(r#"{"meta":["G","maj",32,120.5],"input":[1],"output":[2]}"#).unwrap();
        assert_eq!(r.meta[0], MetaValue::Text("G".into()));
        assert_eq!(r.meta[2], MetaValue::Number(32.0));
    }
}
