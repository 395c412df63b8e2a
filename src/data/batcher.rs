// ============================================================
// Layer 4 — Record Batcher
// ============================================================
// Splits a shuffled record sequence into fixed-size batches:
//
//   records: r0 r1 r2 r3 r4 r5 r6     batch_size = 3
//   batches: [r0 r1 r2] [r3 r4 r5] [r6]
//
// Only the last batch may be short. Every batch is checked for
// uniform window lengths when it is formed (see Batch::new).

use crate::domain::error::EngineError;
use crate::domain::record::{Batch, Record};

pub fn into_batches(records: Vec<Record>, batch_size: usize) -> Result<Vec<Batch>, EngineError> {
    if batch_size == 0 {
        return Err(EngineError::mismatch("batch_size", 1, 0));
    }
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<Record> = iter.by_ref().take(batch_size).collect();
        batches.push(Batch::new(chunk)?);
    }
    Ok(batches)
}
