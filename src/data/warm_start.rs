// ============================================================
// Layer 4 — Warm-Start Selection
// ============================================================
// Generation is primed with a seed drawn from real data: a random
// record's metadata plus the first `warm_len` tokens of its input
// window. Each warm start becomes one sampling session.
//
// Metadata variations prime several sessions with the same tokens
// under edited metadata, e.g. the key flipped or a higher complexity:
//
//   --vary-meta 4=1 --vary-meta 6=350
//     session 0   original metadata
//     session 1   field 4 set to 1
//     session 2   field 6 set to 350

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::record::{MetaValue, RawMeta, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct WarmStart {
    pub meta:   RawMeta,
    pub tokens: Vec<u32>,
}

/// Draw `count` warm starts (with replacement) from `records`.
pub fn pick_warm_starts<R: Rng + ?Sized>(
    records:  &[Record],
    warm_len: usize,
    count:    usize,
    rng:      &mut R,
) -> Result<Vec<WarmStart>> {
    let usable: Vec<&Record> = records.iter().filter(|r| r.input.len() >= warm_len).collect();
    if usable.is_empty() {
        bail!("no record has an input window of at least {warm_len} tokens to warm-start from");
    }
    let mut starts = Vec::with_capacity(count);
    for _ in 0..count {
        if let Some(r) = usable.choose(rng) {
            starts.push(WarmStart {
                meta:   r.meta.clone(),
                tokens: r.input[..warm_len].to_vec(),
            });
        }
    }
    Ok(starts)
}

// ─── Metadata variations ──────────────────────────────────────────────────────

/// Replace metadata field `field` with `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEdit {
    pub field: usize,
    pub value: MetaValue,
}

impl FromStr for MetaEdit {
    type Err = String;

    /// `FIELD=VALUE`; a value that parses as a number is numeric.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, value) = s
            .split_once('=')
            .ok_or_else(|| format!("metadata edit '{s}' is not FIELD=VALUE"))?;
        let field = field
            .trim()
            .parse()
            .map_err(|_| format!("metadata field '{field}' is not an index"))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("metadata edit '{s}' has no value"));
        }
        let value = match value.parse::<f64>() {
            Ok(n)  => MetaValue::Number(n),
            Err(_) => MetaValue::Text(value.to_string()),
        };
        Ok(Self { field, value })
    }
}

impl fmt::Display for MetaEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            MetaValue::Number(n) => write!(f, "{}={}", self.field, n),
            MetaValue::Text(t)   => write!(f, "{}={}", self.field, t),
        }
    }
}

/// `start` under its own metadata, then one copy per edit.
pub fn vary_meta(start: &WarmStart, edits: &[MetaEdit]) -> Result<Vec<WarmStart>> {
    let mut starts = Vec::with_capacity(edits.len() + 1);
    starts.push(start.clone());
    for edit in edits {
        let mut varied = start.clone();
        match varied.meta.get_mut(edit.field) {
            Some(slot) => *slot = edit.value.clone(),
            None => bail!(
                "metadata edit {} targets field {} but records carry {} fields",
                edit,
                edit.field,
                start.meta.len()
            ),
        }
        starts.push(varied);
    }
    Ok(starts)
}
