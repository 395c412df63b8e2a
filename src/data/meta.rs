// ============================================================
// Layer 4 — Metadata Encoder
// ============================================================
// Tune metadata arrives as a short vector of mixed fields, e.g.
//
//   ["6/8", "G", "maj", "jig", 3, 32, 140]
//    meter  key  mode  rhythm ...  bars  complexity
//
// A MetaTable holds one category table per field position.
// Text values are looked up in their field's table; numbers pass
// through unchanged. An unknown category aborts the run.
//
// meta_map.json is a JSON array with one object per field:
//   [ {"4/4": 0, "6/8": 1}, {"G": 0, "D": 1}, {}, ... ]
// An empty object marks a purely numeric field.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};

use crate::domain::error::EngineError;
use crate::domain::record::{MetaValue, RawMeta};
use crate::domain::traits::MetaEncoder;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaTable {
    fields: Vec<HashMap<String, f32>>,
}

impl MetaTable {
    #[cfg(test)]
    pub fn new(fields: Vec<HashMap<String, f32>>) -> Self {
        Self { fields }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read metadata map '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Metadata map '{}' is malformed", path.display()))
    }

    fn encode_one(&self, index: usize, raw: &RawMeta) -> Result<Vec<f32>, EngineError> {
        if raw.len() != self.fields.len() {
            return Err(EngineError::mismatch("meta_width", self.fields.len(), raw.len()));
        }
        raw.iter()
            .zip(&self.fields)
            .map(|(value, table)| match value {
                MetaValue::Number(n) => Ok(*n as f32),
                MetaValue::Text(t) => table.get(t).copied().ok_or_else(|| {
                    EngineError::malformed("metadata", index, format!("unknown category '{t}'"))
                }),
            })
            .collect()
    }
}

impl MetaEncoder for MetaTable {
    fn width(&self) -> usize {
        self.fields.len()
    }

    fn encode_meta_batch(&self, raw: &[RawMeta]) -> Result<Vec<Vec<f32>>, EngineError> {
        raw.iter()
            .enumerate()
            .map(|(i, r)| self.encode_one(i, r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MetaTable {
        let keys: HashMap<String, f32> = [("G".to_string(), 0.0), ("D".to_string(), 1.0)].into();
        MetaTable::new(vec![keys, HashMap::new()])
    }

    #[test]
    fn test_categorical_and_numeric_fields() {
        let raw = vec![vec![MetaValue::Text("D".into()), MetaValue::Number(32.0)]];
        assert_eq!(table().encode_meta_batch(&raw).unwrap(), vec![vec![1.0, 32.0]]);
    }

    #[test]
    fn test_unknown_category_is_malformed() {
        let raw = vec![vec![MetaValue::Text("Z".into()), MetaValue::Number(1.0)]];
        assert!(matches!(
            table().encode_meta_batch(&raw),
            Err(EngineError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_wrong_field_count() {
        let raw = vec![vec![MetaValue::Number(1.0)]];
        assert_eq!(
            table().encode_meta_batch(&raw),
            Err(EngineError::mismatch("meta_width", 2, 1))
        );
    }

    #[test]
    fn test_loads_from_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta_map.json");
        fs::write(&path, r#"[{"G": 0, "D": 1}, {}]"#).unwrap();
        let t = MetaTable::load(&path).unwrap();
        assert_eq!(t.width(), 2);
    }
}
