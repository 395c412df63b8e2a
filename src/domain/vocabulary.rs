// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Maps ABC notation symbols to token ids and back.
//
// The dataset ships a symbol → id map covering ids 0..n.
// Three reserved tokens are appended in a fixed order:
//
//   <start> = n
//   <end>   = n + 1
//   <go>    = n + 2   (encoder-decoder models only)
//
// The confusion matrix is always vocabulary × vocabulary,
// reserved tokens included.

use std::collections::HashMap;

use crate::domain::error::EngineError;
use crate::domain::traits::ModelVariant;

pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN:   &str = "<end>";
pub const GO_TOKEN:    &str = "<go>";

#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    /// id → symbol
    symbols: Vec<String>,
    /// symbol → id
    ids:     HashMap<String, u32>,
    end:     u32,
    go:      Option<u32>,
}

impl Vocabulary {
    /// Build the run vocabulary from the dataset's symbol map and
    /// append the reserved tokens for `variant`.
    ///
    /// Ids in `map` must cover `0..map.len()` exactly once.
    pub fn from_symbol_map(
        map:     &HashMap<String, u32>,
        variant: ModelVariant,
    ) -> Result<Self, EngineError> {
        let n = map.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (symbol, &id) in map {
            let idx = id as usize;
            if idx >= n {
                return Err(EngineError::mismatch("symbol_id", n.saturating_sub(1), idx));
            }
            if slots[idx].replace(symbol.clone()).is_some() {
                return Err(EngineError::mismatch("symbol_id_uses", 1, 2));
            }
        }
        // every slot is filled: n distinct ids below n
        let mut symbols: Vec<String> = slots.into_iter().flatten().collect();

        let start = n as u32;
        let end   = start + 1;
        symbols.push(START_TOKEN.to_string());
        symbols.push(END_TOKEN.to_string());

        let go = if variant.is_encoder_decoder() {
            symbols.push(GO_TOKEN.to_string());
            Some(end + 1)
        } else {
            None
        };

        let ids = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();

        Ok(Self { symbols, ids, end, go })
    }

    /// Total size including reserved tokens.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn go(&self) -> Option<u32> {
        self.go
    }

    pub fn id_of(&self, symbol: &str) -> Option<u32> {
        self.ids.get(symbol).copied()
    }

    pub fn symbol(&self, id: u32) -> Option<&str> {
        self.symbols.get(id as usize).map(String::as_str)
    }

    /// Symbols in id order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Map ids back to symbols; unknown ids render as `?`.
    pub fn decode(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|&id| self.symbol(id).unwrap_or("?").to_string())
            .collect()
    }
}
