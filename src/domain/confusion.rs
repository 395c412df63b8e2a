// ============================================================
// Layer 3 — Confusion Matrix
// ============================================================
// vocabulary × vocabulary counts of (true token, predicted token).
// Rows are indexed by the true id, columns by the predicted id.
// Stored row-major in a flat Vec so adding two matrices is a
// single zip over the counts.

use serde::{Deserialize, Serialize};

use crate::domain::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    size:   usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn zeros(size: usize) -> Self {
        Self { size, counts: vec![0; size * size] }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.size + predicted]
    }

    /// Count one (truth, predicted) pair.
    pub fn record(&mut self, truth: u32, predicted: u32) -> Result<(), EngineError> {
        let (t, p) = (truth as usize, predicted as usize);
        if t >= self.size {
            return Err(EngineError::mismatch("confusion_row", self.size, t));
        }
        if p >= self.size {
            return Err(EngineError::mismatch("confusion_col", self.size, p));
        }
        self.counts[t * self.size + p] += 1;
        Ok(())
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &ConfusionMatrix) -> Result<(), EngineError> {
        if other.size != self.size {
            return Err(EngineError::mismatch("confusion_size", self.size, other.size));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += *b;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Sum of the diagonal.
    #[cfg(test)]
    pub fn correct(&self) -> u64 {
        (0..self.size).map(|i| self.get(i, i)).sum()
    }

    #[cfg(test)]
    pub fn is_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn rows(&self) -> Vec<Vec<u64>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.counts.chunks(self.size).map(<[u64]>::to_vec).collect()
    }

    /// A copy with the given ids' rows and columns removed.
    pub fn without(&self, removed: &[usize]) -> ConfusionMatrix {
        let keep: Vec<usize> = (0..self.size).filter(|i| !removed.contains(i)).collect();
        let mut out = ConfusionMatrix::zeros(keep.len());
        for (r, &t) in keep.iter().enumerate() {
            for (c, &p) in keep.iter().enumerate() {
                out.counts[r * out.size + c] = self.get(t, p);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_add() {
        let mut a = ConfusionMatrix::zeros(3);
        a.record(0, 0).unwrap();
        a.record(1, 2).unwrap();
        let mut b = ConfusionMatrix::zeros(3);
        b.record(1, 2).unwrap();
        a.add_assign(&b).unwrap();
        assert_eq!(a.get(1, 2), 2);
        assert_eq!(a.total(), 3);
        assert_eq!(a.correct(), 1);
    }

    #[test]
    fn test_out_of_range_and_size_mismatch() {
        let mut a = ConfusionMatrix::zeros(2);
        assert!(a.record(2, 0).is_err());
        assert!(a.add_assign(&ConfusionMatrix::zeros(3)).is_err());
    }

    #[test]
    fn test_without_drops_rows_and_columns() {
        let mut a = ConfusionMatrix::zeros(3);
        a.record(0, 2).unwrap();
        a.record(2, 2).unwrap();
        a.record(2, 0).unwrap();
        let trimmed = a.without(&[1]);
        assert_eq!(trimmed.size(), 2);
        assert_eq!(trimmed.rows(), vec![vec![0, 1], vec![1, 1]]);
    }
}
