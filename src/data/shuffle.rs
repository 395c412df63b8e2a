// ============================================================
// Layer 4 — Epoch Shuffling
// ============================================================
// Every training epoch shuffles twice:
//   1. the order of the split's source files
//   2. the records inside each file, as it is read
//
// With a seed, epoch k always uses StdRng(seed + k), so a run
// resumed at epoch k sees exactly the order an uninterrupted run
// would have seen. Without a seed the RNG comes from entropy.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// The RNG that drives all shuffling for one epoch.
pub fn epoch_rng(seed: Option<u64>, epoch: usize) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(epoch as u64)),
        None    => StdRng::from_entropy(),
    }
}

/// Shuffle `items` in place and hand them back.
pub fn shuffled<T>(mut items: Vec<T>, rng: &mut StdRng) -> Vec<T> {
    items.shuffle(rng);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_and_epoch_same_order() {
        let a = shuffled((0..50).collect::<Vec<_>>(), &mut epoch_rng(Some(9), 3));
        let b = shuffled((0..50).collect::<Vec<_>>(), &mut epoch_rng(Some(9), 3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_epochs_differ() {
        let a = shuffled((0..50).collect::<Vec<_>>(), &mut epoch_rng(Some(9), 3));
        let b = shuffled((0..50).collect::<Vec<_>>(), &mut epoch_rng(Some(9), 4));
        assert_ne!(a, b);
    }

    #[test]
    fn test_all_items_preserved() {
        let mut out = shuffled((0..20).collect::<Vec<_>>(), &mut epoch_rng(None, 0));
        out.sort_unstable();
        assert_eq!(out, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        assert!(shuffled(Vec::<u8>::new(), &mut epoch_rng(Some(1), 0)).is_empty());
    }
}
