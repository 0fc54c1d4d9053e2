//! Training
//!
//! From-scratch trainers for the two model families:
//!
//! - [`MlpTrainer`]: full backpropagation with binary cross-entropy for a
//!   [`crate::FeedForwardNet`]
//! - [`LstmTrainer`]: truncated backpropagation-through-time with next-symbol
//!   cross-entropy for a [`crate::LstmModel`]
//!
//! Each trainer owns its own [`crate::optimizer::Adam`], created fresh with
//! the trainer and dropped with it.
//!
//! ## Determinism
//!
//! Every source of randomness is a ChaCha stream seeded by the caller, so the
//! same data, seed and configuration always yield the same weights.

pub mod lstm;
pub mod mlp;

pub use lstm::LstmTrainer;
pub use mlp::{bce_loss, EvalReport, MlpGradients, MlpTrainer, TrainingHistory};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Visiting order for `len` items, shuffled by `seed`
pub(crate) fn shuffled_indices(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_is_a_deterministic_permutation() {
        let a = shuffled_indices(20, 3);
        let b = shuffled_indices(20, 3);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        assert_ne!(a, shuffled_indices(20, 4));
    }
}
