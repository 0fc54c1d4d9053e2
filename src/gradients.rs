//! Gradient Utilities
//!
//! Two clipping policies are used by the trainers:
//!
//! - **Element-wise clamp** (MLP): every gradient value is limited to
//!   `[-limit, limit]`. No value can exceed the configured magnitude.
//! - **Per-tensor norm clip** (LSTM): when a tensor's L2 norm exceeds
//!   `max_norm`, the whole tensor is scaled by `max_norm / norm`, keeping its
//!   direction.
//!
//! ```text
//! norm = √(Σ g²)
//! if norm > max_norm:
//!     g *= max_norm / norm
//! ```
//!
//! ## Example
//!
//! ```rust
//! use scrivener::gradients::{clip_elementwise, clip_norm, l2_norm};
//!
//! let mut g = vec![10.0, -0.5, -7.0];
//! clip_elementwise(&mut g, 5.0);
//! assert_eq!(g, vec![5.0, -0.5, -5.0]);
//!
//! let mut h = vec![3.0, 4.0];
//! clip_norm(&mut h, 1.0);
//! assert!((l2_norm(&h) - 1.0).abs() < 1e-12);
//! ```

use rayon::prelude::*;

use crate::tensor::Matrix;

/// Tensors above this size are processed in parallel
const PARALLEL_THRESHOLD: usize = 4096;

/// L2 norm of a gradient buffer
pub fn l2_norm(grads: &[f64]) -> f64 {
    let sum_sq: f64 = if grads.len() > PARALLEL_THRESHOLD {
        grads.par_iter().map(|&g| g * g).sum()
    } else {
        grads.iter().map(|&g| g * g).sum()
    };
    sum_sq.sqrt()
}

/// Global norm over several buffers, √(Σ over all tensors of Σ g²)
pub fn global_norm<'a>(tensors: impl IntoIterator<Item = &'a [f64]>) -> f64 {
    tensors
        .into_iter()
        .map(|t| {
            let n = l2_norm(t);
            n * n
        })
        .sum::<f64>()
        .sqrt()
}

/// Clamp every value to `[-limit, limit]`
///
/// NaN gradients are replaced with zero so they cannot leak into the moments.
pub fn clip_elementwise(grads: &mut [f64], limit: f64) {
    for g in grads.iter_mut() {
        *g = if g.is_nan() { 0.0 } else { g.clamp(-limit, limit) };
    }
}

/// Scale the tensor down to `max_norm` if its norm is larger
///
/// Returns the norm before clipping.
pub fn clip_norm(grads: &mut [f64], max_norm: f64) -> f64 {
    let norm = l2_norm(grads);
    if norm > max_norm && norm.is_finite() {
        let scale = max_norm / norm;
        if grads.len() > PARALLEL_THRESHOLD {
            grads.par_iter_mut().for_each(|g| *g *= scale);
        } else {
            grads.iter_mut().for_each(|g| *g *= scale);
        }
    } else if !norm.is_finite() {
        grads.iter_mut().for_each(|g| *g = 0.0);
    }
    norm
}

/// [`clip_elementwise`] over a matrix
pub fn clip_matrix_elementwise(grads: &mut Matrix, limit: f64) {
    clip_elementwise(&mut grads.data, limit);
}

/// [`clip_norm`] over a matrix
pub fn clip_matrix_norm(grads: &mut Matrix, max_norm: f64) -> f64 {
    clip_norm(&mut grads.data, max_norm)
}
