//! Vector Kernels
//!
//! Stateless functions over `f64` slices: the arithmetic every layer, cell and
//! trainer is built from.
//!
//! ## Numerical Stability
//!
//! - [`sigmoid`] branches on the sign of its input so `exp` only ever sees a
//!   non-positive argument and cannot overflow.
//! - [`softmax`] and [`log_softmax`] subtract the maximum before
//!   exponentiating:
//!
//! ```text
//! softmax(x)[i]     = exp(x[i] - max(x)) / Σ exp(x[j] - max(x))
//! log_softmax(x)[i] = (x[i] - max(x)) - ln Σ exp(x[j] - max(x))
//! ```
//!
//! Length mismatches are programmer errors and panic.

use crate::tensor::Matrix;

/// Epsilon used by [`layer_norm`] when none is given
pub const LAYER_NORM_EPS: f64 = 1e-5;

/// Dot product
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Lengths must match for dot product");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Element-wise sum
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "Lengths must match for addition");
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Element-wise difference `a - b`
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "Lengths must match for subtraction");
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Multiply every element by a scalar
pub fn scale(a: &[f64], factor: f64) -> Vec<f64> {
    a.iter().map(|x| x * factor).collect()
}

/// Hadamard (element-wise) product
pub fn hadamard(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "Lengths must match for Hadamard product");
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

/// Euclidean norm
pub fn l2_norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine similarity
///
/// Returns 0.0 when either vector has zero norm instead of dividing by zero.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Outer product `a ⊗ b` as an `a.len() × b.len()` matrix
pub fn outer(a: &[f64], b: &[f64]) -> Matrix {
    let mut m = Matrix::zeros(a.len(), b.len());
    m.add_outer(a, b);
    m
}

/// Concatenate two vectors
pub fn concat(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

/// Index of the largest element (first one on ties), `None` when empty
pub fn argmax(a: &[f64]) -> Option<usize> {
    a.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Logistic sigmoid, stable for large |x|
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Softmax with max subtraction
pub fn softmax(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let max = x.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp_values: Vec<f64> = x.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exp_values.iter().sum();
    exp_values.into_iter().map(|v| v / sum).collect()
}

/// Log-softmax with max subtraction
pub fn log_softmax(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let max = x.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let log_sum = x.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
    x.iter().map(|&v| (v - max) - log_sum).collect()
}

/// Layer normalization without learned gain or shift
///
/// ```text
/// y = (x - mean) / √(var + eps)
/// ```
pub fn layer_norm(x: &[f64], eps: f64) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = (var + eps).sqrt();
    x.iter().map(|v| (v - mean) / std).collect()
}
