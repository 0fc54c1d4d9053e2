//! Layer Normalization
//!
//! Dense layers may normalise their pre-activation vector before squashing it.
//! The normalisation carries no learned scale or shift: those live in the
//! layer's own weights and bias.
//!
//! ## Forward Pass
//!
//! ```text
//! 1. mean = Σx / N
//! 2. var  = Σ(x - mean)² / N
//! 3. x̂    = (x - mean) / √(var + ε)
//! ```
//!
//! ## Backward Pass
//!
//! Every output depends on every input through the mean and variance, so the
//! gradient is:
//!
//! ```text
//! grad_x = (grad_x̂ - mean(grad_x̂) - x̂ · mean(grad_x̂ · x̂)) / √(var + ε)
//! ```
//!
//! The first mean term accounts for the mean dependency, the second for the
//! variance dependency.

use crate::kernel::LAYER_NORM_EPS;

/// Values kept from the forward pass
#[derive(Clone, Debug)]
pub struct LayerNormCache {
    pub x_norm: Vec<f64>,
    pub std: f64,
}

/// Normalise `x`, returning the output and what the backward pass needs
pub fn layer_norm_forward(x: &[f64]) -> (Vec<f64>, LayerNormCache) {
    if x.is_empty() {
        return (
            Vec::new(),
            LayerNormCache {
                x_norm: Vec::new(),
                std: 1.0,
            },
        );
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = (var + LAYER_NORM_EPS).sqrt();
    let x_norm: Vec<f64> = x.iter().map(|v| (v - mean) / std).collect();
    (x_norm.clone(), LayerNormCache { x_norm, std })
}

/// Gradient with respect to the un-normalised input
pub fn layer_norm_backward(grad_out: &[f64], cache: &LayerNormCache) -> Vec<f64> {
    assert_eq!(
        grad_out.len(),
        cache.x_norm.len(),
        "Gradient length must match normalised vector"
    );
    if grad_out.is_empty() {
        return Vec::new();
    }
    let n = grad_out.len() as f64;

    let mean_grad = grad_out.iter().sum::<f64>() / n;
    let mean_grad_x = grad_out
        .iter()
        .zip(&cache.x_norm)
        .map(|(g, x)| g * x)
        .sum::<f64>()
        / n;

    grad_out
        .iter()
        .zip(&cache.x_norm)
        .map(|(g, x)| (g - mean_grad - x * mean_grad_x) / cache.std)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_matches_kernel() {
        let x = [0.5, -1.0, 2.0, 3.5];
        let (y, _) = layer_norm_forward(&x);
        let expected = crate::kernel::layer_norm(&x, LAYER_NORM_EPS);
        assert_eq!(y, expected);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let x = [0.5, -1.0, 2.0, 3.5];
        // Loss = Σ w_i * y_i for fixed weights, so dL/dy = w
        let w = [0.3, -0.7, 1.1, 0.2];
        let loss = |x: &[f64]| -> f64 {
            let (y, _) = layer_norm_forward(x);
            y.iter().zip(&w).map(|(a, b)| a * b).sum()
        };

        let (_, cache) = layer_norm_forward(&x);
        let analytic = layer_norm_backward(&w, &cache);

        let h = 1e-6;
        for i in 0..x.len() {
            let mut plus = x;
            let mut minus = x;
            plus[i] += h;
            minus[i] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-5);
        }
    }
}
