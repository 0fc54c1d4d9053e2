//! Dense Layer (Fully Connected)
//!
//! The building block of every feedforward network in the runtime. It performs
//! an affine transform, optionally normalises it, then applies an activation.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [in_features]
//! Weight: W [out_features, in_features]
//! Bias:   b [out_features]
//! z = W · x + b
//! z = layer_norm(z)            (only when the layer has layer_norm set)
//! y = act(z)
//! ```
//!
//! ## Backward Pass
//!
//! Given `grad_y`:
//!
//! ```text
//! grad_z = grad_y ⊙ act'(z)                 (then back through layer norm)
//! grad_W = grad_z ⊗ x
//! grad_b = grad_z
//! grad_x = Wᵀ · grad_z
//! ```
//!
//! ## Initialization
//!
//! [`DenseLayer::seeded`] uses Xavier-normal weights, std = √(2 / (in + out)),
//! drawn from a ChaCha stream so a seed always produces the same layer.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::activation::Activation;
use super::layer_norm::{layer_norm_backward, layer_norm_forward, LayerNormCache};
use crate::error::{NetError, NetResult};
use crate::tensor::Matrix;

/// Draw `size` values from N(0, std²) using a seeded ChaCha stream
pub fn random_init(size: usize, std: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..size)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            z * std
        })
        .collect()
}

/// Fully connected layer: `y = act(norm?(W · x + b))`
#[derive(Clone, Debug, PartialEq)]
pub struct DenseLayer {
    pub(crate) weights: Matrix,
    pub(crate) bias: Vec<f64>,
    pub(crate) activation: Activation,
    pub(crate) layer_norm: bool,
}

impl DenseLayer {
    /// Create a layer from explicit parameters
    ///
    /// # Errors
    ///
    /// Rejects an empty weight matrix and a bias whose length differs from the
    /// number of weight rows.
    pub fn new(
        weights: Matrix,
        bias: Vec<f64>,
        activation: Activation,
        layer_norm: bool,
    ) -> NetResult<Self> {
        Self::build(0, weights, bias, activation, layer_norm)
    }

    /// Create a layer from nested weight rows
    pub fn from_rows(
        weights: &[Vec<f64>],
        bias: Vec<f64>,
        activation: Activation,
        layer_norm: bool,
    ) -> NetResult<Self> {
        Self::build_from_rows(0, weights, bias, activation, layer_norm)
    }

    pub(crate) fn build_from_rows(
        index: usize,
        weights: &[Vec<f64>],
        bias: Vec<f64>,
        activation: Activation,
        layer_norm: bool,
    ) -> NetResult<Self> {
        let weights = Matrix::from_rows(weights).ok_or(NetError::RaggedWeights { index })?;
        Self::build(index, weights, bias, activation, layer_norm)
    }

    pub(crate) fn build(
        index: usize,
        weights: Matrix,
        bias: Vec<f64>,
        activation: Activation,
        layer_norm: bool,
    ) -> NetResult<Self> {
        if weights.rows() == 0 || weights.cols() == 0 {
            return Err(NetError::EmptyWeights { index });
        }
        if bias.len() != weights.rows() {
            return Err(NetError::BiasMismatch {
                index,
                bias: bias.len(),
                rows: weights.rows(),
            });
        }
        Ok(Self {
            weights,
            bias,
            activation,
            layer_norm,
        })
    }

    /// Create a randomly initialised layer
    ///
    /// # Arguments
    ///
    /// * `in_features` - Input dimension
    /// * `out_features` - Output dimension
    /// * `activation` - Activation applied to the output
    /// * `seed` - Seed for the weight stream
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    pub fn seeded(in_features: usize, out_features: usize, activation: Activation, seed: u64) -> Self {
        assert!(
            in_features > 0 && out_features > 0,
            "Layer dimensions must be non-zero: {in_features} -> {out_features}"
        );
        let std = (2.0 / (in_features + out_features) as f64).sqrt();
        Self {
            weights: Matrix::new(
                random_init(in_features * out_features, std, seed),
                out_features,
                in_features,
            ),
            bias: vec![0.0; out_features],
            activation,
            layer_norm: false,
        }
    }

    /// Builder toggle for pre-activation layer normalisation
    pub fn with_layer_norm(mut self, enabled: bool) -> Self {
        self.layer_norm = enabled;
        self
    }

    pub fn in_features(&self) -> usize {
        self.weights.cols()
    }

    pub fn out_features(&self) -> usize {
        self.weights.rows()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn layer_norm(&self) -> bool {
        self.layer_norm
    }

    /// `rows * cols + rows`
    pub fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    /// Forward pass
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != in_features`
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        let mut z = self.weights.matvec(x);
        for (v, b) in z.iter_mut().zip(&self.bias) {
            *v += b;
        }
        if self.layer_norm {
            z = layer_norm_forward(&z).0;
        }
        self.activation.apply_vec(&z)
    }

    /// Forward pass that keeps what [`DenseLayer::backward`] needs
    pub fn forward_cached(&self, x: &[f64]) -> (Vec<f64>, DenseCache) {
        let mut z = self.weights.matvec(x);
        for (v, b) in z.iter_mut().zip(&self.bias) {
            *v += b;
        }
        let norm = if self.layer_norm {
            let (normed, cache) = layer_norm_forward(&z);
            z = normed;
            Some(cache)
        } else {
            None
        };
        let y = self.activation.apply_vec(&z);
        let cache = DenseCache {
            input: x.to_vec(),
            z,
            norm,
        };
        (y, cache)
    }

    /// Backward pass from the gradient of the layer output
    pub fn backward(&self, grad_out: &[f64], cache: &DenseCache) -> DenseGradients {
        assert_eq!(
            grad_out.len(),
            self.out_features(),
            "Output gradient length must match out_features"
        );
        let grad_z: Vec<f64> = grad_out
            .iter()
            .zip(&cache.z)
            .map(|(g, &z)| g * self.activation.derivative(z))
            .collect();
        self.backward_from_preactivation(grad_z, cache)
    }

    /// Backward pass when the caller already holds the gradient of the
    /// post-normalisation pre-activation (e.g. a fused sigmoid/softmax loss)
    pub fn backward_from_preactivation(&self, grad_z: Vec<f64>, cache: &DenseCache) -> DenseGradients {
        let grad_z = match &cache.norm {
            Some(norm) => layer_norm_backward(&grad_z, norm),
            None => grad_z,
        };

        let mut weights = Matrix::zeros(self.out_features(), self.in_features());
        weights.add_outer(&grad_z, &cache.input);
        let input = self.weights.transpose_matvec(&grad_z);

        DenseGradients {
            weights,
            bias: grad_z,
            input,
        }
    }
}

/// Cache for the dense layer backward pass
#[derive(Clone, Debug)]
pub struct DenseCache {
    pub input: Vec<f64>,
    /// Pre-activation after optional normalisation
    pub z: Vec<f64>,
    pub norm: Option<LayerNormCache>,
}

/// Gradients for one dense layer
#[derive(Clone, Debug)]
pub struct DenseGradients {
    pub weights: Matrix,
    pub bias: Vec<f64>,
    pub input: Vec<f64>, // passed to the previous layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity_layer(bias: Vec<f64>, activation: Activation) -> DenseLayer {
        DenseLayer::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]], bias, activation, false).unwrap()
    }

    #[test]
    fn test_known_linear_layer() {
        let layer = identity_layer(vec![0.1, 0.2], Activation::Linear);
        let y = layer.forward(&[3.0, 4.0]);
        assert_relative_eq!(y[0], 3.1, epsilon = 1e-12);
        assert_relative_eq!(y[1], 4.2, epsilon = 1e-12);
    }

    #[test]
    fn test_relu_clamps_negatives() {
        let layer = identity_layer(vec![-5.0, 0.0], Activation::Relu);
        assert_eq!(layer.forward(&[3.0, 4.0]), vec![0.0, 4.0]);
    }

    #[test]
    fn test_bias_mismatch_rejected() {
        let err = DenseLayer::from_rows(&[vec![1.0, 0.0]], vec![0.0, 0.0], Activation::Linear, false)
            .unwrap_err();
        assert!(matches!(err, NetError::BiasMismatch { bias: 2, rows: 1, .. }));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = DenseLayer::seeded(4, 3, Activation::Tanh, 7);
        let b = DenseLayer::seeded(4, 3, Activation::Tanh, 7);
        let c = DenseLayer::seeded(4, 3, Activation::Tanh, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.param_count(), 15);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        for layer_norm in [false, true] {
            let layer = DenseLayer::seeded(3, 4, Activation::Gelu, 11).with_layer_norm(layer_norm);
            let x = [0.4, -1.3, 0.9];
            let w = [0.5, -0.2, 0.8, 0.1];
            let loss = |layer: &DenseLayer, x: &[f64]| -> f64 {
                layer.forward(x).iter().zip(&w).map(|(a, b)| a * b).sum()
            };

            let (_, cache) = layer.forward_cached(&x);
            let grads = layer.backward(&w, &cache);

            let h = 1e-6;
            for r in 0..layer.out_features() {
                for c in 0..layer.in_features() {
                    let mut plus = layer.clone();
                    let mut minus = layer.clone();
                    plus.weights.set(r, c, layer.weights.get(r, c) + h);
                    minus.weights.set(r, c, layer.weights.get(r, c) - h);
                    let numeric = (loss(&plus, &x) - loss(&minus, &x)) / (2.0 * h);
                    assert_relative_eq!(grads.weights.get(r, c), numeric, epsilon = 1e-5);
                }
            }
            for i in 0..x.len() {
                let mut plus = x;
                let mut minus = x;
                plus[i] += h;
                minus[i] -= h;
                let numeric = (loss(&layer, &plus) - loss(&layer, &minus)) / (2.0 * h);
                assert_relative_eq!(grads.input[i], numeric, epsilon = 1e-5);
            }
        }
    }
}
