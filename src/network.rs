//! Feedforward Networks
//!
//! A [`FeedForwardNet`] is a named stack of [`DenseLayer`]s whose sizes chain:
//! layer *i*'s `out_features` equals layer *i+1*'s `in_features`. The shape is
//! checked once, at construction, and never changes afterwards; training only
//! rewrites the values inside each layer's buffers.
//!
//! ## Probabilities
//!
//! [`FeedForwardNet::predict_proba`] turns the final layer's output into the
//! probability of the positive class:
//!
//! ```text
//! 1 output unit:   p = sigmoid(forward(x)[0])
//! n output units:  p = softmax(forward(x))[1]
//! ```
//!
//! The binary path squashes a raw scalar; the multiclass path normalises the
//! full output and reads entry 1.
//!
//! ## Fallback Initialisation
//!
//! When no trained weights are available, [`FeedForwardNet::seeded`] builds a
//! deterministic network from a seed so callers always have a usable model.

use log::debug;
use rayon::prelude::*;

use crate::error::{NetError, NetResult};
use crate::kernel::{sigmoid, softmax};
use crate::layers::{Activation, DenseCache, DenseLayer};

/// Probability returned for inputs that carry no information
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// A multi-layer perceptron
#[derive(Clone, Debug, PartialEq)]
pub struct FeedForwardNet {
    name: String,
    pub(crate) layers: Vec<DenseLayer>,
}

impl FeedForwardNet {
    /// Assemble a network from layers
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Empty`] with no layers and [`NetError::LayerChain`]
    /// when consecutive layer sizes do not match.
    pub fn new(name: impl Into<String>, layers: Vec<DenseLayer>) -> NetResult<Self> {
        let name = name.into();
        if layers.is_empty() {
            return Err(NetError::Empty(name));
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].out_features() != pair[1].in_features() {
                return Err(NetError::LayerChain {
                    index: index + 1,
                    expected: pair[1].in_features(),
                    found: pair[0].out_features(),
                });
            }
        }
        Ok(Self { name, layers })
    }

    /// Deterministically initialised network
    ///
    /// # Arguments
    ///
    /// * `name` - Diagnostic name
    /// * `sizes` - Layer widths including input and output, e.g. `[35, 16, 1]`
    /// * `hidden` - Activation for every hidden layer
    /// * `output` - Activation for the last layer
    /// * `seed` - Seed; layer *i* uses `seed + i`
    ///
    /// # Errors
    ///
    /// Fails if fewer than two sizes are given.
    pub fn seeded(
        name: impl Into<String>,
        sizes: &[usize],
        hidden: Activation,
        output: Activation,
        seed: u64,
    ) -> NetResult<Self> {
        let name = name.into();
        if sizes.len() < 2 {
            return Err(NetError::Empty(name));
        }
        if let Some(index) = sizes.iter().position(|&s| s == 0) {
            return Err(NetError::EmptyWeights {
                index: index.saturating_sub(1),
            });
        }
        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let act = if i == last { output } else { hidden };
                DenseLayer::seeded(pair[0], pair[1], act, seed.wrapping_add(i as u64))
            })
            .collect();
        debug!("initialised network {name:?} with sizes {sizes:?} from seed {seed}");
        Self::new(name, layers)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].in_features()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].out_features()
    }

    /// Total parameters: Σ rows·cols + rows
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::param_count).sum()
    }

    /// Run every layer in order
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from the input size.
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(x.to_vec(), |activation, layer| layer.forward(&activation))
    }

    /// Forward pass keeping one cache per layer
    pub fn forward_cached(&self, x: &[f64]) -> (Vec<f64>, Vec<DenseCache>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut activation = x.to_vec();
        for layer in &self.layers {
            let (y, cache) = layer.forward_cached(&activation);
            caches.push(cache);
            activation = y;
        }
        (activation, caches)
    }

    /// Probability of the positive class
    ///
    /// An empty feature vector yields [`NEUTRAL_PROBABILITY`].
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        if x.is_empty() {
            return NEUTRAL_PROBABILITY;
        }
        output_probability(&self.forward(x))
    }

    /// Probabilities for many inputs, computed in parallel
    ///
    /// The network is only read, so this is safe; output order follows input
    /// order.
    pub fn predict_batch(&self, xs: &[Vec<f64>]) -> Vec<f64> {
        xs.par_iter().map(|x| self.predict_proba(x)).collect()
    }
}

/// Map a network output vector to the positive-class probability
pub(crate) fn output_probability(output: &[f64]) -> f64 {
    match output.len() {
        0 => NEUTRAL_PROBABILITY,
        1 => sigmoid(output[0]),
        _ => softmax(output)[1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layer(rows: &[Vec<f64>], bias: Vec<f64>, act: Activation) -> DenseLayer {
        DenseLayer::from_rows(rows, bias, act, false).unwrap()
    }

    #[test]
    fn test_unchained_layers_rejected() {
        let a = DenseLayer::seeded(4, 3, Activation::Relu, 1);
        let b = DenseLayer::seeded(2, 1, Activation::Linear, 2);
        let err = FeedForwardNet::new("bad", vec![a, b]).unwrap_err();
        assert!(matches!(
            err,
            NetError::LayerChain {
                index: 1,
                expected: 2,
                found: 3
            }
        ));
        assert!(matches!(
            FeedForwardNet::new("empty", vec![]),
            Err(NetError::Empty(_))
        ));
    }

    #[test]
    fn test_predict_proba_binary_applies_sigmoid() {
        let net = FeedForwardNet::new(
            "binary",
            vec![layer(&[vec![1.0, -1.0]], vec![0.5], Activation::Linear)],
        )
        .unwrap();
        let p = net.predict_proba(&[2.0, 1.0]);
        assert_relative_eq!(p, sigmoid(1.5), epsilon = 1e-12);
    }

    #[test]
    fn test_predict_proba_multiclass_reads_index_one() {
        let net = FeedForwardNet::new(
            "multi",
            vec![layer(
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]],
                vec![0.0, 0.0, 0.0],
                Activation::Linear,
            )],
        )
        .unwrap();
        let p = net.predict_proba(&[1.0, 2.0]);
        let expected = softmax(&[1.0, 2.0, 0.0])[1];
        assert_relative_eq!(p, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let net = FeedForwardNet::seeded("d", &[3, 2, 1], Activation::Relu, Activation::Linear, 0)
            .unwrap();
        assert_eq!(net.predict_proba(&[]), NEUTRAL_PROBABILITY);
    }

    #[test]
    fn test_param_count_and_sizes() {
        let net = FeedForwardNet::seeded("d", &[35, 16, 8, 1], Activation::Relu, Activation::Linear, 3)
            .unwrap();
        assert_eq!(net.param_count(), 35 * 16 + 16 + 16 * 8 + 8 + 8 + 1);
        assert_eq!(net.input_size(), 35);
        assert_eq!(net.output_size(), 1);
        assert_eq!(net.layers()[2].activation(), Activation::Linear);
    }

    #[test]
    fn test_seeded_fallback_is_deterministic() {
        let a = FeedForwardNet::seeded("d", &[5, 4, 1], Activation::Tanh, Activation::Linear, 42).unwrap();
        let b = FeedForwardNet::seeded("d", &[5, 4, 1], Activation::Tanh, Activation::Linear, 42).unwrap();
        assert_eq!(a, b);
        let x = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert_eq!(a.forward(&x), b.forward(&x));
    }

    #[test]
    fn test_predict_batch_matches_single() {
        let net = FeedForwardNet::seeded("d", &[3, 4, 1], Activation::Gelu, Activation::Linear, 9).unwrap();
        let xs = vec![vec![0.1, 0.2, 0.3], vec![-1.0, 0.0, 2.0], vec![]];
        let batch = net.predict_batch(&xs);
        for (x, p) in xs.iter().zip(&batch) {
            assert_eq!(net.predict_proba(x), *p);
        }
    }
}
