//! Neural Network Layers
//!
//! Layer implementations shared by the feedforward network and the LSTM
//! language model. Each layer provides a forward pass and, where it is
//! trainable, a backward pass.
//!
//! ## Layers
//!
//! - **activation**: the closed activation set and its derivatives
//! - **layer_norm**: parameter-free layer normalisation
//! - **dense**: fully connected layer
//!
//! ## Design Pattern
//!
//! Each trainable layer follows the same pattern:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn forward(&self, x: &[f64]) -> Vec<f64> { }
//!     pub fn forward_cached(&self, x: &[f64]) -> (Vec<f64>, Cache) { }
//!     pub fn backward(&self, grad: &[f64], cache: &Cache) -> Gradients { }
//! }
//! ```
//!
//! The cache holds what the backward pass needs; gradients are returned as
//! fresh buffers and never stored on the layer.

pub mod activation;
pub mod dense;
pub mod layer_norm;

pub use activation::Activation;
pub use dense::{random_init, DenseCache, DenseGradients, DenseLayer};
pub use layer_norm::{layer_norm_backward, layer_norm_forward, LayerNormCache};
