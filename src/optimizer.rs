//! Adam Optimizer
//!
//! Bias-corrected Adam shared by the MLP and LSTM trainers.
//!
//! ## Algorithm
//!
//! For each parameter θ with gradient g, moments m and v, and step t
//! (incremented once per call for that parameter tensor):
//!
//! ```text
//! g    = g + λ·θ                         (only when weight decay is configured)
//! m    = β₁·m + (1 - β₁)·g
//! v    = β₂·v + (1 - β₂)·g²
//! lr_t = lr · √(1 - β₂ᵗ) / (1 - β₁ᵗ)
//! θ   -= lr_t · m / (√v + ε)
//! ```
//!
//! Defaults: β₁ = 0.9, β₂ = 0.999, ε = 1e-8, λ = 0.
//!
//! ## Parameter Identity
//!
//! Moment state is keyed by a typed [`ParamId`] (layer index + kind, gate +
//! kind, projection, embedding row) rather than a string. Each key owns a pair
//! of moment buffers with the same length as the parameter tensor, and every
//! element is an independent scalar with its own moments. If a tensor arrives
//! under a known key with a different length, that key's state is discarded and
//! restarted, so swapping in other weights can never read mismatched moments.
//!
//! ## Weight Decay
//!
//! Decay is added to the gradient of 2D weight tensors only. Biases and
//! embedding rows are never decayed.
//!
//! ## Lifecycle
//!
//! One optimizer per training run. It is never persisted; [`Adam::reset`]
//! discards all state.
//!
//! ## Example
//!
//! ```rust
//! use scrivener::optimizer::{Adam, ParamId};
//!
//! let mut adam = Adam::new(0.01);
//! let mut p = vec![5.0];
//! for _ in 0..200 {
//!     let g = p.clone();
//!     adam.step_vec(ParamId::LayerBias(0), &mut p, &g);
//! }
//! assert!(p[0].abs() < 5.0);
//! ```

use std::collections::HashMap;

use rayon::prelude::*;

use crate::lstm::Gate;
use crate::tensor::Matrix;

/// Tensors above this size are updated in parallel
const PARALLEL_THRESHOLD: usize = 1000;

/// Identity of one parameter tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    LayerWeight(usize),
    LayerBias(usize),
    GateWeight(Gate),
    GateBias(Gate),
    ProjectionWeight,
    ProjectionBias,
    EmbeddingRow(usize),
}

impl ParamId {
    /// Whether weight decay applies to this tensor
    pub fn decays(self) -> bool {
        matches!(
            self,
            ParamId::LayerWeight(_) | ParamId::GateWeight(_) | ParamId::ProjectionWeight
        )
    }
}

/// First and second moments for one tensor
#[derive(Clone, Debug)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
    step: u64,
}

impl Moments {
    fn zeros(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
            step: 0,
        }
    }
}

/// Adam optimizer state
#[derive(Clone, Debug)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    weight_decay: f64,
    state: HashMap<ParamId, Moments>,
}

impl Adam {
    /// Create an optimizer with the default betas and epsilon
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            state: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    /// Number of updates applied under `id`
    pub fn step_count(&self, id: ParamId) -> u64 {
        self.state.get(&id).map_or(0, |s| s.step)
    }

    /// Number of tensors with moment state
    pub fn tracked(&self) -> usize {
        self.state.len()
    }

    /// Discard every moment buffer and step counter
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Update a vector parameter in place
    ///
    /// # Panics
    ///
    /// Panics if `params` and `grads` differ in length.
    pub fn step_vec(&mut self, id: ParamId, params: &mut [f64], grads: &[f64]) {
        self.update(id, params, grads);
    }

    /// Update a matrix parameter in place; every element is its own scalar
    pub fn step_matrix(&mut self, id: ParamId, params: &mut Matrix, grads: &Matrix) {
        assert_eq!(
            (params.rows(), params.cols()),
            (grads.rows(), grads.cols()),
            "Gradient shape must match parameter shape"
        );
        self.update(id, &mut params.data, &grads.data);
    }

    fn update(&mut self, id: ParamId, params: &mut [f64], grads: &[f64]) {
        assert_eq!(params.len(), grads.len(), "Gradient length must match parameter length");

        let state = self
            .state
            .entry(id)
            .or_insert_with(|| Moments::zeros(params.len()));
        if state.m.len() != params.len() {
            *state = Moments::zeros(params.len());
        }
        state.step += 1;

        let t = state.step as f64;
        let lr_t = self.lr * (1.0 - self.beta2.powf(t)).sqrt() / (1.0 - self.beta1.powf(t));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let decay = if id.decays() { self.weight_decay } else { 0.0 };

        let apply = |p: &mut f64, &g: &f64, m: &mut f64, v: &mut f64| {
            let g = g + decay * *p;
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + epsilon);
        };

        if params.len() > PARALLEL_THRESHOLD {
            params
                .par_iter_mut()
                .zip(grads.par_iter())
                .zip(state.m.par_iter_mut().zip(state.v.par_iter_mut()))
                .for_each(|((p, g), (m, v))| apply(p, g, m, v));
        } else {
            for ((p, g), (m, v)) in params
                .iter_mut()
                .zip(grads)
                .zip(state.m.iter_mut().zip(state.v.iter_mut()))
            {
                apply(p, g, m, v);
            }
        }
    }
}
