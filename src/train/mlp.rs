//! Backpropagation for Feedforward Networks
//!
//! ## Loss
//!
//! Binary cross-entropy on the positive-class probability that
//! [`FeedForwardNet::predict_proba`] reports:
//!
//! ```text
//! p    = clamp(predict_proba(x), 1e-7, 1 - 1e-7)
//! loss = -[t·ln(p) + (1 - t)·ln(1 - p)]
//! ```
//!
//! ## Gradient at the Output
//!
//! ```text
//! one output unit:   dL/dy₀ = p - t
//! n output units:    dL/dyⱼ = dL/dp · p·(δⱼ₁ - sⱼ),   s = softmax(y)
//! ```
//!
//! From there each layer's `backward` walks the activation derivative, the
//! optional layer norm and the affine transform, output to input. Every weight
//! and bias gradient is then clamped element-wise to `±grad_clip` before Adam
//! sees it.
//!
//! ## Training Loop
//!
//! ```text
//! for epoch in 1..=epochs:
//!     shuffle(train, seed + epoch)
//!     for (x, t) in train: train_step(x, t)
//!     report = evaluate(val)
//!     keep weights if report.loss is the best so far
//!     stop after `patience` epochs without improvement
//! restore best weights
//! ```

use log::{debug, info};
use rayon::prelude::*;

use super::shuffled_indices;
use crate::config::MlpTrainerConfig;
use crate::gradients::{clip_elementwise, clip_matrix_elementwise};
use crate::kernel::softmax;
use crate::layers::DenseGradients;
use crate::network::{output_probability, FeedForwardNet};
use crate::optimizer::{Adam, ParamId};
use crate::training_logger::{EpochMetrics, TrainingLogger};

/// Lower and upper probability clamp for the loss
pub const PROBABILITY_CLAMP: f64 = 1e-7;

/// Decision threshold used by [`MlpTrainer::evaluate`]
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Binary cross-entropy with `p` clamped away from 0 and 1
pub fn bce_loss(p: f64, target: f64) -> f64 {
    let p = p.clamp(PROBABILITY_CLAMP, 1.0 - PROBABILITY_CLAMP);
    -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
}

/// Per-layer weight and bias gradients, ordered input to output
#[derive(Clone, Debug)]
pub struct MlpGradients {
    pub layers: Vec<DenseGradients>,
}

impl MlpGradients {
    /// Largest absolute weight or bias gradient
    pub fn max_abs(&self) -> f64 {
        self.layers
            .iter()
            .map(|g| {
                g.bias
                    .iter()
                    .fold(g.weights.max_abs(), |acc, b| acc.max(b.abs()))
            })
            .fold(0.0, f64::max)
    }
}

/// Confusion matrix and derived metrics at the 0.5 threshold
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalReport {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean binary cross-entropy
    pub loss: f64,
}

impl EvalReport {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// What [`MlpTrainer::fit`] did
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch (1-based) whose weights were restored, 0 if none ran
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
}

/// Adam-driven trainer for [`FeedForwardNet`]
pub struct MlpTrainer {
    config: MlpTrainerConfig,
    optimizer: Adam,
}

impl MlpTrainer {
    pub fn new(config: MlpTrainerConfig) -> Self {
        let optimizer = Adam::new(config.learning_rate).with_weight_decay(config.weight_decay);
        Self { config, optimizer }
    }

    pub fn config(&self) -> &MlpTrainerConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Loss and clipped gradients for one sample, without touching weights
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from the network input size.
    pub fn compute_gradients(&self, net: &FeedForwardNet, x: &[f64], target: f64) -> (f64, MlpGradients) {
        let (output, caches) = net.forward_cached(x);
        let p = output_probability(&output);
        let loss = bce_loss(p, target);

        let mut grad = output_gradient(&output, p, target);
        let mut layers = Vec::with_capacity(net.layers.len());
        for (layer, cache) in net.layers.iter().zip(&caches).rev() {
            let mut grads = layer.backward(&grad, cache);
            grad = std::mem::take(&mut grads.input);
            clip_matrix_elementwise(&mut grads.weights, self.config.grad_clip);
            clip_elementwise(&mut grads.bias, self.config.grad_clip);
            layers.push(grads);
        }
        layers.reverse();

        (loss, MlpGradients { layers })
    }

    /// One forward/backward/update on a single sample
    ///
    /// An empty feature vector contributes zero loss and no update.
    pub fn train_step(&mut self, net: &mut FeedForwardNet, x: &[f64], target: f64) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let (loss, grads) = self.compute_gradients(net, x, target);
        self.apply(net, &grads);
        loss
    }

    /// Adam update of every layer from precomputed gradients
    pub fn apply(&mut self, net: &mut FeedForwardNet, grads: &MlpGradients) {
        for (i, (layer, g)) in net.layers.iter_mut().zip(&grads.layers).enumerate() {
            self.optimizer
                .step_matrix(ParamId::LayerWeight(i), &mut layer.weights, &g.weights);
            self.optimizer
                .step_vec(ParamId::LayerBias(i), &mut layer.bias, &g.bias);
        }
    }

    /// One pass over `data` in a seeded shuffled order
    ///
    /// Returns the mean loss, 0 for an empty dataset.
    pub fn train_epoch(&mut self, net: &mut FeedForwardNet, data: &[(Vec<f64>, f64)], seed: u64) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: f64 = shuffled_indices(data.len(), seed)
            .into_iter()
            .map(|i| {
                let (x, t) = &data[i];
                self.train_step(net, x, *t)
            })
            .sum();
        total / data.len() as f64
    }

    /// Confusion matrix, metrics and mean loss; never mutates the network
    pub fn evaluate(&self, net: &FeedForwardNet, data: &[(Vec<f64>, f64)]) -> EvalReport {
        evaluate(net, data)
    }

    /// Epoch loop with early stopping and best-weight restore
    ///
    /// # Arguments
    ///
    /// * `net` - Network to train; holds the best weights on return
    /// * `train` - Training pairs
    /// * `val` - Validation pairs; when empty the training loss is monitored
    /// * `epochs` - Maximum number of epochs
    /// * `seed` - Shuffle seed; epoch *e* uses `seed + e`
    /// * `logger` - Optional CSV logger
    pub fn fit(
        &mut self,
        net: &mut FeedForwardNet,
        train: &[(Vec<f64>, f64)],
        val: &[(Vec<f64>, f64)],
        epochs: usize,
        seed: u64,
        mut logger: Option<&mut TrainingLogger>,
    ) -> std::io::Result<TrainingHistory> {
        info!(
            "training {:?}: {} parameters, {} train / {} val samples, up to {} epochs",
            net.name(),
            net.param_count(),
            train.len(),
            val.len(),
            epochs
        );

        let mut history = TrainingHistory {
            epochs: Vec::with_capacity(epochs),
            best_epoch: 0,
            best_val_loss: f64::INFINITY,
            stopped_early: false,
        };
        let mut best_net = net.clone();
        let mut stale = 0usize;

        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(net, train, seed.wrapping_add(epoch as u64));
            let (val_loss, val_accuracy, val_f1) = if val.is_empty() {
                (train_loss, None, None)
            } else {
                let report = self.evaluate(net, val);
                (report.loss, Some(report.accuracy), Some(report.f1))
            };

            let metrics = EpochMetrics {
                epoch,
                learning_rate: self.optimizer.learning_rate(),
                train_loss,
                val_loss,
                val_accuracy,
                val_f1,
            };
            if let Some(logger) = logger.as_deref_mut() {
                logger.log(&metrics)?;
            }
            history.epochs.push(metrics);

            if val_loss < history.best_val_loss {
                history.best_val_loss = val_loss;
                history.best_epoch = epoch;
                best_net = net.clone();
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.patience {
                    info!("no improvement for {stale} epochs, stopping at epoch {epoch}");
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if history.best_epoch > 0 {
            debug!("restoring weights from epoch {}", history.best_epoch);
            *net = best_net;
        }
        Ok(history)
    }
}

/// dL/dy for the final layer output
fn output_gradient(output: &[f64], p: f64, target: f64) -> Vec<f64> {
    match output.len() {
        0 => Vec::new(),
        1 => vec![p - target],
        _ => {
            let s = softmax(output);
            let pc = p.clamp(PROBABILITY_CLAMP, 1.0 - PROBABILITY_CLAMP);
            let dl_dp = -target / pc + (1.0 - target) / (1.0 - pc);
            s.iter()
                .enumerate()
                .map(|(j, &sj)| {
                    let delta = if j == 1 { 1.0 } else { 0.0 };
                    dl_dp * s[1] * (delta - sj)
                })
                .collect()
        }
    }
}

/// Confusion matrix and metrics for `data`
pub fn evaluate(net: &FeedForwardNet, data: &[(Vec<f64>, f64)]) -> EvalReport {
    if data.is_empty() {
        return EvalReport::default();
    }

    let scored: Vec<(f64, f64)> = data
        .par_iter()
        .map(|(x, t)| {
            let p = net.predict_proba(x);
            (p, *t)
        })
        .collect();

    let mut report = EvalReport::default();
    let mut total_loss = 0.0;
    for &(p, t) in &scored {
        total_loss += bce_loss(p, t);
        let predicted = p >= DECISION_THRESHOLD;
        let actual = t >= DECISION_THRESHOLD;
        match (predicted, actual) {
            (true, true) => report.tp += 1,
            (true, false) => report.fp += 1,
            (false, false) => report.tn += 1,
            (false, true) => report.fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    report.accuracy = ratio(report.tp + report.tn, scored.len());
    report.precision = ratio(report.tp, report.tp + report.fp);
    report.recall = ratio(report.tp, report.tp + report.fn_);
    report.f1 = if report.precision + report.recall == 0.0 {
        0.0
    } else {
        2.0 * report.precision * report.recall / (report.precision + report.recall)
    };
    report.loss = total_loss / scored.len() as f64;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Activation;
    use approx::assert_relative_eq;

    fn separable(n: usize) -> Vec<(Vec<f64>, f64)> {
        (0..n)
            .map(|i| {
                let a = (i as f64 * 0.61).sin();
                let b = (i as f64 * 1.37).cos();
                let label = if a + b > 0.0 { 1.0 } else { 0.0 };
                (vec![a, b], label)
            })
            .collect()
    }

    #[test]
    fn test_bce_bounds() {
        assert!(bce_loss(0.99, 1.0) < 0.02);
        assert!(bce_loss(0.01, 1.0) > 3.0);
        assert!(bce_loss(0.0, 1.0).is_finite());
        assert!(bce_loss(1.0, 0.0).is_finite());
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        for sizes in [vec![3, 4, 1], vec![3, 4, 2]] {
            let net = FeedForwardNet::seeded("fd", &sizes, Activation::Tanh, Activation::Linear, 5).unwrap();
            let trainer = MlpTrainer::new(MlpTrainerConfig {
                grad_clip: f64::INFINITY,
                ..MlpTrainerConfig::default()
            });
            let x = [0.3, -0.8, 0.5];
            let (_, grads) = trainer.compute_gradients(&net, &x, 1.0);

            let h = 1e-6;
            for (li, layer) in net.layers.iter().enumerate() {
                for k in 0..layer.weights.len() {
                    let mut plus = net.clone();
                    let mut minus = net.clone();
                    plus.layers[li].weights.data[k] += h;
                    minus.layers[li].weights.data[k] -= h;
                    let numeric =
                        (bce_loss(plus.predict_proba(&x), 1.0) - bce_loss(minus.predict_proba(&x), 1.0)) / (2.0 * h);
                    assert_relative_eq!(grads.layers[li].weights.data[k], numeric, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_gradients_are_clamped() {
        let net = FeedForwardNet::seeded("clip", &[2, 3, 1], Activation::Relu, Activation::Linear, 1).unwrap();
        let trainer = MlpTrainer::new(MlpTrainerConfig {
            grad_clip: 0.01,
            ..MlpTrainerConfig::default()
        });
        let (_, grads) = trainer.compute_gradients(&net, &[100.0, -50.0], 1.0);
        assert!(grads.max_abs() <= 0.01);
    }

    #[test]
    fn test_empty_features_do_not_update() {
        let mut net = FeedForwardNet::seeded("e", &[2, 1], Activation::Linear, Activation::Linear, 1).unwrap();
        let before = net.clone();
        let mut trainer = MlpTrainer::new(MlpTrainerConfig::default());
        assert_eq!(trainer.train_step(&mut net, &[], 1.0), 0.0);
        assert_eq!(net, before);
    }

    #[test]
    fn test_training_reduces_loss() {
        let data = separable(80);
        let mut net = FeedForwardNet::seeded("sep", &[2, 8, 1], Activation::Tanh, Activation::Linear, 3).unwrap();
        let mut trainer = MlpTrainer::new(MlpTrainerConfig::quick());
        let before = trainer.evaluate(&net, &data).loss;
        for epoch in 0..30 {
            trainer.train_epoch(&mut net, &data, epoch);
        }
        let after = trainer.evaluate(&net, &data);
        assert!(after.loss < before);
        assert!(after.accuracy > 0.8);
        assert_eq!(after.total(), 80);
    }

    #[test]
    fn test_train_epoch_is_deterministic() {
        let data = separable(30);
        let run = || {
            let mut net = FeedForwardNet::seeded("d", &[2, 4, 1], Activation::Gelu, Activation::Linear, 9).unwrap();
            let mut trainer = MlpTrainer::new(MlpTrainerConfig::default());
            trainer.train_epoch(&mut net, &data, 42);
            net
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_evaluate_confusion_matrix() {
        // Single linear unit: p = sigmoid(x₀)
        let net = FeedForwardNet::new(
            "id",
            vec![crate::layers::DenseLayer::from_rows(&[vec![1.0]], vec![0.0], Activation::Linear, false).unwrap()],
        )
        .unwrap();
        let data = vec![
            (vec![5.0], 1.0),
            (vec![5.0], 0.0),
            (vec![-5.0], 0.0),
            (vec![-5.0], 1.0),
            (vec![-5.0], 0.0),
        ];
        let report = evaluate(&net, &data);
        assert_eq!((report.tp, report.fp, report.tn, report.fn_), (1, 1, 2, 1));
        assert_relative_eq!(report.accuracy, 0.6);
        assert_relative_eq!(report.precision, 0.5);
        assert_relative_eq!(report.recall, 0.5);
        assert_relative_eq!(report.f1, 0.5);
        assert_eq!(evaluate(&net, &[]), EvalReport::default());
    }

    #[test]
    fn test_fit_restores_best_weights() {
        let data = separable(60);
        let (train, val) = data.split_at(45);
        let mut net = FeedForwardNet::seeded("fit", &[2, 6, 1], Activation::Tanh, Activation::Linear, 4).unwrap();
        let mut trainer = MlpTrainer::new(MlpTrainerConfig::quick());
        let history = trainer.fit(&mut net, train, val, 20, 7, None).unwrap();

        assert!(history.best_epoch >= 1);
        assert!(!history.epochs.is_empty());
        let restored = trainer.evaluate(&net, val).loss;
        assert_relative_eq!(restored, history.best_val_loss, epsilon = 1e-12);
        let min = history
            .epochs
            .iter()
            .map(|m| m.val_loss)
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(min, history.best_val_loss);
    }
}
