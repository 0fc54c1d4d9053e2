//! Truncated Backpropagation-Through-Time
//!
//! Trains an [`LstmModel`] on next-symbol prediction.
//!
//! ## Windows
//!
//! A sequence of `n` symbols gives `n - 1` predictions. They are processed in
//! windows of `window` steps (default 50):
//!
//! ```text
//! forward:   for t in window:
//!                x     = embedding[seq[t]]
//!                h, c  = cell.step(x, h, c)          (cache gates)
//!                probs = softmax(projection(h))
//!                loss += -ln probs[seq[t + 1]]
//! backward:  for t in window, reversed:
//!                dlogits = probs - onehot(seq[t + 1])
//!                dh      = projectionᵀ · dlogits + dh_next
//!                dh_next, dc_next, dx = cell.backward_step(dh, dc_next)
//!                d_embedding[seq[t]] += dx
//! update:    average over window steps, clip each tensor's norm, Adam
//! ```
//!
//! `h` and `c` carry over from one window to the next within a sequence, but
//! gradients do not flow across the boundary. Every call to
//! [`LstmTrainer::train_sequence`] starts from zero state.
//!
//! Only embedding rows used inside a window are updated.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use super::shuffled_indices;
use crate::config::LstmTrainerConfig;
use crate::gradients::{clip_matrix_norm, clip_norm, global_norm};
use crate::kernel::softmax;
use crate::layers::DenseCache;
use crate::lstm::{Gate, LstmCellGradients, LstmModel, LstmStepCache};
use crate::optimizer::{Adam, ParamId};
use crate::tensor::Matrix;

/// Probability floor inside the cross-entropy
const MIN_PROBABILITY: f64 = 1e-12;

/// Forward record of one time step
struct StepRecord {
    symbol: usize,
    target: usize,
    cell: LstmStepCache,
    projection: DenseCache,
    probs: Vec<f64>,
}

/// Gradient sums for one window
struct WindowGradients {
    cell: LstmCellGradients,
    projection_weights: Matrix,
    projection_bias: Vec<f64>,
    embedding_rows: BTreeMap<usize, Vec<f64>>,
}

impl WindowGradients {
    fn zeros(model: &LstmModel) -> Self {
        Self {
            cell: LstmCellGradients::zeros(model.cell()),
            projection_weights: Matrix::zeros(
                model.projection().out_features(),
                model.projection().in_features(),
            ),
            projection_bias: vec![0.0; model.projection().out_features()],
            embedding_rows: BTreeMap::new(),
        }
    }

    /// Norm over every tensor in the window, before averaging
    fn global_norm(&self) -> f64 {
        let gates = self
            .cell
            .gates
            .iter()
            .flat_map(|g| [g.weights.data.as_slice(), g.bias.as_slice()]);
        let rows = self.embedding_rows.values().map(Vec::as_slice);
        global_norm(
            gates
                .chain([self.projection_weights.data.as_slice(), self.projection_bias.as_slice()])
                .chain(rows),
        )
    }

    fn scale_and_clip(&mut self, factor: f64, max_norm: f64) {
        for gate in self.cell.gates.iter_mut() {
            gate.weights.scale_in_place(factor);
            clip_matrix_norm(&mut gate.weights, max_norm);
            scale_and_clip(&mut gate.bias, factor, max_norm);
        }
        self.projection_weights.scale_in_place(factor);
        clip_matrix_norm(&mut self.projection_weights, max_norm);
        scale_and_clip(&mut self.projection_bias, factor, max_norm);
        for row in self.embedding_rows.values_mut() {
            scale_and_clip(row, factor, max_norm);
        }
    }
}

fn scale_and_clip(values: &mut [f64], factor: f64, max_norm: f64) {
    values.iter_mut().for_each(|v| *v *= factor);
    clip_norm(values, max_norm);
}

/// Run the cell over `symbols`, predicting each next symbol
///
/// `h` and `c` are advanced in place. Returns one record per prediction and
/// the summed cross-entropy.
fn forward_window(
    model: &LstmModel,
    symbols: &[usize],
    h: &mut Vec<f64>,
    c: &mut Vec<f64>,
) -> (Vec<StepRecord>, f64) {
    let mut records = Vec::with_capacity(symbols.len().saturating_sub(1));
    let mut loss = 0.0;
    for pair in symbols.windows(2) {
        let (symbol, target) = (pair[0], pair[1]);
        let x = model.embedding().vectors().row(symbol);
        let (h_new, c_new, cell) = model.cell().step_cached(x, h, c);
        let (logits, projection) = model.projection().forward_cached(&h_new);
        let probs = softmax(&logits);
        loss -= probs[target].max(MIN_PROBABILITY).ln();
        records.push(StepRecord {
            symbol,
            target,
            cell,
            projection,
            probs,
        });
        *h = h_new;
        *c = c_new;
    }
    (records, loss)
}

/// Summed (not yet averaged) gradients of a window's loss
fn backward_window(model: &LstmModel, records: &[StepRecord]) -> WindowGradients {
    let mut grads = WindowGradients::zeros(model);
    let hidden = model.cell().hidden_size();
    let mut dh_next = vec![0.0; hidden];
    let mut dc_next = vec![0.0; hidden];

    for record in records.iter().rev() {
        let mut dlogits = record.probs.clone();
        dlogits[record.target] -= 1.0;

        let projection = model.projection().backward(&dlogits, &record.projection);
        grads.projection_weights.add_assign(&projection.weights);
        for (acc, g) in grads.projection_bias.iter_mut().zip(&projection.bias) {
            *acc += g;
        }

        let dh: Vec<f64> = projection
            .input
            .iter()
            .zip(&dh_next)
            .map(|(a, b)| a + b)
            .collect();
        let (dh_prev, dc_prev, dx) =
            model
                .cell()
                .backward_step(&record.cell, &dh, &dc_next, &mut grads.cell);

        let row = grads
            .embedding_rows
            .entry(record.symbol)
            .or_insert_with(|| vec![0.0; dx.len()]);
        for (acc, g) in row.iter_mut().zip(&dx) {
            *acc += g;
        }

        dh_next = dh_prev;
        dc_next = dc_prev;
    }
    grads
}

/// Adam-driven BPTT trainer for [`LstmModel`]
pub struct LstmTrainer {
    config: LstmTrainerConfig,
    optimizer: Adam,
}

impl LstmTrainer {
    pub fn new(config: LstmTrainerConfig) -> Self {
        let optimizer = Adam::new(config.learning_rate).with_weight_decay(config.weight_decay);
        Self { config, optimizer }
    }

    pub fn config(&self) -> &LstmTrainerConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Train on one sequence of vocabulary indices
    ///
    /// Returns the mean cross-entropy per predicted symbol. Sequences shorter
    /// than two symbols, or containing an index outside the vocabulary,
    /// contribute zero loss and leave the model untouched.
    pub fn train_sequence(&mut self, model: &mut LstmModel, seq: &[usize]) -> f64 {
        if seq.len() < 2 {
            return 0.0;
        }
        if let Some(&bad) = seq.iter().find(|&&s| s >= model.vocab_size()) {
            warn!("skipping sequence with symbol {bad} outside vocabulary of {}", model.vocab_size());
            return 0.0;
        }

        let window = self.config.window.max(1);
        let predictions = seq.len() - 1;
        let (mut h, mut c) = model.cell().zero_state();
        let mut total_loss = 0.0;

        for start in (0..predictions).step_by(window) {
            let end = (start + window).min(predictions);

            let (records, window_loss) = forward_window(model, &seq[start..=end], &mut h, &mut c);
            total_loss += window_loss;

            let mut grads = backward_window(model, &records);
            let norm = grads.global_norm();
            if !norm.is_finite() {
                warn!("non-finite gradient norm in window starting at {start}");
            }
            debug!("window {start}..{end}: gradient norm {norm:.4}");
            grads.scale_and_clip(1.0 / records.len() as f64, self.config.grad_clip);
            self.apply(model, grads);
        }

        let mean = total_loss / predictions as f64;
        debug!("sequence of {} symbols, mean loss {mean:.4}", seq.len());
        mean
    }

    fn apply(&mut self, model: &mut LstmModel, grads: WindowGradients) {
        for gate in Gate::ALL {
            let params = &mut model.cell.gates[gate.index()];
            let g = &grads.cell.gates[gate.index()];
            self.optimizer
                .step_matrix(ParamId::GateWeight(gate), &mut params.weights, &g.weights);
            self.optimizer
                .step_vec(ParamId::GateBias(gate), &mut params.bias, &g.bias);
        }

        self.optimizer.step_matrix(
            ParamId::ProjectionWeight,
            &mut model.projection.weights,
            &grads.projection_weights,
        );
        self.optimizer.step_vec(
            ParamId::ProjectionBias,
            &mut model.projection.bias,
            &grads.projection_bias,
        );

        for (symbol, g) in &grads.embedding_rows {
            if let Some(row) = model.embedding.row_mut(*symbol) {
                self.optimizer.step_vec(ParamId::EmbeddingRow(*symbol), row, g);
            }
        }
    }

    /// Mean cross-entropy per predicted symbol, without training
    pub fn evaluate_sequence(&self, model: &LstmModel, seq: &[usize]) -> Option<f64> {
        let ll = model.log_likelihood(seq)?;
        Some(-ll / (seq.len() - 1) as f64)
    }

    /// Several epochs over a corpus, visiting sequences in seeded order
    ///
    /// Returns the mean loss of each epoch over sequences long enough to
    /// train on.
    pub fn train_corpus(
        &mut self,
        model: &mut LstmModel,
        sequences: &[Vec<usize>],
        epochs: usize,
        seed: u64,
    ) -> Vec<f64> {
        let usable = sequences.iter().filter(|s| s.len() >= 2).count();
        let mut losses = Vec::with_capacity(epochs);
        for epoch in 1..=epochs {
            let order = shuffled_indices(sequences.len(), seed.wrapping_add(epoch as u64));
            let total: f64 = order
                .into_iter()
                .map(|i| self.train_sequence(model, &sequences[i]))
                .sum();
            let mean = if usable == 0 { 0.0 } else { total / usable as f64 };
            info!(
                "Epoch {:3} | sequences: {} | loss: {:.4} | perplexity: {:.2}",
                epoch,
                usable,
                mean,
                mean.exp()
            );
            losses.push(mean);
        }
        losses
    }
}
