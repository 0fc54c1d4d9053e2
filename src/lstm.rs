//! LSTM Cell and Language Model
//!
//! ## The Cell
//!
//! One step of a standard LSTM:
//!
//! ```text
//! combined = [h_prev, x]
//! f = σ(W_f · combined + b_f)      forget gate
//! i = σ(W_i · combined + b_i)      input gate
//! g = tanh(W_g · combined + b_g)   candidate
//! o = σ(W_o · combined + b_o)      output gate
//! c = f ⊙ c_prev + i ⊙ g
//! h = o ⊙ tanh(c)
//! ```
//!
//! The cell owns only its weights. Hidden and cell state are passed in and
//! returned by the caller on every step, so one cell can serve any number of
//! independent sequences and a backward pass never sees stale state.
//!
//! ## Backward Step
//!
//! Given `dh` and `dc` flowing into a step:
//!
//! ```text
//! dc     += dh ⊙ o ⊙ (1 - tanh²(c))
//! do_raw  = dh ⊙ tanh(c) ⊙ o(1 - o)
//! df_raw  = dc ⊙ c_prev ⊙ f(1 - f)
//! di_raw  = dc ⊙ g ⊙ i(1 - i)
//! dg_raw  = dc ⊙ i ⊙ (1 - g²)
//! dc_prev = dc ⊙ f
//! d_combined = Σ_gates W_gateᵀ · d_raw   →  split into dh_prev, dx
//! ```
//!
//! ## The Language Model
//!
//! [`LstmModel`] bundles an [`EmbeddingTable`] (symbol → input vector), the
//! cell, and a [`DenseLayer`] projecting the hidden state onto vocabulary
//! logits.

use crate::embedding::EmbeddingTable;
use crate::error::{NetError, NetResult};
use crate::kernel::{concat, log_softmax, softmax};
use crate::layers::{random_init, Activation, DenseLayer};
use crate::tensor::Matrix;

/// The four LSTM gates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gate {
    Forget,
    Input,
    Candidate,
    Output,
}

impl Gate {
    pub const ALL: [Gate; 4] = [Gate::Forget, Gate::Input, Gate::Candidate, Gate::Output];

    pub fn index(self) -> usize {
        match self {
            Gate::Forget => 0,
            Gate::Input => 1,
            Gate::Candidate => 2,
            Gate::Output => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Gate::Forget => "forget",
            Gate::Input => "input",
            Gate::Candidate => "candidate",
            Gate::Output => "output",
        }
    }

    fn activation(self) -> Activation {
        match self {
            Gate::Candidate => Activation::Tanh,
            _ => Activation::Sigmoid,
        }
    }
}

/// Weights and bias of one gate
#[derive(Clone, Debug, PartialEq)]
pub struct GateParams {
    pub weights: Matrix,
    pub bias: Vec<f64>,
}

impl GateParams {
    pub fn zeros(hidden_size: usize, combined_size: usize) -> Self {
        Self {
            weights: Matrix::zeros(hidden_size, combined_size),
            bias: vec![0.0; hidden_size],
        }
    }

    fn preactivation(&self, combined: &[f64]) -> Vec<f64> {
        let mut z = self.weights.matvec(combined);
        for (v, b) in z.iter_mut().zip(&self.bias) {
            *v += b;
        }
        z
    }
}

/// A stateless LSTM cell
#[derive(Clone, Debug, PartialEq)]
pub struct LstmCell {
    input_size: usize,
    hidden_size: usize,
    pub(crate) gates: [GateParams; 4],
}

impl LstmCell {
    /// Create a cell from explicit gate parameters, ordered as [`Gate::ALL`]
    ///
    /// # Errors
    ///
    /// Every gate must hold a `hidden × (hidden + input)` matrix and a bias of
    /// length `hidden`.
    pub fn new(input_size: usize, hidden_size: usize, gates: [GateParams; 4]) -> NetResult<Self> {
        let combined = hidden_size + input_size;
        for gate in Gate::ALL {
            let params = &gates[gate.index()];
            if params.weights.rows() != hidden_size
                || params.weights.cols() != combined
                || params.bias.len() != hidden_size
            {
                return Err(NetError::GateShape {
                    gate: gate.name(),
                    expected_rows: hidden_size,
                    expected_cols: combined,
                });
            }
        }
        Ok(Self {
            input_size,
            hidden_size,
            gates,
        })
    }

    /// Randomly initialised cell
    ///
    /// Weights use std = 1/√(hidden + input); the forget bias starts at 1.0
    /// so early training keeps the cell state.
    pub fn seeded(input_size: usize, hidden_size: usize, seed: u64) -> Self {
        let combined = hidden_size + input_size;
        let std = if combined == 0 { 0.0 } else { 1.0 / (combined as f64).sqrt() };
        let gates = Gate::ALL.map(|gate| {
            let data = random_init(hidden_size * combined, std, seed.wrapping_add(gate.index() as u64));
            let bias_value = if gate == Gate::Forget { 1.0 } else { 0.0 };
            GateParams {
                weights: Matrix::new(data, hidden_size, combined),
                bias: vec![bias_value; hidden_size],
            }
        });
        Self {
            input_size,
            hidden_size,
            gates,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn gate(&self, gate: Gate) -> &GateParams {
        &self.gates[gate.index()]
    }

    /// Σ over gates of rows·cols + rows
    pub fn param_count(&self) -> usize {
        self.gates.iter().map(|g| g.weights.len() + g.bias.len()).sum()
    }

    /// Zeroed `(h, c)`
    pub fn zero_state(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0; self.hidden_size], vec![0.0; self.hidden_size])
    }

    /// Advance one step
    ///
    /// # Panics
    ///
    /// Panics if `x`, `h` or `c` have the wrong length.
    pub fn step(&self, x: &[f64], h: &[f64], c: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (h_new, c_new, _) = self.step_cached(x, h, c);
        (h_new, c_new)
    }

    /// Advance one step and keep the gate activations for BPTT
    pub fn step_cached(&self, x: &[f64], h: &[f64], c: &[f64]) -> (Vec<f64>, Vec<f64>, LstmStepCache) {
        assert_eq!(x.len(), self.input_size, "Input length must match LSTM input size");
        assert_eq!(h.len(), self.hidden_size, "Hidden state length must match LSTM hidden size");
        assert_eq!(c.len(), self.hidden_size, "Cell state length must match LSTM hidden size");

        let combined = concat(h, x);
        let [f, i, g, o] = Gate::ALL.map(|gate| {
            let act = gate.activation();
            self.gates[gate.index()]
                .preactivation(&combined)
                .into_iter()
                .map(|z| act.apply(z))
                .collect::<Vec<f64>>()
        });

        let c_new: Vec<f64> = (0..self.hidden_size)
            .map(|k| f[k] * c[k] + i[k] * g[k])
            .collect();
        let tanh_c: Vec<f64> = c_new.iter().map(|v| v.tanh()).collect();
        let h_new: Vec<f64> = o.iter().zip(&tanh_c).map(|(o, t)| o * t).collect();

        let cache = LstmStepCache {
            combined,
            c_prev: c.to_vec(),
            tanh_c,
            activations: [f, i, g, o],
        };
        (h_new, c_new, cache)
    }

    /// Backward through one step, accumulating into `grads`
    ///
    /// Returns `(dh_prev, dc_prev, dx)`.
    pub fn backward_step(
        &self,
        cache: &LstmStepCache,
        dh: &[f64],
        dc: &[f64],
        grads: &mut LstmCellGradients,
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let n = self.hidden_size;
        let [f, i, g, o] = &cache.activations;

        let mut raw: [Vec<f64>; 4] = [vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        let mut dc_prev = vec![0.0; n];
        for k in 0..n {
            let t = cache.tanh_c[k];
            let dc_total = dc[k] + dh[k] * o[k] * (1.0 - t * t);
            raw[Gate::Output.index()][k] = dh[k] * t * o[k] * (1.0 - o[k]);
            raw[Gate::Forget.index()][k] = dc_total * cache.c_prev[k] * f[k] * (1.0 - f[k]);
            raw[Gate::Input.index()][k] = dc_total * g[k] * i[k] * (1.0 - i[k]);
            raw[Gate::Candidate.index()][k] = dc_total * i[k] * (1.0 - g[k] * g[k]);
            dc_prev[k] = dc_total * f[k];
        }

        let mut d_combined = vec![0.0; n + self.input_size];
        for gate in Gate::ALL {
            let idx = gate.index();
            let grad = &mut grads.gates[idx];
            grad.weights.add_outer(&raw[idx], &cache.combined);
            for (b, d) in grad.bias.iter_mut().zip(&raw[idx]) {
                *b += d;
            }
            let back = self.gates[idx].weights.transpose_matvec(&raw[idx]);
            for (acc, v) in d_combined.iter_mut().zip(back) {
                *acc += v;
            }
        }

        let dx = d_combined.split_off(n);
        (d_combined, dc_prev, dx)
    }
}

/// What one forward step keeps for the backward pass
#[derive(Clone, Debug)]
pub struct LstmStepCache {
    pub combined: Vec<f64>,
    pub c_prev: Vec<f64>,
    pub tanh_c: Vec<f64>,
    /// Gate outputs ordered as [`Gate::ALL`]
    pub activations: [Vec<f64>; 4],
}

/// Gradient accumulators for all four gates
#[derive(Clone, Debug)]
pub struct LstmCellGradients {
    pub gates: [GateParams; 4],
}

impl LstmCellGradients {
    pub fn zeros(cell: &LstmCell) -> Self {
        let combined = cell.hidden_size + cell.input_size;
        Self {
            gates: Gate::ALL.map(|_| GateParams::zeros(cell.hidden_size, combined)),
        }
    }

    pub fn gate(&self, gate: Gate) -> &GateParams {
        &self.gates[gate.index()]
    }
}

/// Embedding + LSTM cell + output projection
#[derive(Clone, Debug, PartialEq)]
pub struct LstmModel {
    pub(crate) embedding: EmbeddingTable,
    pub(crate) cell: LstmCell,
    pub(crate) projection: DenseLayer,
}

impl LstmModel {
    /// Bundle the three parts
    ///
    /// # Errors
    ///
    /// The embedding width must equal the cell input size, and the projection
    /// must map `hidden_size` onto the vocabulary.
    pub fn new(embedding: EmbeddingTable, cell: LstmCell, projection: DenseLayer) -> NetResult<Self> {
        if embedding.dim() != cell.input_size() {
            return Err(NetError::EmbeddingWidth {
                embedding: embedding.dim(),
                input: cell.input_size(),
            });
        }
        if projection.out_features() != embedding.len()
            || projection.in_features() != cell.hidden_size()
        {
            return Err(NetError::ProjectionShape {
                rows: projection.out_features(),
                cols: projection.in_features(),
                expected_rows: embedding.len(),
                expected_cols: cell.hidden_size(),
            });
        }
        Ok(Self {
            embedding,
            cell,
            projection,
        })
    }

    /// Randomly initialised model over `vocab`
    pub fn seeded(vocab: Vec<String>, embed_dim: usize, hidden_size: usize, seed: u64) -> NetResult<Self> {
        let vocab_size = vocab.len();
        if vocab_size == 0 || hidden_size == 0 {
            return Err(NetError::EmptyWeights { index: 0 });
        }
        let embedding = EmbeddingTable::seeded(vocab, embed_dim, seed)?;
        let cell = LstmCell::seeded(embed_dim, hidden_size, seed.wrapping_add(100));
        let projection =
            DenseLayer::seeded(hidden_size, vocab_size, Activation::Linear, seed.wrapping_add(200));
        Self::new(embedding, cell, projection)
    }

    /// Character-level model whose vocabulary is every distinct char of `text`
    pub fn for_characters(text: &str, embed_dim: usize, hidden_size: usize, seed: u64) -> NetResult<Self> {
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        let vocab = chars.into_iter().map(String::from).collect();
        Self::seeded(vocab, embed_dim, hidden_size, seed)
    }

    pub fn embedding(&self) -> &EmbeddingTable {
        &self.embedding
    }

    pub fn cell(&self) -> &LstmCell {
        &self.cell
    }

    pub fn projection(&self) -> &DenseLayer {
        &self.projection
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.len()
    }

    pub fn param_count(&self) -> usize {
        self.embedding.vectors().len() + self.cell.param_count() + self.projection.param_count()
    }

    /// Map each char of `text` to its vocabulary index, dropping unknown chars
    pub fn encode_chars(&self, text: &str) -> Vec<usize> {
        let mut buf = [0u8; 4];
        text.chars()
            .filter_map(|ch| self.embedding.index_of(ch.encode_utf8(&mut buf)))
            .collect()
    }

    /// Vocabulary logits for a hidden state
    pub fn logits(&self, h: &[f64]) -> Vec<f64> {
        self.projection.forward(h)
    }

    /// Feed one symbol, `None` if the index is outside the vocabulary
    pub fn step_symbol(&self, symbol: usize, h: &[f64], c: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
        let x = self.embedding.row(symbol)?;
        Some(self.cell.step(x, h, c))
    }

    /// Σ ln p(seq[t+1] | seq[..=t]) from zero state
    ///
    /// `None` for sequences shorter than two symbols or with unknown indices.
    pub fn log_likelihood(&self, seq: &[usize]) -> Option<f64> {
        if seq.len() < 2 {
            return None;
        }
        let (mut h, mut c) = self.cell.zero_state();
        let mut total = 0.0;
        for pair in seq.windows(2) {
            let (h_new, c_new) = self.step_symbol(pair[0], &h, &c)?;
            h = h_new;
            c = c_new;
            let log_probs = log_softmax(&self.logits(&h));
            total += *log_probs.get(pair[1])?;
        }
        Some(total)
    }

    /// exp(mean negative log-likelihood per predicted symbol)
    pub fn perplexity(&self, seq: &[usize]) -> Option<f64> {
        let ll = self.log_likelihood(seq)?;
        Some((-ll / (seq.len() - 1) as f64).exp())
    }

    /// Distribution over the symbol following `prefix`
    pub fn next_symbol_distribution(&self, prefix: &[usize]) -> Option<Vec<f64>> {
        if prefix.is_empty() {
            return None;
        }
        let (mut h, mut c) = self.cell.zero_state();
        for &symbol in prefix {
            let (h_new, c_new) = self.step_symbol(symbol, &h, &c)?;
            h = h_new;
            c = c_new;
        }
        Some(softmax(&self.logits(&h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_is_deterministic_and_stateless() {
        let cell = LstmCell::seeded(3, 4, 5);
        let inputs = [[0.1, -0.2, 0.3], [0.5, 0.0, -0.5], [1.0, 1.0, 1.0]];

        let run = || {
            let (mut h, mut c) = cell.zero_state();
            let mut trajectory = Vec::new();
            for x in &inputs {
                let (h2, c2) = cell.step(x, &h, &c);
                trajectory.push((h2.clone(), c2.clone()));
                h = h2;
                c = c2;
            }
            trajectory
        };

        let first = run();
        let second = run();
        for ((h1, c1), (h2, c2)) in first.iter().zip(&second) {
            assert_eq!(
                h1.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                h2.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
            assert_eq!(
                c1.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                c2.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_zero_weights_give_half_gates() {
        let gates = Gate::ALL.map(|_| GateParams::zeros(2, 3));
        let cell = LstmCell::new(1, 2, gates).unwrap();
        let (h, c) = cell.step(&[1.0], &[0.0, 0.0], &[2.0, 2.0]);
        // f = i = o = 0.5, g = 0 → c = 1.0, h = 0.5 * tanh(1)
        assert_relative_eq!(c[0], 1.0);
        assert_relative_eq!(h[0], 0.5 * 1.0f64.tanh());
    }

    #[test]
    fn test_gate_shape_rejected() {
        let mut gates = Gate::ALL.map(|_| GateParams::zeros(2, 3));
        gates[Gate::Output.index()].bias = vec![0.0];
        let err = LstmCell::new(1, 2, gates).unwrap_err();
        assert!(matches!(err, NetError::GateShape { gate: "output", .. }));
    }

    #[test]
    fn test_backward_step_matches_finite_differences() {
        let cell = LstmCell::seeded(2, 3, 17);
        let x = [0.4, -0.7];
        let h0 = [0.1, -0.3, 0.2];
        let c0 = [0.5, 0.0, -0.4];
        let wh = [0.3, -0.6, 0.9];
        let wc = [-0.2, 0.4, 0.1];
        let loss = |cell: &LstmCell, x: &[f64]| -> f64 {
            let (h, c) = cell.step(x, &h0, &c0);
            h.iter().zip(&wh).map(|(a, b)| a * b).sum::<f64>()
                + c.iter().zip(&wc).map(|(a, b)| a * b).sum::<f64>()
        };

        let (_, _, cache) = cell.step_cached(&x, &h0, &c0);
        let mut grads = LstmCellGradients::zeros(&cell);
        let (_, _, dx) = cell.backward_step(&cache, &wh, &wc, &mut grads);

        let h = 1e-6;
        for gate in Gate::ALL {
            let idx = gate.index();
            for k in 0..cell.gates[idx].weights.len() {
                let mut plus = cell.clone();
                let mut minus = cell.clone();
                plus.gates[idx].weights.data[k] += h;
                minus.gates[idx].weights.data[k] -= h;
                let numeric = (loss(&plus, &x) - loss(&minus, &x)) / (2.0 * h);
                assert_relative_eq!(grads.gates[idx].weights.data[k], numeric, epsilon = 1e-5);
            }
        }
        for k in 0..x.len() {
            let mut plus = x;
            let mut minus = x;
            plus[k] += h;
            minus[k] -= h;
            let numeric = (loss(&cell, &plus) - loss(&cell, &minus)) / (2.0 * h);
            assert_relative_eq!(dx[k], numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_model_short_sequences_are_none() {
        let model = LstmModel::for_characters("abc", 4, 5, 1).unwrap();
        assert_eq!(model.vocab_size(), 3);
        assert!(model.log_likelihood(&[0]).is_none());
        assert!(model.perplexity(&[]).is_none());
        assert!(model.log_likelihood(&[0, 7]).is_none());
        let ppl = model.perplexity(&[0, 1, 2]).unwrap();
        assert!(ppl.is_finite() && ppl > 0.0);
    }

    #[test]
    fn test_next_symbol_distribution_sums_to_one() {
        let model = LstmModel::for_characters("hello", 3, 4, 2).unwrap();
        let seq = model.encode_chars("hel");
        assert_eq!(seq.len(), 3);
        let dist = model.next_symbol_distribution(&seq).unwrap();
        assert_relative_eq!(dist.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}
