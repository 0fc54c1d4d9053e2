//! Embedding Tables
//!
//! A fixed vocabulary of symbols mapped one-to-one onto rows of a matrix. The
//! table keeps both directions: position → symbol (the ordered vocabulary) and
//! symbol → position (a reverse index).
//!
//! Looking up a symbol the table does not know returns `None`. The table never
//! invents a vector for an unknown symbol, so callers cannot mistake a
//! placeholder for real data.
//!
//! ## Example
//!
//! ```rust
//! use scrivener::EmbeddingTable;
//!
//! let table = EmbeddingTable::seeded(vec!["a".into(), "b".into()], 4, 1).unwrap();
//! assert_eq!(table.lookup("a").map(<[f64]>::len), Some(4));
//! assert!(table.lookup("z").is_none());
//! ```

use std::collections::HashMap;

use crate::error::{NetError, NetResult};
use crate::kernel::cosine_similarity;
use crate::layers::random_init;
use crate::tensor::Matrix;

/// Symbol → dense vector lookup
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingTable {
    vocab: Vec<String>,
    index: HashMap<String, usize>,
    pub(crate) vectors: Matrix,
}

impl EmbeddingTable {
    /// Create a table from a vocabulary and one row per symbol
    ///
    /// # Errors
    ///
    /// Fails on duplicate symbols or when the row count differs from the
    /// vocabulary size.
    pub fn new(vocab: Vec<String>, vectors: Matrix) -> NetResult<Self> {
        if vocab.len() != vectors.rows() {
            return Err(NetError::EmbeddingRows {
                symbols: vocab.len(),
                rows: vectors.rows(),
            });
        }
        let mut index = HashMap::with_capacity(vocab.len());
        for (i, symbol) in vocab.iter().enumerate() {
            if index.insert(symbol.clone(), i).is_some() {
                return Err(NetError::DuplicateSymbol(symbol.clone()));
            }
        }
        Ok(Self {
            vocab,
            index,
            vectors,
        })
    }

    /// Randomly initialised table, std = 1/√dim
    pub fn seeded(vocab: Vec<String>, dim: usize, seed: u64) -> NetResult<Self> {
        let std = if dim == 0 { 0.0 } else { 1.0 / (dim as f64).sqrt() };
        let rows = vocab.len();
        Self::new(vocab, Matrix::new(random_init(rows * dim, std, seed), rows, dim))
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    /// Width of every vector
    pub fn dim(&self) -> usize {
        self.vectors.cols()
    }

    pub fn vocab(&self) -> &[String] {
        &self.vocab
    }

    pub fn vectors(&self) -> &Matrix {
        &self.vectors
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, index: usize) -> Option<&str> {
        self.vocab.get(index).map(String::as_str)
    }

    /// Vector for a symbol, `None` when unknown
    pub fn lookup(&self, symbol: &str) -> Option<&[f64]> {
        self.index_of(symbol).map(|i| self.vectors.row(i))
    }

    /// Vector at a vocabulary position
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        (index < self.len()).then(|| self.vectors.row(index))
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut [f64]> {
        if index < self.len() {
            Some(self.vectors.row_mut(index))
        } else {
            None
        }
    }

    /// Map symbols to positions, `None` if any symbol is unknown
    pub fn encode<S: AsRef<str>>(&self, symbols: &[S]) -> Option<Vec<usize>> {
        symbols.iter().map(|s| self.index_of(s.as_ref())).collect()
    }

    /// Mean of the known symbols' vectors
    ///
    /// Unknown symbols are skipped. Returns `None` if none are known.
    pub fn average<S: AsRef<str>>(&self, symbols: &[S]) -> Option<Vec<f64>> {
        let mut sum = vec![0.0; self.dim()];
        let mut count = 0usize;
        for vector in symbols.iter().filter_map(|s| self.lookup(s.as_ref())) {
            for (acc, v) in sum.iter_mut().zip(vector) {
                *acc += v;
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(sum.into_iter().map(|v| v / n).collect())
    }

    /// Cosine similarity of two symbols, `None` if either is unknown
    pub fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        Some(cosine_similarity(self.lookup(a)?, self.lookup(b)?))
    }

    /// The `k` symbols closest to `symbol` by cosine similarity
    ///
    /// The symbol itself is excluded. Ties keep vocabulary order.
    pub fn most_similar(&self, symbol: &str, k: usize) -> Vec<(String, f64)> {
        let Some(target_index) = self.index_of(symbol) else {
            return Vec::new();
        };
        let target = self.vectors.row(target_index);
        let mut scored: Vec<(String, f64)> = self
            .vocab
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != target_index)
            .map(|(i, s)| (s.clone(), cosine_similarity(target, self.vectors.row(i))))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}
