//! Dense Matrices
//!
//! A minimal row-major matrix used for every weight tensor in the runtime.
//! Each matrix is a single contiguous allocation, so a layer's parameters can
//! be updated in place during training without touching the network's shape.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f64>` storing all elements in row-major order
//! - **Rows / cols**: Fixed at construction; never resized afterwards
//! - **Vectors**: Plain `Vec<f64>` / `&[f64]`, see [`crate::kernel`]
//!
//! ## Example
//!
//! ```rust
//! use scrivener::Matrix;
//!
//! // A 2x3 matrix applied to a length-3 vector
//! let w = Matrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
//! let y = w.matvec(&[1.0, 0.0, 1.0]);
//! assert_eq!(y, vec![4.0, 10.0]);
//! ```
//!
//! ## Shape Errors
//!
//! Mismatched lengths inside a computation are programmer errors: every
//! operation asserts its shapes and panics with a descriptive message. Fallible
//! construction from untrusted nested rows goes through [`Matrix::from_rows`].
//!
//! ## Performance
//!
//! `matvec` parallelises over output rows with Rayon once the amount of work
//! crosses a threshold. Each output element is still computed by one thread in
//! a fixed order, so results are bit-identical to the sequential path.

use rayon::prelude::*;

/// Work threshold (rows × cols) above which `matvec` runs in parallel.
const PARALLEL_THRESHOLD: usize = 16_384;

/// A row-major matrix of `f64` values
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    /// Flat storage of all elements, row after row
    pub data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Create a matrix from flat row-major data
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Data length ({}) doesn't match shape [{}, {}]",
            data.len(),
            rows,
            cols
        );
        Self { data, rows, cols }
    }

    /// Create a matrix filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(vec![0.0; rows * cols], rows, cols)
    }

    /// Build a matrix from nested rows
    ///
    /// Returns `None` when the rows have unequal lengths. An empty slice gives
    /// a 0x0 matrix.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Some(Self::new(data, rows.len(), cols))
    }

    /// Copy out as nested rows
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Mutably borrow one row
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Matrix-vector product `W · x`
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != cols`
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(
            x.len(),
            self.cols,
            "Matrix-vector dimensions incompatible: [{}, {}] · [{}]",
            self.rows,
            self.cols,
            x.len()
        );

        if self.cols == 0 {
            return vec![0.0; self.rows];
        }

        // Rows are independent, so large products are split across threads
        if self.rows * self.cols >= PARALLEL_THRESHOLD {
            return self
                .data
                .par_chunks(self.cols)
                .map(|row| Self::row_dot(row, x))
                .collect();
        }

        self.data
            .chunks(self.cols)
            .map(|row| Self::row_dot(row, x))
            .collect()
    }

    /// Transposed product `Wᵀ · y`
    ///
    /// Used in backward passes to send a delta from a layer's outputs back to
    /// its inputs.
    ///
    /// # Panics
    ///
    /// Panics if `y.len() != rows`
    pub fn transpose_matvec(&self, y: &[f64]) -> Vec<f64> {
        assert_eq!(
            y.len(),
            self.rows,
            "Transposed product dimensions incompatible: [{}, {}]ᵀ · [{}]",
            self.rows,
            self.cols,
            y.len()
        );

        let mut result = vec![0.0; self.cols];
        for (r, &y_val) in y.iter().enumerate() {
            if y_val == 0.0 {
                continue;
            }
            for (acc, &w) in result.iter_mut().zip(self.row(r)) {
                *acc += w * y_val;
            }
        }
        result
    }

    /// Accumulate the outer product `a ⊗ b` into this matrix
    ///
    /// # Panics
    ///
    /// Panics if `a.len() != rows` or `b.len() != cols`
    pub fn add_outer(&mut self, a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), self.rows, "Outer product row count mismatch");
        assert_eq!(b.len(), self.cols, "Outer product column count mismatch");
        let cols = self.cols;
        for (r, &a_val) in a.iter().enumerate() {
            if a_val == 0.0 {
                continue;
            }
            let row = &mut self.data[r * cols..(r + 1) * cols];
            for (w, &b_val) in row.iter_mut().zip(b) {
                *w += a_val * b_val;
            }
        }
    }

    /// Element-wise in-place accumulation
    pub fn add_assign(&mut self, other: &Matrix) {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "Shapes must match for addition"
        );
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Multiply every element by a scalar in place
    pub fn scale_in_place(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    /// Largest absolute element (0.0 for an empty matrix)
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc: f64, &v| acc.max(v.abs()))
    }

    #[inline(always)]
    fn row_dot(row: &[f64], x: &[f64]) -> f64 {
        row.iter().zip(x).map(|(w, v)| w * v).sum()
    }
}
