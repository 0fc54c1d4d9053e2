//! Training Logger and Dataset Utilities
//!
//! Per-epoch metric tracking for the trainers plus a helper for holding out a
//! validation set.
//!
//! ## Components
//!
//! - **TrainingLogger**: writes one CSV row per epoch and mirrors it to the
//!   `log` facade
//! - **EpochMetrics**: the values recorded for one epoch
//! - **train_val_split**: splits any slice into training and validation parts
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number, starting at 1
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Optimizer learning rate
//! - `train_loss`: Mean training loss
//! - `val_loss`: Mean validation loss
//! - `val_accuracy`: Validation accuracy at the 0.5 threshold
//! - `val_f1`: Validation F1
//!
//! Language-model runs leave the accuracy and F1 columns empty.
//!
//! ## Example
//!
//! ```rust,no_run
//! use scrivener::training_logger::{EpochMetrics, TrainingLogger};
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(&EpochMetrics {
//!     epoch: 1,
//!     learning_rate: 0.001,
//!     train_loss: 0.69,
//!     val_loss: 0.65,
//!     val_accuracy: Some(0.71),
//!     val_f1: Some(0.68),
//! })?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use log::info;

/// Metrics for one epoch
#[derive(Clone, Debug, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub learning_rate: f64,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_accuracy: Option<f64>,
    pub val_f1: Option<f64>,
}

/// CSV + log output for a training run
pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new(log_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;
        writeln!(
            log_file,
            "epoch,elapsed_seconds,learning_rate,train_loss,val_loss,val_accuracy,val_f1"
        )?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one epoch
    pub fn log(&mut self, metrics: &EpochMetrics) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let optional = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_default();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.6},{:.6},{},{}",
            metrics.epoch,
            elapsed,
            metrics.learning_rate,
            metrics.train_loss,
            metrics.val_loss,
            optional(metrics.val_accuracy),
            optional(metrics.val_f1),
        )?;
        // Flush so a crashed run keeps its rows
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f64();
        match (metrics.val_accuracy, metrics.val_f1) {
            (Some(acc), Some(f1)) => info!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Train: {:.4} | Val: {:.4} | Acc: {:.3} | F1: {:.3}",
                metrics.epoch, elapsed, epoch_time, metrics.learning_rate, metrics.train_loss, metrics.val_loss, acc, f1
            ),
            _ => info!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Train: {:.4} | Val: {:.4} | Perplexity: {:.2}",
                metrics.epoch, elapsed, epoch_time, metrics.learning_rate, metrics.train_loss, metrics.val_loss, metrics.val_loss.exp()
            ),
        }

        self.last_log_time = Instant::now();
        Ok(())
    }
}

/// Split data into training and validation parts
///
/// The validation part is taken from the end so ordered data keeps its
/// temporal separation. `val_fraction` is clamped to `[0, 1]`.
///
/// ```rust
/// # use scrivener::training_logger::train_val_split;
/// let items = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
/// let (train, val) = train_val_split(&items, 0.2);
/// assert_eq!(train.len(), 8);
/// assert_eq!(val.len(), 2);
/// ```
pub fn train_val_split<T>(items: &[T], val_fraction: f64) -> (&[T], &[T]) {
    let fraction = val_fraction.clamp(0.0, 1.0);
    let split_idx = ((items.len() as f64) * (1.0 - fraction)).round() as usize;
    items.split_at(split_idx.min(items.len()))
}
