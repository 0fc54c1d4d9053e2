//! Scrivener: a from-scratch numeric runtime for text models
//!
//! Everything needed to run and train the small models behind an AI-text
//! detector, a character language model and a part-of-speech tagger, written
//! without any external tensor library.
//!
//! # Modules
//!
//! - [`kernel`] / [`tensor`] - Vector primitives, activations, row-major matrices
//! - [`layers`] - Dense layer, activation set, layer normalisation
//! - [`network`] - Feedforward networks and `predict_proba`
//! - [`lstm`] - Stateless LSTM cell and the embedding + cell + projection model
//! - [`embedding`] - Symbol → vector tables
//! - [`hmm`] - Hidden Markov Model with Viterbi decoding
//! - [`optimizer`] / [`gradients`] - Adam and gradient clipping
//! - [`train`] - Backpropagation and truncated BPTT trainers
//! - [`codec`] - JSON → DEFLATE → base-85 weight blobs, plus lossy binary16
//! - [`config`] / [`training_logger`] - Trainer settings and run logging
//!
//! # Example
//!
//! ```rust
//! use scrivener::codec::{decode_network, encode_network};
//! use scrivener::config::MlpTrainerConfig;
//! use scrivener::{Activation, FeedForwardNet, MlpTrainer};
//!
//! let mut net = FeedForwardNet::seeded("toy", &[2, 4, 1], Activation::Tanh, Activation::Linear, 1)?;
//! let data = vec![(vec![1.0, 0.0], 1.0), (vec![0.0, 1.0], 0.0)];
//!
//! let mut trainer = MlpTrainer::new(MlpTrainerConfig::default());
//! for epoch in 0..10 {
//!     trainer.train_epoch(&mut net, &data, epoch);
//! }
//!
//! let blob = encode_network(&net)?;
//! let restored = decode_network(&blob)?;
//! assert_eq!(restored.predict_proba(&[1.0, 0.0]), net.predict_proba(&[1.0, 0.0]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gradients;
pub mod hmm;
pub mod kernel;
pub mod layers;
pub mod lstm;
pub mod network;
pub mod optimizer;
pub mod tensor;
pub mod train;
pub mod training_logger;

// Re-export main types for convenience
pub use codec::{decode_network, encode_network, load_or_fallback, ModelSource};
pub use embedding::EmbeddingTable;
pub use error::{CodecError, ConfigError, NetError};
pub use hmm::{Hmm, ViterbiPath};
pub use layers::{Activation, DenseLayer};
pub use lstm::{Gate, LstmCell, LstmModel};
pub use network::FeedForwardNet;
pub use optimizer::{Adam, ParamId};
pub use tensor::Matrix;
pub use train::{EvalReport, LstmTrainer, MlpTrainer};
pub use training_logger::{train_val_split, TrainingLogger};
