//! Error types
//!
//! Three families of failure, kept apart so callers can react differently:
//!
//! - [`NetError`]: a network, cell, table or HMM was described with shapes that
//!   do not fit together. These are construction-time programmer errors and are
//!   propagated, never coerced.
//! - [`CodecError`]: a weight blob could not be turned back into a model. Callers
//!   are expected to catch this and fall back to a seeded initializer.
//! - [`ConfigError`]: a trainer configuration file could not be read.

use thiserror::Error;

/// Shape errors raised while assembling layers, networks and tables.
#[derive(Debug, Error)]
pub enum NetError {
    /// A network needs at least one layer.
    #[error("network {0:?} has no layers")]
    Empty(String),

    /// Weight rows of one layer have different lengths.
    #[error("layer {index}: weight rows have unequal lengths")]
    RaggedWeights { index: usize },

    /// A layer has zero rows or zero columns.
    #[error("layer {index}: weight matrix must be non-empty")]
    EmptyWeights { index: usize },

    /// Bias length differs from the number of weight rows.
    #[error("layer {index}: bias has {bias} entries but weights have {rows} rows")]
    BiasMismatch {
        index: usize,
        bias: usize,
        rows: usize,
    },

    /// Consecutive layers do not chain.
    #[error("layer {index} expects {expected} inputs but the previous layer produces {found}")]
    LayerChain {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Activation tag outside the supported set.
    #[error("unknown activation {0:?}")]
    UnknownActivation(String),

    /// An LSTM gate tensor has the wrong shape.
    #[error("gate {gate}: expected {expected_rows}x{expected_cols} weights and {expected_rows} biases")]
    GateShape {
        gate: &'static str,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// Vocabulary and embedding rows disagree.
    #[error("embedding table has {symbols} symbols but {rows} vectors")]
    EmbeddingRows { symbols: usize, rows: usize },

    /// A symbol appears twice in a vocabulary.
    #[error("duplicate symbol {0:?} in vocabulary")]
    DuplicateSymbol(String),

    /// Output projection does not match the vocabulary or hidden size.
    #[error("projection is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    ProjectionShape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// Embedding width differs from the cell's input size.
    #[error("embedding dimension {embedding} does not match LSTM input size {input}")]
    EmbeddingWidth { embedding: usize, input: usize },

    /// The LSTM output projection failed to build.
    #[error("output projection: {0}")]
    Projection(#[source] Box<NetError>),

    /// An HMM needs at least one state.
    #[error("hidden Markov model has no states")]
    NoStates,
}

/// Failures while decoding weight blobs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Character outside the base-85 alphabet.
    #[error("invalid base85 character {character:?} at offset {offset}")]
    InvalidBase85 { character: char, offset: usize },

    /// A five-character group decodes to more than 32 bits.
    #[error("base85 group at offset {0} overflows 32 bits")]
    Base85Overflow(usize),

    /// Neither a zlib nor a raw DEFLATE stream.
    #[error("failed to inflate weight blob: {0}")]
    Inflate(#[source] std::io::Error),

    /// JSON is malformed or a required field is missing.
    #[error("malformed weight config: {0}")]
    Json(#[from] serde_json::Error),

    /// The config parsed but describes an impossible network.
    #[error("weight config describes an invalid model: {0}")]
    Shape(#[from] NetError),

    /// Half-precision payloads are pairs of bytes.
    #[error("half-precision payload has odd length {0}")]
    OddHalfLength(usize),

    /// Reading or writing a blob file failed.
    #[error("weight blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while loading trainer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type NetResult<T> = std::result::Result<T, NetError>;
pub type CodecResult<T> = std::result::Result<T, CodecError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
