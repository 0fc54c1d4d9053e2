//! Weight Codec
//!
//! Turns trained models into compact, text-safe blobs and back.
//!
//! ## Blob Format
//!
//! ```text
//! model  →  JSON config  →  DEFLATE (zlib)  →  base-85 text
//! ```
//!
//! The JSON layer for a feedforward network is
//!
//! ```json
//! {
//!   "name": "detector",
//!   "layers": [
//!     { "weights": [[0.1, 0.2], [0.3, 0.4]], "bias": [0.0, 0.0],
//!       "activation": "relu", "layer_norm": false }
//!   ]
//! }
//! ```
//!
//! `layer_norm` may be omitted and defaults to `false`. Floats are written with
//! shortest round-trip formatting, so decoding reproduces every weight bit for
//! bit and the decoded network computes exactly what the original did.
//!
//! Decoding accepts both zlib-wrapped and raw DEFLATE streams, and ignores
//! surrounding whitespace in the text.
//!
//! ## Failure and Fallback
//!
//! Every decode failure (bad base-85, bad DEFLATE, malformed or incomplete
//! JSON, impossible shapes) is a [`CodecError`]. [`load_or_fallback`] turns
//! such a failure into a warning plus a seeded network, so an application is
//! never left without a model.
//!
//! ## Lossy Path
//!
//! [`half`] packs raw floats as big-endian binary16 for size-constrained
//! transport. It is lossy and is not used for weight files.

pub mod base85;
pub mod half;

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingTable;
use crate::error::{CodecError, CodecResult, NetError, NetResult};
use crate::layers::{Activation, DenseLayer};
use crate::lstm::{Gate, GateParams, LstmCell, LstmModel};
use crate::network::FeedForwardNet;
use crate::tensor::Matrix;

/// One dense layer descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: String,
    #[serde(default)]
    pub layer_norm: bool,
}

impl LayerConfig {
    fn from_layer(layer: &DenseLayer) -> Self {
        Self {
            weights: layer.weights().to_rows(),
            bias: layer.bias().to_vec(),
            activation: layer.activation().as_str().to_string(),
            layer_norm: layer.layer_norm(),
        }
    }

    fn into_layer(self, index: usize) -> NetResult<DenseLayer> {
        let activation: Activation = self.activation.parse()?;
        DenseLayer::build_from_rows(index, &self.weights, self.bias, activation, self.layer_norm)
    }
}

/// Feedforward network descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub layers: Vec<LayerConfig>,
}

impl From<&FeedForwardNet> for NetworkConfig {
    fn from(net: &FeedForwardNet) -> Self {
        Self {
            name: net.name().to_string(),
            layers: net.layers().iter().map(LayerConfig::from_layer).collect(),
        }
    }
}

impl NetworkConfig {
    /// Validate and build the network
    pub fn into_network(self) -> NetResult<FeedForwardNet> {
        let layers = self
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| layer.into_layer(i))
            .collect::<NetResult<Vec<_>>>()?;
        FeedForwardNet::new(self.name, layers)
    }
}

/// One LSTM gate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// The four gates of a cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatesConfig {
    pub forget: GateConfig,
    pub input: GateConfig,
    pub candidate: GateConfig,
    pub output: GateConfig,
}

/// Embedding + LSTM cell + projection descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LstmBundleConfig {
    pub vocab: Vec<String>,
    pub embeddings: Vec<Vec<f64>>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub gates: GatesConfig,
    pub projection: LayerConfig,
}

impl From<&LstmModel> for LstmBundleConfig {
    fn from(model: &LstmModel) -> Self {
        let gate = |g: Gate| GateConfig {
            weights: model.cell().gate(g).weights.to_rows(),
            bias: model.cell().gate(g).bias.clone(),
        };
        Self {
            vocab: model.embedding().vocab().to_vec(),
            embeddings: model.embedding().vectors().to_rows(),
            input_size: model.cell().input_size(),
            hidden_size: model.cell().hidden_size(),
            gates: GatesConfig {
                forget: gate(Gate::Forget),
                input: gate(Gate::Input),
                candidate: gate(Gate::Candidate),
                output: gate(Gate::Output),
            },
            projection: LayerConfig::from_layer(model.projection()),
        }
    }
}

impl LstmBundleConfig {
    /// Validate and build the model
    pub fn into_model(self) -> NetResult<LstmModel> {
        let vectors = if self.embeddings.is_empty() {
            Matrix::zeros(0, self.input_size)
        } else {
            Matrix::from_rows(&self.embeddings).ok_or(NetError::RaggedWeights { index: 0 })?
        };
        let embedding = EmbeddingTable::new(self.vocab, vectors)?;

        let combined = self.hidden_size + self.input_size;
        let gate = |config: GateConfig, gate: Gate| -> NetResult<GateParams> {
            let shape_error = NetError::GateShape {
                gate: gate.name(),
                expected_rows: self.hidden_size,
                expected_cols: combined,
            };
            let weights = if config.weights.is_empty() {
                Matrix::zeros(0, combined)
            } else {
                Matrix::from_rows(&config.weights).ok_or(shape_error)?
            };
            Ok(GateParams {
                weights,
                bias: config.bias,
            })
        };
        let GatesConfig {
            forget,
            input,
            candidate,
            output,
        } = self.gates;
        let gates = [
            gate(forget, Gate::Forget)?,
            gate(input, Gate::Input)?,
            gate(candidate, Gate::Candidate)?,
            gate(output, Gate::Output)?,
        ];
        let cell = LstmCell::new(self.input_size, self.hidden_size, gates)?;
        let projection = self
            .projection
            .into_layer(0)
            .map_err(|e| NetError::Projection(Box::new(e)))?;
        LstmModel::new(embedding, cell, projection)
    }
}

/// Where a loaded network came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Decoded,
    Fallback,
}

/// Serialize any config to blob text
pub fn to_blob<T: Serialize>(value: &T) -> CodecResult<String> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    debug!(
        "encoded blob: {} bytes JSON, {} bytes compressed",
        json.len(),
        compressed.len()
    );
    Ok(base85::encode(&compressed))
}

/// Parse blob text back into a config
pub fn from_blob<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    let compressed = base85::decode(text.trim())?;
    let json = inflate(&compressed)?;
    Ok(serde_json::from_slice(&json)?)
}

fn inflate(compressed: &[u8]) -> CodecResult<Vec<u8>> {
    let mut json = Vec::new();
    match ZlibDecoder::new(compressed).read_to_end(&mut json) {
        Ok(_) => Ok(json),
        Err(zlib_err) => {
            json.clear();
            DeflateDecoder::new(compressed)
                .read_to_end(&mut json)
                .map(|_| json)
                .map_err(|_| CodecError::Inflate(zlib_err))
        }
    }
}

/// Encode a feedforward network as blob text
pub fn encode_network(net: &FeedForwardNet) -> CodecResult<String> {
    to_blob(&NetworkConfig::from(net))
}

/// Decode blob text into a validated feedforward network
pub fn decode_network(text: &str) -> CodecResult<FeedForwardNet> {
    let config: NetworkConfig = from_blob(text)?;
    Ok(config.into_network()?)
}

/// Encode an LSTM language model as blob text
pub fn encode_lstm(model: &LstmModel) -> CodecResult<String> {
    to_blob(&LstmBundleConfig::from(model))
}

/// Decode blob text into a validated LSTM language model
pub fn decode_lstm(text: &str) -> CodecResult<LstmModel> {
    let config: LstmBundleConfig = from_blob(text)?;
    Ok(config.into_model()?)
}

/// Write blob text to a file
pub fn save_blob(path: impl AsRef<Path>, blob: &str) -> CodecResult<()> {
    fs::write(path, blob)?;
    Ok(())
}

/// Read and decode a network blob file
pub fn load_network(path: impl AsRef<Path>) -> CodecResult<FeedForwardNet> {
    decode_network(&fs::read_to_string(path)?)
}

/// Decode `blob`, or build the fallback network when it is absent or broken
///
/// # Example
///
/// ```rust
/// use scrivener::codec::{load_or_fallback, ModelSource};
/// use scrivener::{Activation, FeedForwardNet};
///
/// let fallback = || {
///     FeedForwardNet::seeded("detector", &[35, 16, 1], Activation::Relu, Activation::Linear, 7)
///         .expect("static sizes are valid")
/// };
/// let (net, source) = load_or_fallback(Some("not a blob"), fallback);
/// assert_eq!(source, ModelSource::Fallback);
/// assert_eq!(net.input_size(), 35);
/// ```
pub fn load_or_fallback<F>(blob: Option<&str>, fallback: F) -> (FeedForwardNet, ModelSource)
where
    F: FnOnce() -> FeedForwardNet,
{
    match blob.map(decode_network) {
        Some(Ok(net)) => (net, ModelSource::Decoded),
        Some(Err(err)) => {
            warn!("weight blob rejected ({err}); using seeded fallback");
            (fallback(), ModelSource::Fallback)
        }
        None => {
            debug!("no weight blob supplied; using seeded fallback");
            (fallback(), ModelSource::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;

    fn net() -> FeedForwardNet {
        let first = DenseLayer::seeded(4, 3, Activation::Gelu, 1).with_layer_norm(true);
        let second = DenseLayer::seeded(3, 1, Activation::Linear, 2);
        FeedForwardNet::new("codec", vec![first, second]).unwrap()
    }

    #[test]
    fn test_network_round_trip_is_exact() {
        let original = net();
        let blob = encode_network(&original).unwrap();
        assert!(blob.is_ascii());
        let decoded = decode_network(&blob).unwrap();
        assert_eq!(decoded, original);
        let x = [0.3, -0.1, 0.7, 1.5];
        assert_eq!(decoded.forward(&x), original.forward(&x));
    }

    #[test]
    fn test_lstm_round_trip_is_exact() {
        let model = LstmModel::for_characters("hello world", 3, 5, 4).unwrap();
        let decoded = decode_lstm(&encode_lstm(&model).unwrap()).unwrap();
        assert_eq!(decoded, model);
    }

    #[test]
    fn test_layer_norm_defaults_to_false() {
        let json = r#"{"name":"n","layers":[{"weights":[[1.0,2.0]],"bias":[0.5],"activation":"sigmoid"}]}"#;
        let config: NetworkConfig = serde_json::from_str(json).unwrap();
        let net = config.into_network().unwrap();
        assert!(!net.layers()[0].layer_norm());
    }

    #[test]
    fn test_raw_deflate_is_accepted() {
        let json = serde_json::to_vec(&NetworkConfig::from(&net())).unwrap();
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        let blob = base85::encode(&encoder.finish().unwrap());
        assert_eq!(decode_network(&blob).unwrap(), net());
    }

    #[test]
    fn test_corrupt_blobs_are_distinct_errors() {
        assert!(matches!(decode_network("\"bad\""), Err(CodecError::InvalidBase85 { .. })));
        assert!(matches!(
            decode_network(&base85::encode(b"not deflate at all")),
            Err(CodecError::Inflate(_))
        ));

        let missing_bias = serde_json::json!({"name": "x", "layers": [{"weights": [[1.0]], "activation": "relu"}]});
        let blob = to_blob(&missing_bias).unwrap();
        assert!(matches!(decode_network(&blob), Err(CodecError::Json(_))));

        let bad_activation = serde_json::json!({"name": "x", "layers": [{"weights": [[1.0]], "bias": [0.0], "activation": "swish"}]});
        let blob = to_blob(&bad_activation).unwrap();
        assert!(matches!(
            decode_network(&blob),
            Err(CodecError::Shape(NetError::UnknownActivation(_)))
        ));
    }

    #[test]
    fn test_unchained_config_rejected() {
        let config = serde_json::json!({"name": "x", "layers": [
            {"weights": [[1.0, 0.0]], "bias": [0.0], "activation": "relu"},
            {"weights": [[1.0, 0.0]], "bias": [0.0], "activation": "linear"}
        ]});
        let blob = to_blob(&config).unwrap();
        assert!(matches!(
            decode_network(&blob),
            Err(CodecError::Shape(NetError::LayerChain { .. }))
        ));
    }

    #[test]
    fn test_bad_projection_is_reported_as_projection() {
        let model = LstmModel::for_characters("abc", 2, 3, 1).unwrap();
        let mut config = LstmBundleConfig::from(&model);
        config.projection.bias.pop();
        let blob = to_blob(&config).unwrap();
        match decode_lstm(&blob) {
            Err(CodecError::Shape(NetError::Projection(inner))) => {
                assert!(matches!(*inner, NetError::BiasMismatch { bias: 2, rows: 3, .. }));
            }
            other => panic!("expected a projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_round_trip_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.b85");
        let original = net();
        save_blob(&path, &format!("{}\n", encode_network(&original).unwrap())).unwrap();
        assert_eq!(load_network(&path).unwrap(), original);

        let blob = fs::read_to_string(&path).unwrap();
        let (loaded, source) = load_or_fallback(Some(blob.as_str()), || unreachable!());
        assert_eq!(source, ModelSource::Decoded);
        assert_eq!(loaded, original);

        let (fallback, source) = load_or_fallback(None, net);
        assert_eq!(source, ModelSource::Fallback);
        assert_eq!(fallback, original);

        assert!(matches!(load_network(dir.path().join("missing")), Err(CodecError::Io(_))));
    }
}
