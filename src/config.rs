//! Trainer Configuration
//!
//! Hyper-parameters for the two trainers. Both structs derive serde, so a run
//! can be described in a JSON file and loaded with [`load_json`]. Missing
//! fields take their defaults.
//!
//! ## Presets
//!
//! - `Default`: the values the trainers were tuned with
//! - `quick()`: higher learning rate, short patience; for smoke tests
//! - `thorough()`: lower learning rate, long patience; for real runs

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;

/// Element-wise gradient clip used when nothing else is configured
pub const DEFAULT_GRAD_CLIP: f64 = 5.0;

/// Truncated BPTT window length
pub const DEFAULT_BPTT_WINDOW: usize = 50;

/// Settings for [`crate::train::MlpTrainer`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpTrainerConfig {
    /// Adam learning rate
    pub learning_rate: f64,
    /// Gradients are clamped element-wise to ±grad_clip
    pub grad_clip: f64,
    /// L2 term added to weight gradients
    pub weight_decay: f64,
    /// Epochs without validation improvement before `fit` stops
    pub patience: usize,
}

impl Default for MlpTrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            grad_clip: DEFAULT_GRAD_CLIP,
            weight_decay: 0.0,
            patience: 5,
        }
    }
}

impl MlpTrainerConfig {
    pub fn quick() -> Self {
        Self {
            learning_rate: 1e-2,
            patience: 2,
            ..Self::default()
        }
    }

    pub fn thorough() -> Self {
        Self {
            learning_rate: 3e-4,
            weight_decay: 1e-4,
            patience: 15,
            ..Self::default()
        }
    }
}

/// Settings for [`crate::train::LstmTrainer`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmTrainerConfig {
    pub learning_rate: f64,
    /// Steps per truncated BPTT window
    pub window: usize,
    /// Per-tensor L2 norm limit
    pub grad_clip: f64,
    pub weight_decay: f64,
}

impl Default for LstmTrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-3,
            window: DEFAULT_BPTT_WINDOW,
            grad_clip: DEFAULT_GRAD_CLIP,
            weight_decay: 0.0,
        }
    }
}

impl LstmTrainerConfig {
    pub fn quick() -> Self {
        Self {
            learning_rate: 1e-2,
            window: 20,
            ..Self::default()
        }
    }

    pub fn thorough() -> Self {
        Self {
            learning_rate: 2e-3,
            window: 100,
            ..Self::default()
        }
    }
}

/// Read a JSON configuration file
///
/// # Errors
///
/// I/O failures and malformed JSON are reported as [`crate::error::ConfigError`].
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> ConfigResult<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let mlp = MlpTrainerConfig::default();
        assert_eq!(mlp.grad_clip, 5.0);
        let lstm = LstmTrainerConfig::default();
        assert_eq!(lstm.window, 50);
        assert!(MlpTrainerConfig::quick().learning_rate > MlpTrainerConfig::thorough().learning_rate);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "learning_rate": 0.05 }}"#).unwrap();
        let config: LstmTrainerConfig = load_json(file.path()).unwrap();
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.window, DEFAULT_BPTT_WINDOW);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result: ConfigResult<MlpTrainerConfig> = load_json("/nonexistent/config.json");
        assert!(result.is_err());
    }
}
