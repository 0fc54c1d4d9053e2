//! Activation Functions
//!
//! The closed set of activations a dense layer can carry, with the derivative
//! each one needs during backpropagation.
//!
//! | Tag        | Forward                     | Derivative               |
//! |------------|-----------------------------|--------------------------|
//! | `sigmoid`  | 1 / (1 + e⁻ᶻ)               | σ(z)(1 - σ(z))           |
//! | `tanh`     | tanh z                      | 1 - tanh² z              |
//! | `relu`     | max(0, z)                   | 1 if z > 0 else 0        |
//! | `gelu`     | see below                   | see below                |
//! | `linear`   | z                           | 1                        |
//!
//! ## GELU
//!
//! We use the tanh approximation:
//!
//! ```text
//! GELU(z) ≈ 0.5 × z × (1 + tanh(√(2/π) × (z + 0.044715 × z³)))
//! ```
//!
//! The derivative combines the sech² of the inner term with the derivative of
//! the cubic polynomial via the product rule.
//!
//! Tags are the strings stored in weight blobs; parsing an unknown tag is an
//! error rather than a silent fallback to `linear`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::kernel::sigmoid;

const GELU_COEFF: f64 = 0.044715;

/// Activation applied after a layer's affine transform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Gelu,
    Linear,
}

impl Activation {
    /// Apply to one pre-activation value
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => sigmoid(z),
            Activation::Tanh => z.tanh(),
            Activation::Relu => z.max(0.0),
            Activation::Gelu => {
                0.5 * z * (1.0 + (gelu_scale() * (z + GELU_COEFF * z.powi(3))).tanh())
            }
            Activation::Linear => z,
        }
    }

    /// Derivative with respect to the pre-activation value
    pub fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = z.tanh();
                1.0 - t * t
            }
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Gelu => {
                let sqrt_2_pi = gelu_scale();
                let inner = sqrt_2_pi * (z + GELU_COEFF * z.powi(3));
                let tanh_inner = inner.tanh();
                let sech_sq = 1.0 - tanh_inner * tanh_inner;
                0.5 * (1.0 + tanh_inner)
                    + 0.5 * z * sech_sq * sqrt_2_pi * (1.0 + 3.0 * GELU_COEFF * z * z)
            }
            Activation::Linear => 1.0,
        }
    }

    /// Apply element-wise to a vector
    pub fn apply_vec(self, z: &[f64]) -> Vec<f64> {
        z.iter().map(|&v| self.apply(v)).collect()
    }

    /// Tag used in weight blobs
    pub fn as_str(self) -> &'static str {
        match self {
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Gelu => "gelu",
            Activation::Linear => "linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = NetError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            "gelu" => Ok(Activation::Gelu),
            "linear" => Ok(Activation::Linear),
            _ => Err(NetError::UnknownActivation(tag.to_string())),
        }
    }
}

fn gelu_scale() -> f64 {
    (2.0 / std::f64::consts::PI).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [Activation; 5] = [
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Relu,
        Activation::Gelu,
        Activation::Linear,
    ];

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-6;
        for act in ALL {
            for &z in &[-2.3, -0.4, 0.7, 1.9] {
                let numeric = (act.apply(z + h) - act.apply(z - h)) / (2.0 * h);
                assert_relative_eq!(act.derivative(z), numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_tag_round_trip() {
        for act in ALL {
            assert_eq!(act.as_str().parse::<Activation>().unwrap(), act);
        }
        assert!(matches!(
            "swish".parse::<Activation>(),
            Err(NetError::UnknownActivation(_))
        ));
    }

    #[test]
    fn test_relu_clamps_negatives() {
        assert_eq!(Activation::Relu.apply_vec(&[-5.0, 0.0, 4.0]), vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_gelu_reference_points() {
        assert_eq!(Activation::Gelu.apply(0.0), 0.0);
        assert_relative_eq!(Activation::Gelu.apply(1.0), 0.841192, epsilon = 1e-5);
    }
}
