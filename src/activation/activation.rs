use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

use crate::math::special::sigmoid;

/// Element-wise activations available to dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationFunction {
    Identity,
    ReLU,
    LeakyReLU { alpha: f64 },
    Sigmoid,
    Tanh,
    Gelu,
}

/// tanh approximation of GELU: value and slope at `x`.
fn gelu(x: f64) -> (f64, f64) {
    const K: f64 = 0.044715;
    let c = (2.0 / PI).sqrt();
    let t = (c * (x + K * x.powi(3))).tanh();
    let slope = 0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * c * (1.0 + 3.0 * K * x * x);
    (0.5 * x * (1.0 + t), slope)
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match *self {
            ActivationFunction::Identity => x,
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::LeakyReLU { alpha } if x <= 0.0 => alpha * x,
            ActivationFunction::LeakyReLU { .. } => x,
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Gelu => gelu(x).0,
        }
    }

    /// Derivative evaluated at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match *self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::ReLU => f64::from(u8::from(x > 0.0)),
            ActivationFunction::LeakyReLU { alpha } if x <= 0.0 => alpha,
            ActivationFunction::LeakyReLU { .. } => 1.0,
            ActivationFunction::Sigmoid => sigmoid(x) * (1.0 - sigmoid(x)),
            ActivationFunction::Tanh => 1.0 - x.tanh().powi(2),
            ActivationFunction::Gelu => gelu(x).1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1e-6;
        for act in [
            ActivationFunction::Sigmoid,
            ActivationFunction::Tanh,
            ActivationFunction::Gelu,
            ActivationFunction::LeakyReLU { alpha: 0.1 },
        ] {
            for &x in &[-1.3, 0.4, 2.0] {
                let numeric = (act.function(x + h) - act.function(x - h)) / (2.0 * h);
                assert!((numeric - act.derivative(x)).abs() < 1e-5, "{act:?} at {x}");
            }
        }
    }
}
