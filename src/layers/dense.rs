use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::module::Module;
use crate::math::tensor::Tensor;

/// Trainable fully-connected layer with an element-wise activation.
///
/// Weights are stored `[input_size, size]` so the forward pass is `x · W + b`.
/// The last input and pre-activations are cached for `backward`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub size: usize,
    pub input_size: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
    #[serde(skip)]
    input: Tensor,
    #[serde(skip)]
    pre_neurons: Tensor,
}

/// Gradients of one layer for one mini-batch.
#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Tensor,
    pub biases: Tensor,
    /// ∂L/∂input, to feed into the previous layer.
    pub input_delta: Tensor,
}

impl DenseLayer {
    pub fn new(size: usize, input_size: usize, activation: ActivationFunction) -> Result<DenseLayer> {
        if size == 0 || input_size == 0 {
            return Err(Error::invalid("dense layer needs non-zero sizes"));
        }
        // He init before ReLU-like units, Xavier otherwise.
        let gain = match activation {
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } | ActivationFunction::Gelu => 2.0,
            _ => 1.0,
        };
        let std = (gain / input_size as f64).sqrt();
        Ok(DenseLayer {
            size,
            input_size,
            weights: Tensor::randn(&[input_size, size], 0.0, std),
            biases: Tensor::zeros(&[size]),
            activator: activation,
            input: Tensor::default(),
            pre_neurons: Tensor::default(),
        })
    }

    /// Forward pass over a `[B, input_size]` batch; caches what `backward` needs.
    pub fn feed_from(&mut self, x: &Tensor) -> Result<Tensor> {
        let mut z = x.matmul(&self.weights)?;
        for row in z.data.chunks_mut(self.size) {
            for (v, b) in row.iter_mut().zip(self.biases.data.iter()) {
                *v += b;
            }
        }
        let a = z.map(|v| self.activator.function(v));
        self.input = x.clone();
        self.pre_neurons = z;
        Ok(a)
    }

    /// `next_layer_delta` is ∂L/∂a for this layer's output, `[B, size]`.
    /// Gradients are summed over the batch; the caller averages.
    pub fn backward(&self, next_layer_delta: &Tensor) -> Result<DenseGradients> {
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        // δ = error ⊙ σ'(z)
        let layer_delta = next_layer_delta.zip_map(&act_derivative, |e, d| e * d)?;
        let weights = self.input.t().matmul(&layer_delta)?;
        let mut biases = Tensor::zeros(&[self.size]);
        for row in layer_delta.data.chunks(self.size) {
            for (b, d) in biases.data.iter_mut().zip(row.iter()) {
                *b += d;
            }
        }
        let input_delta = layer_delta.matmul(&self.weights.t())?;
        Ok(DenseGradients { weights, biases, input_delta })
    }
}

impl Module for DenseLayer {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.feed_from(x)
    }

    fn name(&self) -> String {
        format!("Dense({}, {}, {:?})", self.input_size, self.size, self.activator)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.biases]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.parameters()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.biases]
    }
}
