use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::dense::{DenseGradients, DenseLayer};
use crate::layers::module::Module;
use crate::math::special::softplus;
use crate::math::tensor::Tensor;
use crate::models::variant::Variant;
use crate::models::UncertaintyModel;

/// Optional annotations attached to a saved MLP.
/// All fields are `Option` so checkpoints without metadata deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    /// Dataset the weights were fitted on.
    pub dataset: Option<String>,
    /// Human-readable labels for the output units.
    pub output_labels: Option<Vec<String>>,
}

/// Serializable description of an MLP architecture.
///
/// `dist_estimation` is the number of distribution parameters predicted per
/// output: 1 (point estimate), 2 (Gaussian mean and variance) or 4
/// (normal-inverse-gamma γ, ν, α, β). The head therefore has
/// `num_outputs * dist_estimation` units, laid out parameter-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpSpec {
    pub name: String,
    pub in_features: usize,
    pub num_outputs: usize,
    pub hidden_dims: Vec<usize>,
    pub activation: ActivationFunction,
    pub dist_estimation: usize,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl MlpSpec {
    pub fn new(name: impl Into<String>, in_features: usize, num_outputs: usize, hidden_dims: Vec<usize>) -> MlpSpec {
        MlpSpec {
            name: name.into(),
            in_features,
            num_outputs,
            hidden_dims,
            activation: ActivationFunction::ReLU,
            dist_estimation: 1,
            metadata: None,
        }
    }

    pub fn dist_estimation(mut self, dist_estimation: usize) -> MlpSpec {
        self.dist_estimation = dist_estimation;
        self
    }

    pub fn activation(mut self, activation: ActivationFunction) -> MlpSpec {
        self.activation = activation;
        self
    }

    pub fn head_width(&self) -> usize {
        self.num_outputs * self.dist_estimation
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<MlpSpec> {
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// What the head of an MLP predicts once positivity constraints are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Point(Tensor),
    Gaussian { mean: Tensor, variance: Tensor },
    NormalInverseGamma { gamma: Tensor, nu: Tensor, alpha: Tensor, beta: Tensor },
}

/// Trainable dense network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    pub spec: MlpSpec,
    pub layers: Vec<DenseLayer>,
}

impl Mlp {
    pub fn new(spec: MlpSpec) -> Result<Mlp> {
        if ![1, 2, 4].contains(&spec.dist_estimation) {
            return Err(Error::invalid(format!(
                "dist_estimation must be 1, 2 or 4, got {}",
                spec.dist_estimation
            )));
        }
        if spec.in_features == 0 || spec.num_outputs == 0 {
            return Err(Error::invalid("in_features and num_outputs must be positive"));
        }
        let mut layers = Vec::with_capacity(spec.hidden_dims.len() + 1);
        let mut input_size = spec.in_features;
        for &size in &spec.hidden_dims {
            layers.push(DenseLayer::new(size, input_size, spec.activation)?);
            input_size = size;
        }
        layers.push(DenseLayer::new(spec.head_width(), input_size, ActivationFunction::Identity)?);
        Ok(Mlp { spec, layers })
    }

    /// Raw head output `[B, num_outputs * dist_estimation]`; caches activations
    /// for `backward`.
    pub fn forward_raw(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(2)?;
        if x.shape[1] != self.spec.in_features {
            return Err(Error::ShapeMismatch {
                expected: vec![x.batch(), self.spec.in_features],
                got: x.shape.clone(),
            });
        }
        let mut current = x.clone();
        for layer in &mut self.layers {
            current = layer.feed_from(&current)?;
        }
        Ok(current)
    }

    /// Backpropagates ∂L/∂raw-output through every layer, first layer first.
    pub fn backward(&self, output_delta: &Tensor) -> Result<Vec<DenseGradients>> {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut delta = output_delta.clone();
        for layer in self.layers.iter().rev() {
            let g = layer.backward(&delta)?;
            delta = g.input_delta.clone();
            grads.push(g);
        }
        grads.reverse();
        Ok(grads)
    }

    /// Splits the raw head into distribution parameters: variances, ν and β go
    /// through softplus, α through `1 + softplus`.
    pub fn split_output(&self, raw: &Tensor) -> Result<Prediction> {
        let n = self.spec.num_outputs;
        let k = self.spec.dist_estimation;
        raw.expect_shape(&[raw.batch(), n * k])?;
        let column = |j: usize, f: fn(f64) -> f64| -> Tensor {
            let mut out = Tensor::zeros(&[raw.batch(), n]);
            for b in 0..raw.batch() {
                for o in 0..n {
                    out.data[b * n + o] = f(raw.data[b * n * k + j * n + o]);
                }
            }
            out
        };
        Ok(match k {
            1 => Prediction::Point(raw.clone()),
            2 => Prediction::Gaussian {
                mean: column(0, |v| v),
                variance: column(1, |v| softplus(v) + 1e-6),
            },
            _ => Prediction::NormalInverseGamma {
                gamma: column(0, |v| v),
                nu: column(1, softplus),
                alpha: column(2, |v| 1.0 + softplus(v)),
                beta: column(3, softplus),
            },
        })
    }

    pub fn predict(&mut self, x: &Tensor) -> Result<Prediction> {
        let raw = self.forward_raw(x)?;
        self.split_output(&raw)
    }

    /// Serializes the architecture and weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!(path = %path.display(), "saved MLP checkpoint");
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Mlp> {
        let path = path.as_ref();
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        let mlp: Mlp = serde_json::from_reader(reader)?;
        tracing::info!(path = %path.display(), layers = mlp.layers.len(), "loaded MLP checkpoint");
        Ok(mlp)
    }
}

impl Module for Mlp {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.forward_raw(x)
    }

    fn name(&self) -> String {
        format!("MLP[{}]", self.spec.name)
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.layers.iter().map(|l| l as &dyn Module).collect()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        self.layers.iter_mut().map(|l| l as &mut dyn Module).collect()
    }
}

impl UncertaintyModel for Mlp {
    fn variant(&self) -> Variant {
        Variant::Standard
    }

    fn summary(&self) -> String {
        crate::layers::summary(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_dist_estimation() {
        assert!(Mlp::new(MlpSpec::new("m", 5, 1, vec![]).dist_estimation(3)).is_err());
    }

    #[test]
    fn nig_head_respects_positivity() {
        let mut mlp = Mlp::new(MlpSpec::new("nig", 3, 1, vec![8]).dist_estimation(4)).unwrap();
        let pred = mlp.predict(&Tensor::rand(&[4, 3], -1.0, 1.0)).unwrap();
        match pred {
            Prediction::NormalInverseGamma { nu, alpha, beta, .. } => {
                assert!(nu.data.iter().all(|&v| v > 0.0));
                assert!(alpha.data.iter().all(|&v| v > 1.0));
                assert!(beta.data.iter().all(|&v| v > 0.0));
            }
            other => panic!("unexpected prediction {other:?}"),
        }
    }

    #[test]
    fn json_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlp.json");
        let mut mlp = Mlp::new(MlpSpec::new("reg", 5, 1, vec![4])).unwrap();
        mlp.save_json(&path).unwrap();
        let mut restored = Mlp::load_json(&path).unwrap();
        let x = Tensor::rand(&[2, 5], 0.0, 1.0);
        let a = mlp.forward(&x).unwrap();
        let b = restored.forward(&x).unwrap();
        assert!(a.data.iter().zip(b.data.iter()).all(|(u, v)| (u - v).abs() < 1e-12));
        assert_eq!(restored.num_parameters(), 5 * 4 + 4 + 4 + 1);
    }
}
