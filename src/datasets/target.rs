use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Supervision attached to one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Class index.
    Class(usize),
    /// Probability vector over classes (e.g. CIFAR-10H annotator votes).
    Soft(Vec<f64>),
    /// Regression target(s).
    Value(Vec<f64>),
    /// One target per interlaced copy of an aggregated dataset.
    Group(Vec<Target>),
}

/// Supervision of a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Classes(Vec<usize>),
    /// `[B, C]`
    Soft(Tensor),
    /// `[B, D]`
    Values(Tensor),
}

impl Targets {
    /// Stacks per-sample targets; all of them must be of the same kind.
    pub fn from_samples(targets: &[Target]) -> Result<Targets> {
        match targets.first() {
            None => Ok(Targets::Classes(Vec::new())),
            Some(Target::Group(first)) => {
                let n = first.len();
                let groups = targets
                    .iter()
                    .map(|t| match t {
                        Target::Group(g) if g.len() == n => Ok(g),
                        _ => Err(Error::invalid("mixed target kinds in one batch")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                // estimator-major, like the model outputs
                let flat: Vec<Target> = (0..n).flat_map(|k| groups.iter().map(move |g| g[k].clone())).collect();
                Targets::from_samples(&flat)
            }
            Some(Target::Class(_)) => targets
                .iter()
                .map(|t| match t {
                    Target::Class(c) => Ok(*c),
                    _ => Err(Error::invalid("mixed target kinds in one batch")),
                })
                .collect::<Result<Vec<_>>>()
                .map(Targets::Classes),
            Some(Target::Soft(_)) => Ok(Targets::Soft(stack(targets, |t| match t {
                Target::Soft(v) => Some(v),
                _ => None,
            })?)),
            Some(Target::Value(_)) => Ok(Targets::Values(stack(targets, |t| match t {
                Target::Value(v) => Some(v),
                _ => None,
            })?)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(c) => c.len(),
            Targets::Soft(t) | Targets::Values(t) => t.batch(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard labels; soft targets collapse to their argmax.
    pub fn classes(&self) -> Result<Vec<usize>> {
        match self {
            Targets::Classes(c) => Ok(c.clone()),
            Targets::Soft(t) => Ok(t.argmax_last()),
            Targets::Values(_) => Err(Error::invalid("regression targets carry no class labels")),
        }
    }

    /// `[B, num_classes]` probabilities: one-hot for class indices.
    pub fn distribution(&self, num_classes: usize) -> Result<Tensor> {
        match self {
            Targets::Classes(c) => {
                let mut out = Tensor::zeros(&[c.len(), num_classes]);
                for (i, &class) in c.iter().enumerate() {
                    if class >= num_classes {
                        return Err(Error::invalid(format!(
                            "class {class} out of range for {num_classes} classes"
                        )));
                    }
                    out.data[i * num_classes + class] = 1.0;
                }
                Ok(out)
            }
            Targets::Soft(t) => {
                t.expect_shape(&[t.batch(), num_classes])?;
                Ok(t.clone())
            }
            Targets::Values(_) => Err(Error::invalid("regression targets are not a distribution")),
        }
    }

    pub fn values(&self) -> Result<&Tensor> {
        match self {
            Targets::Values(t) | Targets::Soft(t) => Ok(t),
            Targets::Classes(_) => Err(Error::invalid("class targets carry no regression values")),
        }
    }

    /// Tiles the batch `m` times, matching an estimator-major model output.
    pub fn repeat(&self, m: usize) -> Targets {
        match self {
            Targets::Classes(c) => Targets::Classes(c.repeat(m)),
            Targets::Soft(t) => Targets::Soft(t.repeat_batch(m)),
            Targets::Values(t) => Targets::Values(t.repeat_batch(m)),
        }
    }
}

fn stack<'a>(targets: &'a [Target], pick: impl Fn(&'a Target) -> Option<&'a Vec<f64>>) -> Result<Tensor> {
    let rows = targets
        .iter()
        .map(|t| pick(t).cloned().ok_or_else(|| Error::invalid("mixed target kinds in one batch")))
        .collect::<Result<Vec<_>>>()?;
    Tensor::from_rows(&rows)
}
