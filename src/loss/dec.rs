//! Deep evidential classification: logits are read as Dirichlet evidence.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::loss::reduction::Reduction;
use crate::math::special::{digamma, ln_gamma};
use crate::math::tensor::Tensor;

/// Data term of the evidential loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecLossType {
    Mse,
    #[default]
    Log,
    Digamma,
}

impl FromStr for DecLossType {
    type Err = Error;

    fn from_str(s: &str) -> Result<DecLossType> {
        match s {
            "mse" => Ok(DecLossType::Mse),
            "log" => Ok(DecLossType::Log),
            "digamma" => Ok(DecLossType::Digamma),
            other => Err(Error::invalid(format!(
                "{other} is not a valid value for loss_type, expected mse, log or digamma"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecLoss {
    pub loss_type: DecLossType,
    pub reg_weight: Option<f64>,
    pub annealing_step: Option<usize>,
    pub reduction: Reduction,
}

impl DecLoss {
    pub fn new(
        loss_type: DecLossType,
        reg_weight: Option<f64>,
        annealing_step: Option<usize>,
        reduction: Reduction,
    ) -> Result<DecLoss> {
        if let Some(w) = reg_weight {
            if !(w >= 0.0) {
                return Err(Error::invalid(format!(
                    "The regularization weight should be non-negative, but got {w}."
                )));
            }
        }
        if annealing_step == Some(0) {
            return Err(Error::invalid("The annealing step should be positive, but got 0."));
        }
        Ok(DecLoss { loss_type, reg_weight, annealing_step, reduction })
    }

    /// Weight of the KL term for the given epoch.
    pub fn regularizer_weight(&self, epoch: Option<usize>) -> f64 {
        match (self.annealing_step, epoch) {
            (Some(step), Some(epoch)) => (epoch as f64 / step as f64).min(1.0),
            _ => self.reg_weight.unwrap_or(0.0),
        }
    }

    pub fn forward(&self, evidence: &Tensor, targets: &Targets, epoch: Option<usize>) -> Result<Tensor> {
        evidence.expect_ndim(2)?;
        let k = evidence.shape[1];
        let y = targets.distribution(k)?;
        if y.batch() != evidence.batch() {
            return Err(Error::ShapeMismatch { expected: evidence.shape.clone(), got: y.shape.clone() });
        }
        let coef = self.regularizer_weight(epoch);
        let values = evidence
            .data
            .chunks(k)
            .zip(y.data.chunks(k))
            .map(|(e, y)| {
                let alpha: Vec<f64> = e.iter().map(|v| v.max(0.0) + 1.0).collect();
                self.data_term(&alpha, y) + coef * kl_to_uniform(&alpha, y)
            })
            .collect();
        Ok(self.reduction.reduce(values))
    }

    fn data_term(&self, alpha: &[f64], y: &[f64]) -> f64 {
        let strength: f64 = alpha.iter().sum();
        match self.loss_type {
            DecLossType::Mse => alpha
                .iter()
                .zip(y.iter())
                .map(|(&a, &t)| {
                    let p = a / strength;
                    (t - p).powi(2) + a * (strength - a) / (strength * strength * (strength + 1.0))
                })
                .sum(),
            DecLossType::Log => alpha.iter().zip(y.iter()).map(|(&a, &t)| t * (strength.ln() - a.ln())).sum(),
            DecLossType::Digamma => {
                let ds = digamma(strength);
                alpha.iter().zip(y.iter()).map(|(&a, &t)| t * (ds - digamma(a))).sum()
            }
        }
    }
}

/// KL(Dir(α̃) ‖ Dir(1)) where α̃ drops the evidence of the true class.
fn kl_to_uniform(alpha: &[f64], y: &[f64]) -> f64 {
    let k = alpha.len() as f64;
    let kl_alpha: Vec<f64> = alpha.iter().zip(y.iter()).map(|(&a, &t)| (a - 1.0) * (1.0 - t) + 1.0).collect();
    let sum: f64 = kl_alpha.iter().sum();
    let first = ln_gamma(sum) - ln_gamma(k) - kl_alpha.iter().map(|&a| ln_gamma(a)).sum::<f64>();
    let ds = digamma(sum);
    let second: f64 = kl_alpha.iter().map(|&a| (a - 1.0) * (digamma(a) - ds)).sum();
    first + second
}
