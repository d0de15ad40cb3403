//! Streaming uncertainty and calibration metrics.
//!
//! Metrics accumulate over any number of `update` calls and fold everything
//! seen so far in `compute`. Probability inputs are either `[B, C]` or, for
//! ensembles, `[B, M, C]`.

pub mod accuracy;
pub mod brier;
pub mod calibration;
pub mod disagreement;
pub mod entropy;
pub mod mutual_information;
pub mod nll;
pub mod ood;
pub mod regression;
pub mod variation_ratio;

pub use accuracy::Accuracy;
pub use brier::BrierScore;
pub use calibration::{CalibrationError, CalibrationNorm};
pub use disagreement::Disagreement;
pub use entropy::Entropy;
pub use mutual_information::MutualInformation;
pub use nll::NegativeLogLikelihood;
pub use ood::{Auroc, Fpr95};
pub use regression::{GaussianNll, MeanSquaredError};
pub use variation_ratio::VariationRatio;

use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

pub trait Metric {
    fn name(&self) -> &'static str;

    /// Accumulates one batch. Unsupervised metrics ignore `targets`.
    fn update(&mut self, preds: &Tensor, targets: Option<&Targets>) -> Result<()>;

    /// Value over every batch seen since the last `reset`.
    fn compute(&self) -> Result<Tensor>;

    fn reset(&mut self);
}

/// Shannon entropy in nats, with `0 ln 0 = 0`.
pub(crate) fn entropy_of(p: &[f64]) -> f64 {
    -p.iter().filter(|&&v| v > 0.0).map(|&v| v * v.ln()).sum::<f64>()
}

pub(crate) fn require_targets<'a>(metric: &str, targets: Option<&'a Targets>) -> Result<&'a Targets> {
    targets.ok_or_else(|| Error::invalid(format!("{metric} needs targets")))
}

/// `[B, M, C]` view of ensemble probabilities (`[B, C]` is read as `M = 1`).
pub(crate) fn as_ensemble(probs: &Tensor) -> Result<(usize, usize, usize)> {
    match probs.shape.as_slice() {
        [b, c] => Ok((*b, 1, *c)),
        [b, m, c] => Ok((*b, *m, *c)),
        other => Err(Error::invalid(format!(
            "expected [B, C] or [B, M, C] probabilities, got {other:?}"
        ))),
    }
}

pub(crate) fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
pub(crate) fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}
