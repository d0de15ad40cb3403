use crate::datasets::target::Targets;
use crate::error::Result;
use crate::math::tensor::Tensor;

/// A differentiable training objective over a batch of model outputs.
pub trait Criterion {
    fn name(&self) -> &'static str;

    /// Loss reduced according to the criterion's reduction.
    fn forward(&self, outputs: &Tensor, targets: &Targets) -> Result<Tensor>;

    /// ∂L/∂outputs under the same reduction.
    fn derivative(&self, outputs: &Tensor, targets: &Targets) -> Result<Tensor>;
}
