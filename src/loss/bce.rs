use crate::datasets::target::Targets;
use crate::error::Result;
use crate::loss::criterion::Criterion;
use crate::loss::reduction::Reduction;
use crate::math::special::{sigmoid, softplus};
use crate::math::tensor::Tensor;

/// Binary cross-entropy on logits: `softplus(z) - y z`, averaged element-wise.
#[derive(Debug, Clone, Copy, Default)]
pub struct BceWithLogitsLoss {
    pub reduction: Reduction,
}

impl BceWithLogitsLoss {
    pub fn new(reduction: Reduction) -> BceWithLogitsLoss {
        BceWithLogitsLoss { reduction }
    }
}

impl Criterion for BceWithLogitsLoss {
    fn name(&self) -> &'static str {
        "bce_with_logits"
    }

    fn forward(&self, logits: &Tensor, targets: &Targets) -> Result<Tensor> {
        let y = targets.values()?;
        let per_element = logits.zip_map(y, |z, y| softplus(z) - y * z)?;
        Ok(self.reduction.reduce(per_element.data))
    }

    /// Per-output gradient: `sigmoid(z) - y`
    fn derivative(&self, logits: &Tensor, targets: &Targets) -> Result<Tensor> {
        let y = targets.values()?;
        let scale = self.reduction.gradient_scale(logits.numel());
        logits.zip_map(y, |z, y| (sigmoid(z) - y) * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_logit_costs_ln2() {
        let y = Targets::Values(Tensor::new(&[1, 1], vec![1.0]).unwrap());
        let v = BceWithLogitsLoss::default().forward(&Tensor::zeros(&[1, 1]), &y).unwrap();
        assert!((v.item().unwrap() - 2f64.ln()).abs() < 1e-12);
    }
}
