use crate::datasets::target::Targets;
use crate::error::Result;
use crate::loss::criterion::Criterion;
use crate::loss::reduction::Reduction;
use crate::math::special::log_sum_exp;
use crate::math::tensor::Tensor;

/// Categorical cross-entropy on raw logits (softmax is applied internally).
/// Accepts class indices or soft target distributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss {
    pub reduction: Reduction,
}

impl CrossEntropyLoss {
    pub fn new(reduction: Reduction) -> CrossEntropyLoss {
        CrossEntropyLoss { reduction }
    }
}

impl Criterion for CrossEntropyLoss {
    fn name(&self) -> &'static str {
        "cross_entropy"
    }

    /// L = logsumexp(z) - Σ y_i z_i
    fn forward(&self, logits: &Tensor, targets: &Targets) -> Result<Tensor> {
        logits.expect_ndim(2)?;
        let c = logits.shape[1];
        let dist = targets.distribution(c)?;
        dist.expect_shape(&logits.shape)?;
        let per_sample = logits
            .data
            .chunks(c)
            .zip(dist.data.chunks(c))
            .map(|(z, y)| {
                let lse = log_sum_exp(z);
                y.iter().zip(z.iter()).map(|(yi, zi)| yi * (lse - zi)).sum()
            })
            .collect();
        Ok(self.reduction.reduce(per_sample))
    }

    /// Combined softmax + cross-entropy gradient: `softmax(z) - y`.
    fn derivative(&self, logits: &Tensor, targets: &Targets) -> Result<Tensor> {
        logits.expect_ndim(2)?;
        let dist = targets.distribution(logits.shape[1])?;
        let scale = self.reduction.gradient_scale(logits.batch());
        logits.softmax_last().zip_map(&dist, |p, y| (p - y) * scale)
    }
}
