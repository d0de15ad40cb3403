use crate::datasets::target::Targets;
use crate::error::Result;
use crate::loss::criterion::Criterion;
use crate::loss::reduction::Reduction;
use crate::math::tensor::Tensor;

/// Squared error; `Mean` averages over every element, `None` keeps one value
/// per sample (averaged over its outputs).
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss {
    pub reduction: Reduction,
}

impl MseLoss {
    pub fn new(reduction: Reduction) -> MseLoss {
        MseLoss { reduction }
    }
}

impl Criterion for MseLoss {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn forward(&self, predicted: &Tensor, targets: &Targets) -> Result<Tensor> {
        let expected = targets.values()?;
        expected.expect_shape(&predicted.shape)?;
        let width = predicted.sample_len().max(1);
        let squared = predicted.zip_map(expected, |a, b| (a - b).powi(2))?;
        Ok(match self.reduction {
            Reduction::Mean | Reduction::Sum => self.reduction.reduce(squared.data),
            Reduction::None => {
                Reduction::None.reduce(squared.data.chunks(width).map(|r| r.iter().sum::<f64>() / width as f64).collect())
            }
        })
    }

    /// `2 (predicted - expected)`, scaled by the reduction.
    fn derivative(&self, predicted: &Tensor, targets: &Targets) -> Result<Tensor> {
        let expected = targets.values()?;
        let scale = match self.reduction {
            Reduction::Mean => 1.0 / predicted.numel().max(1) as f64,
            Reduction::Sum => 1.0,
            Reduction::None => 1.0 / predicted.sample_len().max(1) as f64,
        };
        predicted.zip_map(expected, |a, b| 2.0 * (a - b) * scale)
    }
}
