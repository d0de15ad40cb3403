use crate::error::Result;
use crate::loss::reduction::Reduction;
use crate::math::tensor::Tensor;

/// Negative log-likelihood of a heteroscedastic Gaussian, constant dropped:
/// `0.5 (ln σ² + (y - μ)² / σ²)`.
#[derive(Debug, Clone, Copy)]
pub struct GaussianNllLoss {
    pub reduction: Reduction,
    /// Variances are clamped from below to this value.
    pub eps: f64,
}

impl Default for GaussianNllLoss {
    fn default() -> Self {
        GaussianNllLoss { reduction: Reduction::Mean, eps: 1e-6 }
    }
}

impl GaussianNllLoss {
    pub fn new(reduction: Reduction) -> GaussianNllLoss {
        GaussianNllLoss { reduction, ..Default::default() }
    }

    pub fn forward(&self, mean: &Tensor, variance: &Tensor, target: &Tensor) -> Result<Tensor> {
        variance.expect_shape(&mean.shape)?;
        target.expect_shape(&mean.shape)?;
        let values = mean
            .data
            .iter()
            .zip(variance.data.iter())
            .zip(target.data.iter())
            .map(|((&mu, &var), &y)| {
                let var = var.max(self.eps);
                0.5 * (var.ln() + (y - mu).powi(2) / var)
            })
            .collect();
        Ok(self.reduction.reduce(values))
    }

    /// Gradients with respect to the mean and the variance.
    pub fn derivative(&self, mean: &Tensor, variance: &Tensor, target: &Tensor) -> Result<(Tensor, Tensor)> {
        variance.expect_shape(&mean.shape)?;
        target.expect_shape(&mean.shape)?;
        let scale = self.reduction.gradient_scale(mean.numel());
        let mut d_mean = Tensor::zeros(&mean.shape);
        let mut d_var = Tensor::zeros(&mean.shape);
        for i in 0..mean.numel() {
            let var = variance.data[i].max(self.eps);
            let err = target.data[i] - mean.data[i];
            d_mean.data[i] = -err / var * scale;
            d_var.data[i] = if variance.data[i] > self.eps {
                0.5 * (1.0 / var - err * err / (var * var)) * scale
            } else {
                0.0
            };
        }
        Ok((d_mean, d_var))
    }
}
