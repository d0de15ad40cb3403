use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{mean_or_zero, require_targets, Metric};

/// Mean squared error over every regressed value.
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError {
    sum: f64,
    count: usize,
}

impl MeanSquaredError {
    pub fn new() -> MeanSquaredError {
        MeanSquaredError::default()
    }
}

impl Metric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn update(&mut self, preds: &Tensor, targets: Option<&Targets>) -> Result<()> {
        let y = require_targets(self.name(), targets)?.values()?;
        if y.numel() != preds.numel() {
            return Err(Error::ShapeMismatch { expected: y.shape.clone(), got: preds.shape.clone() });
        }
        self.sum += preds.data.iter().zip(&y.data).map(|(p, t)| (p - t).powi(2)).sum::<f64>();
        self.count += y.numel();
        Ok(())
    }

    fn compute(&self) -> Result<Tensor> {
        Ok(Tensor::scalar(if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }))
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Gaussian negative log-likelihood. Predictions are `[B, 2 * D]` with the
/// means first and the (already positive) variances second.
#[derive(Debug, Clone, Default)]
pub struct GaussianNll {
    values: Vec<f64>,
}

impl GaussianNll {
    pub fn new() -> GaussianNll {
        GaussianNll::default()
    }

    pub fn update_distribution(&mut self, mean: &Tensor, variance: &Tensor, target: &Tensor) -> Result<()> {
        if mean.shape != variance.shape || mean.shape != target.shape {
            return Err(Error::ShapeMismatch { expected: mean.shape.clone(), got: target.shape.clone() });
        }
        let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
        for ((&mu, &var), &y) in mean.data.iter().zip(&variance.data).zip(&target.data) {
            if var <= 0.0 {
                return Err(Error::invalid("variance must be positive"));
            }
            self.values.push(0.5 * var.ln() + (y - mu).powi(2) / (2.0 * var) + half_ln_2pi);
        }
        Ok(())
    }
}

impl Metric for GaussianNll {
    fn name(&self) -> &'static str {
        "gaussian_nll"
    }

    fn update(&mut self, preds: &Tensor, targets: Option<&Targets>) -> Result<()> {
        let y = require_targets(self.name(), targets)?.values()?.clone();
        preds.expect_shape(&[y.batch(), 2 * y.sample_len()])?;
        let d = y.sample_len();
        let mut mean = Tensor::zeros(&y.shape);
        let mut var = Tensor::zeros(&y.shape);
        for b in 0..y.batch() {
            let row = preds.sample(b);
            mean.sample_mut(b).copy_from_slice(&row[..d]);
            var.sample_mut(b).copy_from_slice(&row[d..]);
        }
        self.update_distribution(&mean, &var, &y)
    }

    fn compute(&self) -> Result<Tensor> {
        Ok(Tensor::scalar(mean_or_zero(&self.values)))
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::assert_close;

    #[test]
    fn mse_accumulates() {
        let mut mse = MeanSquaredError::new();
        let y = Targets::Values(Tensor::new(&[2, 1], vec![0.0, 0.0]).unwrap());
        mse.update(&Tensor::new(&[2, 1], vec![1.0, 3.0]).unwrap(), Some(&y)).unwrap();
        assert_close(mse.compute().unwrap().item().unwrap(), 5.0);
    }

    #[test]
    fn unit_gaussian_at_mean() {
        let mut nll = GaussianNll::new();
        let y = Targets::Values(Tensor::new(&[1, 1], vec![0.0]).unwrap());
        nll.update(&Tensor::new(&[1, 2], vec![0.0, 1.0]).unwrap(), Some(&y)).unwrap();
        assert_close(nll.compute().unwrap().item().unwrap(), 0.5 * (2.0 * std::f64::consts::PI).ln());
    }
}
