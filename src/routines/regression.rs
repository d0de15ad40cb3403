use crate::datamodules::loader::{Batch, DataLoader};
use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::metrics::{GaussianNll, MeanSquaredError, Metric};
use crate::models::mlp::{Mlp, Prediction};
use crate::routines::MetricReport;

/// Evaluates a dense regressor. Point heads report MSE; Gaussian and NIG heads
/// add the Gaussian NLL of their predictive distribution.
pub struct RegressionRoutine {
    pub dist_estimation: usize,
    mse: MeanSquaredError,
    nll: GaussianNll,
}

impl RegressionRoutine {
    pub fn new(dist_estimation: usize) -> Result<RegressionRoutine> {
        if ![1, 2, 4].contains(&dist_estimation) {
            return Err(Error::invalid(format!("dist_estimation must be 1, 2 or 4, got {dist_estimation}")));
        }
        Ok(RegressionRoutine { dist_estimation, mse: MeanSquaredError::new(), nll: GaussianNll::new() })
    }

    pub fn update(&mut self, prediction: &Prediction, targets: &Targets) -> Result<()> {
        match prediction {
            Prediction::Point(values) => self.mse.update(values, Some(targets)),
            Prediction::Gaussian { mean, variance } => {
                self.mse.update(mean, Some(targets))?;
                self.nll.update_distribution(mean, variance, targets.values()?)
            }
            Prediction::NormalInverseGamma { gamma, nu, alpha, beta } => {
                self.mse.update(gamma, Some(targets))?;
                // aleatoric β/(α-1) plus epistemic β/(ν(α-1))
                let variance = beta
                    .zip_map(alpha, |b, a| b / (a - 1.0).max(1e-12))?
                    .zip_map(nu, |v, n| v * (1.0 + 1.0 / n.max(1e-12)))?;
                self.nll.update_distribution(gamma, &variance, targets.values()?)
            }
        }
    }

    pub fn test_step(&mut self, mlp: &mut Mlp, batch: &Batch) -> Result<()> {
        let prediction = mlp.predict(&batch.inputs.flatten())?;
        self.update(&prediction, &batch.targets)
    }

    pub fn evaluate(&mut self, mlp: &mut Mlp, loader: &DataLoader) -> Result<MetricReport> {
        if mlp.spec.dist_estimation != self.dist_estimation {
            return Err(Error::invalid(format!(
                "routine expects dist_estimation {}, the MLP has {}",
                self.dist_estimation, mlp.spec.dist_estimation
            )));
        }
        self.reset();
        for batch in loader.iter() {
            self.test_step(mlp, &batch?)?;
        }
        let report = self.compute()?;
        report.log("test");
        Ok(report)
    }

    pub fn compute(&self) -> Result<MetricReport> {
        let mut report = MetricReport::default();
        report.insert(self.mse.name(), self.mse.compute()?.item()?);
        if self.dist_estimation > 1 {
            report.insert(self.nll.name(), self.nll.compute()?.item()?);
        }
        Ok(report)
    }

    pub fn reset(&mut self) {
        self.mse.reset();
        self.nll.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    fn column(values: &[f64]) -> Tensor {
        Tensor::new(&[values.len(), 1], values.to_vec()).unwrap()
    }

    #[test]
    fn point_head_reports_mse_only() {
        let mut routine = RegressionRoutine::new(1).unwrap();
        routine.update(&Prediction::Point(column(&[1.0, 3.0])), &Targets::Values(column(&[0.0, 1.0]))).unwrap();
        let report = routine.compute().unwrap();
        assert!((report.get("mse").unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(report.values.len(), 1);
    }

    #[test]
    fn gaussian_head_adds_nll() {
        let mut routine = RegressionRoutine::new(2).unwrap();
        let prediction = Prediction::Gaussian { mean: column(&[0.0]), variance: column(&[1.0]) };
        routine.update(&prediction, &Targets::Values(column(&[0.0]))).unwrap();
        let nll = routine.compute().unwrap().get("gaussian_nll").unwrap();
        assert!((nll - 0.5 * (2.0 * std::f64::consts::PI).ln()).abs() < 1e-12);
    }

    #[test]
    fn nig_head_uses_predictive_variance() {
        let mut routine = RegressionRoutine::new(4).unwrap();
        // β/(α-1) · (1 + 1/ν) = 1 · 2
        let prediction = Prediction::NormalInverseGamma {
            gamma: column(&[0.0]),
            nu: column(&[1.0]),
            alpha: column(&[2.0]),
            beta: column(&[1.0]),
        };
        routine.update(&prediction, &Targets::Values(column(&[0.0]))).unwrap();
        let nll = routine.compute().unwrap().get("gaussian_nll").unwrap();
        assert!((nll - (0.5 * 2f64.ln() + 0.5 * (2.0 * std::f64::consts::PI).ln())).abs() < 1e-12);
        assert!(RegressionRoutine::new(3).is_err());
    }
}
