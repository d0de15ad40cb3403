use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::layers::module::Module;
use crate::loss::criterion::Criterion;
use crate::math::tensor::Tensor;

/// Monte-Carlo evidence lower bound for Bayesian networks.
///
/// Each of the `num_samples` stochastic forward passes contributes
/// `criterion(model(x), y) + kl_weight · KL`; the result is their mean.
/// Deterministic models report a KL of zero, so the loss reduces to the
/// criterion.
pub struct ElboLoss {
    pub kl_weight: f64,
    pub num_samples: usize,
    criterion: Box<dyn Criterion>,
}

impl ElboLoss {
    pub fn new(criterion: Box<dyn Criterion>, kl_weight: f64, num_samples: usize) -> Result<ElboLoss> {
        if !(kl_weight >= 0.0) {
            return Err(Error::invalid(format!(
                "The KL weight should be non-negative. Got {kl_weight}."
            )));
        }
        if num_samples < 1 {
            return Err(Error::invalid(format!(
                "The number of samples should not be lower than 1. Got {num_samples}."
            )));
        }
        Ok(ElboLoss { kl_weight, num_samples, criterion })
    }

    pub fn criterion(&self) -> &dyn Criterion {
        self.criterion.as_ref()
    }

    pub fn forward(&self, model: &mut dyn Module, inputs: &Tensor, targets: &Targets) -> Result<f64> {
        let mut total = 0.0;
        for _ in 0..self.num_samples {
            let outputs = model.forward(inputs)?;
            total += self.criterion.forward(&outputs, targets)?.mean();
            total += self.kl_weight * model.kl_divergence();
        }
        Ok(total / self.num_samples as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{BayesLinear, Linear};
    use crate::loss::bce::BceWithLogitsLoss;

    fn bce() -> Box<dyn Criterion> {
        Box::new(BceWithLogitsLoss::default())
    }

    #[test]
    fn bayesian_model_adds_kl() {
        let mut model = BayesLinear::new(1, 1).unwrap();
        let x = Tensor::randn(&[1, 1], 0.0, 1.0);
        let y = Targets::Values(Tensor::new(&[1, 1], vec![1.0]).unwrap());
        let loss = ElboLoss::new(bce(), 1e-5, 1).unwrap();
        assert!(loss.forward(&mut model, &x, &y).unwrap().is_finite());
    }

    #[test]
    fn deterministic_model_matches_criterion() {
        let mut model = Linear::new(1, 1, true).unwrap();
        let x = Tensor::randn(&[1, 1], 0.0, 1.0);
        let y = Targets::Values(Tensor::new(&[1, 1], vec![0.0]).unwrap());
        let loss = ElboLoss::new(bce(), 1e-5, 3).unwrap();
        let expected = BceWithLogitsLoss::default()
            .forward(&model.forward(&x).unwrap(), &y)
            .unwrap()
            .item()
            .unwrap();
        assert!((loss.forward(&mut model, &x, &y).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn invalid_arguments() {
        assert!(ElboLoss::new(bce(), -1.0, 1).is_err());
        assert!(ElboLoss::new(bce(), 1.0, 0).is_err());
    }
}
