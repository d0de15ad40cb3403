use crate::datasets::target::Targets;
use crate::error::Result;
use crate::loss::reduction::Reduction;
use crate::math::tensor::Tensor;
use crate::metrics::{as_ensemble, entropy_of, Metric};

/// Predictive entropy. For `[B, M, C]` input each sample scores the mean of
/// its estimators' entropies.
#[derive(Debug, Clone, Default)]
pub struct Entropy {
    pub reduction: Reduction,
    values: Vec<f64>,
}

impl Entropy {
    pub fn new(reduction: Reduction) -> Entropy {
        Entropy { reduction, values: Vec::new() }
    }

    /// Builds the metric from a reduction name; unknown names are rejected.
    pub fn with_reduction_name(name: &str) -> Result<Entropy> {
        Ok(Entropy::new(name.parse()?))
    }
}

impl Metric for Entropy {
    fn name(&self) -> &'static str {
        "entropy"
    }

    fn update(&mut self, probs: &Tensor, _targets: Option<&Targets>) -> Result<()> {
        let (_, m, c) = as_ensemble(probs)?;
        for sample in probs.data.chunks(m * c) {
            let total: f64 = sample.chunks(c).map(entropy_of).sum();
            self.values.push(total / m as f64);
        }
        Ok(())
    }

    fn compute(&self) -> Result<Tensor> {
        Ok(self.reduction.reduce(self.values.clone()))
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::assert_close;

    fn certain() -> Tensor {
        Tensor::new(&[1, 2], vec![0.0, 1.0]).unwrap()
    }

    fn uniform() -> Tensor {
        Tensor::new(&[1, 2], vec![0.5, 0.5]).unwrap()
    }

    fn disagreeing_ensemble() -> Tensor {
        Tensor::new(&[1, 2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap()
    }

    #[test]
    fn certain_prediction_has_zero_entropy() {
        let mut metric = Entropy::default();
        metric.update(&certain(), None).unwrap();
        assert_eq!(metric.compute().unwrap().item().unwrap(), 0.0);
    }

    #[test]
    fn uniform_prediction_has_ln2() {
        let mut metric = Entropy::new(Reduction::Sum);
        metric.update(&uniform(), None).unwrap();
        assert_close(metric.compute().unwrap().item().unwrap(), 2f64.ln());
    }

    #[test]
    fn reductions_over_several_updates() {
        let mut sum = Entropy::new(Reduction::Sum);
        let mut mean = Entropy::new(Reduction::Mean);
        let mut none = Entropy::new(Reduction::None);
        for metric in [&mut sum, &mut mean, &mut none] {
            metric.update(&certain(), None).unwrap();
            metric.update(&uniform(), None).unwrap();
        }
        assert_close(sum.compute().unwrap().item().unwrap(), 2f64.ln());
        assert_close(mean.compute().unwrap().item().unwrap(), 2f64.ln() / 2.0);
        let per_sample = none.compute().unwrap();
        assert_eq!(per_sample.shape, vec![2]);
        assert_close(per_sample.data[0], 0.0);
        assert_close(per_sample.data[1], 2f64.ln());
    }

    #[test]
    fn ensembles_average_member_entropies() {
        let mut metric = Entropy::default();
        metric.update(&disagreeing_ensemble(), None).unwrap();
        assert_eq!(metric.compute().unwrap().item().unwrap(), 0.0);

        let mut averaged = Entropy::default();
        averaged.update(&disagreeing_ensemble().mean_dim1().unwrap(), None).unwrap();
        assert_close(averaged.compute().unwrap().item().unwrap(), 2f64.ln());
    }

    #[test]
    fn unknown_reduction_is_rejected() {
        assert!(Entropy::with_reduction_name("geometric_mean").is_err());
    }
}
