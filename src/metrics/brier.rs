use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{mean_or_zero, require_targets, Metric};

/// Mean over samples of `sum_c (p_c - y_c)^2`.
#[derive(Debug, Clone, Default)]
pub struct BrierScore {
    values: Vec<f64>,
}

impl BrierScore {
    pub fn new() -> BrierScore {
        BrierScore::default()
    }
}

impl Metric for BrierScore {
    fn name(&self) -> &'static str {
        "brier"
    }

    fn update(&mut self, probs: &Tensor, targets: Option<&Targets>) -> Result<()> {
        probs.expect_ndim(2)?;
        let dist = require_targets(self.name(), targets)?.distribution(probs.shape[1])?;
        if dist.batch() != probs.batch() {
            return Err(Error::invalid("predictions and targets differ in batch size"));
        }
        for b in 0..probs.batch() {
            let score = probs.sample(b).iter().zip(dist.sample(b)).map(|(p, y)| (p - y).powi(2)).sum();
            self.values.push(score);
        }
        Ok(())
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
    fn perfect_and_wrong_predictions() {
        let mut brier = BrierScore::new();
        let p = Tensor::new(&[2, 2], vec![1.0, 0.0, 1.0, 0.0]).unwrap();
        brier.update(&p, Some(&Targets::Classes(vec![0, 1]))).unwrap();
        assert_close(brier.compute().unwrap().item().unwrap(), 1.0);
    }
}
