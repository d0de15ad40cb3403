use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{mean_or_zero, require_targets, Metric};

const MIN_PROB: f64 = 1e-12;

/// Mean negative log-likelihood of `[B, C]` probabilities. Soft targets give
/// the cross-entropy against the target distribution.
#[derive(Debug, Clone, Default)]
pub struct NegativeLogLikelihood {
    values: Vec<f64>,
}

impl NegativeLogLikelihood {
    pub fn new() -> NegativeLogLikelihood {
        NegativeLogLikelihood::default()
    }
}

impl Metric for NegativeLogLikelihood {
    fn name(&self) -> &'static str {
        "nll"
    }

    fn update(&mut self, probs: &Tensor, targets: Option<&Targets>) -> Result<()> {
        probs.expect_ndim(2)?;
        let c = probs.shape[1];
        let dist = require_targets(self.name(), targets)?.distribution(c)?;
        if dist.batch() != probs.batch() {
            return Err(Error::invalid("predictions and targets differ in batch size"));
        }
        for b in 0..probs.batch() {
            let nll: f64 = probs
                .sample(b)
                .iter()
                .zip(dist.sample(b))
                .filter(|(_, &y)| y > 0.0)
                .map(|(&p, &y)| -y * p.max(MIN_PROB).ln())
                .sum();
            self.values.push(nll);
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
    fn uniform_binary_is_ln2() {
        let mut nll = NegativeLogLikelihood::new();
        let p = Tensor::new(&[1, 2], vec![0.5, 0.5]).unwrap();
        nll.update(&p, Some(&Targets::Classes(vec![1]))).unwrap();
        assert_close(nll.compute().unwrap().item().unwrap(), 2f64.ln());
    }
}
