use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{entropy_of, mean_or_zero, Metric};

/// Epistemic part of the predictive entropy: `H(E[p]) - E[H(p)]` over estimators.
#[derive(Debug, Clone, Default)]
pub struct MutualInformation {
    values: Vec<f64>,
}

impl MutualInformation {
    pub fn new() -> MutualInformation {
        MutualInformation::default()
    }
}

impl Metric for MutualInformation {
    fn name(&self) -> &'static str {
        "mutual_information"
    }

    fn update(&mut self, probs: &Tensor, _targets: Option<&Targets>) -> Result<()> {
        if probs.ndim() != 3 {
            return Err(Error::invalid("mutual information needs [B, M, C] probabilities"));
        }
        let (m, c) = (probs.shape[1], probs.shape[2]);
        let mean = probs.mean_dim1()?;
        for (b, sample) in probs.data.chunks(m * c).enumerate() {
            let expected: f64 = sample.chunks(c).map(entropy_of).sum::<f64>() / m as f64;
            self.values.push(entropy_of(mean.sample(b)) - expected);
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
    fn full_disagreement_is_ln2() {
        let mut mi = MutualInformation::new();
        mi.update(&Tensor::new(&[1, 2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap(), None).unwrap();
        assert_close(mi.compute().unwrap().item().unwrap(), 2f64.ln());
    }

    #[test]
    fn agreement_is_zero() {
        let mut mi = MutualInformation::new();
        mi.update(&Tensor::new(&[1, 2, 2], vec![0.3, 0.7, 0.3, 0.7]).unwrap(), None).unwrap();
        assert_close(mi.compute().unwrap().item().unwrap(), 0.0);
    }
}
