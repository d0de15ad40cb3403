use crate::datasets::target::Targets;
use crate::error::Result;
use crate::math::tensor::{argmax, Tensor};
use crate::metrics::{as_ensemble, mean_or_zero, Metric};

/// `1 - p(mode)`. The probabilistic flavour uses the averaged probabilities,
/// the hard one the share of estimators voting for the mode.
#[derive(Debug, Clone)]
pub struct VariationRatio {
    pub probabilistic: bool,
    values: Vec<f64>,
}

impl Default for VariationRatio {
    fn default() -> Self {
        VariationRatio { probabilistic: true, values: Vec::new() }
    }
}

impl VariationRatio {
    pub fn new(probabilistic: bool) -> VariationRatio {
        VariationRatio { probabilistic, values: Vec::new() }
    }
}

impl Metric for VariationRatio {
    fn name(&self) -> &'static str {
        "variation_ratio"
    }

    fn update(&mut self, probs: &Tensor, _targets: Option<&Targets>) -> Result<()> {
        let (_, m, c) = as_ensemble(probs)?;
        for sample in probs.data.chunks(m * c) {
            let mode_share = if self.probabilistic {
                let mut mean = vec![0.0; c];
                for member in sample.chunks(c) {
                    for (acc, p) in mean.iter_mut().zip(member) {
                        *acc += p / m as f64;
                    }
                }
                mean.iter().cloned().fold(0.0, f64::max)
            } else {
                let mut votes = vec![0usize; c];
                for member in sample.chunks(c) {
                    votes[argmax(member)] += 1;
                }
                votes.iter().copied().max().unwrap_or(0) as f64 / m as f64
            };
            self.values.push(1.0 - mode_share);
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
