use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::{argmax, Tensor};
use crate::metrics::{mean_or_zero, Metric};

/// Fraction of estimator pairs whose top-1 predictions differ.
#[derive(Debug, Clone, Default)]
pub struct Disagreement {
    values: Vec<f64>,
}

impl Disagreement {
    pub fn new() -> Disagreement {
        Disagreement::default()
    }
}

impl Metric for Disagreement {
    fn name(&self) -> &'static str {
        "disagreement"
    }

    fn update(&mut self, probs: &Tensor, _targets: Option<&Targets>) -> Result<()> {
        if probs.ndim() != 3 {
            return Err(Error::invalid("disagreement needs [B, M, C] probabilities"));
        }
        let (m, c) = (probs.shape[1], probs.shape[2]);
        let pairs = (m * m.saturating_sub(1)) as f64 / 2.0;
        for sample in probs.data.chunks(m * c) {
            if pairs == 0.0 {
                self.values.push(0.0);
                continue;
            }
            let mut counts = vec![0usize; c];
            for member in sample.chunks(c) {
                counts[argmax(member)] += 1;
            }
            let agreeing: f64 = counts.iter().map(|&n| (n * n.saturating_sub(1)) as f64 / 2.0).sum();
            self.values.push(1.0 - agreeing / pairs);
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
    fn counts_disagreeing_pairs() {
        let mut d = Disagreement::new();
        // votes: 0, 0, 1 -> one agreeing pair out of three
        let p = Tensor::new(&[1, 3, 2], vec![0.9, 0.1, 0.8, 0.2, 0.1, 0.9]).unwrap();
        d.update(&p, None).unwrap();
        assert_close(d.compute().unwrap().item().unwrap(), 2.0 / 3.0);
    }
}
