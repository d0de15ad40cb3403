use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{require_targets, Metric};

/// Top-1 accuracy of `[B, C]` scores.
#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Accuracy {
        Accuracy::default()
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn update(&mut self, preds: &Tensor, targets: Option<&Targets>) -> Result<()> {
        preds.expect_ndim(2)?;
        let labels = require_targets(self.name(), targets)?.classes()?;
        if labels.len() != preds.batch() {
            return Err(Error::invalid("predictions and targets differ in batch size"));
        }
        self.correct += preds.argmax_last().iter().zip(&labels).filter(|(p, y)| p == y).count();
        self.total += labels.len();
        Ok(())
    }

    fn compute(&self) -> Result<Tensor> {
        Ok(Tensor::scalar(if self.total == 0 { 0.0 } else { self.correct as f64 / self.total as f64 }))
    }

    fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_top1_hits() {
        let mut acc = Accuracy::new();
        let p = Tensor::new(&[2, 2], vec![0.9, 0.1, 0.8, 0.2]).unwrap();
        acc.update(&p, Some(&Targets::Classes(vec![0, 1]))).unwrap();
        assert_eq!(acc.compute().unwrap().item().unwrap(), 0.5);
        acc.reset();
        assert_eq!(acc.compute().unwrap().item().unwrap(), 0.0);
    }
}
