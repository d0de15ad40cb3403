//! Out-of-distribution detection scores. Inputs are `[N]` scores where higher
//! means "more likely OOD", targets are `1` for OOD samples and `0` otherwise.

use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::metrics::{require_targets, Metric};

#[derive(Debug, Clone, Default)]
struct ScoreBuffer {
    scores: Vec<f64>,
    labels: Vec<bool>,
}

impl ScoreBuffer {
    fn push(&mut self, metric: &str, scores: &Tensor, targets: Option<&Targets>) -> Result<()> {
        let labels = require_targets(metric, targets)?.classes()?;
        if labels.len() != scores.numel() {
            return Err(Error::invalid(format!("{metric}: scores and labels differ in length")));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(Error::invalid(format!("{metric}: labels must be 0 or 1, got {bad}")));
        }
        self.scores.extend_from_slice(&scores.data);
        self.labels.extend(labels.iter().map(|&l| l == 1));
        Ok(())
    }

    fn split(&self) -> (Vec<f64>, Vec<f64>) {
        let mut pos = Vec::new();
        let mut neg = Vec::new();
        for (&s, &l) in self.scores.iter().zip(&self.labels) {
            if l { pos.push(s) } else { neg.push(s) }
        }
        (pos, neg)
    }

    fn clear(&mut self) {
        self.scores.clear();
        self.labels.clear();
    }
}

/// Area under the ROC curve (ties count one half).
#[derive(Debug, Clone, Default)]
pub struct Auroc {
    buffer: ScoreBuffer,
}

impl Auroc {
    pub fn new() -> Auroc {
        Auroc::default()
    }
}

impl Metric for Auroc {
    fn name(&self) -> &'static str {
        "auroc"
    }

    fn update(&mut self, scores: &Tensor, targets: Option<&Targets>) -> Result<()> {
        self.buffer.push("auroc", scores, targets)
    }

    fn compute(&self) -> Result<Tensor> {
        let (pos, neg) = self.buffer.split();
        if pos.is_empty() || neg.is_empty() {
            return Err(Error::invalid("auroc needs both positive and negative samples"));
        }
        let mut ranked: Vec<(f64, bool)> = self.buffer.scores.iter().copied().zip(self.buffer.labels.iter().copied()).collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        // Mann-Whitney U with average ranks
        let mut rank_sum = 0.0;
        let mut i = 0;
        while i < ranked.len() {
            let mut j = i;
            while j + 1 < ranked.len() && ranked[j + 1].0 == ranked[i].0 {
                j += 1;
            }
            let avg_rank = (i + j) as f64 / 2.0 + 1.0;
            rank_sum += ranked[i..=j].iter().filter(|(_, l)| *l).count() as f64 * avg_rank;
            i = j + 1;
        }
        let (p, n) = (pos.len() as f64, neg.len() as f64);
        Ok(Tensor::scalar((rank_sum - p * (p + 1.0) / 2.0) / (p * n)))
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// False positive rate when 95% of OOD samples are detected.
#[derive(Debug, Clone, Default)]
pub struct Fpr95 {
    buffer: ScoreBuffer,
}

impl Fpr95 {
    pub fn new() -> Fpr95 {
        Fpr95::default()
    }
}

impl Metric for Fpr95 {
    fn name(&self) -> &'static str {
        "fpr95"
    }

    fn update(&mut self, scores: &Tensor, targets: Option<&Targets>) -> Result<()> {
        self.buffer.push("fpr95", scores, targets)
    }

    fn compute(&self) -> Result<Tensor> {
        let (mut pos, neg) = self.buffer.split();
        if pos.is_empty() || neg.is_empty() {
            return Err(Error::invalid("fpr95 needs both positive and negative samples"));
        }
        pos.sort_by(|a, b| b.total_cmp(a));
        let needed = (0.95 * pos.len() as f64).ceil() as usize;
        let threshold = pos[needed.max(1) - 1];
        let false_positives = neg.iter().filter(|&&s| s >= threshold).count();
        Ok(Tensor::scalar(false_positives as f64 / neg.len() as f64))
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::assert_close;

    fn batch() -> (Tensor, Targets) {
        let scores = Tensor::new(&[4], vec![0.1, 0.4, 0.35, 0.8]).unwrap();
        (scores, Targets::Classes(vec![0, 0, 1, 1]))
    }

    #[test]
    fn auroc_matches_pair_counting() {
        let (s, t) = batch();
        let mut auroc = Auroc::new();
        auroc.update(&s, Some(&t)).unwrap();
        assert_close(auroc.compute().unwrap().item().unwrap(), 0.75);
    }

    #[test]
    fn fpr95_uses_lowest_needed_positive() {
        let (s, t) = batch();
        let mut fpr = Fpr95::new();
        fpr.update(&s, Some(&t)).unwrap();
        // threshold 0.35 lets the 0.4 in-distribution sample through
        assert_close(fpr.compute().unwrap().item().unwrap(), 0.5);
    }

    #[test]
    fn single_class_is_an_error() {
        let mut auroc = Auroc::new();
        auroc.update(&Tensor::new(&[2], vec![0.1, 0.2]).unwrap(), Some(&Targets::Classes(vec![1, 1]))).unwrap();
        assert!(auroc.compute().is_err());
    }
}
