use serde::{Deserialize, Serialize};

use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::math::tensor::{argmax, Tensor};
use crate::metrics::{require_targets, Metric};

pub const DEFAULT_BINS: usize = 15;

/// `L1` is the expected calibration error, `Max` the maximum one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationNorm {
    #[default]
    L1,
    Max,
}

/// Top-label calibration error over equal-width confidence bins.
#[derive(Debug, Clone)]
pub struct CalibrationError {
    pub num_bins: usize,
    pub norm: CalibrationNorm,
    confidences: Vec<f64>,
    hits: Vec<bool>,
}

impl Default for CalibrationError {
    fn default() -> Self {
        CalibrationError {
            num_bins: DEFAULT_BINS,
            norm: CalibrationNorm::L1,
            confidences: Vec::new(),
            hits: Vec::new(),
        }
    }
}

impl CalibrationError {
    pub fn new(num_bins: usize, norm: CalibrationNorm) -> Result<CalibrationError> {
        if num_bins == 0 {
            return Err(Error::invalid("calibration error needs at least one bin"));
        }
        Ok(CalibrationError { num_bins, norm, ..CalibrationError::default() })
    }

    fn bin_of(&self, confidence: f64) -> usize {
        // bins are (lo, hi]; a confidence of exactly 0 lands in the first one
        let scaled = (confidence * self.num_bins as f64).ceil() as usize;
        scaled.saturating_sub(1).min(self.num_bins - 1)
    }
}

impl Metric for CalibrationError {
    fn name(&self) -> &'static str {
        "ece"
    }

    fn update(&mut self, probs: &Tensor, targets: Option<&Targets>) -> Result<()> {
        probs.expect_ndim(2)?;
        let labels = require_targets(self.name(), targets)?.classes()?;
        if labels.len() != probs.batch() {
            return Err(Error::invalid("predictions and targets differ in batch size"));
        }
        for (b, &label) in labels.iter().enumerate() {
            let p = probs.sample(b);
            let top = argmax(p);
            self.confidences.push(p[top]);
            self.hits.push(top == label);
        }
        Ok(())
    }

    fn compute(&self) -> Result<Tensor> {
        let n = self.confidences.len();
        if n == 0 {
            return Ok(Tensor::scalar(0.0));
        }
        let mut count = vec![0usize; self.num_bins];
        let mut conf = vec![0.0; self.num_bins];
        let mut acc = vec![0.0; self.num_bins];
        for (&c, &hit) in self.confidences.iter().zip(&self.hits) {
            let bin = self.bin_of(c);
            count[bin] += 1;
            conf[bin] += c;
            if hit {
                acc[bin] += 1.0;
            }
        }
        let gaps = (0..self.num_bins).filter(|&i| count[i] > 0).map(|i| {
            let k = count[i] as f64;
            ((acc[i] / k - conf[i] / k).abs(), k / n as f64)
        });
        let value = match self.norm {
            CalibrationNorm::L1 => gaps.map(|(gap, weight)| gap * weight).sum(),
            CalibrationNorm::Max => gaps.map(|(gap, _)| gap).fold(0.0, f64::max),
        };
        Ok(Tensor::scalar(value))
    }

    fn reset(&mut self) {
        self.confidences.clear();
        self.hits.clear();
    }
}
