use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optim::Optimizer;

/// Epoch-indexed learning-rate schedule, expressed as a factor of the base rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrScheduler {
    Constant,
    /// Multiplies by `gamma` at each milestone epoch.
    MultiStep { milestones: Vec<usize>, gamma: f64 },
    /// Linear warm-up over `warmup_epochs`, then cosine decay to `min_factor`
    /// at `total_epochs`.
    CosineWarmup { warmup_epochs: usize, total_epochs: usize, min_factor: f64 },
}

impl LrScheduler {
    pub fn multi_step(milestones: Vec<usize>, gamma: f64) -> Result<LrScheduler> {
        if milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid("milestones must be strictly increasing"));
        }
        if !(gamma > 0.0) {
            return Err(Error::invalid("gamma must be positive"));
        }
        Ok(LrScheduler::MultiStep { milestones, gamma })
    }

    pub fn cosine_warmup(warmup_epochs: usize, total_epochs: usize) -> Result<LrScheduler> {
        if warmup_epochs >= total_epochs {
            return Err(Error::invalid("warm-up must be shorter than the whole schedule"));
        }
        Ok(LrScheduler::CosineWarmup { warmup_epochs, total_epochs, min_factor: 0.0 })
    }

    /// Factor applied to the base learning rate during `epoch` (0-based).
    pub fn factor(&self, epoch: usize) -> f64 {
        match self {
            LrScheduler::Constant => 1.0,
            LrScheduler::MultiStep { milestones, gamma } => {
                gamma.powi(milestones.iter().filter(|&&m| m <= epoch).count() as i32)
            }
            LrScheduler::CosineWarmup { warmup_epochs, total_epochs, min_factor } => {
                if epoch < *warmup_epochs {
                    (epoch + 1) as f64 / *warmup_epochs as f64
                } else {
                    let span = (total_epochs - warmup_epochs) as f64;
                    let progress = ((epoch - warmup_epochs) as f64 / span).min(1.0);
                    min_factor + (1.0 - min_factor) * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
                }
            }
        }
    }

    /// Sets the optimizer's rate for `epoch`.
    pub fn apply(&self, optimizer: &mut dyn Optimizer, base_lr: f64, epoch: usize) {
        let lr = base_lr * self.factor(epoch);
        optimizer.set_learning_rate(lr);
        tracing::debug!(epoch, lr, "learning rate updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_step_decays_at_milestones() {
        let s = LrScheduler::multi_step(vec![25, 50], 0.1).unwrap();
        assert_eq!(s.factor(24), 1.0);
        assert!((s.factor(25) - 0.1).abs() < 1e-12);
        assert!((s.factor(60) - 0.01).abs() < 1e-12);
        assert!(LrScheduler::multi_step(vec![50, 25], 0.1).is_err());
    }

    #[test]
    fn cosine_warms_up_then_decays() {
        let s = LrScheduler::cosine_warmup(5, 105).unwrap();
        assert!((s.factor(0) - 0.2).abs() < 1e-12);
        assert!((s.factor(5) - 1.0).abs() < 1e-12);
        assert!((s.factor(55) - 0.5).abs() < 1e-12);
        assert!(s.factor(105).abs() < 1e-12);
    }
}
