//! First-order optimizers with per-parameter state, and learning-rate schedules.

pub mod adam;
pub mod lamb;
pub mod scheduler;
pub mod sgd;

pub use adam::{Adam, AdamW};
pub use lamb::Lamb;
pub use scheduler::LrScheduler;
pub use sgd::Sgd;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

pub trait Optimizer: Send {
    fn name(&self) -> &'static str;

    /// Updates `params` in place. `grads[i]` is the gradient of `params[i]`;
    /// the order must stay the same from one step to the next.
    fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor]) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// Serializable description of an optimizer, built into a live one with
/// [`OptimizerConfig::build`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd { lr: f64, momentum: f64, weight_decay: f64, nesterov: bool },
    Adam { lr: f64, betas: (f64, f64), eps: f64, weight_decay: f64 },
    AdamW { lr: f64, betas: (f64, f64), eps: f64, weight_decay: f64 },
    Lamb { lr: f64, betas: (f64, f64), eps: f64, weight_decay: f64 },
}

impl OptimizerConfig {
    pub fn sgd(lr: f64) -> OptimizerConfig {
        OptimizerConfig::Sgd { lr, momentum: 0.0, weight_decay: 0.0, nesterov: false }
    }

    pub fn adam(lr: f64, weight_decay: f64) -> OptimizerConfig {
        OptimizerConfig::Adam { lr, betas: (0.9, 0.999), eps: 1e-8, weight_decay }
    }

    pub fn adamw(lr: f64, weight_decay: f64) -> OptimizerConfig {
        OptimizerConfig::AdamW { lr, betas: (0.9, 0.999), eps: 1e-8, weight_decay }
    }

    pub fn lamb(lr: f64, weight_decay: f64) -> OptimizerConfig {
        OptimizerConfig::Lamb { lr, betas: (0.9, 0.999), eps: 1e-6, weight_decay }
    }

    pub fn lr(&self) -> f64 {
        match *self {
            OptimizerConfig::Sgd { lr, .. }
            | OptimizerConfig::Adam { lr, .. }
            | OptimizerConfig::AdamW { lr, .. }
            | OptimizerConfig::Lamb { lr, .. } => lr,
        }
    }

    pub fn build(&self) -> Result<Box<dyn Optimizer>> {
        if !(self.lr() > 0.0) {
            return Err(Error::invalid(format!("learning rate must be positive, got {}", self.lr())));
        }
        Ok(match *self {
            OptimizerConfig::Sgd { lr, momentum, weight_decay, nesterov } => {
                Box::new(Sgd::new(lr).momentum(momentum, nesterov)?.weight_decay(weight_decay))
            }
            OptimizerConfig::Adam { lr, betas, eps, weight_decay } => Box::new(Adam::new(lr, betas, eps, weight_decay)),
            OptimizerConfig::AdamW { lr, betas, eps, weight_decay } => {
                Box::new(AdamW::new(lr, betas, eps, weight_decay))
            }
            OptimizerConfig::Lamb { lr, betas, eps, weight_decay } => Box::new(Lamb::new(lr, betas, eps, weight_decay)),
        })
    }
}

/// Checks gradient / parameter pairing and lazily sizes a per-parameter state.
pub(crate) fn check_step(params: &[&mut Tensor], grads: &[Tensor], state: &mut Vec<Vec<Tensor>>, slots: usize) -> Result<()> {
    if params.len() != grads.len() {
        return Err(Error::invalid(format!("{} parameters but {} gradients", params.len(), grads.len())));
    }
    for (p, g) in params.iter().zip(grads) {
        if p.shape != g.shape {
            return Err(Error::ShapeMismatch { expected: p.shape.clone(), got: g.shape.clone() });
        }
    }
    if state.is_empty() {
        *state = params.iter().map(|p| vec![Tensor::zeros(&p.shape); slots]).collect();
    } else if state.len() != params.len() || state.iter().zip(params).any(|(s, p)| s[0].shape != p.shape) {
        return Err(Error::invalid("parameter list changed between optimizer steps"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimizes `sum((p - 3)^2)` and returns the final parameter.
    pub(crate) fn minimize(opt: &mut dyn Optimizer, steps: usize) -> f64 {
        let mut p = Tensor::zeros(&[1]);
        for _ in 0..steps {
            let g = p.map(|v| 2.0 * (v - 3.0));
            opt.step(vec![&mut p], &[g]).unwrap();
        }
        p.data[0]
    }

    #[test]
    fn build_rejects_bad_learning_rate() {
        assert!(OptimizerConfig::sgd(0.0).build().is_err());
        assert!(OptimizerConfig::adam(1e-3, 0.0).build().is_ok());
    }

    #[test]
    fn step_checks_pairing() {
        let mut opt = OptimizerConfig::sgd(0.1).build().unwrap();
        let mut p = Tensor::zeros(&[2]);
        assert!(opt.step(vec![&mut p], &[]).is_err());
        assert!(opt.step(vec![&mut p], &[Tensor::zeros(&[3])]).is_err());
    }
}
