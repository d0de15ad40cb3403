use rand::Rng;

use crate::error::{Error, Result};
use crate::layers::module::Module;
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;

#[derive(Debug, Clone, Default)]
pub struct Identity;

impl Module for Identity {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        Ok(x.clone())
    }

    fn name(&self) -> String {
        "Identity".into()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReLU;

impl Module for ReLU {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        Ok(x.map(|v| v.max(0.0)))
    }

    fn name(&self) -> String {
        "ReLU".into()
    }
}

/// `[B, ...] -> [B, N]`
#[derive(Debug, Clone, Default)]
pub struct Flatten;

impl Module for Flatten {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        Ok(x.flatten())
    }

    fn name(&self) -> String {
        "Flatten".into()
    }
}

/// Inverted dropout. Active in training mode, or in evaluation mode when
/// Monte-Carlo dropout is switched on.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub p: f64,
    training: bool,
    mc: bool,
}

impl Dropout {
    pub fn new(p: f64) -> Result<Dropout> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::invalid(format!("dropout probability must be in [0, 1], got {p}")));
        }
        Ok(Dropout { p, training: true, mc: false })
    }

    pub fn is_active(&self) -> bool {
        (self.training || self.mc) && self.p > 0.0
    }
}

impl Module for Dropout {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        if !self.is_active() {
            return Ok(x.clone());
        }
        if self.p >= 1.0 {
            return Ok(Tensor::zeros(&x.shape));
        }
        let keep = 1.0 - self.p;
        let mut out = x.clone();
        with_rng(|rng| {
            for v in out.data.iter_mut() {
                if rng.gen::<f64>() < self.p {
                    *v = 0.0;
                } else {
                    *v /= keep;
                }
            }
        });
        Ok(out)
    }

    fn name(&self) -> String {
        format!("Dropout(p={})", self.p)
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_mc_dropout(&mut self, enabled: bool) {
        self.mc = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropout_is_identity_in_eval() {
        let mut d = Dropout::new(0.5).unwrap();
        d.train(false);
        assert!(!d.is_training());
        let x = Tensor::ones(&[4, 4]);
        assert_eq!(d.forward(&x).unwrap(), x);
        d.set_mc_dropout(true);
        assert!(d.is_active());
    }

    #[test]
    fn dropout_rejects_bad_probability() {
        assert!(Dropout::new(1.5).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }

    #[test]
    fn dropout_scales_kept_units() {
        let mut d = Dropout::new(0.5).unwrap();
        let y = d.forward(&Tensor::ones(&[1, 64])).unwrap();
        assert!(y.data.iter().all(|&v| v == 0.0 || v == 2.0));
    }
}
