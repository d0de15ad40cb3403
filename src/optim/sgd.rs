use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::optim::{check_step, Optimizer};

/// Stochastic gradient descent with optional momentum, Nesterov momentum and
/// L2 weight decay.
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub nesterov: bool,
    pub weight_decay: f64,
    velocity: Vec<Vec<Tensor>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0, nesterov: false, weight_decay: 0.0, velocity: Vec::new() }
    }

    pub fn momentum(mut self, momentum: f64, nesterov: bool) -> Result<Sgd> {
        if nesterov && momentum <= 0.0 {
            return Err(Error::invalid("Nesterov momentum requires a positive momentum"));
        }
        self.momentum = momentum;
        self.nesterov = nesterov;
        Ok(self)
    }

    pub fn weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "SGD"
    }

    fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor]) -> Result<()> {
        check_step(&params, grads, &mut self.velocity, 1)?;
        for ((p, g), state) in params.into_iter().zip(grads).zip(self.velocity.iter_mut()) {
            let v = &mut state[0];
            for i in 0..p.data.len() {
                let mut d = g.data[i] + self.weight_decay * p.data[i];
                if self.momentum > 0.0 {
                    v.data[i] = self.momentum * v.data[i] + d;
                    d = if self.nesterov { d + self.momentum * v.data[i] } else { v.data[i] };
                }
                p.data[i] -= self.learning_rate * d;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::tests::minimize;

    #[test]
    fn plain_step() {
        let mut sgd = Sgd::new(0.5);
        let mut p = Tensor::ones(&[2]);
        sgd.step(vec![&mut p], &[Tensor::ones(&[2])]).unwrap();
        assert_eq!(p.data, vec![0.5, 0.5]);
    }

    #[test]
    fn nesterov_converges() {
        let mut sgd = Sgd::new(0.05).momentum(0.9, true).unwrap();
        assert!((minimize(&mut sgd, 200) - 3.0).abs() < 1e-3);
        assert!(Sgd::new(0.1).momentum(0.0, true).is_err());
    }
}
