use crate::error::Result;
use crate::math::tensor::Tensor;
use crate::optim::{check_step, Optimizer};

/// Bias-corrected first and second moment update shared by Adam and AdamW.
struct Moments {
    betas: (f64, f64),
    eps: f64,
    t: i32,
    state: Vec<Vec<Tensor>>,
}

impl Moments {
    fn new(betas: (f64, f64), eps: f64) -> Moments {
        Moments { betas, eps, t: 0, state: Vec::new() }
    }

    /// Calls `apply(param, index, adam_direction)` for every element.
    fn update(
        &mut self,
        params: Vec<&mut Tensor>,
        grads: &[Tensor],
        mut effective_grad: impl FnMut(f64, f64) -> f64,
        mut apply: impl FnMut(&mut f64, f64),
    ) -> Result<()> {
        check_step(&params, grads, &mut self.state, 2)?;
        self.t += 1;
        let (b1, b2) = self.betas;
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);
        for ((p, g), state) in params.into_iter().zip(grads).zip(self.state.iter_mut()) {
            let (m, v) = state.split_at_mut(1);
            let (m, v) = (&mut m[0], &mut v[0]);
            for i in 0..p.data.len() {
                let grad = effective_grad(g.data[i], p.data[i]);
                m.data[i] = b1 * m.data[i] + (1.0 - b1) * grad;
                v.data[i] = b2 * v.data[i] + (1.0 - b2) * grad * grad;
                let direction = (m.data[i] / c1) / ((v.data[i] / c2).sqrt() + self.eps);
                apply(&mut p.data[i], direction);
            }
        }
        Ok(())
    }
}

/// Adam with L2 weight decay folded into the gradient.
pub struct Adam {
    pub learning_rate: f64,
    pub weight_decay: f64,
    moments: Moments,
}

impl Adam {
    pub fn new(learning_rate: f64, betas: (f64, f64), eps: f64, weight_decay: f64) -> Adam {
        Adam { learning_rate, weight_decay, moments: Moments::new(betas, eps) }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor]) -> Result<()> {
        let (lr, wd) = (self.learning_rate, self.weight_decay);
        self.moments.update(params, grads, |g, p| g + wd * p, |p, d| *p -= lr * d)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

/// Adam with decoupled weight decay.
pub struct AdamW {
    pub learning_rate: f64,
    pub weight_decay: f64,
    moments: Moments,
}

impl AdamW {
    pub fn new(learning_rate: f64, betas: (f64, f64), eps: f64, weight_decay: f64) -> AdamW {
        AdamW { learning_rate, weight_decay, moments: Moments::new(betas, eps) }
    }
}

impl Optimizer for AdamW {
    fn name(&self) -> &'static str {
        "AdamW"
    }

    fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor]) -> Result<()> {
        let (lr, wd) = (self.learning_rate, self.weight_decay);
        self.moments.update(params, grads, |g, _| g, |p, d| *p = *p * (1.0 - lr * wd) - lr * d)
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
    fn first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.1, (0.9, 0.999), 1e-8, 0.0);
        let mut p = Tensor::zeros(&[1]);
        adam.step(vec![&mut p], &[Tensor::full(&[1], 5.0)]).unwrap();
        assert!((p.data[0] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn both_flavours_converge() {
        assert!((minimize(&mut Adam::new(0.1, (0.9, 0.999), 1e-8, 0.0), 500) - 3.0).abs() < 5e-2);
        assert!((minimize(&mut AdamW::new(0.1, (0.9, 0.999), 1e-8, 0.0), 500) - 3.0).abs() < 5e-2);
    }
}
