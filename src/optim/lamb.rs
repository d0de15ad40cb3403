use crate::error::Result;
use crate::math::tensor::Tensor;
use crate::optim::{check_step, Optimizer};

/// Layer-wise adaptive moments: an AdamW direction rescaled per parameter
/// tensor by the trust ratio `||p|| / ||update||`.
pub struct Lamb {
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub eps: f64,
    pub weight_decay: f64,
    t: i32,
    state: Vec<Vec<Tensor>>,
}

impl Lamb {
    pub fn new(learning_rate: f64, betas: (f64, f64), eps: f64, weight_decay: f64) -> Lamb {
        Lamb { learning_rate, betas, eps, weight_decay, t: 0, state: Vec::new() }
    }
}

impl Optimizer for Lamb {
    fn name(&self) -> &'static str {
        "LAMB"
    }

    fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor]) -> Result<()> {
        check_step(&params, grads, &mut self.state, 2)?;
        self.t += 1;
        let (b1, b2) = self.betas;
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);
        for ((p, g), state) in params.into_iter().zip(grads).zip(self.state.iter_mut()) {
            let (m, v) = state.split_at_mut(1);
            let (m, v) = (&mut m[0], &mut v[0]);
            let mut update = vec![0.0; p.data.len()];
            for i in 0..p.data.len() {
                m.data[i] = b1 * m.data[i] + (1.0 - b1) * g.data[i];
                v.data[i] = b2 * v.data[i] + (1.0 - b2) * g.data[i] * g.data[i];
                update[i] = (m.data[i] / c1) / ((v.data[i] / c2).sqrt() + self.eps) + self.weight_decay * p.data[i];
            }
            let w_norm = p.data.iter().map(|x| x * x).sum::<f64>().sqrt();
            let u_norm = update.iter().map(|x| x * x).sum::<f64>().sqrt();
            let trust = if w_norm > 0.0 && u_norm > 0.0 { w_norm / u_norm } else { 1.0 };
            for (x, u) in p.data.iter_mut().zip(&update) {
                *x -= self.learning_rate * trust * u;
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
