use crate::error::Result;
use crate::layers::module::{Module, WeightInit};
use crate::math::tensor::Tensor;

const EPS: f64 = 1e-5;
const MOMENTUM: f64 = 0.1;

/// Batch normalisation over the channel axis of NCHW input.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    pub num_features: usize,
    pub weight: Tensor,
    pub bias: Tensor,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    training: bool,
}

impl BatchNorm2d {
    pub fn new(num_features: usize) -> BatchNorm2d {
        BatchNorm2d {
            num_features,
            weight: Tensor::ones(&[num_features]),
            bias: Tensor::zeros(&[num_features]),
            running_mean: Tensor::zeros(&[num_features]),
            running_var: Tensor::ones(&[num_features]),
            training: true,
        }
    }
}

impl Module for BatchNorm2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let (b, c, h, w) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        x.expect_shape(&[b, self.num_features, h, w])?;
        let plane = h * w;
        let count = (b * plane) as f64;
        let mut out = x.clone();

        for ci in 0..c {
            let (mean, var) = if self.training {
                let mut sum = 0.0;
                let mut sq = 0.0;
                for bi in 0..b {
                    let start = (bi * c + ci) * plane;
                    for v in &x.data[start..start + plane] {
                        sum += v;
                        sq += v * v;
                    }
                }
                let mean = sum / count;
                let var = (sq / count - mean * mean).max(0.0);
                let unbiased = if count > 1.0 { var * count / (count - 1.0) } else { var };
                self.running_mean.data[ci] =
                    (1.0 - MOMENTUM) * self.running_mean.data[ci] + MOMENTUM * mean;
                self.running_var.data[ci] =
                    (1.0 - MOMENTUM) * self.running_var.data[ci] + MOMENTUM * unbiased;
                (mean, var)
            } else {
                (self.running_mean.data[ci], self.running_var.data[ci])
            };
            let scale = self.weight.data[ci] / (var + EPS).sqrt();
            let shift = self.bias.data[ci] - mean * scale;
            for bi in 0..b {
                let start = (bi * c + ci) * plane;
                for v in &mut out.data[start..start + plane] {
                    *v = *v * scale + shift;
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> String {
        format!("BatchNorm2d({})", self.num_features)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias, &self.running_mean, &self.running_var]
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        vec![
            &mut self.weight,
            &mut self.bias,
            &mut self.running_mean,
            &mut self.running_var,
        ]
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn init_weights(&mut self, _init: WeightInit) {
        self.weight = Tensor::ones(&[self.num_features]);
        self.bias = Tensor::zeros(&[self.num_features]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_mode_normalises_each_channel() {
        let mut bn = BatchNorm2d::new(1);
        let x = Tensor::new(&[2, 1, 1, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = bn.forward(&x).unwrap();
        assert!(y.mean().abs() < 1e-9);
        assert!((bn.running_mean.data[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn eval_mode_uses_running_statistics() {
        let mut bn = BatchNorm2d::new(1);
        bn.train(false);
        let x = Tensor::new(&[1, 1, 1, 1], vec![2.0]).unwrap();
        let y = bn.forward(&x).unwrap();
        assert!((y.data[0] - 2.0 / (1.0 + EPS).sqrt()).abs() < 1e-12);
    }
}
