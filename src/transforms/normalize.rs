use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::transforms::{image_dims, Transform};

pub const CIFAR10_MEAN: [f64; 3] = [0.4914, 0.4822, 0.4465];
pub const CIFAR10_STD: [f64; 3] = [0.2023, 0.1994, 0.2010];
pub const CIFAR100_MEAN: [f64; 3] = [0.5071, 0.4865, 0.4409];
pub const CIFAR100_STD: [f64; 3] = [0.2673, 0.2564, 0.2762];
pub const MNIST_MEAN: [f64; 1] = [0.1307];
pub const MNIST_STD: [f64; 1] = [0.3081];

/// Per-channel `(x - mean) / std`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Normalize {
    pub fn new(mean: Vec<f64>, std: Vec<f64>) -> Result<Normalize> {
        if mean.len() != std.len() || mean.is_empty() {
            return Err(Error::invalid("mean and std must be non-empty and of equal length"));
        }
        if std.iter().any(|&s| s <= 0.0) {
            return Err(Error::invalid("std must be positive"));
        }
        Ok(Normalize { mean, std })
    }
}

impl Transform for Normalize {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (c, h, w) = image_dims(x)?;
        if c != self.mean.len() {
            return Err(Error::invalid(format!("normalize expects {} channels, got {c}", self.mean.len())));
        }
        let mut out = x.clone();
        for (ch, plane) in out.data.chunks_mut(h * w).enumerate() {
            for v in plane {
                *v = (*v - self.mean[ch]) / self.std[ch];
            }
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "Normalize".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_must_match() {
        let n = Normalize::new(CIFAR10_MEAN.to_vec(), CIFAR10_STD.to_vec()).unwrap();
        assert!(n.apply(&Tensor::zeros(&[1, 2, 2])).is_err());
        assert!(Normalize::new(vec![0.0], vec![0.0]).is_err());
    }
}
