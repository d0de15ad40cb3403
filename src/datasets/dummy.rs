use crate::datasets::{out_of_range, Dataset, Sample, Target};
use crate::error::Result;
use crate::math::tensor::Tensor;

/// Random images whose labels cycle through the classes. Used to exercise
/// datamodules and routines without data on disk.
#[derive(Debug, Clone)]
pub struct DummyClassificationDataset {
    pub num_classes: usize,
    pub num_channels: usize,
    pub image_size: usize,
    images: Vec<Tensor>,
}

impl DummyClassificationDataset {
    pub fn new(num_classes: usize, num_channels: usize) -> DummyClassificationDataset {
        DummyClassificationDataset { num_classes, num_channels, image_size: 4, images: Vec::new() }.num_images(2)
    }

    pub fn image_size(mut self, size: usize) -> DummyClassificationDataset {
        self.image_size = size;
        let n = self.images.len();
        self.num_images(n)
    }

    pub fn num_images(mut self, n: usize) -> DummyClassificationDataset {
        let shape = [self.num_channels, self.image_size, self.image_size];
        self.images = (0..n).map(|_| Tensor::rand(&shape, 0.0, 1.0)).collect();
        self
    }
}

impl Dataset for DummyClassificationDataset {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let input = self.images.get(idx).cloned().ok_or_else(|| out_of_range(idx, self.len()))?;
        Ok(Sample { input, target: Target::Class(idx % self.num_classes.max(1)) })
    }
}

/// Random features with a fixed linear target plus noise.
#[derive(Debug, Clone)]
pub struct DummyRegressionDataset {
    pub in_features: usize,
    pub out_features: usize,
    inputs: Tensor,
    targets: Tensor,
}

impl DummyRegressionDataset {
    pub fn new(in_features: usize, out_features: usize, num_samples: usize) -> DummyRegressionDataset {
        let inputs = Tensor::rand(&[num_samples, in_features], -1.0, 1.0);
        let weights = Tensor::randn(&[in_features, out_features], 0.0, 1.0);
        let noise = Tensor::randn(&[num_samples, out_features], 0.0, 0.05);
        let targets = if in_features == 0 || num_samples == 0 {
            Tensor::zeros(&[num_samples, out_features])
        } else {
            // shapes are consistent by construction
            inputs.matmul(&weights).and_then(|t| t.add(&noise)).unwrap_or_else(|_| Tensor::zeros(&[num_samples, out_features]))
        };
        DummyRegressionDataset { in_features, out_features, inputs, targets }
    }
}

impl Dataset for DummyRegressionDataset {
    fn len(&self) -> usize {
        self.inputs.batch()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        Ok(Sample {
            input: Tensor::new(&[self.in_features], self.inputs.sample(idx).to_vec())?,
            target: Target::Value(self.targets.sample(idx).to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_labels_cycle() {
        let ds = DummyClassificationDataset::new(3, 1).num_images(5);
        assert_eq!(ds.get(4).unwrap().target, Target::Class(1));
        assert_eq!(ds.get(0).unwrap().input.shape, vec![1, 4, 4]);
        assert!(ds.get(5).is_err());
    }

    #[test]
    fn regression_shapes() {
        let ds = DummyRegressionDataset::new(4, 2, 8);
        let s = ds.get(7).unwrap();
        assert_eq!(s.input.shape, vec![4]);
        assert!(matches!(s.target, Target::Value(ref v) if v.len() == 2));
    }
}
