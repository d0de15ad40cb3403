//! Per-sample image augmentations operating on `[C, H, W]` tensors in `[0, 1]`.

pub mod crop;
pub mod cutout;
pub mod normalize;
pub mod randaugment;

pub use crop::{RandomCrop, RandomHorizontalFlip};
pub use cutout::Cutout;
pub use normalize::Normalize;
pub use randaugment::RandAugment;

use std::sync::Arc;

use crate::datasets::{Dataset, Sample, SharedDataset};
use crate::error::Result;
use crate::math::tensor::Tensor;

pub trait Transform: Send + Sync {
    fn apply(&self, x: &Tensor) -> Result<Tensor>;

    fn name(&self) -> String;
}

/// Applies its transforms in order.
#[derive(Default)]
pub struct Compose {
    pub transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new() -> Compose {
        Compose::default()
    }

    pub fn push(mut self, t: impl Transform + 'static) -> Compose {
        self.transforms.push(Box::new(t));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.transforms.iter().map(|t| t.name()).collect()
    }
}

impl Transform for Compose {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = x.clone();
        for t in &self.transforms {
            out = t.apply(&out)?;
        }
        Ok(out)
    }

    fn name(&self) -> String {
        format!("Compose({})", self.names().join(", "))
    }
}

/// A dataset whose inputs go through `transform` on every access.
pub struct TransformedDataset {
    pub dataset: SharedDataset,
    pub transform: Arc<dyn Transform>,
}

impl TransformedDataset {
    pub fn new(dataset: SharedDataset, transform: Arc<dyn Transform>) -> TransformedDataset {
        TransformedDataset { dataset, transform }
    }
}

impl Dataset for TransformedDataset {
    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let sample = self.dataset.get(idx)?;
        Ok(Sample { input: self.transform.apply(&sample.input)?, target: sample.target })
    }
}

/// `(C, H, W)` of a single image.
pub(crate) fn image_dims(x: &Tensor) -> Result<(usize, usize, usize)> {
    x.expect_ndim(3)?;
    Ok((x.shape[0], x.shape[1], x.shape[2]))
}
