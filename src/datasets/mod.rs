//! In-memory and on-disk datasets. Nothing is downloaded: every reader looks
//! for its files under a local `root` and fails with `DatasetNotFound`.

pub mod aggregated;
pub mod cifar;
pub mod dummy;
pub mod image_folder;
pub mod mnist;
pub mod npy;
pub mod target;
pub mod uci;

pub use aggregated::AggregatedDataset;
pub use cifar::{Cifar, Cifar10H, CifarC, CifarVersion, CORRUPTIONS};
pub use dummy::{DummyClassificationDataset, DummyRegressionDataset};
pub use image_folder::{ImageFolder, ImageNetVariant};
pub use mnist::Mnist;
pub use target::{Target, Targets};
pub use uci::{UciRegression, UCI_DATASETS};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;

/// One item: a `[C, H, W]` image (or `[F]` feature vector) and its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Tensor,
    pub target: Target,
}

pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, idx: usize) -> Result<Sample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedDataset = Arc<dyn Dataset>;

/// Which half of a dataset a builder should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// Arguments handed to a [`DatasetBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRequest {
    pub root: PathBuf,
    pub split: Split,
    pub num_classes: usize,
}

/// Constructs a dataset for a datamodule. Datamodules hold these instead of
/// concrete readers so tests can plug in dummy data.
pub type DatasetBuilder = Arc<dyn Fn(&DatasetRequest) -> Result<SharedDataset> + Send + Sync>;

pub fn dataset_builder<F>(f: F) -> DatasetBuilder
where
    F: Fn(&DatasetRequest) -> Result<SharedDataset> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Items of `dataset` at `indices`.
pub struct Subset {
    pub dataset: SharedDataset,
    pub indices: Vec<usize>,
}

impl Subset {
    pub fn new(dataset: SharedDataset, indices: Vec<usize>) -> Result<Subset> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= dataset.len()) {
            return Err(Error::invalid(format!(
                "subset index {bad} out of range for a dataset of {}",
                dataset.len()
            )));
        }
        Ok(Subset { dataset, indices })
    }
}

impl Dataset for Subset {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let inner = *self.indices.get(idx).ok_or_else(|| out_of_range(idx, self.len()))?;
        self.dataset.get(inner)
    }
}

/// Randomly partitions `dataset` into non-overlapping subsets of the given lengths.
pub fn random_split(dataset: SharedDataset, lengths: &[usize]) -> Result<Vec<Subset>> {
    let total: usize = lengths.iter().sum();
    if total != dataset.len() {
        return Err(Error::invalid(format!(
            "split lengths sum to {total} but the dataset has {} items",
            dataset.len()
        )));
    }
    let mut order: Vec<usize> = (0..total).collect();
    with_rng(|rng| order.shuffle(rng));
    let mut start = 0;
    let mut subsets = Vec::with_capacity(lengths.len());
    for &len in lengths {
        subsets.push(Subset { dataset: Arc::clone(&dataset), indices: order[start..start + len].to_vec() });
        start += len;
    }
    Ok(subsets)
}

pub(crate) fn out_of_range(idx: usize, len: usize) -> Error {
    Error::invalid(format!("index {idx} out of range for a dataset of {len} items"))
}

pub(crate) fn require_path(name: &str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::DatasetNotFound { name: name.to_string(), path: path.display().to_string() })
    }
}

/// `[H, W, C]` bytes (numpy / image layout) to a `[C, H, W]` tensor in `[0, 1]`.
pub(crate) fn hwc_to_chw(pixels: &[u8], h: usize, w: usize, c: usize) -> Result<Tensor> {
    let mut out = Tensor::zeros(&[c, h, w]);
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                out.data[(ch * h + y) * w + x] = pixels[(y * w + x) * c + ch] as f64 / 255.0;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::rng::seed_everything;

    #[test]
    fn random_split_partitions_every_index() {
        seed_everything(3);
        let base: SharedDataset = Arc::new(DummyClassificationDataset::new(10, 3).num_images(10));
        let parts = random_split(base, &[7, 3]).unwrap();
        let mut all: Vec<usize> = parts.iter().flat_map(|s| s.indices.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(parts[1].len(), 3);
        assert!(parts[1].get(3).is_err());
    }

    #[test]
    fn random_split_checks_lengths() {
        let base: SharedDataset = Arc::new(DummyClassificationDataset::new(10, 3).num_images(4));
        assert!(random_split(base, &[1, 1]).is_err());
    }

    #[test]
    fn hwc_layout_is_transposed() {
        // 1x2 image, rgb
        let t = hwc_to_chw(&[255, 0, 0, 0, 255, 0], 1, 2, 3).unwrap();
        assert_eq!(t.shape, vec![3, 1, 2]);
        assert_eq!(t.data, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
