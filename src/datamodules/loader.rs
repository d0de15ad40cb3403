use rand::seq::SliceRandom;

use crate::datasets::{SharedDataset, Target, Targets};
use crate::error::{Error, Result};
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;

/// A stacked mini-batch: inputs are `[B, ...sample shape]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Tensor,
    pub targets: Targets,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.batch()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterates a dataset in mini-batches, reshuffling on every pass when asked.
#[derive(Clone)]
pub struct DataLoader {
    pub dataset: SharedDataset,
    pub batch_size: usize,
    pub shuffle: bool,
}

impl DataLoader {
    pub fn new(dataset: SharedDataset, batch_size: usize, shuffle: bool) -> Result<DataLoader> {
        if batch_size == 0 {
            return Err(Error::invalid("batch_size must be positive"));
        }
        Ok(DataLoader { dataset, batch_size, shuffle })
    }

    /// Number of batches per pass (the last one may be partial).
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn iter(&self) -> DataLoaderIter<'_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            with_rng(|rng| order.shuffle(rng));
        }
        DataLoaderIter { loader: self, order, cursor: 0 }
    }
}

pub struct DataLoaderIter<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for DataLoaderIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Result<Batch>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;
        Some(collate(&self.loader.dataset, indices))
    }
}

fn collate(dataset: &SharedDataset, indices: &[usize]) -> Result<Batch> {
    let mut shape = Vec::new();
    let mut data = Vec::new();
    let mut targets: Vec<Target> = Vec::with_capacity(indices.len());
    for &i in indices {
        let sample = dataset.get(i)?;
        if shape.is_empty() {
            shape = sample.input.shape.clone();
        } else if sample.input.shape != shape {
            return Err(Error::ShapeMismatch { expected: shape, got: sample.input.shape });
        }
        data.extend(sample.input.data);
        targets.push(sample.target);
    }
    let mut batch_shape = vec![indices.len()];
    batch_shape.extend(shape);
    Ok(Batch { inputs: Tensor::new(&batch_shape, data)?, targets: Targets::from_samples(&targets)? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DummyClassificationDataset;
    use std::sync::Arc;

    #[test]
    fn batches_cover_the_dataset_once() {
        let ds = Arc::new(DummyClassificationDataset::new(10, 3).num_images(5));
        let loader = DataLoader::new(ds, 2, true).unwrap();
        assert_eq!(loader.len(), 3);
        let batches: Vec<Batch> = loader.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches[0].inputs.shape, vec![2, 3, 4, 4]);
        assert_eq!(batches[2].len(), 1);
        let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.targets.classes().unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
