use crate::datasets::{out_of_range, Dataset, Sample, SharedDataset, Target};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Virtually interlaces `n` copies of a dataset so each ensemble member sees
/// a different batch order. Item `i` stacks items `(i + k * offset) % len`
/// for `k in 0..n` along the channel axis, with `offset = len / n`.
pub struct AggregatedDataset {
    dataset: SharedDataset,
    n_dataloaders: usize,
    offset: usize,
}

impl AggregatedDataset {
    pub fn new(dataset: SharedDataset, n_dataloaders: usize) -> Result<AggregatedDataset> {
        if n_dataloaders == 0 {
            return Err(Error::invalid("n_dataloaders must be positive"));
        }
        let offset = dataset.len() / n_dataloaders;
        Ok(AggregatedDataset { dataset, n_dataloaders, offset })
    }

    pub fn n_dataloaders(&self) -> usize {
        self.n_dataloaders
    }
}

impl Dataset for AggregatedDataset {
    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let len = self.len();
        if idx >= len {
            return Err(out_of_range(idx, len));
        }
        let items = (0..self.n_dataloaders)
            .map(|k| self.dataset.get((idx + k * self.offset) % len))
            .collect::<Result<Vec<_>>>()?;
        let sample_shape = items[0].input.shape.clone();
        let mut data = Vec::with_capacity(items.len() * items[0].input.numel());
        let mut targets = Vec::with_capacity(items.len());
        for item in items {
            if item.input.shape != sample_shape {
                return Err(Error::ShapeMismatch { expected: sample_shape, got: item.input.shape });
            }
            data.extend(item.input.data);
            targets.push(item.target);
        }
        let mut shape = sample_shape;
        match shape.first_mut() {
            Some(first) => *first *= self.n_dataloaders,
            None => shape.push(self.n_dataloaders),
        }
        Ok(Sample { input: Tensor::new(&shape, data)?, target: Target::Group(targets) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DummyClassificationDataset;
    use std::sync::Arc;

    #[test]
    fn interlaces_with_offset() {
        let base = Arc::new(DummyClassificationDataset::new(10, 1).num_images(6).image_size(2));
        let agg = AggregatedDataset::new(base.clone(), 2).unwrap();
        assert_eq!(agg.len(), 6);
        let item = agg.get(4).unwrap();
        assert_eq!(item.input.shape, vec![2, 2, 2]);
        // offset 3: items 4 and (4 + 3) % 6 = 1
        assert_eq!(&item.input.data[..4], &base.get(4).unwrap().input.data[..]);
        assert_eq!(&item.input.data[4..], &base.get(1).unwrap().input.data[..]);
        assert_eq!(item.target, Target::Group(vec![Target::Class(4), Target::Class(1)]));
    }
}
