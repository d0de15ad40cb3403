//! Masksembles: each estimator sees a fixed binary subset of the input channels.

use rand::seq::index::sample;

use crate::error::{Error, Result};
use crate::layers::conv::{Conv2d, ConvSpec};
use crate::layers::linear::Linear;
use crate::layers::module::{Module, WeightInit};
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;

const MAX_SEARCH_ITER: usize = 1_000;

fn random_masks(active: usize, n: usize, scale: f64) -> Vec<Vec<f64>> {
    let total = ((active as f64) * scale) as usize;
    let total = total.max(active);
    let mut masks: Vec<Vec<f64>> = with_rng(|rng| {
        (0..n)
            .map(|_| {
                let mut v = vec![0.0; total];
                for idx in sample(rng, total, active).iter() {
                    v[idx] = 1.0;
                }
                v
            })
            .collect()
    });
    // Positions no mask uses carry no information.
    let used: Vec<bool> = (0..total).map(|j| masks.iter().any(|m| m[j] > 0.0)).collect();
    for m in masks.iter_mut() {
        *m = m.iter().zip(used.iter()).filter(|(_, u)| **u).map(|(&v, _)| v).collect();
    }
    masks
}

/// Generates `n` binary masks of width `channels` whose overlap is governed by `scale`.
pub fn generate_masks(channels: usize, n: usize, scale: f64) -> Result<Tensor> {
    if channels < 10 {
        return Err(Error::invalid(format!(
            "masksembles needs at least 10 channels, got {channels}"
        )));
    }
    if !(1.0..=6.0).contains(&scale) {
        return Err(Error::invalid(format!("scale must lie in [1, 6], got {scale}")));
    }
    if n == 0 {
        return Err(Error::invalid("num_estimators must be at least 1"));
    }
    let coverage = 1.0 - (1.0 - 1.0 / scale).powi(n as i32);
    let active = ((channels as f64) / (scale * coverage)) as usize;
    let active = active.clamp(1, channels);

    let (mut low, mut high) = ((scale * 0.8).max(1.0), scale * 1.2);
    let mut masks = random_masks(active, n, (low + high) / 2.0);
    for _ in 0..MAX_SEARCH_ITER {
        let mid = (low + high) / 2.0;
        masks = random_masks(active, n, mid);
        let width = masks[0].len();
        if width == channels {
            break;
        }
        if width > channels {
            high = mid;
        } else {
            low = mid;
        }
    }
    if masks[0].len() != channels {
        return Err(Error::invalid(format!(
            "could not generate masks of width {channels} with scale {scale}"
        )));
    }
    Tensor::new(&[n, channels], masks.into_iter().flatten().collect())
}

/// Multiplies batch group `i` (of `n` contiguous groups) by mask `i` along dim 1.
fn apply_masks(x: &Tensor, masks: &Tensor) -> Result<Tensor> {
    let (n, c) = (masks.shape[0], masks.shape[1]);
    if x.shape[1] != c {
        return Err(Error::ShapeMismatch { expected: vec![x.batch(), c], got: x.shape.clone() });
    }
    if x.batch() % n != 0 {
        return Err(Error::invalid(format!(
            "batch of {} must be a multiple of {} estimators",
            x.batch(),
            n
        )));
    }
    let per = x.batch() / n;
    let spatial = x.sample_len() / c;
    let mut out = x.clone();
    for bi in 0..x.batch() {
        let mask = &masks.data[(bi / per) * c..(bi / per + 1) * c];
        for (ci, chunk) in out.sample_mut(bi).chunks_mut(spatial.max(1)).enumerate() {
            if mask[ci] == 0.0 {
                chunk.iter_mut().for_each(|v| *v = 0.0);
            }
        }
    }
    Ok(out)
}

pub struct MaskedLinear {
    pub num_estimators: usize,
    pub scale: f64,
    pub masks: Tensor,
    inner: Linear,
}

impl MaskedLinear {
    pub fn new(in_features: usize, out_features: usize, num_estimators: usize, scale: f64) -> Result<MaskedLinear> {
        if scale < 1.0 {
            return Err(Error::invalid(format!("scale should be >= 1, not {scale}")));
        }
        Ok(MaskedLinear {
            num_estimators,
            scale,
            masks: generate_masks(in_features, num_estimators, scale)?,
            inner: Linear::new(in_features, out_features, true)?,
        })
    }
}

impl Module for MaskedLinear {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let masked = apply_masks(x, &self.masks)?;
        self.inner.forward(&masked)
    }

    fn name(&self) -> String {
        format!("Masked{} x{}", self.inner.name(), self.num_estimators)
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.inner]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.inner]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        let mut s = self.inner.state_tensors();
        s.push(&self.masks);
        s
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        let mut s = self.inner.state_tensors_mut();
        s.push(&mut self.masks);
        s
    }

    fn init_weights(&mut self, init: WeightInit) {
        self.inner.init_weights(init);
    }
}

pub struct MaskedConv2d {
    pub num_estimators: usize,
    pub scale: f64,
    pub masks: Tensor,
    inner: Conv2d,
}

impl MaskedConv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        spec: ConvSpec,
        num_estimators: usize,
        scale: f64,
    ) -> Result<MaskedConv2d> {
        if scale < 1.0 {
            return Err(Error::invalid(format!("scale should be >= 1, not {scale}")));
        }
        Ok(MaskedConv2d {
            num_estimators,
            scale,
            masks: generate_masks(in_channels, num_estimators, scale)?,
            inner: Conv2d::new(in_channels, out_channels, spec)?,
        })
    }
}

impl Module for MaskedConv2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let masked = apply_masks(x, &self.masks)?;
        self.inner.forward(&masked)
    }

    fn name(&self) -> String {
        format!("Masked{} x{}", self.inner.name(), self.num_estimators)
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.inner]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.inner]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        let mut s = self.inner.state_tensors();
        s.push(&self.masks);
        s
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        let mut s = self.inner.state_tensors_mut();
        s.push(&mut self.masks);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_have_requested_width() {
        let masks = generate_masks(16, 4, 2.0).unwrap();
        assert_eq!(masks.shape, vec![4, 16]);
        assert!(masks.data.iter().all(|&v| v == 0.0 || v == 1.0));
        // Every channel is used by at least one estimator.
        for c in 0..16 {
            assert!((0..4).any(|m| masks.data[m * 16 + c] == 1.0));
        }
    }

    #[test]
    fn unit_scale_keeps_every_channel() {
        let masks = generate_masks(12, 3, 1.0).unwrap();
        assert!(masks.data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rejects_bad_setups() {
        assert!(generate_masks(8, 2, 2.0).is_err());
        assert!(generate_masks(16, 2, 7.0).is_err());
        assert!(MaskedLinear::new(16, 4, 2, 0.5).is_err());
    }

    #[test]
    fn batch_must_split_across_estimators() {
        let mut layer = MaskedLinear::new(16, 4, 2, 2.0).unwrap();
        assert!(layer.forward(&Tensor::ones(&[3, 16])).is_err());
        assert_eq!(layer.forward(&Tensor::ones(&[4, 16])).unwrap().shape, vec![4, 4]);
    }
}
