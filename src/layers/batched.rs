//! BatchEnsemble: a shared weight modulated by rank-1 per-estimator factors.

use crate::error::{Error, Result};
use crate::layers::conv::{conv2d_forward, ConvSpec};
use crate::layers::linear::linear_forward;
use crate::layers::module::{Module, WeightInit};
use crate::math::tensor::Tensor;

/// Estimator serving batch row `row`: contiguous blocks of `batch / m` rows,
/// remainder rows reuse the leading blocks.
fn estimator_of(row: usize, batch: usize, m: usize) -> usize {
    let per = batch / m;
    let row = if row < per * m { row } else { row - per * m };
    row / per
}

fn fast_weights(num_estimators: usize, in_dim: usize, out_dim: usize) -> (Tensor, Tensor) {
    (
        Tensor::randn(&[num_estimators, in_dim], 1.0, 0.5),
        Tensor::randn(&[num_estimators, out_dim], 1.0, 0.5),
    )
}

/// Scales dimension 1 of every batch row by the row's estimator factor.
fn scale_channels(x: &Tensor, factors: &Tensor, m: usize) -> Result<Tensor> {
    let c = factors.shape[1];
    if x.shape[1] != c {
        return Err(Error::ShapeMismatch { expected: vec![x.batch(), c], got: x.shape.clone() });
    }
    if x.batch() < m {
        return Err(Error::invalid(format!(
            "batch of {} is smaller than {} estimators",
            x.batch(),
            m
        )));
    }
    let spatial = x.sample_len() / c;
    let batch = x.batch();
    let mut out = x.clone();
    for bi in 0..batch {
        let e = estimator_of(bi, batch, m);
        let f = &factors.data[e * c..(e + 1) * c];
        for (ci, chunk) in out.sample_mut(bi).chunks_mut(spatial.max(1)).enumerate() {
            chunk.iter_mut().for_each(|v| *v *= f[ci]);
        }
    }
    Ok(out)
}

fn add_estimator_bias(x: &mut Tensor, bias: &Tensor, m: usize) {
    let c = bias.shape[1];
    let spatial = x.sample_len() / c;
    let batch = x.batch();
    for bi in 0..batch {
        let e = estimator_of(bi, batch, m);
        let b = &bias.data[e * c..(e + 1) * c];
        for (ci, chunk) in x.sample_mut(bi).chunks_mut(spatial.max(1)).enumerate() {
            chunk.iter_mut().for_each(|v| *v += b[ci]);
        }
    }
}

pub struct BatchLinear {
    pub in_features: usize,
    pub out_features: usize,
    pub num_estimators: usize,
    pub weight: Tensor,
    pub r_group: Tensor,
    pub s_group: Tensor,
    pub bias: Tensor,
}

impl BatchLinear {
    pub fn new(in_features: usize, out_features: usize, num_estimators: usize) -> Result<BatchLinear> {
        if num_estimators == 0 {
            return Err(Error::invalid("num_estimators must be at least 1"));
        }
        let bound = 1.0 / (in_features.max(1) as f64).sqrt();
        let (r_group, s_group) = fast_weights(num_estimators, in_features, out_features);
        Ok(BatchLinear {
            in_features,
            out_features,
            num_estimators,
            weight: Tensor::rand(&[out_features, in_features], -bound, bound),
            r_group,
            s_group,
            bias: Tensor::rand(&[num_estimators, out_features], -bound, bound),
        })
    }
}

impl Module for BatchLinear {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let m = self.num_estimators;
        let scaled = scale_channels(x, &self.r_group, m)?;
        let y = linear_forward(&scaled, &self.weight, None)?;
        let mut y = scale_channels(&y, &self.s_group, m)?;
        add_estimator_bias(&mut y, &self.bias, m);
        Ok(y)
    }

    fn name(&self) -> String {
        format!("BatchLinear({}, {}, num_estimators={})", self.in_features, self.out_features, self.num_estimators)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.r_group, &self.s_group, &self.bias]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.parameters()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.r_group, &mut self.s_group, &mut self.bias]
    }

    fn init_weights(&mut self, init: WeightInit) {
        if let WeightInit::KaimingFanOut { linear_std } = init {
            self.weight = Tensor::randn(&self.weight.shape, 0.0, linear_std);
            self.bias = Tensor::zeros(&self.bias.shape);
        }
    }
}

pub struct BatchConv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub num_estimators: usize,
    pub spec: ConvSpec,
    pub weight: Tensor,
    pub r_group: Tensor,
    pub s_group: Tensor,
    pub bias: Tensor,
}

impl BatchConv2d {
    pub fn new(in_channels: usize, out_channels: usize, spec: ConvSpec, num_estimators: usize) -> Result<BatchConv2d> {
        if num_estimators == 0 {
            return Err(Error::invalid("num_estimators must be at least 1"));
        }
        if spec.groups == 0 || in_channels % spec.groups != 0 || out_channels % spec.groups != 0 {
            return Err(Error::invalid(format!(
                "channels ({in_channels} -> {out_channels}) must be divisible by groups ({})",
                spec.groups
            )));
        }
        let k = spec.kernel_size;
        let bound = 1.0 / ((in_channels / spec.groups * k * k).max(1) as f64).sqrt();
        let (r_group, s_group) = fast_weights(num_estimators, in_channels, out_channels);
        Ok(BatchConv2d {
            in_channels,
            out_channels,
            num_estimators,
            spec,
            weight: Tensor::rand(&[out_channels, in_channels / spec.groups, k, k], -bound, bound),
            r_group,
            s_group,
            bias: Tensor::rand(&[num_estimators, out_channels], -bound, bound),
        })
    }
}

impl Module for BatchConv2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let m = self.num_estimators;
        let scaled = scale_channels(x, &self.r_group, m)?;
        let y = conv2d_forward(&scaled, &self.weight, None, &self.spec)?;
        let mut y = scale_channels(&y, &self.s_group, m)?;
        add_estimator_bias(&mut y, &self.bias, m);
        Ok(y)
    }

    fn name(&self) -> String {
        format!(
            "BatchConv2d({}, {}, kernel_size={}, num_estimators={})",
            self.in_channels, self.out_channels, self.spec.kernel_size, self.num_estimators
        )
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.r_group, &self.s_group, &self.bias]
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.parameters()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.r_group, &mut self.s_group, &mut self.bias]
    }

    fn init_weights(&mut self, _init: WeightInit) {
        let k = self.spec.kernel_size;
        let std = (2.0 / (self.out_channels * k * k) as f64).sqrt();
        self.weight = Tensor::randn(&self.weight.shape, 0.0, std);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_rows_reuse_leading_estimators() {
        // batch 5, 2 estimators: rows 0-1 -> 0, rows 2-3 -> 1, row 4 -> 0
        let owners: Vec<usize> = (0..5).map(|r| estimator_of(r, 5, 2)).collect();
        assert_eq!(owners, vec![0, 0, 1, 1, 0]);
    }

    #[test]
    fn estimators_differ_only_through_fast_weights() {
        let mut layer = BatchLinear::new(2, 1, 2).unwrap();
        layer.weight = Tensor::new(&[1, 2], vec![1.0, 1.0]).unwrap();
        layer.r_group = Tensor::new(&[2, 2], vec![1.0, 1.0, 2.0, 2.0]).unwrap();
        layer.s_group = Tensor::ones(&[2, 1]);
        layer.bias = Tensor::zeros(&[2, 1]);
        let y = layer.forward(&Tensor::ones(&[2, 2])).unwrap();
        assert_eq!(y.data, vec![2.0, 4.0]);
    }

    #[test]
    fn conv_keeps_spatial_shape() {
        let mut conv = BatchConv2d::new(3, 4, ConvSpec::new(3, 1, 1), 2).unwrap();
        let y = conv.forward(&Tensor::ones(&[4, 3, 5, 5])).unwrap();
        assert_eq!(y.shape, vec![4, 4, 5, 5]);
    }
}
