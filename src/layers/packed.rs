//! Packed-Ensembles: `M` estimators folded into one network through grouped
//! convolutions over channel blocks widened by `alpha`.

use crate::error::{Error, Result};
use crate::layers::conv::{Conv2d, ConvSpec};
use crate::layers::module::{Module, WeightInit};
use crate::math::tensor::Tensor;

/// Groups narrower than this many channels are merged by lowering `gamma`.
const MIN_CHANNELS_PER_GROUP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedConfig {
    pub alpha: f64,
    pub num_estimators: usize,
    pub gamma: usize,
}

impl PackedConfig {
    pub fn new(alpha: f64, num_estimators: usize, gamma: usize) -> Result<PackedConfig> {
        if !(alpha > 0.0) {
            return Err(Error::invalid(format!("alpha must be positive, got {alpha}")));
        }
        if num_estimators == 0 {
            return Err(Error::invalid("num_estimators must be at least 1"));
        }
        if gamma == 0 {
            return Err(Error::invalid("gamma must be at least 1"));
        }
        Ok(PackedConfig { alpha, num_estimators, gamma })
    }

    /// Channel count of a hidden packed tensor, rounded up so every estimator
    /// (and every conv group inside it) gets the same width.
    pub fn width(&self, channels: usize, groups: usize) -> usize {
        let unit = self.num_estimators * groups;
        let raw = (channels as f64 * self.alpha).round() as usize;
        raw.div_ceil(unit).max(1) * unit
    }

    fn extended(&self, in_c: usize, out_c: usize, groups: usize, first: bool, last: bool) -> (usize, usize) {
        let ext_in = if first { in_c } else { self.width(in_c, groups) };
        let ext_out = if last { out_c * self.num_estimators } else { self.width(out_c, groups) };
        (ext_in, ext_out)
    }

    /// Group count of a packed layer and its output width. Only the input
    /// width can lower `gamma`; a hidden output width is then rounded up to a
    /// multiple of the group count. The logit width of a last layer is fixed,
    /// so there it must divide evenly as well.
    fn grouping(&self, ext_in: usize, ext_out: usize, groups: usize, first: bool, last: bool) -> (usize, usize) {
        if first {
            return (1, ext_out);
        }
        let mut gamma = self.gamma;
        let mut actual = groups * gamma * self.num_estimators;
        while gamma > 1
            && (ext_in % actual != 0
                || ext_in / actual < MIN_CHANNELS_PER_GROUP
                || (last && ext_out % actual != 0))
        {
            gamma -= 1;
            actual = groups * gamma * self.num_estimators;
        }
        let ext_out = if last { ext_out } else { ext_out.div_ceil(actual) * actual };
        (actual, ext_out)
    }
}

/// Grouped 1x1 projection acting as `M` independent linear layers.
pub struct PackedLinear {
    pub config: PackedConfig,
    pub first: bool,
    pub last: bool,
    inner: Conv2d,
}

impl PackedLinear {
    pub fn new(
        in_features: usize,
        out_features: usize,
        config: PackedConfig,
        first: bool,
        last: bool,
    ) -> Result<PackedLinear> {
        let (ext_in, ext_out) = config.extended(in_features, out_features, 1, first, last);
        PackedLinear::build(ext_in, ext_out, config, first, last)
    }

    /// Takes an input that is already packed (`ext_in` wide), as produced by
    /// the previous packed layer.
    pub fn from_packed_input(ext_in: usize, out_features: usize, config: PackedConfig, last: bool) -> Result<PackedLinear> {
        let (_, ext_out) = config.extended(ext_in, out_features, 1, false, last);
        PackedLinear::build(ext_in, ext_out, config, false, last)
    }

    fn build(ext_in: usize, ext_out: usize, config: PackedConfig, first: bool, last: bool) -> Result<PackedLinear> {
        let (groups, ext_out) = config.grouping(ext_in, ext_out, 1, first, last);
        let inner = Conv2d::new(ext_in, ext_out, ConvSpec::new(1, 1, 0).groups(groups))?;
        Ok(PackedLinear { config, first, last, inner })
    }

    pub fn in_features(&self) -> usize {
        self.inner.in_channels
    }

    pub fn out_features(&self) -> usize {
        self.inner.out_channels
    }
}

impl Module for PackedLinear {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(2)?;
        let b = x.batch();
        let as_image = x.reshape(&[b, x.shape[1], 1, 1])?;
        let y = self.inner.forward(&as_image)?;
        y.into_reshape(&[b, self.inner.out_channels])
    }

    fn name(&self) -> String {
        format!(
            "PackedLinear({}, {}, groups={})",
            self.inner.in_channels, self.inner.out_channels, self.inner.spec.groups
        )
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.inner]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.inner]
    }

    fn init_weights(&mut self, init: WeightInit) {
        if let WeightInit::KaimingFanOut { linear_std } = init {
            self.inner.weight = Tensor::randn(&self.inner.weight.shape, 0.0, linear_std);
            if let Some(b) = self.inner.bias.as_mut() {
                *b = Tensor::zeros(&b.shape);
            }
        }
    }
}

/// Grouped convolution acting as `M` independent convolutions.
pub struct PackedConv2d {
    pub config: PackedConfig,
    pub first: bool,
    pub last: bool,
    inner: Conv2d,
}

impl PackedConv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        spec: ConvSpec,
        config: PackedConfig,
        first: bool,
        last: bool,
    ) -> Result<PackedConv2d> {
        let (ext_in, ext_out) = config.extended(in_channels, out_channels, spec.groups, first, last);
        PackedConv2d::build(ext_in, ext_out, spec, config, first, last)
    }

    /// Takes an input that is already packed (`ext_in` wide).
    pub fn from_packed_input(ext_in: usize, out_channels: usize, spec: ConvSpec, config: PackedConfig) -> Result<PackedConv2d> {
        let (_, ext_out) = config.extended(ext_in, out_channels, spec.groups, false, false);
        PackedConv2d::build(ext_in, ext_out, spec, config, false, false)
    }

    fn build(
        ext_in: usize,
        ext_out: usize,
        spec: ConvSpec,
        config: PackedConfig,
        first: bool,
        last: bool,
    ) -> Result<PackedConv2d> {
        let (groups, ext_out) = config.grouping(ext_in, ext_out, spec.groups, first, last);
        let inner = Conv2d::new(ext_in, ext_out, spec.groups(groups))?;
        Ok(PackedConv2d { config, first, last, inner })
    }

    pub fn in_channels(&self) -> usize {
        self.inner.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.inner.out_channels
    }
}

impl Module for PackedConv2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.inner.forward(x)
    }

    fn name(&self) -> String {
        format!("Packed{}", self.inner.name())
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.inner]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.inner]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(PackedConfig::new(0.0, 2, 1).is_err());
        assert!(PackedConfig::new(2.0, 0, 1).is_err());
        assert!(PackedConfig::new(2.0, 2, 0).is_err());
    }

    #[test]
    fn first_and_last_layers_shape_the_ensemble() {
        let cfg = PackedConfig::new(2.0, 4, 1).unwrap();
        let mut first = PackedLinear::new(3, 8, cfg, true, false).unwrap();
        let mut last = PackedLinear::new(8, 10, cfg, false, true).unwrap();
        assert_eq!(first.in_features(), 3);
        assert_eq!(first.out_features(), 16);
        assert_eq!(last.in_features(), 16);
        assert_eq!(last.out_features(), 40);
        let h = first.forward(&Tensor::ones(&[5, 3])).unwrap();
        let y = last.forward(&h).unwrap();
        assert_eq!(y.shape, vec![5, 40]);
    }

    #[test]
    fn narrow_groups_lower_gamma() {
        let cfg = PackedConfig::new(1.0, 2, 4).unwrap();
        let conv = PackedConv2d::new(16, 16, ConvSpec::new(3, 1, 1), cfg, false, false).unwrap();
        // 16 channels cannot host 8 groups of at least 64 channels.
        assert_eq!(conv.inner.spec.groups, 2);
    }

    #[test]
    fn awkward_output_width_is_rounded_up_not_regrouped() {
        let cfg = PackedConfig::new(2.0, 2, 2).unwrap();
        let mut conv = PackedConv2d::new(128, 129, ConvSpec::new(1, 1, 0), cfg, false, false).unwrap();
        assert_eq!(conv.in_channels(), 256);
        assert_eq!(conv.inner.spec.groups, 4);
        assert_eq!(conv.out_channels(), 260);
        let y = conv.forward(&Tensor::ones(&[1, 256, 2, 2])).unwrap();
        assert_eq!(y.shape, vec![1, 260, 2, 2]);
    }
}
