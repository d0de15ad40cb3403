use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::{
    BatchConv2d, BatchLinear, BatchNorm2d, Conv2d, ConvSpec, Linear, MaskedConv2d, MaskedLinear,
    Module, PackedConfig, PackedConv2d, PackedLinear,
};
use crate::math::tensor::Tensor;

/// Stem and pooling layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// 7x7 stride-2 stem followed by max-pooling.
    Imagenet,
    /// 3x3 stride-1 stem, no max-pooling.
    Cifar,
}

impl std::str::FromStr for Style {
    type Err = Error;

    fn from_str(s: &str) -> Result<Style> {
        match s {
            "imagenet" => Ok(Style::Imagenet),
            "cifar" => Ok(Style::Cifar),
            other => Err(Error::invalid(format!("unknown style {other:?}"))),
        }
    }
}

/// How a model spreads `num_estimators` ensemble members over its layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    Standard,
    Packed(PackedConfig),
    Masked { num_estimators: usize, scale: f64 },
    Batched { num_estimators: usize },
    Mimo { num_estimators: usize },
    McDropout { num_estimators: usize, last_layer_dropout: bool },
}

/// Where a layer sits: stem, body or classification head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Hidden,
    Last,
}

impl Variant {
    pub fn num_estimators(&self) -> usize {
        match *self {
            Variant::Standard => 1,
            Variant::Packed(cfg) => cfg.num_estimators,
            Variant::Masked { num_estimators, .. }
            | Variant::Batched { num_estimators }
            | Variant::Mimo { num_estimators }
            | Variant::McDropout { num_estimators, .. } => num_estimators,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_estimators() == 0 {
            return Err(Error::invalid("num_estimators must be at least 1"));
        }
        if let Variant::Masked { scale, .. } = *self {
            if scale < 1.0 {
                return Err(Error::invalid(format!("scale should be >= 1, not {scale}")));
            }
        }
        Ok(())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Variant::Standard => "std",
            Variant::Packed(_) => "packed",
            Variant::Masked { .. } => "masked",
            Variant::Batched { .. } => "batched",
            Variant::Mimo { .. } => "mimo",
            Variant::McDropout { .. } => "mc-dropout",
        }
    }

    /// Builds a convolution for this variant. `in_channels` is the real width
    /// of the incoming tensor (already packed for hidden layers); the real
    /// output width is returned alongside the layer.
    pub fn conv(
        &self,
        in_channels: usize,
        out_channels: usize,
        spec: ConvSpec,
        position: Position,
    ) -> Result<(Box<dyn Module>, usize)> {
        let first = position == Position::First;
        // Only the packed stem keeps the body's groups, to size its output.
        let spec = match self {
            Variant::Packed(_) => spec,
            _ if first => spec.groups(1),
            _ => spec,
        };
        Ok(match *self {
            Variant::Packed(cfg) => {
                let conv = if first {
                    PackedConv2d::new(in_channels, out_channels, spec, cfg, true, false)?
                } else {
                    PackedConv2d::from_packed_input(in_channels, out_channels, spec, cfg)?
                };
                let out = conv.out_channels();
                (Box::new(conv), out)
            }
            Variant::Masked { num_estimators, scale } if !first => (
                Box::new(MaskedConv2d::new(in_channels, out_channels, spec, num_estimators, scale)?),
                out_channels,
            ),
            Variant::Batched { num_estimators } => (
                Box::new(BatchConv2d::new(in_channels, out_channels, spec, num_estimators)?),
                out_channels,
            ),
            Variant::Mimo { num_estimators } if first => (
                Box::new(Conv2d::new(in_channels * num_estimators, out_channels, spec)?),
                out_channels,
            ),
            _ => (Box::new(Conv2d::new(in_channels, out_channels, spec)?), out_channels),
        })
    }

    /// Same contract as [`Variant::conv`] for fully-connected layers.
    pub fn linear(
        &self,
        in_features: usize,
        out_features: usize,
        position: Position,
    ) -> Result<(Box<dyn Module>, usize)> {
        let last = position == Position::Last;
        Ok(match *self {
            Variant::Packed(cfg) => {
                let layer = if position == Position::First {
                    PackedLinear::new(in_features, out_features, cfg, true, last)?
                } else {
                    PackedLinear::from_packed_input(in_features, out_features, cfg, last)?
                };
                let out = layer.out_features();
                (Box::new(layer), out)
            }
            Variant::Masked { num_estimators, scale } => (
                Box::new(MaskedLinear::new(in_features, out_features, num_estimators, scale)?),
                out_features,
            ),
            Variant::Batched { num_estimators } => (
                Box::new(BatchLinear::new(in_features, out_features, num_estimators)?),
                out_features,
            ),
            Variant::Mimo { num_estimators } if last => (
                Box::new(Linear::new(in_features, out_features * num_estimators, true)?),
                out_features * num_estimators,
            ),
            _ => (Box::new(Linear::new(in_features, out_features, true)?), out_features),
        })
    }

    pub fn norm(&self, channels: usize) -> BatchNorm2d {
        BatchNorm2d::new(channels)
    }

    /// Shapes the raw input batch before the stem.
    pub fn prepare_input(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        match *self {
            Variant::Masked { num_estimators, .. } | Variant::Batched { num_estimators } => {
                Ok(x.repeat_batch(num_estimators))
            }
            Variant::McDropout { num_estimators, .. } if !training => Ok(x.repeat_batch(num_estimators)),
            Variant::Mimo { num_estimators } => {
                if training {
                    x.batch_to_channels(num_estimators)
                } else {
                    Ok(x.repeat_channels(num_estimators))
                }
            }
            _ => Ok(x.clone()),
        }
    }

    /// Brings head output to the estimator-major `[(M * B), classes]` layout.
    pub fn finish_output(&self, logits: Tensor) -> Result<Tensor> {
        match *self {
            Variant::Packed(cfg) => logits.channels_to_batch(cfg.num_estimators),
            Variant::Mimo { num_estimators } => logits.channels_to_batch(num_estimators),
            _ => Ok(logits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mimo_input_layouts() {
        let v = Variant::Mimo { num_estimators: 2 };
        let x = Tensor::zeros(&[4, 3, 2, 2]);
        assert_eq!(v.prepare_input(&x, true).unwrap().shape, vec![2, 6, 2, 2]);
        assert_eq!(v.prepare_input(&x, false).unwrap().shape, vec![4, 6, 2, 2]);
        let odd = Tensor::zeros(&[3, 3, 2, 2]);
        assert!(v.prepare_input(&odd, true).is_err());
    }

    #[test]
    fn masked_scale_is_validated() {
        assert!(Variant::Masked { num_estimators: 2, scale: 0.5 }.validate().is_err());
        assert!(Variant::Batched { num_estimators: 0 }.validate().is_err());
    }
}
