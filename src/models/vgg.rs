use crate::error::{Error, Result};
use crate::layers::{
    AdaptiveAvgPool2d, BatchNorm2d, ConvSpec, Dropout, Identity, MaxPool2d, Module, ReLU, Sequential, WeightInit,
};
use crate::math::tensor::Tensor;
use crate::models::variant::{Position, Style, Variant};
use crate::models::UncertaintyModel;

/// `None` marks a 2x2 max-pooling step.
const CFG_11: &[Option<usize>] = &[
    Some(64), None, Some(128), None, Some(256), Some(256), None, Some(512), Some(512), None, Some(512), Some(512), None,
];
const CFG_13: &[Option<usize>] = &[
    Some(64), Some(64), None, Some(128), Some(128), None, Some(256), Some(256), None, Some(512), Some(512), None,
    Some(512), Some(512), None,
];
const CFG_16: &[Option<usize>] = &[
    Some(64), Some(64), None, Some(128), Some(128), None, Some(256), Some(256), Some(256), None, Some(512), Some(512),
    Some(512), None, Some(512), Some(512), Some(512), None,
];
const CFG_19: &[Option<usize>] = &[
    Some(64), Some(64), None, Some(128), Some(128), None, Some(256), Some(256), Some(256), Some(256), None, Some(512),
    Some(512), Some(512), Some(512), None, Some(512), Some(512), Some(512), Some(512), None,
];

fn layer_config(arch: usize) -> Result<&'static [Option<usize>]> {
    match arch {
        11 => Ok(CFG_11),
        13 => Ok(CFG_13),
        16 => Ok(CFG_16),
        19 => Ok(CFG_19),
        other => Err(Error::invalid(format!(
            "unknown VGG depth {other}, expected one of 11, 13, 16, 19"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VggConfig {
    pub arch: usize,
    pub in_channels: usize,
    pub num_classes: usize,
    pub style: Style,
    pub groups: usize,
    pub dropout_rate: f64,
    pub batch_norm: bool,
    pub variant: Variant,
}

impl VggConfig {
    pub fn new(arch: usize, in_channels: usize, num_classes: usize) -> VggConfig {
        VggConfig {
            arch,
            in_channels,
            num_classes,
            style: Style::Imagenet,
            groups: 1,
            dropout_rate: 0.5,
            batch_norm: false,
            variant: Variant::Standard,
        }
    }

    pub fn style(mut self, style: Style) -> VggConfig {
        self.style = style;
        self
    }

    pub fn groups(mut self, groups: usize) -> VggConfig {
        self.groups = groups;
        self
    }

    pub fn dropout_rate(mut self, rate: f64) -> VggConfig {
        self.dropout_rate = rate;
        self
    }

    pub fn batch_norm(mut self, enabled: bool) -> VggConfig {
        self.batch_norm = enabled;
        self
    }

    pub fn variant(mut self, variant: Variant) -> VggConfig {
        self.variant = variant;
        self
    }
}

pub struct Vgg {
    pub config: VggConfig,
    features: Sequential,
    pool: AdaptiveAvgPool2d,
    head: Sequential,
    training: bool,
}

impl Vgg {
    pub fn new(config: VggConfig) -> Result<Vgg> {
        config.variant.validate()?;
        if matches!(config.variant, Variant::Masked { .. } | Variant::Batched { .. } | Variant::Mimo { .. }) {
            return Err(Error::invalid(format!(
                "VGG supports std, packed and mc-dropout versions, not {}",
                config.variant.label()
            )));
        }
        let variant = config.variant;
        let mut features = Sequential::new();
        let mut width = config.in_channels;
        for (i, step) in layer_config(config.arch)?.iter().enumerate() {
            match step {
                None => features.push(MaxPool2d::new(2, 2, 0)),
                Some(out) => {
                    let position = if i == 0 { Position::First } else { Position::Hidden };
                    let spec = ConvSpec::new(3, 1, 1).groups(config.groups);
                    let (conv, w) = variant.conv(width, *out, spec, position)?;
                    features.push_boxed(conv);
                    if config.batch_norm {
                        features.push(BatchNorm2d::new(w));
                    } else {
                        features.push(Identity);
                    }
                    features.push(ReLU);
                    width = w;
                }
            }
        }

        let (pool_side, surface) = match config.style {
            Style::Imagenet => (7, 49),
            Style::Cifar => (1, 1),
        };
        let mut head = Sequential::new();
        let (fc1, w1) = variant.linear(width * surface, 4096, Position::Hidden)?;
        let (fc2, w2) = variant.linear(w1, 4096, Position::Hidden)?;
        let (fc3, _) = variant.linear(w2, config.num_classes, Position::Last)?;
        let mut drop1 = Dropout::new(config.dropout_rate)?;
        let mut drop2 = Dropout::new(config.dropout_rate)?;
        if let Variant::McDropout { last_layer_dropout, .. } = variant {
            drop1.set_mc_dropout(!last_layer_dropout);
            drop2.set_mc_dropout(true);
        }
        head.push_boxed(fc1);
        head.push(ReLU);
        head.push(drop1);
        head.push_boxed(fc2);
        head.push(ReLU);
        head.push(drop2);
        head.push_boxed(fc3);

        let mut vgg = Vgg {
            config,
            features,
            pool: AdaptiveAvgPool2d::new(pool_side, pool_side),
            head,
            training: true,
        };
        vgg.init_weights(WeightInit::KaimingFanOut { linear_std: 0.01 });
        tracing::debug!(arch = config.arch, variant = variant.label(), "built VGG");
        Ok(vgg)
    }
}

impl Module for Vgg {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let variant = self.config.variant;
        let out = variant.prepare_input(x, self.training)?;
        let out = self.features.forward(&out)?;
        let out = self.pool.forward(&out)?.flatten();
        variant.finish_output(self.head.forward(&out)?)
    }

    fn name(&self) -> String {
        format!("{}-VGG{}", self.config.variant.label(), self.config.arch)
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.features, &self.pool, &self.head]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.features, &mut self.pool, &mut self.head]
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
        for child in self.children_mut() {
            child.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

impl UncertaintyModel for Vgg {
    fn variant(&self) -> Variant {
        self.config.variant
    }

    fn summary(&self) -> String {
        crate::layers::summary(self)
    }
}

pub fn vgg11(in_channels: usize, num_classes: usize, style: Style) -> Result<Vgg> {
    Vgg::new(VggConfig::new(11, in_channels, num_classes).style(style))
}

pub fn vgg13(in_channels: usize, num_classes: usize, style: Style) -> Result<Vgg> {
    Vgg::new(VggConfig::new(13, in_channels, num_classes).style(style))
}

pub fn vgg16(in_channels: usize, num_classes: usize, style: Style) -> Result<Vgg> {
    Vgg::new(VggConfig::new(16, in_channels, num_classes).style(style))
}

pub fn vgg19(in_channels: usize, num_classes: usize, style: Style) -> Result<Vgg> {
    Vgg::new(VggConfig::new(19, in_channels, num_classes).style(style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::PackedConfig;

    #[test]
    fn vgg11_cifar_parameter_count() {
        let net = vgg11(3, 10, Style::Cifar).unwrap();
        // 9,220,480 conv + 512*4096+4096 + 4096*4096+4096 + 4096*10+10
        assert_eq!(net.num_parameters(), 9_220_480 + 2_101_248 + 16_781_312 + 40_970);
    }

    #[test]
    fn mc_dropout_repeats_input_in_eval() {
        let cfg = VggConfig::new(11, 3, 10)
            .style(Style::Cifar)
            .variant(Variant::McDropout { num_estimators: 4, last_layer_dropout: false });
        let mut net = Vgg::new(cfg).unwrap();
        net.train(false);
        let y = net.forward(&Tensor::rand(&[1, 3, 32, 32], 0.0, 1.0)).unwrap();
        assert_eq!(y.shape, vec![4, 10]);
        assert_eq!(net.num_estimators(), 4);
    }

    #[test]
    fn packed_vgg_outputs_every_estimator() {
        let cfg = VggConfig::new(11, 3, 10)
            .style(Style::Cifar)
            .variant(Variant::Packed(PackedConfig::new(1.0, 2, 1).unwrap()));
        let mut net = Vgg::new(cfg).unwrap();
        let y = net.forward(&Tensor::rand(&[2, 3, 32, 32], 0.0, 1.0)).unwrap();
        assert_eq!(y.shape, vec![4, 10]);
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        assert!(Vgg::new(VggConfig::new(12, 3, 10)).is_err());
        let cfg = VggConfig::new(11, 3, 10).variant(Variant::Batched { num_estimators: 2 });
        assert!(Vgg::new(cfg).is_err());
    }
}
