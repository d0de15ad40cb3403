use crate::error::{Error, Result};
use crate::layers::{AdaptiveAvgPool2d, BatchNorm2d, ConvSpec, Dropout, MaxPool2d, Module};
use crate::math::tensor::Tensor;
use crate::models::variant::{Position, Style, Variant};
use crate::models::UncertaintyModel;

/// Depth of a residual network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetArch {
    R18,
    R34,
    R50,
    R101,
    R152,
}

impl ResNetArch {
    pub fn from_depth(depth: usize) -> Result<ResNetArch> {
        match depth {
            18 => Ok(ResNetArch::R18),
            34 => Ok(ResNetArch::R34),
            50 => Ok(ResNetArch::R50),
            101 => Ok(ResNetArch::R101),
            152 => Ok(ResNetArch::R152),
            other => Err(Error::invalid(format!(
                "unknown ResNet depth {other}, expected one of 18, 34, 50, 101, 152"
            ))),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            ResNetArch::R18 => 18,
            ResNetArch::R34 => 34,
            ResNetArch::R50 => 50,
            ResNetArch::R101 => 101,
            ResNetArch::R152 => 152,
        }
    }

    fn blocks(&self) -> [usize; 4] {
        match self {
            ResNetArch::R18 => [2, 2, 2, 2],
            ResNetArch::R34 | ResNetArch::R50 => [3, 4, 6, 3],
            ResNetArch::R101 => [3, 4, 23, 3],
            ResNetArch::R152 => [3, 8, 36, 3],
        }
    }

    fn bottleneck(&self) -> bool {
        matches!(self, ResNetArch::R50 | ResNetArch::R101 | ResNetArch::R152)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResNetConfig {
    pub arch: ResNetArch,
    pub in_channels: usize,
    pub num_classes: usize,
    pub style: Style,
    pub groups: usize,
    /// Dropout before the classification head.
    pub dropout_rate: f64,
    pub variant: Variant,
}

impl ResNetConfig {
    pub fn new(arch: ResNetArch, in_channels: usize, num_classes: usize, style: Style) -> ResNetConfig {
        ResNetConfig {
            arch,
            in_channels,
            num_classes,
            style,
            groups: 1,
            dropout_rate: 0.0,
            variant: Variant::Standard,
        }
    }

    pub fn groups(mut self, groups: usize) -> ResNetConfig {
        self.groups = groups;
        self
    }

    pub fn dropout_rate(mut self, rate: f64) -> ResNetConfig {
        self.dropout_rate = rate;
        self
    }

    pub fn variant(mut self, variant: Variant) -> ResNetConfig {
        self.variant = variant;
        self
    }
}

type ConvBn = (Box<dyn Module>, BatchNorm2d);

/// Basic (two 3x3) or bottleneck (1x1, 3x3, 1x1) residual block.
struct ResidualBlock {
    convs: Vec<ConvBn>,
    shortcut: Option<ConvBn>,
    bottleneck: bool,
}

impl ResidualBlock {
    /// `in_width` is the real incoming channel count; returns the block and its
    /// real output width.
    fn new(
        variant: &Variant,
        in_width: usize,
        planes: usize,
        stride: usize,
        groups: usize,
        bottleneck: bool,
        needs_projection: bool,
    ) -> Result<(ResidualBlock, usize)> {
        let layout: Vec<(usize, ConvSpec)> = if bottleneck {
            vec![
                (planes, ConvSpec::new(1, 1, 0)),
                (planes, ConvSpec::new(3, stride, 1)),
                (planes * 4, ConvSpec::new(1, 1, 0)),
            ]
        } else {
            vec![(planes, ConvSpec::new(3, stride, 1)), (planes, ConvSpec::new(3, 1, 1))]
        };

        let mut convs = Vec::with_capacity(layout.len());
        let mut width = in_width;
        for (out, spec) in layout {
            let (conv, w) = variant.conv(width, out, spec.groups(groups).bias(false), Position::Hidden)?;
            convs.push((conv, variant.norm(w)));
            width = w;
        }

        let shortcut = if needs_projection {
            let spec = ConvSpec::new(1, stride, 0).groups(groups).bias(false);
            let (conv, w) = variant.conv(in_width, if bottleneck { planes * 4 } else { planes }, spec, Position::Hidden)?;
            Some((conv, variant.norm(w)))
        } else {
            None
        };
        Ok((ResidualBlock { convs, shortcut, bottleneck }, width))
    }
}

impl Module for ResidualBlock {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let last = self.convs.len() - 1;
        let mut out = x.clone();
        for (i, (conv, bn)) in self.convs.iter_mut().enumerate() {
            out = bn.forward(&conv.forward(&out)?)?;
            if i < last {
                out = relu(&out);
            }
        }
        let identity = match self.shortcut.as_mut() {
            Some((conv, bn)) => bn.forward(&conv.forward(x)?)?,
            None => x.clone(),
        };
        Ok(relu(&out.add(&identity)?))
    }

    fn name(&self) -> String {
        if self.bottleneck { "Bottleneck".into() } else { "BasicBlock".into() }
    }

    fn children(&self) -> Vec<&dyn Module> {
        let mut out: Vec<&dyn Module> = Vec::new();
        for (conv, bn) in self.convs.iter().chain(self.shortcut.iter()) {
            out.push(conv.as_ref());
            out.push(bn);
        }
        out
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        let mut out: Vec<&mut dyn Module> = Vec::new();
        for (conv, bn) in self.convs.iter_mut().chain(self.shortcut.iter_mut()) {
            out.push(conv.as_mut());
            out.push(bn);
        }
        out
    }
}

pub(crate) fn relu(x: &Tensor) -> Tensor {
    x.map(|v| v.max(0.0))
}

/// Residual network with a CIFAR or ImageNet stem.
pub struct ResNet {
    pub config: ResNetConfig,
    stem: ConvBn,
    max_pool: Option<MaxPool2d>,
    blocks: Vec<ResidualBlock>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    head: Box<dyn Module>,
    training: bool,
}

impl ResNet {
    pub fn new(config: ResNetConfig) -> Result<ResNet> {
        config.variant.validate()?;
        if config.groups == 0 {
            return Err(Error::invalid("groups must be at least 1"));
        }
        let variant = config.variant;
        let stem_spec = match config.style {
            Style::Imagenet => ConvSpec::new(7, 2, 3),
            Style::Cifar => ConvSpec::new(3, 1, 1),
        }
        .groups(config.groups)
        .bias(false);
        let (stem_conv, mut width) = variant.conv(config.in_channels, 64, stem_spec, Position::First)?;
        let stem = (stem_conv, variant.norm(width));
        let max_pool = (config.style == Style::Imagenet).then(|| MaxPool2d::new(3, 2, 1));

        let bottleneck = config.arch.bottleneck();
        let expansion = if bottleneck { 4 } else { 1 };
        let mut nominal = 64;
        let mut blocks = Vec::new();
        for (stage, (&count, planes)) in config.arch.blocks().iter().zip([64, 128, 256, 512]).enumerate() {
            for i in 0..count {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                let projection = stride != 1 || nominal != planes * expansion;
                let (block, w) =
                    ResidualBlock::new(&variant, width, planes, stride, config.groups, bottleneck, projection)?;
                blocks.push(block);
                width = w;
                nominal = planes * expansion;
            }
        }

        let (head, _) = variant.linear(width, config.num_classes, Position::Last)?;
        let mut dropout = Dropout::new(config.dropout_rate)?;
        if matches!(variant, Variant::McDropout { .. }) {
            dropout.set_mc_dropout(true);
        }
        tracing::debug!(arch = config.arch.depth(), variant = variant.label(), "built ResNet");
        Ok(ResNet {
            config,
            stem,
            max_pool,
            blocks,
            pool: AdaptiveAvgPool2d::new(1, 1),
            dropout,
            head,
            training: true,
        })
    }
}

impl Module for ResNet {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let variant = self.config.variant;
        let mut out = variant.prepare_input(x, self.training)?;
        out = relu(&self.stem.1.forward(&self.stem.0.forward(&out)?)?);
        if let Some(pool) = self.max_pool.as_mut() {
            out = pool.forward(&out)?;
        }
        for block in self.blocks.iter_mut() {
            out = block.forward(&out)?;
        }
        out = self.pool.forward(&out)?.flatten();
        out = self.dropout.forward(&out)?;
        variant.finish_output(self.head.forward(&out)?)
    }

    fn name(&self) -> String {
        format!("{}-ResNet{}", self.config.variant.label(), self.config.arch.depth())
    }

    fn children(&self) -> Vec<&dyn Module> {
        let mut out: Vec<&dyn Module> = vec![self.stem.0.as_ref(), &self.stem.1];
        if let Some(pool) = self.max_pool.as_ref() {
            out.push(pool);
        }
        out.extend(self.blocks.iter().map(|b| b as &dyn Module));
        out.push(&self.pool);
        out.push(&self.dropout);
        out.push(self.head.as_ref());
        out
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        let mut out: Vec<&mut dyn Module> = vec![self.stem.0.as_mut(), &mut self.stem.1];
        if let Some(pool) = self.max_pool.as_mut() {
            out.push(pool);
        }
        out.extend(self.blocks.iter_mut().map(|b| b as &mut dyn Module));
        out.push(&mut self.pool);
        out.push(&mut self.dropout);
        out.push(self.head.as_mut());
        out
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

impl UncertaintyModel for ResNet {
    fn variant(&self) -> Variant {
        self.config.variant
    }

    fn summary(&self) -> String {
        crate::layers::summary(self)
    }
}

pub fn resnet18(in_channels: usize, num_classes: usize, style: Style) -> Result<ResNet> {
    ResNet::new(ResNetConfig::new(ResNetArch::R18, in_channels, num_classes, style))
}

pub fn resnet34(in_channels: usize, num_classes: usize, style: Style) -> Result<ResNet> {
    ResNet::new(ResNetConfig::new(ResNetArch::R34, in_channels, num_classes, style))
}

pub fn resnet50(in_channels: usize, num_classes: usize, style: Style) -> Result<ResNet> {
    ResNet::new(ResNetConfig::new(ResNetArch::R50, in_channels, num_classes, style))
}

pub fn resnet101(in_channels: usize, num_classes: usize, style: Style) -> Result<ResNet> {
    ResNet::new(ResNetConfig::new(ResNetArch::R101, in_channels, num_classes, style))
}

pub fn resnet152(in_channels: usize, num_classes: usize, style: Style) -> Result<ResNet> {
    ResNet::new(ResNetConfig::new(ResNetArch::R152, in_channels, num_classes, style))
}
