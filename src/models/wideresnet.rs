use crate::error::{Error, Result};
use crate::layers::{AdaptiveAvgPool2d, BatchNorm2d, ConvSpec, Dropout, MaxPool2d, Module, PackedConfig};
use crate::math::tensor::Tensor;
use crate::models::resnet::relu;
use crate::models::variant::{Position, Style, Variant};
use crate::models::UncertaintyModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WideResNetConfig {
    pub depth: usize,
    pub widen_factor: usize,
    pub in_channels: usize,
    pub num_classes: usize,
    pub style: Style,
    pub groups: usize,
    pub dropout_rate: f64,
    pub variant: Variant,
}

impl WideResNetConfig {
    /// WRN-28-10 with dropout 0.3.
    pub fn new(in_channels: usize, num_classes: usize, style: Style) -> WideResNetConfig {
        WideResNetConfig {
            depth: 28,
            widen_factor: 10,
            in_channels,
            num_classes,
            style,
            groups: 1,
            dropout_rate: 0.3,
            variant: Variant::Standard,
        }
    }

    pub fn depth(mut self, depth: usize, widen_factor: usize) -> WideResNetConfig {
        self.depth = depth;
        self.widen_factor = widen_factor;
        self
    }

    pub fn groups(mut self, groups: usize) -> WideResNetConfig {
        self.groups = groups;
        self
    }

    pub fn dropout_rate(mut self, rate: f64) -> WideResNetConfig {
        self.dropout_rate = rate;
        self
    }

    pub fn variant(mut self, variant: Variant) -> WideResNetConfig {
        self.variant = variant;
        self
    }
}

/// conv, dropout, bn, relu, conv (+ shortcut), bn, relu
struct WideBlock {
    conv1: Box<dyn Module>,
    dropout: Dropout,
    bn1: BatchNorm2d,
    conv2: Box<dyn Module>,
    shortcut: Option<Box<dyn Module>>,
    bn2: BatchNorm2d,
}

impl WideBlock {
    fn new(
        variant: &Variant,
        in_width: usize,
        in_planes: usize,
        planes: usize,
        stride: usize,
        config: &WideResNetConfig,
    ) -> Result<(WideBlock, usize)> {
        let g = config.groups;
        let (conv1, w1) = variant.conv(in_width, planes, ConvSpec::new(3, 1, 1).groups(g).bias(false), Position::Hidden)?;
        let (conv2, w2) = variant.conv(w1, planes, ConvSpec::new(3, stride, 1).groups(g).bias(false), Position::Hidden)?;
        let shortcut = if stride != 1 || in_planes != planes {
            let (conv, _) = variant.conv(in_width, planes, ConvSpec::new(1, stride, 0).groups(g), Position::Hidden)?;
            Some(conv)
        } else {
            None
        };
        let mut dropout = Dropout::new(config.dropout_rate)?;
        if matches!(variant, Variant::McDropout { .. }) {
            dropout.set_mc_dropout(true);
        }
        let block = WideBlock {
            conv1,
            dropout,
            bn1: variant.norm(w1),
            conv2,
            shortcut,
            bn2: variant.norm(w2),
        };
        Ok((block, w2))
    }
}

impl Module for WideBlock {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let out = self.dropout.forward(&self.conv1.forward(x)?)?;
        let out = relu(&self.bn1.forward(&out)?);
        let out = self.conv2.forward(&out)?;
        let identity = match self.shortcut.as_mut() {
            Some(conv) => conv.forward(x)?,
            None => x.clone(),
        };
        Ok(relu(&self.bn2.forward(&out.add(&identity)?)?))
    }

    fn name(&self) -> String {
        "WideBasicBlock".into()
    }

    fn children(&self) -> Vec<&dyn Module> {
        let mut out: Vec<&dyn Module> = vec![self.conv1.as_ref(), &self.dropout, &self.bn1, self.conv2.as_ref()];
        if let Some(s) = self.shortcut.as_ref() {
            out.push(s.as_ref());
        }
        out.push(&self.bn2);
        out
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        let mut out: Vec<&mut dyn Module> =
            vec![self.conv1.as_mut(), &mut self.dropout, &mut self.bn1, self.conv2.as_mut()];
        if let Some(s) = self.shortcut.as_mut() {
            out.push(s.as_mut());
        }
        out.push(&mut self.bn2);
        out
    }
}

pub struct WideResNet {
    pub config: WideResNetConfig,
    stem: Box<dyn Module>,
    stem_bn: BatchNorm2d,
    max_pool: Option<MaxPool2d>,
    blocks: Vec<WideBlock>,
    pool: AdaptiveAvgPool2d,
    head: Box<dyn Module>,
    training: bool,
}

impl WideResNet {
    pub fn new(config: WideResNetConfig) -> Result<WideResNet> {
        config.variant.validate()?;
        if config.depth < 10 || (config.depth - 4) % 6 != 0 {
            return Err(Error::invalid(format!(
                "Wide-resnet depth should be 6n+4, got {}",
                config.depth
            )));
        }
        if config.widen_factor == 0 || config.groups == 0 {
            return Err(Error::invalid("widen_factor and groups must be at least 1"));
        }
        let variant = config.variant;
        let per_stage = (config.depth - 4) / 6;
        let k = config.widen_factor;
        let stages = [16, 16 * k, 32 * k, 64 * k];

        let stem_spec = match config.style {
            Style::Imagenet => ConvSpec::new(7, 2, 3),
            Style::Cifar => ConvSpec::new(3, 1, 1),
        }
        .groups(config.groups)
        .bias(false);
        let (stem, mut width) = variant.conv(config.in_channels, stages[0], stem_spec, Position::First)?;
        let stem_bn = variant.norm(width);
        let max_pool = (config.style == Style::Imagenet).then(|| MaxPool2d::new(3, 2, 1));

        let mut blocks = Vec::with_capacity(3 * per_stage);
        let mut in_planes = stages[0];
        for (stage, planes) in stages[1..].iter().copied().enumerate() {
            for i in 0..per_stage {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                let (block, w) = WideBlock::new(&variant, width, in_planes, planes, stride, &config)?;
                blocks.push(block);
                width = w;
                in_planes = planes;
            }
        }
        let (head, _) = variant.linear(width, config.num_classes, Position::Last)?;
        tracing::debug!(depth = config.depth, widen = k, variant = variant.label(), "built WideResNet");
        Ok(WideResNet {
            config,
            stem,
            stem_bn,
            max_pool,
            blocks,
            pool: AdaptiveAvgPool2d::new(1, 1),
            head,
            training: true,
        })
    }
}

impl Module for WideResNet {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let variant = self.config.variant;
        let out = variant.prepare_input(x, self.training)?;
        let mut out = relu(&self.stem_bn.forward(&self.stem.forward(&out)?)?);
        if let Some(pool) = self.max_pool.as_mut() {
            out = pool.forward(&out)?;
        }
        for block in self.blocks.iter_mut() {
            out = block.forward(&out)?;
        }
        let out = self.pool.forward(&out)?.flatten();
        variant.finish_output(self.head.forward(&out)?)
    }

    fn name(&self) -> String {
        format!(
            "{}-WideResNet{}x{}",
            self.config.variant.label(),
            self.config.depth,
            self.config.widen_factor
        )
    }

    fn children(&self) -> Vec<&dyn Module> {
        let mut out: Vec<&dyn Module> = vec![self.stem.as_ref(), &self.stem_bn];
        if let Some(pool) = self.max_pool.as_ref() {
            out.push(pool);
        }
        out.extend(self.blocks.iter().map(|b| b as &dyn Module));
        out.push(&self.pool);
        out.push(self.head.as_ref());
        out
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        let mut out: Vec<&mut dyn Module> = vec![self.stem.as_mut(), &mut self.stem_bn];
        if let Some(pool) = self.max_pool.as_mut() {
            out.push(pool);
        }
        out.extend(self.blocks.iter_mut().map(|b| b as &mut dyn Module));
        out.push(&mut self.pool);
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

impl UncertaintyModel for WideResNet {
    fn variant(&self) -> Variant {
        self.config.variant
    }

    fn summary(&self) -> String {
        crate::layers::summary(self)
    }
}

pub fn wideresnet28x10(in_channels: usize, num_classes: usize, groups: usize, style: Style) -> Result<WideResNet> {
    WideResNet::new(WideResNetConfig::new(in_channels, num_classes, style).groups(groups))
}

pub fn packed_wideresnet28x10(
    in_channels: usize,
    num_estimators: usize,
    alpha: f64,
    gamma: usize,
    groups: usize,
    num_classes: usize,
    style: Style,
) -> Result<WideResNet> {
    let packed = PackedConfig::new(alpha, num_estimators, gamma)?;
    WideResNet::new(
        WideResNetConfig::new(in_channels, num_classes, style)
            .groups(groups)
            .variant(Variant::Packed(packed)),
    )
}

pub fn masked_wideresnet28x10(
    in_channels: usize,
    num_estimators: usize,
    scale: f64,
    groups: usize,
    num_classes: usize,
    style: Style,
) -> Result<WideResNet> {
    WideResNet::new(
        WideResNetConfig::new(in_channels, num_classes, style)
            .groups(groups)
            .variant(Variant::Masked { num_estimators, scale }),
    )
}

pub fn batched_wideresnet28x10(
    in_channels: usize,
    num_estimators: usize,
    groups: usize,
    num_classes: usize,
    style: Style,
) -> Result<WideResNet> {
    WideResNet::new(
        WideResNetConfig::new(in_channels, num_classes, style)
            .groups(groups)
            .variant(Variant::Batched { num_estimators }),
    )
}

pub fn mimo_wideresnet28x10(
    in_channels: usize,
    num_classes: usize,
    num_estimators: usize,
    style: Style,
) -> Result<WideResNet> {
    WideResNet::new(
        WideResNetConfig::new(in_channels, num_classes, style).variant(Variant::Mimo { num_estimators }),
    )
}
