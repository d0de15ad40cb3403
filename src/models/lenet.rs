use crate::error::Result;
use crate::layers::{
    AdaptiveAvgPool2d, BayesConfig, BayesConv2d, BayesLinear, Conv2d, ConvSpec, Dropout, Linear, MaxPool2d, Module,
};
use crate::math::tensor::Tensor;
use crate::models::resnet::relu;
use crate::models::variant::Variant;
use crate::models::UncertaintyModel;

/// LeNet-5 style network; the Bayesian flavour swaps every layer for its
/// variational counterpart.
pub struct LeNet {
    pub in_channels: usize,
    pub num_classes: usize,
    pub bayesian: bool,
    conv1: Box<dyn Module>,
    conv2: Box<dyn Module>,
    max_pool: MaxPool2d,
    pool: AdaptiveAvgPool2d,
    fc1: Box<dyn Module>,
    fc2: Box<dyn Module>,
    fc3: Box<dyn Module>,
    dropout: Dropout,
}

impl LeNet {
    pub fn new(in_channels: usize, num_classes: usize, dropout_rate: f64) -> Result<LeNet> {
        let spec = ConvSpec::new(5, 1, 0);
        Ok(LeNet {
            in_channels,
            num_classes,
            bayesian: false,
            conv1: Box::new(Conv2d::new(in_channels, 6, spec)?),
            conv2: Box::new(Conv2d::new(6, 16, spec)?),
            max_pool: MaxPool2d::new(2, 2, 0),
            pool: AdaptiveAvgPool2d::new(4, 4),
            fc1: Box::new(Linear::new(256, 120, true)?),
            fc2: Box::new(Linear::new(120, 84, true)?),
            fc3: Box::new(Linear::new(84, num_classes, true)?),
            dropout: Dropout::new(dropout_rate)?,
        })
    }

    pub fn bayesian(in_channels: usize, num_classes: usize, config: BayesConfig) -> Result<LeNet> {
        let spec = ConvSpec::new(5, 1, 0);
        Ok(LeNet {
            in_channels,
            num_classes,
            bayesian: true,
            conv1: Box::new(BayesConv2d::new(in_channels, 6, spec, config)?),
            conv2: Box::new(BayesConv2d::new(6, 16, spec, config)?),
            max_pool: MaxPool2d::new(2, 2, 0),
            pool: AdaptiveAvgPool2d::new(4, 4),
            fc1: Box::new(BayesLinear::with_config(256, 120, true, config)?),
            fc2: Box::new(BayesLinear::with_config(120, 84, true, config)?),
            fc3: Box::new(BayesLinear::with_config(84, num_classes, true, config)?),
            dropout: Dropout::new(0.0)?,
        })
    }
}

impl Module for LeNet {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let out = relu(&self.conv1.forward(x)?);
        let out = self.max_pool.forward(&out)?;
        let out = relu(&self.conv2.forward(&out)?);
        let out = self.max_pool.forward(&out)?;
        let out = self.pool.forward(&out)?.flatten();
        let out = self.dropout.forward(&relu(&self.fc1.forward(&out)?))?;
        let out = self.dropout.forward(&relu(&self.fc2.forward(&out)?))?;
        self.fc3.forward(&out)
    }

    fn name(&self) -> String {
        if self.bayesian { "BayesianLeNet".into() } else { "LeNet".into() }
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![
            self.conv1.as_ref(),
            &self.max_pool,
            self.conv2.as_ref(),
            &self.pool,
            self.fc1.as_ref(),
            &self.dropout,
            self.fc2.as_ref(),
            self.fc3.as_ref(),
        ]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![
            self.conv1.as_mut(),
            &mut self.max_pool,
            self.conv2.as_mut(),
            &mut self.pool,
            self.fc1.as_mut(),
            &mut self.dropout,
            self.fc2.as_mut(),
            self.fc3.as_mut(),
        ]
    }
}

impl UncertaintyModel for LeNet {
    fn variant(&self) -> Variant {
        Variant::Standard
    }

    fn summary(&self) -> String {
        crate::layers::summary(self)
    }
}

pub fn lenet(in_channels: usize, num_classes: usize) -> Result<LeNet> {
    LeNet::new(in_channels, num_classes, 0.0)
}

pub fn bayesian_lenet(in_channels: usize, num_classes: usize) -> Result<LeNet> {
    LeNet::bayesian(in_channels, num_classes, BayesConfig::default())
}
