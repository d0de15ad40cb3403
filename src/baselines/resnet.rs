use crate::baselines::{Baseline, BaselineArgs};
use crate::error::Result;
use crate::loss::LossType;
use crate::models::{ResNet, ResNetArch, ResNetConfig};
use crate::procedures::Procedure;

pub type ResNetBaseline = Baseline<ResNet>;

impl Baseline<ResNet> {
    /// ResNet-`arch` classifier in the version selected by `args`.
    pub fn new(
        num_classes: usize,
        in_channels: usize,
        loss: LossType,
        procedure: Procedure,
        arch: usize,
        args: &BaselineArgs,
    ) -> Result<ResNetBaseline> {
        let config = ResNetConfig::new(ResNetArch::from_depth(arch)?, in_channels, num_classes, args.style)
            .groups(args.groups)
            .dropout_rate(args.dropout_rate.unwrap_or(0.0))
            .variant(args.variant()?);
        Baseline::assemble(ResNet::new(config)?, num_classes, loss, procedure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Module;
    use crate::math::tensor::Tensor;
    use crate::procedures::get_procedure;

    fn mc_dropout_args() -> BaselineArgs {
        BaselineArgs { dropout_rate: Some(0.1), ..BaselineArgs::with_version("mc-dropout", 4) }
    }

    #[test]
    fn mc_dropout_resnet18_exposes_criterion_and_procedure() {
        let procedure = get_procedure("resnet18", "cifar10", "mc-dropout", None).unwrap();
        let net = ResNetBaseline::new(10, 3, LossType::CrossEntropy, procedure, 18, &mc_dropout_args()).unwrap();
        assert_eq!(net.criterion().unwrap().name(), "cross_entropy");
        assert_eq!(net.configure_optimizers().unwrap().name, "cifar10_resnet18");
        assert_eq!(net.num_estimators(), 4);
        assert!(net.summary().contains("ResNet"));
    }

    #[test]
    #[ignore = "full-size forward pass is slow without optimizations"]
    fn mc_dropout_resnet18_forward() {
        let procedure = get_procedure("resnet18", "cifar10", "mc-dropout", None).unwrap();
        let mut net = ResNetBaseline::new(10, 3, LossType::CrossEntropy, procedure, 18, &mc_dropout_args()).unwrap();
        net.train(false);
        let y = net.forward(&Tensor::rand(&[1, 3, 32, 32], 0.0, 1.0)).unwrap();
        assert_eq!(y.shape, vec![4, 10]);
    }

    #[test]
    fn unknown_version_and_depth_are_rejected() {
        let procedure = get_procedure("resnet18", "cifar10", "standard", None).unwrap();
        let bad = BaselineArgs { version: "ensemble".into(), ..BaselineArgs::default() };
        assert!(ResNetBaseline::new(10, 3, LossType::CrossEntropy, procedure, 18, &bad).is_err());
        assert!(ResNetBaseline::new(10, 3, LossType::CrossEntropy, procedure, 20, &BaselineArgs::default()).is_err());
    }
}
