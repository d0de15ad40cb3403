use crate::baselines::{Baseline, BaselineArgs};
use crate::error::Result;
use crate::loss::LossType;
use crate::models::{WideResNet, WideResNetConfig};
use crate::procedures::Procedure;

pub type WideResNetBaseline = Baseline<WideResNet>;

impl Baseline<WideResNet> {
    /// WideResNet-28-10 in the version selected by `args`.
    pub fn new(
        num_classes: usize,
        in_channels: usize,
        loss: LossType,
        procedure: Procedure,
        args: &BaselineArgs,
    ) -> Result<WideResNetBaseline> {
        WideResNetBaseline::with_depth(num_classes, in_channels, loss, procedure, 28, 10, args)
    }

    pub fn with_depth(
        num_classes: usize,
        in_channels: usize,
        loss: LossType,
        procedure: Procedure,
        depth: usize,
        widen_factor: usize,
        args: &BaselineArgs,
    ) -> Result<WideResNetBaseline> {
        let mut config = WideResNetConfig::new(in_channels, num_classes, args.style)
            .depth(depth, widen_factor)
            .groups(args.groups)
            .variant(args.variant()?);
        if let Some(rate) = args.dropout_rate {
            config = config.dropout_rate(rate);
        }
        Baseline::assemble(WideResNet::new(config)?, num_classes, loss, procedure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Module;
    use crate::math::tensor::Tensor;
    use crate::procedures::get_procedure;

    #[test]
    fn mc_dropout_wide_baseline() {
        let procedure = get_procedure("wideresnet28x10", "cifar10", "mc-dropout", None).unwrap();
        let args = BaselineArgs::with_version("mc-dropout", 4);
        let mut net =
            WideResNetBaseline::with_depth(10, 3, LossType::CrossEntropy, procedure, 10, 1, &args).unwrap();
        assert_eq!(net.configure_optimizers().unwrap().name, "cifar10_wideresnet");
        assert!(net.criterion().is_ok());
        net.train(false);
        let y = net.forward(&Tensor::rand(&[1, 3, 32, 32], 0.0, 1.0)).unwrap();
        assert_eq!(y.shape, vec![4, 10]);
    }

    #[test]
    #[ignore = "allocates the full 36M-parameter network"]
    fn wideresnet28x10_baseline_builds() {
        let procedure = get_procedure("wideresnet28x10", "cifar10", "standard", None).unwrap();
        let net = WideResNetBaseline::new(10, 3, LossType::CrossEntropy, procedure, &BaselineArgs::default()).unwrap();
        assert_eq!(net.num_estimators(), 1);
    }

    #[test]
    fn bad_depth_is_rejected() {
        let procedure = get_procedure("wideresnet28x10", "cifar10", "standard", None).unwrap();
        let args = BaselineArgs::default();
        assert!(WideResNetBaseline::with_depth(10, 3, LossType::CrossEntropy, procedure, 12, 1, &args).is_err());
    }
}
