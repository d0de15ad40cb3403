use crate::baselines::{Baseline, BaselineArgs};
use crate::error::Result;
use crate::loss::LossType;
use crate::models::{Vgg, VggConfig};
use crate::procedures::Procedure;

pub type VggBaseline = Baseline<Vgg>;

impl Baseline<Vgg> {
    /// VGG-`arch` classifier; only `std`, `packed` and `mc-dropout` exist.
    pub fn new(
        num_classes: usize,
        in_channels: usize,
        loss: LossType,
        procedure: Procedure,
        arch: usize,
        args: &BaselineArgs,
    ) -> Result<VggBaseline> {
        let mut config = VggConfig::new(arch, in_channels, num_classes)
            .style(args.style)
            .groups(args.groups)
            .variant(args.variant()?);
        if let Some(rate) = args.dropout_rate {
            config = config.dropout_rate(rate);
        }
        Baseline::assemble(Vgg::new(config)?, num_classes, loss, procedure)
    }
}
