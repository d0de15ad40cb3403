//! Ready-made models bundled with their loss and optimization procedure.
//!
//! A baseline is built from a `version` string (`std`/`vanilla`, `packed`,
//! `batched`, `masked`, `mimo`, `mc-dropout`) and the hyperparameters that
//! version needs.

pub mod mlp;
pub mod resnet;
pub mod vgg;
pub mod wideresnet;

pub use mlp::MlpBaseline;
pub use resnet::ResNetBaseline;
pub use vgg::VggBaseline;
pub use wideresnet::WideResNetBaseline;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::layers::{Module, PackedConfig};
use crate::loss::{BceWithLogitsLoss, Criterion, CrossEntropyLoss, LossType, MseLoss, Reduction};
use crate::math::tensor::Tensor;
use crate::models::{Style, UncertaintyModel, Variant};
use crate::procedures::{OptimizationProcedure, Procedure};
use crate::routines::ClassificationRoutine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Standard,
    Packed,
    Batched,
    Masked,
    Mimo,
    McDropout,
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Version> {
        match s {
            "std" | "vanilla" => Ok(Version::Standard),
            "packed" => Ok(Version::Packed),
            "batched" => Ok(Version::Batched),
            "masked" => Ok(Version::Masked),
            "mimo" => Ok(Version::Mimo),
            "mc-dropout" => Ok(Version::McDropout),
            other => Err(Error::invalid(format!(
                "Unknown version: {other}. Available versions are std, vanilla, packed, batched, masked, mimo, mc-dropout."
            ))),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Version::Standard => "std",
            Version::Packed => "packed",
            Version::Batched => "batched",
            Version::Masked => "masked",
            Version::Mimo => "mimo",
            Version::McDropout => "mc-dropout",
        })
    }
}

/// Model-group command-line arguments shared by the convolutional baselines.
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct BaselineArgs {
    #[arg(long, default_value = "std")]
    pub version: String,
    #[arg(long)]
    pub num_estimators: Option<usize>,
    /// Width factor of packed ensembles.
    #[arg(long)]
    pub alpha: Option<f64>,
    /// Extra groups of packed ensembles.
    #[arg(long, default_value_t = 1)]
    pub gamma: usize,
    /// Mask scale of masksembles.
    #[arg(long)]
    pub scale: Option<f64>,
    #[arg(long, default_value_t = 1)]
    pub groups: usize,
    #[arg(long)]
    pub dropout_rate: Option<f64>,
    #[arg(long)]
    pub last_layer_dropout: bool,
    #[arg(long, value_enum, default_value = "cifar")]
    pub style: Style,
}

impl Default for BaselineArgs {
    fn default() -> Self {
        BaselineArgs {
            version: "std".into(),
            num_estimators: None,
            alpha: None,
            gamma: 1,
            scale: None,
            groups: 1,
            dropout_rate: None,
            last_layer_dropout: false,
            style: Style::Cifar,
        }
    }
}

impl BaselineArgs {
    pub fn with_version(version: &str, num_estimators: usize) -> BaselineArgs {
        BaselineArgs { version: version.into(), num_estimators: Some(num_estimators), ..BaselineArgs::default() }
    }

    /// Resolves `version` and checks it got the hyperparameters it needs.
    pub fn variant(&self) -> Result<Variant> {
        let version: Version = self.version.parse()?;
        let needs = |what: &str| Error::invalid(format!("version {version} needs {what}"));
        let num_estimators = || self.num_estimators.ok_or_else(|| needs("num_estimators"));
        let variant = match version {
            Version::Standard => Variant::Standard,
            Version::Packed => {
                let alpha = self.alpha.ok_or_else(|| needs("alpha"))?;
                Variant::Packed(PackedConfig::new(alpha, num_estimators()?, self.gamma)?)
            }
            Version::Masked => Variant::Masked {
                num_estimators: num_estimators()?,
                scale: self.scale.ok_or_else(|| needs("scale"))?,
            },
            Version::Batched => Variant::Batched { num_estimators: num_estimators()? },
            Version::Mimo => Variant::Mimo { num_estimators: num_estimators()? },
            Version::McDropout => Variant::McDropout {
                num_estimators: num_estimators()?,
                last_layer_dropout: self.last_layer_dropout,
            },
        };
        variant.validate()?;
        Ok(variant)
    }
}

/// The criterion of a classification `loss`.
pub fn classification_criterion(loss: LossType) -> Result<Box<dyn Criterion>> {
    Ok(match loss {
        LossType::CrossEntropy => Box::new(CrossEntropyLoss::new(Reduction::Mean)),
        LossType::BinaryCrossEntropy => Box::new(BceWithLogitsLoss::new(Reduction::Mean)),
        LossType::Mse => Box::new(MseLoss::new(Reduction::Mean)),
        other => return Err(Error::invalid(format!("{other:?} is not a classification loss"))),
    })
}

/// A classifier with its loss and optimization procedure.
pub struct Baseline<M> {
    pub model: M,
    pub num_classes: usize,
    pub loss: LossType,
    procedure: Procedure,
}

impl<M: UncertaintyModel> Baseline<M> {
    pub(crate) fn assemble(model: M, num_classes: usize, loss: LossType, procedure: Procedure) -> Result<Baseline<M>> {
        classification_criterion(loss)?;
        tracing::info!(model = %model.name(), estimators = model.num_estimators(), procedure = procedure.name, "baseline ready");
        Ok(Baseline { model, num_classes, loss, procedure })
    }

    pub fn criterion(&self) -> Result<Box<dyn Criterion>> {
        classification_criterion(self.loss)
    }

    pub fn configure_optimizers(&self) -> Result<OptimizationProcedure> {
        self.procedure.apply(&self.model)
    }

    pub fn procedure(&self) -> Procedure {
        self.procedure
    }

    pub fn num_estimators(&self) -> usize {
        self.model.num_estimators()
    }

    /// The evaluation routine matching this model's ensemble size.
    pub fn routine(&self) -> Result<ClassificationRoutine> {
        ClassificationRoutine::new(self.num_classes, self.num_estimators())
    }

    pub fn summary(&self) -> String {
        self.model.summary()
    }
}

impl<M: UncertaintyModel> Module for Baseline<M> {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.model.forward(x)
    }

    fn name(&self) -> String {
        self.model.name()
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.model]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.model]
    }
}

impl<M: UncertaintyModel> UncertaintyModel for Baseline<M> {
    fn variant(&self) -> Variant {
        self.model.variant()
    }

    fn summary(&self) -> String {
        self.model.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_parse() {
        assert_eq!("vanilla".parse::<Version>().unwrap(), Version::Standard);
        assert_eq!("mc-dropout".parse::<Version>().unwrap(), Version::McDropout);
        assert!(matches!("deep".parse::<Version>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn versions_require_their_hyperparameters() {
        let args = BaselineArgs { version: "packed".into(), num_estimators: Some(4), ..BaselineArgs::default() };
        assert!(args.variant().is_err());
        let args = BaselineArgs { alpha: Some(2.0), ..args };
        assert_eq!(args.variant().unwrap().num_estimators(), 4);

        let masked = BaselineArgs { version: "masked".into(), num_estimators: Some(4), ..BaselineArgs::default() };
        assert!(masked.variant().is_err());
        assert!(BaselineArgs { scale: Some(2.0), ..masked }.variant().is_ok());

        assert!(BaselineArgs { version: "mimo".into(), ..BaselineArgs::default() }.variant().is_err());
        assert_eq!(BaselineArgs::default().variant().unwrap(), Variant::Standard);
    }

    #[test]
    fn regression_losses_are_not_classification_criteria() {
        assert!(classification_criterion(LossType::Nig).is_err());
        assert_eq!(classification_criterion(LossType::CrossEntropy).unwrap().name(), "cross_entropy");
    }
}
