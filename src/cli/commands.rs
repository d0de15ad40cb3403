use std::path::Path;

use clap::{Parser, Subcommand, ValueEnum};

use crate::baselines::{BaselineArgs, MlpBaseline};
use crate::cli::{cli_main, CliModel, CliOutcome, TrainerArgs};
use crate::datamodules::{CifarArgs, CifarDataModule, DataModule, MnistArgs, MnistDataModule, Stage, UciArgs, UciDataModule};
use crate::error::Result;
use crate::loss::LossType;
use crate::models::{
    LeNet, ResNet, ResNetArch, ResNetConfig, UncertaintyModel, Vgg, VggConfig, WideResNet, WideResNetConfig,
};
use crate::procedures::{registry, Procedure};

#[derive(Debug, Parser)]
#[command(name = "uncertainty-nn", version, about = "Uncertainty-aware deep learning")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a model's layer tree and parameter count.
    Summary {
        #[arg(long, value_enum)]
        arch: Arch,
        #[arg(long, default_value_t = 3)]
        in_channels: usize,
        #[arg(long, default_value_t = 10)]
        num_classes: usize,
        #[command(flatten)]
        model: BaselineArgs,
    },
    /// Evaluate a classifier checkpoint (`--test`) on an image dataset.
    Evaluate {
        #[arg(long, value_enum)]
        arch: Arch,
        #[arg(long, value_enum, default_value = "cifar10")]
        dataset: ImageDataset,
        #[command(flatten)]
        trainer: TrainerArgs,
        #[command(flatten)]
        model: BaselineArgs,
        #[command(flatten)]
        data: CifarArgs,
    },
    /// Train a dense regressor on a UCI dataset, then evaluate it.
    TrainMlp {
        #[arg(long, value_delimiter = ',', default_value = "50")]
        hidden_dims: Vec<usize>,
        #[arg(long, value_enum, default_value = "nig")]
        loss: LossType,
        #[arg(long, default_value_t = 1e-2)]
        nig_reg_weight: f64,
        #[command(flatten)]
        trainer: TrainerArgs,
        #[command(flatten)]
        data: UciArgs,
    },
    /// List the registered optimization procedures.
    Procedures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Arch {
    Resnet18,
    Resnet34,
    Resnet50,
    Resnet101,
    Resnet152,
    Wideresnet28x10,
    Vgg11,
    Vgg13,
    Vgg16,
    Vgg19,
    Lenet,
}

impl Arch {
    pub fn label(&self) -> String {
        self.to_possible_value().map(|v| v.get_name().to_string()).unwrap_or_default()
    }

    /// Builds the architecture in the version `args` selects.
    pub fn build(&self, in_channels: usize, num_classes: usize, args: &BaselineArgs) -> Result<Box<dyn UncertaintyModel>> {
        let variant = args.variant()?;
        Ok(match self {
            Arch::Resnet18 | Arch::Resnet34 | Arch::Resnet50 | Arch::Resnet101 | Arch::Resnet152 => {
                let depth = match self {
                    Arch::Resnet18 => 18,
                    Arch::Resnet34 => 34,
                    Arch::Resnet50 => 50,
                    Arch::Resnet101 => 101,
                    _ => 152,
                };
                let config = ResNetConfig::new(ResNetArch::from_depth(depth)?, in_channels, num_classes, args.style)
                    .groups(args.groups)
                    .dropout_rate(args.dropout_rate.unwrap_or(0.0))
                    .variant(variant);
                Box::new(ResNet::new(config)?)
            }
            Arch::Wideresnet28x10 => {
                let mut config =
                    WideResNetConfig::new(in_channels, num_classes, args.style).groups(args.groups).variant(variant);
                if let Some(rate) = args.dropout_rate {
                    config = config.dropout_rate(rate);
                }
                Box::new(WideResNet::new(config)?)
            }
            Arch::Vgg11 | Arch::Vgg13 | Arch::Vgg16 | Arch::Vgg19 => {
                let depth = match self {
                    Arch::Vgg11 => 11,
                    Arch::Vgg13 => 13,
                    Arch::Vgg16 => 16,
                    _ => 19,
                };
                let mut config = VggConfig::new(depth, in_channels, num_classes)
                    .style(args.style)
                    .groups(args.groups)
                    .variant(variant);
                if let Some(rate) = args.dropout_rate {
                    config = config.dropout_rate(rate);
                }
                Box::new(Vgg::new(config)?)
            }
            Arch::Lenet => Box::new(LeNet::new(in_channels, num_classes, args.dropout_rate.unwrap_or(0.0))?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageDataset {
    Cifar10,
    Cifar100,
    Mnist,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Summary { arch, in_channels, num_classes, model } => {
            let net = arch.build(in_channels, num_classes, &model)?;
            print!("{}", net.summary());
        }
        Command::Evaluate { arch, dataset, trainer, model, data } => {
            let mut datamodule: Box<dyn DataModule> = match dataset {
                ImageDataset::Cifar10 => Box::new(CifarDataModule::cifar10(data)?),
                ImageDataset::Cifar100 => Box::new(CifarDataModule::cifar100(data)?),
                ImageDataset::Mnist => Box::new(MnistDataModule::new(MnistArgs {
                    root: data.root,
                    batch_size: data.batch_size,
                    val_split: data.val_split,
                })?),
            };
            let mut net = arch.build(datamodule.num_channels(), datamodule.num_classes(), &model)?;
            let name = format!("{}-{}", net.name(), datamodule.name());
            report(cli_main(CliModel::Classifier(net.as_mut()), datamodule.as_mut(), Path::new("."), &name, &trainer)?);
        }
        Command::TrainMlp { hidden_dims, loss, nig_reg_weight, trainer, data } => {
            let name = format!("mlp-{}", data.dataset_name);
            let mut datamodule = UciDataModule::new(data, Vec::new())?;
            datamodule.setup(Some(Stage::Fit))?;
            let in_features = datamodule.train_dataloader()?.dataset.get(0)?.input.numel();
            datamodule.input_shape = vec![in_features];
            let procedure = Procedure::by_name("regression")?;
            let mut baseline =
                MlpBaseline::new(in_features, datamodule.num_classes(), hidden_dims, loss, procedure, "std")?;
            baseline.nig_reg_weight = nig_reg_weight;
            report(cli_main(CliModel::Mlp(&mut baseline), &mut datamodule, Path::new("."), &name, &trainer)?);
        }
        Command::Procedures => {
            println!("{:<18} {:<12} procedure", "arch", "dataset");
            for (arch, dataset, procedure) in registry() {
                println!("{arch:<18} {dataset:<12} {}", procedure.name);
            }
        }
    }
    Ok(())
}

fn report(outcome: CliOutcome) {
    match outcome {
        CliOutcome::Summary(summary) => print!("{summary}"),
        CliOutcome::Evaluated(metrics) => print!("{metrics}"),
        CliOutcome::Trained { checkpoint, report } => {
            println!("saved {}", checkpoint.display());
            print!("{report}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["uncertainty-nn", "summary", "--arch", "lenet", "--in-channels", "1"]).unwrap();
        assert!(matches!(cli.command, Command::Summary { arch: Arch::Lenet, in_channels: 1, .. }));

        let cli = Cli::try_parse_from([
            "uncertainty-nn",
            "train-mlp",
            "--hidden-dims",
            "16,16",
            "--loss",
            "gaussian-nll",
            "--dataset-name",
            "boston",
        ])
        .unwrap();
        match cli.command {
            Command::TrainMlp { hidden_dims, loss, data, .. } => {
                assert_eq!(hidden_dims, vec![16, 16]);
                assert_eq!(loss, LossType::GaussianNll);
                assert_eq!(data.dataset_name, "boston");
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["uncertainty-nn", "evaluate", "--arch", "vgg16", "--dataset", "svhn"]).is_err());
    }

    #[test]
    fn arch_builds_lenet_summary() {
        let net = Arch::Lenet.build(1, 10, &BaselineArgs::default()).unwrap();
        assert!(net.summary().starts_with("LeNet"));
        assert_eq!(Arch::Wideresnet28x10.label(), "wideresnet28x10");
    }
}
