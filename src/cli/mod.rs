//! Command-line entry points: argument groups, `cli_main`, and the binary's
//! subcommands.

pub mod commands;

pub use commands::{run, Cli, Command};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Args, FromArgMatches};

use crate::baselines::MlpBaseline;
use crate::datamodules::{DataModule, Stage, TrainingTask};
use crate::error::{Error, Result};
use crate::math::rng::seed_everything;
use crate::models::mlp::Mlp;
use crate::models::{load_checkpoint, UncertaintyModel};
use crate::routines::{ClassificationRoutine, MetricReport};

/// Trainer-level options shared by every run.
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct TrainerArgs {
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, default_value_t = 100)]
    pub max_epochs: usize,
    /// Print the model summary and exit.
    #[arg(long)]
    pub summary: bool,
    /// Checkpoint to evaluate instead of training.
    #[arg(long)]
    pub test: Option<PathBuf>,
    #[arg(long, default_value = "logs/")]
    pub exp_dir: PathBuf,
    #[arg(long, default_value = "")]
    pub exp_name: String,
}

impl Default for TrainerArgs {
    fn default() -> Self {
        TrainerArgs {
            seed: None,
            max_epochs: 100,
            summary: false,
            test: None,
            exp_dir: PathBuf::from("logs/"),
            exp_name: String::new(),
        }
    }
}

/// The full argument set: trainer options, then the model group `M`, then
/// the datamodule group `D`.
pub fn init_args<M: Args, D: Args>() -> clap::Command {
    let cmd = clap::Command::new("uncertainty-nn").about("Train and evaluate uncertainty-aware models");
    let cmd = TrainerArgs::augment_args(cmd);
    let cmd = M::augment_args(cmd);
    D::augment_args(cmd)
}

/// Parses `argv` against [`init_args`].
pub fn parse_args<M, D, I, T>(argv: I) -> Result<(TrainerArgs, M, D)>
where
    M: Args,
    D: Args,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = init_args::<M, D>().try_get_matches_from(argv).map_err(|e| Error::invalid(e.to_string()))?;
    let group = |e: clap::Error| Error::invalid(e.to_string());
    Ok((
        TrainerArgs::from_arg_matches(&matches).map_err(group)?,
        M::from_arg_matches(&matches).map_err(group)?,
        D::from_arg_matches(&matches).map_err(group)?,
    ))
}

/// What `cli_main` runs on.
pub enum CliModel<'a> {
    /// A convolutional classifier; evaluation only.
    Classifier(&'a mut dyn UncertaintyModel),
    Mlp(&'a mut MlpBaseline),
}

impl CliModel<'_> {
    fn summary(&self) -> String {
        match self {
            CliModel::Classifier(model) => model.summary(),
            CliModel::Mlp(baseline) => baseline.model.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CliOutcome {
    Summary(String),
    Evaluated(MetricReport),
    Trained { checkpoint: PathBuf, report: MetricReport },
}

/// Runs one experiment.
///
/// - `--summary` returns the model summary.
/// - `--test <ckpt>` loads the checkpoint and evaluates it on the test set.
/// - otherwise the MLP is trained for `--max-epochs`, saved under
///   `root/exp_dir/net_name/exp_name/`, and evaluated.
pub fn cli_main(
    model: CliModel<'_>,
    datamodule: &mut dyn DataModule,
    root: &Path,
    net_name: &str,
    args: &TrainerArgs,
) -> Result<CliOutcome> {
    let task: TrainingTask = datamodule.training_task().parse()?;
    if let Some(seed) = args.seed {
        seed_everything(seed);
    }
    if args.summary {
        let summary = model.summary();
        tracing::info!(net = net_name, "printing model summary");
        return Ok(CliOutcome::Summary(summary));
    }
    datamodule.prepare_data()?;

    match (model, &args.test) {
        (CliModel::Classifier(model), Some(checkpoint)) => {
            if task != TrainingTask::Classification {
                return Err(Error::invalid(format!("{net_name} is a classifier, the datamodule is {task:?}")));
            }
            load_checkpoint(&mut *model, checkpoint)?;
            datamodule.setup(Some(Stage::Test))?;
            let mut routine = ClassificationRoutine::new(datamodule.num_classes(), model.num_estimators())?;
            Ok(CliOutcome::Evaluated(routine.evaluate(&mut *model, &datamodule.test_dataloader()?)?))
        }
        (CliModel::Classifier(_), None) => Err(Error::NotImplemented(format!(
            "training {net_name} is not supported, only MLP baselines train; pass --test <checkpoint>"
        ))),
        (CliModel::Mlp(baseline), Some(checkpoint)) => {
            *baseline = MlpBaseline::from_model(Mlp::load_json(checkpoint)?, baseline.loss, baseline.procedure())?;
            datamodule.setup(Some(Stage::Test))?;
            Ok(CliOutcome::Evaluated(evaluate_mlp(baseline, datamodule)?))
        }
        (CliModel::Mlp(baseline), None) => {
            datamodule.setup(Some(Stage::Fit))?;
            let train = datamodule.train_dataloader()?;
            let val = datamodule.val_dataloader().ok().map(|l| l.dataset);
            baseline.fit(train.dataset, val, args.max_epochs, train.batch_size)?;

            let dir = root.join(&args.exp_dir).join(net_name).join(&args.exp_name);
            std::fs::create_dir_all(&dir)?;
            let checkpoint = dir.join("model.json");
            baseline.model.save_json(&checkpoint)?;

            datamodule.setup(Some(Stage::Test))?;
            let report = evaluate_mlp(baseline, datamodule)?;
            Ok(CliOutcome::Trained { checkpoint, report })
        }
    }
}

fn evaluate_mlp(baseline: &mut MlpBaseline, datamodule: &dyn DataModule) -> Result<MetricReport> {
    let loaders = datamodule.test_dataloader()?;
    let loader = loaders.first().ok_or_else(|| Error::invalid("the datamodule has no test loader"))?;
    baseline.evaluate(loader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baselines::BaselineArgs;
    use crate::datamodules::UciArgs;

    #[test]
    fn groups_parse_together() {
        let (trainer, model, data) = parse_args::<BaselineArgs, UciArgs, _, _>([
            "uncertainty-nn",
            "--max-epochs",
            "3",
            "--version",
            "packed",
            "--num-estimators",
            "4",
            "--alpha",
            "2",
            "--dataset-name",
            "yacht",
        ])
        .unwrap();
        assert_eq!(trainer.max_epochs, 3);
        assert_eq!(model.num_estimators, Some(4));
        assert_eq!(data.dataset_name, "yacht");
        assert!(parse_args::<BaselineArgs, UciArgs, _, _>(["uncertainty-nn", "--bogus"]).is_err());
    }
}
