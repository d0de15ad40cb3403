use std::path::Path;
use std::sync::Arc;

use uncertainty_nn::baselines::{BaselineArgs, MlpBaseline, ResNetBaseline, VggBaseline};
use uncertainty_nn::cli::{cli_main, init_args, parse_args, CliModel, CliOutcome, TrainerArgs};
use uncertainty_nn::datamodules::{CifarArgs, CifarDataModule, DataLoader, DataModule, Stage, UciArgs, UciDataModule};
use uncertainty_nn::datasets::{dataset_builder, DummyRegressionDataset, SharedDataset};
use uncertainty_nn::loss::LossType;
use uncertainty_nn::math::rng::seed_everything;
use uncertainty_nn::procedures::{optim_regression, Procedure};
use uncertainty_nn::{get_procedure, Error, Mlp, Result};

fn summary_args() -> TrainerArgs {
    TrainerArgs { summary: true, ..TrainerArgs::default() }
}

fn uci() -> UciDataModule {
    let mut dm = UciDataModule::new(UciArgs { batch_size: 8, ..UciArgs::default() }, vec![1, 5]).unwrap();
    dm.dataset = dataset_builder(|_| Ok(Arc::new(DummyRegressionDataset::new(5, 1, 40)) as SharedDataset));
    dm
}

fn mlp(loss: LossType) -> MlpBaseline {
    MlpBaseline::new(5, 1, vec![], loss, Procedure::by_name("regression").unwrap(), "std").unwrap()
}

#[test]
fn resnet_summary() {
    let (trainer, model_args, data) =
        parse_args::<BaselineArgs, CifarArgs, _, _>(["file", "--seed", "42", "--max-epochs", "1"]).unwrap();
    assert_eq!(trainer.seed, Some(42));
    let mut dm = CifarDataModule::cifar10(data).unwrap();
    let procedure = get_procedure("resnet18", "cifar10", "standard", None).unwrap();
    let mut net = ResNetBaseline::new(dm.num_classes(), dm.num_channels(), LossType::CrossEntropy, procedure, 18, &model_args)
        .unwrap();
    let args = TrainerArgs { summary: true, ..trainer };
    let outcome = cli_main(CliModel::Classifier(&mut net), &mut dm, Path::new("."), "std", &args).unwrap();
    assert!(matches!(outcome, CliOutcome::Summary(s) if s.contains("ResNet18")));
}

#[test]
fn vgg_summary() {
    let mut dm = CifarDataModule::cifar10(CifarArgs::default()).unwrap();
    let procedure = get_procedure("vgg16", "cifar10", "standard", None).unwrap();
    let mut net = VggBaseline::new(10, 3, LossType::CrossEntropy, procedure, 11, &BaselineArgs::default()).unwrap();
    let outcome = cli_main(CliModel::Classifier(&mut net), &mut dm, Path::new("."), "std", &summary_args()).unwrap();
    assert!(matches!(outcome, CliOutcome::Summary(_)));
}

#[test]
fn mlp_summary() {
    let mut dm = uci();
    let mut net = mlp(LossType::Mse);
    assert!(optim_regression(&net.model).is_ok());
    let outcome = cli_main(CliModel::Mlp(&mut net), &mut dm, Path::new("."), "std", &summary_args()).unwrap();
    assert!(matches!(outcome, CliOutcome::Summary(s) if s.contains("MLP")));
}

/// A UCI module that claims a task the CLI does not know.
struct TimeSeries(UciDataModule);

impl DataModule for TimeSeries {
    fn name(&self) -> String {
        self.0.name()
    }

    fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        self.0.setup(stage)
    }

    fn train_dataloader(&self) -> Result<DataLoader> {
        self.0.train_dataloader()
    }

    fn val_dataloader(&self) -> Result<DataLoader> {
        self.0.val_dataloader()
    }

    fn test_dataloader(&self) -> Result<Vec<DataLoader>> {
        self.0.test_dataloader()
    }

    fn num_classes(&self) -> usize {
        self.0.num_classes()
    }

    fn num_channels(&self) -> usize {
        self.0.num_channels()
    }

    fn training_task(&self) -> &str {
        "time-series-regression"
    }
}

#[test]
fn other_training_task_is_rejected() {
    let mut dm = TimeSeries(uci());
    let mut net = mlp(LossType::Mse);
    let result = cli_main(CliModel::Mlp(&mut net), &mut dm, Path::new("."), "std", &summary_args());
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn mlp_trains_saves_and_reloads() {
    seed_everything(1);
    let dir = tempfile::tempdir().unwrap();
    let mut dm = uci();
    let mut net = mlp(LossType::GaussianNll);
    let args = TrainerArgs { max_epochs: 2, exp_name: "run".into(), ..TrainerArgs::default() };
    let outcome = cli_main(CliModel::Mlp(&mut net), &mut dm, dir.path(), "mlp", &args).unwrap();
    let checkpoint = match outcome {
        CliOutcome::Trained { checkpoint, report } => {
            assert!(report.get("gaussian_nll").is_some());
            checkpoint
        }
        other => panic!("expected a training run, got {other:?}"),
    };
    assert!(checkpoint.starts_with(dir.path().join("logs").join("mlp").join("run")));
    assert_eq!(Mlp::load_json(&checkpoint).unwrap().spec.dist_estimation, 2);

    let test = TrainerArgs { test: Some(checkpoint), ..TrainerArgs::default() };
    let outcome = cli_main(CliModel::Mlp(&mut net), &mut dm, dir.path(), "mlp", &test).unwrap();
    assert!(matches!(outcome, CliOutcome::Evaluated(report) if report.get("mse").is_some()));
}

#[test]
fn classifiers_do_not_train() {
    let mut dm = CifarDataModule::cifar10(CifarArgs::default()).unwrap();
    let procedure = get_procedure("vgg16", "cifar10", "standard", None).unwrap();
    let mut net = VggBaseline::new(10, 3, LossType::CrossEntropy, procedure, 11, &BaselineArgs::default()).unwrap();
    let result = cli_main(CliModel::Classifier(&mut net), &mut dm, Path::new("."), "std", &TrainerArgs::default());
    assert!(matches!(result, Err(Error::NotImplemented(_))));
}

#[test]
fn argument_groups_build() {
    let cmd = init_args::<BaselineArgs, UciArgs>();
    assert!(cmd.get_arguments().any(|a| a.get_id() == "max_epochs"));
    assert!(cmd.get_arguments().any(|a| a.get_id() == "dataset_name"));
}
