use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::datamodules::loader::{Batch, DataLoader};
use crate::datasets::SharedDataset;
use crate::error::{Error, Result};
use crate::loss::loss_type::LossType;
use crate::math::tensor::Tensor;
use crate::models::mlp::Mlp;
use crate::optim::Optimizer;
use crate::procedures::OptimizationProcedure;
use crate::train::epoch_stats::EpochStats;
use crate::train::objective::Objective;
use crate::train::train_config::TrainConfig;

/// Trains `mlp` for `config.epochs` epochs and returns the mean training loss
/// of the last completed epoch.
///
/// The optimizer and its learning-rate schedule come from `procedure`; the
/// schedule is applied at the start of every epoch.
///
/// # Early termination
/// The loop breaks early if the `progress_tx` receiver has been dropped or
/// `config.stop_flag` is set.
///
/// # Errors
/// An empty training set, `batch_size == 0`, or a head whose width does not
/// match `config.loss_type`.
pub fn train_loop(
    mlp: &mut Mlp,
    train: SharedDataset,
    val: Option<SharedDataset>,
    procedure: &OptimizationProcedure,
    config: &TrainConfig,
) -> Result<f64> {
    if train.is_empty() {
        return Err(Error::invalid("the training set must not be empty"));
    }
    let objective = Objective::new(config.loss_type, config.nig_reg_weight)?;
    objective.check(mlp)?;
    let train_loader = DataLoader::new(train, config.batch_size, true)?;
    let val_loader = val.map(|v| DataLoader::new(v, config.batch_size, false)).transpose()?;

    let mut optimizer = procedure.build_optimizer()?;
    let base_lr = procedure.optimizer.lr();
    tracing::info!(
        procedure = procedure.name,
        optimizer = optimizer.name(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        loss = ?config.loss_type,
        "starting training"
    );

    let mut last_train_loss = 0.0;
    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            break;
        }
        procedure.scheduler.apply(optimizer.as_mut(), base_lr, epoch - 1);
        let t_start = Instant::now();

        let train_loss = run_one_epoch(mlp, &train_loader, &objective, optimizer.as_mut())?;
        last_train_loss = train_loss;
        let elapsed_ms = t_start.elapsed().as_millis() as u64;

        let train_accuracy = if config.loss_type == LossType::CrossEntropy {
            Some(evaluate(mlp, &train_loader, &objective)?.1)
        } else {
            None
        };
        let (val_loss, val_accuracy) = match &val_loader {
            Some(loader) if !loader.is_empty() => {
                let (loss, accuracy) = evaluate(mlp, loader, &objective)?;
                (Some(loss), (config.loss_type == LossType::CrossEntropy).then_some(accuracy))
            }
            _ => (None, None),
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            val_loss,
            train_accuracy,
            val_accuracy,
            learning_rate: optimizer.learning_rate(),
            elapsed_ms,
        };
        tracing::info!(epoch, train_loss, val_loss = ?val_loss, elapsed_ms, "epoch finished");

        if let Some(ref tx) = config.progress_tx {
            if tx.send(stats).is_err() {
                tracing::debug!("progress receiver dropped, stopping");
                break;
            }
        }
        if stop_requested(config) {
            break;
        }
    }

    Ok(last_train_loss)
}

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// One pass of mini-batch updates; returns the sample-weighted mean loss.
fn run_one_epoch(
    mlp: &mut Mlp,
    loader: &DataLoader,
    objective: &Objective,
    optimizer: &mut dyn Optimizer,
) -> Result<f64> {
    let mut total_loss = 0.0;
    let mut seen = 0usize;
    for batch in loader.iter() {
        let Batch { inputs, targets } = batch?;
        let inputs = inputs.flatten();
        let raw = mlp.forward_raw(&inputs)?;
        let (loss, delta) = objective.loss_and_delta(mlp, &raw, &targets)?;
        let grads = mlp.backward(&delta)?;

        let flat: Vec<Tensor> = grads.into_iter().flat_map(|g| [g.weights, g.biases]).collect();
        let params: Vec<&mut Tensor> =
            mlp.layers.iter_mut().flat_map(|l| [&mut l.weights, &mut l.biases]).collect();
        optimizer.step(params, &flat)?;

        total_loss += loss * inputs.batch() as f64;
        seen += inputs.batch();
    }
    Ok(if seen == 0 { 0.0 } else { total_loss / seen as f64 })
}

/// Mean loss and argmax accuracy over a loader, without updating weights.
fn evaluate(mlp: &mut Mlp, loader: &DataLoader, objective: &Objective) -> Result<(f64, f64)> {
    let mut total_loss = 0.0;
    let mut correct = 0usize;
    let mut seen = 0usize;
    for batch in loader.iter() {
        let Batch { inputs, targets } = batch?;
        let raw = mlp.forward_raw(&inputs.flatten())?;
        let (loss, _) = objective.loss_and_delta(mlp, &raw, &targets)?;
        total_loss += loss * raw.batch() as f64;
        if let Ok(classes) = targets.classes() {
            correct += raw.argmax_last().iter().zip(&classes).filter(|(p, t)| p == t).count();
        }
        seen += raw.batch();
    }
    if seen == 0 {
        return Ok((0.0, 0.0));
    }
    Ok((total_loss / seen as f64, correct as f64 / seen as f64))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};

    use super::*;
    use crate::datasets::DummyRegressionDataset;
    use crate::math::rng::seed_everything;
    use crate::models::mlp::MlpSpec;
    use crate::optim::{LrScheduler, OptimizerConfig};

    fn procedure(lr: f64) -> OptimizationProcedure {
        OptimizationProcedure { name: "test", optimizer: OptimizerConfig::adam(lr, 0.0), scheduler: LrScheduler::Constant }
    }

    #[test]
    fn regression_loss_decreases() {
        seed_everything(3);
        let data: SharedDataset = Arc::new(DummyRegressionDataset::new(3, 1, 64));
        let mut mlp = Mlp::new(MlpSpec::new("reg", 3, 1, vec![16])).unwrap();
        let first = train_loop(&mut mlp, data.clone(), None, &procedure(1e-2), &TrainConfig::new(1, 16, LossType::Mse)).unwrap();
        let later = train_loop(&mut mlp, data, None, &procedure(1e-2), &TrainConfig::new(40, 16, LossType::Mse)).unwrap();
        assert!(later < first, "{later} !< {first}");
    }

    #[test]
    fn emits_stats_per_epoch_and_honours_stop_flag() {
        seed_everything(0);
        let data: SharedDataset = Arc::new(DummyRegressionDataset::new(2, 1, 8));
        let mut mlp = Mlp::new(MlpSpec::new("nig", 2, 1, vec![4]).dist_estimation(4)).unwrap();
        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(3, 4, LossType::Nig);
        config.progress_tx = Some(tx);
        train_loop(&mut mlp, data.clone(), Some(data.clone()), &procedure(1e-3), &config).unwrap();
        let stats: Vec<EpochStats> = rx.try_iter().collect();
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|s| s.val_loss.is_some() && s.train_loss.is_finite()));

        let flag = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(3, 4, LossType::Nig);
        config.progress_tx = Some(tx);
        config.stop_flag = Some(flag);
        train_loop(&mut mlp, data, None, &procedure(1e-3), &config).unwrap();
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn mismatched_head_is_rejected() {
        let data: SharedDataset = Arc::new(DummyRegressionDataset::new(2, 1, 8));
        let mut mlp = Mlp::new(MlpSpec::new("m", 2, 1, vec![])).unwrap();
        let config = TrainConfig::new(1, 4, LossType::GaussianNll);
        assert!(train_loop(&mut mlp, data, None, &procedure(1e-3), &config).is_err());
    }
}
