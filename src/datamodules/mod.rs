//! Datamodules bundle dataset construction, splits, augmentation and loaders
//! for one benchmark.

pub mod cifar;
pub mod loader;
pub mod mnist;
pub mod uci;

pub use cifar::{CifarArgs, CifarDataModule};
pub use loader::{Batch, DataLoader};
pub use mnist::{MnistArgs, MnistDataModule};
pub use uci::{UciArgs, UciDataModule};

use std::str::FromStr;
use std::sync::Arc;

use crate::datasets::{random_split, SharedDataset, Subset};
use crate::error::{Error, Result};
use crate::transforms::{Transform, TransformedDataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fit,
    Test,
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Stage> {
        match s {
            "fit" => Ok(Stage::Fit),
            "test" => Ok(Stage::Test),
            other => Err(Error::invalid(format!("stage {other} is not supported, expected fit or test"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrainingTask {
    Classification,
    Regression,
}

impl FromStr for TrainingTask {
    type Err = Error;

    fn from_str(s: &str) -> Result<TrainingTask> {
        match s {
            "classification" => Ok(TrainingTask::Classification),
            "regression" => Ok(TrainingTask::Regression),
            other => Err(Error::invalid(format!(
                "training task {other} is not supported, expected classification or regression"
            ))),
        }
    }
}

pub trait DataModule {
    fn name(&self) -> String;

    /// Checks that the data can be built. Nothing is downloaded.
    fn prepare_data(&mut self) -> Result<()> {
        Ok(())
    }

    /// Builds the datasets of `stage`, or of every stage for `None`.
    fn setup(&mut self, stage: Option<Stage>) -> Result<()>;

    /// `setup` with the stage given by name.
    fn setup_named(&mut self, stage: Option<&str>) -> Result<()> {
        let stage = stage.map(str::parse).transpose()?;
        self.setup(stage)
    }

    fn train_dataloader(&self) -> Result<DataLoader>;

    fn val_dataloader(&self) -> Result<DataLoader>;

    /// The test loader, followed by the OOD loader when OOD detection is on.
    fn test_dataloader(&self) -> Result<Vec<DataLoader>>;

    fn num_classes(&self) -> usize;

    fn num_channels(&self) -> usize;

    /// `"classification"` or `"regression"`.
    fn training_task(&self) -> &str;
}

pub(crate) fn transformed(dataset: SharedDataset, transform: &Arc<dyn Transform>) -> SharedDataset {
    Arc::new(TransformedDataset::new(dataset, Arc::clone(transform)))
}

/// Holds out `val_split` of `raw` for validation. Both halves see their own
/// transform; with no split the caller falls back to the test set.
pub(crate) fn split_train_val(
    raw: SharedDataset,
    val_split: f64,
    train_tf: &Arc<dyn Transform>,
    val_tf: &Arc<dyn Transform>,
) -> Result<(SharedDataset, Option<SharedDataset>)> {
    if !(0.0..1.0).contains(&val_split) {
        return Err(Error::invalid(format!("val_split must be in [0, 1), got {val_split}")));
    }
    if val_split == 0.0 {
        return Ok((transformed(raw, train_tf), None));
    }
    let n_val = ((raw.len() as f64) * val_split).round() as usize;
    let parts = random_split(Arc::clone(&raw), &[raw.len() - n_val, n_val])?;
    let mut parts = parts.into_iter();
    let (train, val) = match (parts.next(), parts.next()) {
        (Some(t), Some(v)) => (t, v),
        _ => return Err(Error::invalid("random split returned too few parts")),
    };
    let train = transformed(Arc::new(train), train_tf);
    let val = transformed(Arc::new(Subset::new(raw, val.indices)?), val_tf);
    Ok((train, Some(val)))
}

pub(crate) fn not_set_up(what: &str) -> Error {
    Error::invalid(format!("{what} dataset is not set up, call setup first"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_and_task_names() {
        assert_eq!("fit".parse::<Stage>().unwrap(), Stage::Fit);
        assert!("other".parse::<Stage>().is_err());
        assert!("segmentation".parse::<TrainingTask>().is_err());
    }
}
