use std::path::PathBuf;
use std::sync::Arc;

use crate::datamodules::{not_set_up, DataLoader, DataModule, Stage};
use crate::datasets::{
    dataset_builder, random_split, DatasetBuilder, DatasetRequest, SharedDataset, Split, UciRegression,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct UciArgs {
    #[arg(long, default_value = "./data")]
    pub root: PathBuf,
    /// One of boston, concrete, energy, kin8nm, naval, power, protein, wine, yacht.
    #[arg(long, default_value = "kin8nm")]
    pub dataset_name: String,
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 0.0)]
    pub val_split: f64,
    #[arg(long, default_value_t = 0.2)]
    pub test_split: f64,
}

impl Default for UciArgs {
    fn default() -> Self {
        UciArgs {
            root: PathBuf::from("./data"),
            dataset_name: "kin8nm".into(),
            batch_size: 128,
            val_split: 0.0,
            test_split: 0.2,
        }
    }
}

/// A UCI regression table split at random into train / val / test.
pub struct UciDataModule {
    pub args: UciArgs,
    pub input_shape: Vec<usize>,
    pub dataset: DatasetBuilder,
    train: Option<SharedDataset>,
    val: Option<SharedDataset>,
    test: Option<SharedDataset>,
}

impl UciDataModule {
    pub fn new(args: UciArgs, input_shape: Vec<usize>) -> Result<UciDataModule> {
        if args.val_split < 0.0 || args.test_split < 0.0 || args.val_split + args.test_split >= 1.0 {
            return Err(Error::invalid("val_split and test_split must be non-negative and sum below 1"));
        }
        let name = args.dataset_name.clone();
        Ok(UciDataModule {
            args,
            input_shape,
            dataset: dataset_builder(move |req| Ok(Arc::new(UciRegression::new(&req.root, &name)?) as SharedDataset)),
            train: None,
            val: None,
            test: None,
        })
    }

    fn ensure_split(&mut self) -> Result<()> {
        if self.train.is_some() {
            return Ok(());
        }
        let req = DatasetRequest { root: self.args.root.clone(), split: Split::Train, num_classes: 0 };
        let full = (self.dataset)(&req)?;
        let n = full.len();
        let n_test = (n as f64 * self.args.test_split).round() as usize;
        let n_val = (n as f64 * self.args.val_split).round() as usize;
        let n_train = n
            .checked_sub(n_test + n_val)
            .ok_or_else(|| Error::invalid("dataset too small for the requested splits"))?;
        let mut parts = random_split(full, &[n_train, n_val, n_test])?.into_iter().map(|s| Arc::new(s) as SharedDataset);
        self.train = parts.next();
        self.val = parts.next();
        self.test = parts.next();
        tracing::info!(dataset = %self.args.dataset_name, train = n_train, val = n_val, test = n_test, "UCI splits ready");
        Ok(())
    }
}

impl DataModule for UciDataModule {
    fn name(&self) -> String {
        format!("UCI-{}", self.args.dataset_name)
    }

    fn setup(&mut self, _stage: Option<Stage>) -> Result<()> {
        self.ensure_split()
    }

    fn train_dataloader(&self) -> Result<DataLoader> {
        DataLoader::new(self.train.clone().ok_or_else(|| not_set_up("train"))?, self.args.batch_size, true)
    }

    /// Falls back to the test split when no validation share was requested.
    fn val_dataloader(&self) -> Result<DataLoader> {
        let val = match (&self.val, &self.test) {
            (Some(v), _) if !v.is_empty() => v.clone(),
            (_, Some(t)) => t.clone(),
            _ => return Err(not_set_up("validation")),
        };
        DataLoader::new(val, self.args.batch_size, false)
    }

    fn test_dataloader(&self) -> Result<Vec<DataLoader>> {
        Ok(vec![DataLoader::new(self.test.clone().ok_or_else(|| not_set_up("test"))?, self.args.batch_size, false)?])
    }

    /// Number of regressed values.
    fn num_classes(&self) -> usize {
        1
    }

    fn num_channels(&self) -> usize {
        1
    }

    fn training_task(&self) -> &str {
        "regression"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DummyRegressionDataset;

    #[test]
    fn splits_are_disjoint_and_complete() {
        let mut dm = UciDataModule::new(UciArgs { batch_size: 8, ..UciArgs::default() }, vec![3]).unwrap();
        dm.dataset = dataset_builder(|_| Ok(Arc::new(DummyRegressionDataset::new(3, 1, 10)) as SharedDataset));
        dm.setup(Some(Stage::Fit)).unwrap();
        assert_eq!(dm.train_dataloader().unwrap().dataset.len(), 8);
        assert_eq!(dm.val_dataloader().unwrap().dataset.len(), 2);
        assert_eq!(dm.test_dataloader().unwrap()[0].dataset.len(), 2);
        assert_eq!(dm.training_task(), "regression");
    }

    #[test]
    fn rejects_oversized_splits() {
        let args = UciArgs { val_split: 0.5, test_split: 0.5, ..UciArgs::default() };
        assert!(UciDataModule::new(args, vec![8]).is_err());
    }
}
