use std::path::PathBuf;
use std::sync::Arc;

use crate::datamodules::{not_set_up, split_train_val, transformed, DataLoader, DataModule, Stage};
use crate::datasets::{dataset_builder, DatasetBuilder, DatasetRequest, Mnist, SharedDataset, Split};
use crate::error::Result;
use crate::transforms::normalize::{MNIST_MEAN, MNIST_STD};
use crate::transforms::{Compose, Normalize, Transform};

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct MnistArgs {
    #[arg(long, default_value = "./data")]
    pub root: PathBuf,
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 0.0)]
    pub val_split: f64,
}

impl Default for MnistArgs {
    fn default() -> Self {
        MnistArgs { root: PathBuf::from("./data"), batch_size: 128, val_split: 0.0 }
    }
}

pub struct MnistDataModule {
    pub args: MnistArgs,
    pub dataset: DatasetBuilder,
    transform: Arc<dyn Transform>,
    train: Option<SharedDataset>,
    val: Option<SharedDataset>,
    test: Option<SharedDataset>,
}

impl MnistDataModule {
    pub fn new(args: MnistArgs) -> Result<MnistDataModule> {
        Ok(MnistDataModule {
            args,
            dataset: dataset_builder(|req| Ok(Arc::new(Mnist::new(&req.root, req.split)?) as SharedDataset)),
            transform: Arc::new(Compose::new().push(Normalize::new(MNIST_MEAN.to_vec(), MNIST_STD.to_vec())?)),
            train: None,
            val: None,
            test: None,
        })
    }

    fn request(&self, split: Split) -> DatasetRequest {
        DatasetRequest { root: self.args.root.clone(), split, num_classes: 10 }
    }
}

impl DataModule for MnistDataModule {
    fn name(&self) -> String {
        "MNIST".into()
    }

    fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        if matches!(stage, None | Some(Stage::Fit)) {
            let raw = (self.dataset)(&self.request(Split::Train))?;
            let (train, val) = split_train_val(raw, self.args.val_split, &self.transform, &self.transform)?;
            let val = match val {
                Some(v) => v,
                None => transformed((self.dataset)(&self.request(Split::Test))?, &self.transform),
            };
            tracing::info!(train = train.len(), val = val.len(), "MNIST fit data ready");
            self.train = Some(train);
            self.val = Some(val);
        }
        if matches!(stage, None | Some(Stage::Test)) {
            self.test = Some(transformed((self.dataset)(&self.request(Split::Test))?, &self.transform));
        }
        Ok(())
    }

    fn train_dataloader(&self) -> Result<DataLoader> {
        DataLoader::new(self.train.clone().ok_or_else(|| not_set_up("train"))?, self.args.batch_size, true)
    }

    fn val_dataloader(&self) -> Result<DataLoader> {
        DataLoader::new(self.val.clone().ok_or_else(|| not_set_up("validation"))?, self.args.batch_size, false)
    }

    fn test_dataloader(&self) -> Result<Vec<DataLoader>> {
        Ok(vec![DataLoader::new(self.test.clone().ok_or_else(|| not_set_up("test"))?, self.args.batch_size, false)?])
    }

    fn num_classes(&self) -> usize {
        10
    }

    fn num_channels(&self) -> usize {
        1
    }

    fn training_task(&self) -> &str {
        "classification"
    }
}
