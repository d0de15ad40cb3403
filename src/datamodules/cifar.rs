use std::path::PathBuf;
use std::sync::Arc;

use crate::datamodules::{not_set_up, split_train_val, transformed, DataLoader, DataModule, Stage};
use crate::datasets::{
    dataset_builder, AggregatedDataset, Cifar, Cifar10H, CifarC, CifarVersion, DatasetBuilder, DatasetRequest,
    ImageFolder, SharedDataset, Split,
};
use crate::error::{Error, Result};
use crate::transforms::normalize::{CIFAR100_MEAN, CIFAR100_STD, CIFAR10_MEAN, CIFAR10_STD};
use crate::transforms::{Compose, Cutout, Normalize, RandAugment, RandomCrop, RandomHorizontalFlip, Transform};

/// Command-line options of the CIFAR datamodules.
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct CifarArgs {
    #[arg(long, default_value = "./data")]
    pub root: PathBuf,
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,
    /// Share of the training set held out for validation.
    #[arg(long, default_value_t = 0.0)]
    pub val_split: f64,
    /// Interlaced copies of the training set (one per ensemble member).
    #[arg(long, default_value_t = 1)]
    pub num_dataloaders: usize,
    #[arg(long)]
    pub cutout: Option<usize>,
    #[arg(long)]
    pub randaugment: bool,
    /// RandAugment policy string, e.g. `rand-m9-n2-mstd0.5`.
    #[arg(long)]
    pub auto_augment: Option<String>,
    /// Alternative test set: `c` (corrupted) or, for CIFAR-10, `h` (CIFAR-10H).
    #[arg(long)]
    pub test_alt: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub corruption_severity: usize,
    #[arg(long)]
    pub ood_detection: bool,
}

impl Default for CifarArgs {
    fn default() -> Self {
        CifarArgs {
            root: PathBuf::from("./data"),
            batch_size: 128,
            val_split: 0.0,
            num_dataloaders: 1,
            cutout: None,
            randaugment: false,
            auto_augment: None,
            test_alt: None,
            corruption_severity: 1,
            ood_detection: false,
        }
    }
}

/// CIFAR-10 / CIFAR-100 with optional validation split, interlaced training
/// copies, corrupted or human-label test sets and SVHN-style OOD data.
pub struct CifarDataModule {
    pub version: CifarVersion,
    pub args: CifarArgs,
    pub ood_detection: bool,
    /// Builds the in-distribution train / test sets.
    pub dataset: DatasetBuilder,
    /// Builds the OOD test set.
    pub ood_dataset: DatasetBuilder,
    /// Builds the `test_alt` test set.
    pub shift_dataset: DatasetBuilder,
    pub transform_train: Arc<Compose>,
    pub transform_test: Arc<Compose>,
    train: Option<SharedDataset>,
    val: Option<SharedDataset>,
    test: Option<SharedDataset>,
    ood: Option<SharedDataset>,
}

impl CifarDataModule {
    pub fn cifar10(args: CifarArgs) -> Result<CifarDataModule> {
        CifarDataModule::new(CifarVersion::Cifar10, args)
    }

    pub fn cifar100(args: CifarArgs) -> Result<CifarDataModule> {
        CifarDataModule::new(CifarVersion::Cifar100, args)
    }

    pub fn new(version: CifarVersion, args: CifarArgs) -> Result<CifarDataModule> {
        let cutout = args.cutout.filter(|&c| c > 0);
        if cutout.is_some() && (args.randaugment || args.auto_augment.is_some()) {
            return Err(Error::invalid("cutout cannot be combined with RandAugment"));
        }
        let allowed: &[&str] = match version {
            CifarVersion::Cifar10 => &["c", "h"],
            CifarVersion::Cifar100 => &["c"],
        };
        if let Some(alt) = &args.test_alt {
            if !allowed.contains(&alt.as_str()) {
                return Err(Error::invalid(format!("test_alt {alt} is not available for {}", version.name())));
            }
        }
        if args.num_dataloaders == 0 {
            return Err(Error::invalid("num_dataloaders must be positive"));
        }

        let (mean, std) = match version {
            CifarVersion::Cifar10 => (CIFAR10_MEAN, CIFAR10_STD),
            CifarVersion::Cifar100 => (CIFAR100_MEAN, CIFAR100_STD),
        };
        let mut train_tf = Compose::new().push(RandomCrop::new(32, 4)?).push(RandomHorizontalFlip::default());
        if let Some(length) = cutout {
            train_tf = train_tf.push(Cutout::new(length)?);
        } else if let Some(policy) = &args.auto_augment {
            train_tf = train_tf.push(policy.parse::<RandAugment>()?);
        } else if args.randaugment {
            train_tf = train_tf.push(RandAugment::default());
        }
        let train_tf = train_tf.push(Normalize::new(mean.to_vec(), std.to_vec())?);
        let test_tf = Compose::new().push(Normalize::new(mean.to_vec(), std.to_vec())?);

        let severity = args.corruption_severity;
        let shift_dataset: DatasetBuilder = match args.test_alt.as_deref() {
            Some("h") => dataset_builder(|req| Ok(Arc::new(Cifar10H::new(&req.root)?) as SharedDataset)),
            _ => dataset_builder(move |req| {
                Ok(Arc::new(CifarC::new(&req.root, version, severity)?) as SharedDataset)
            }),
        };

        Ok(CifarDataModule {
            version,
            ood_detection: args.ood_detection,
            args,
            dataset: dataset_builder(move |req| {
                Ok(Arc::new(Cifar::new(&req.root, version, req.split)?) as SharedDataset)
            }),
            ood_dataset: dataset_builder(|req| {
                Ok(Arc::new(ImageFolder::new(req.root.join("svhn"), 32)?) as SharedDataset)
            }),
            shift_dataset,
            transform_train: Arc::new(train_tf),
            transform_test: Arc::new(test_tf),
            train: None,
            val: None,
            test: None,
            ood: None,
        })
    }

    fn request(&self, split: Split) -> DatasetRequest {
        DatasetRequest { root: self.args.root.clone(), split, num_classes: self.version.num_classes() }
    }

    fn train_tf(&self) -> Arc<dyn Transform> {
        self.transform_train.clone()
    }

    fn test_tf(&self) -> Arc<dyn Transform> {
        self.transform_test.clone()
    }

    fn build_test(&self) -> Result<SharedDataset> {
        let raw = if self.args.test_alt.is_some() {
            (self.shift_dataset)(&self.request(Split::Test))?
        } else {
            (self.dataset)(&self.request(Split::Test))?
        };
        Ok(transformed(raw, &self.test_tf()))
    }
}

impl DataModule for CifarDataModule {
    fn name(&self) -> String {
        self.version.name().to_string()
    }

    fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        if matches!(stage, None | Some(Stage::Fit)) {
            if let Some(alt) = &self.args.test_alt {
                return Err(Error::invalid(format!("test_alt {alt} can only be used in testing")));
            }
            let raw = (self.dataset)(&self.request(Split::Train))?;
            let (train, val) = split_train_val(raw, self.args.val_split, &self.train_tf(), &self.test_tf())?;
            let val = match val {
                Some(v) => v,
                None => self.build_test()?,
            };
            tracing::info!(dataset = %self.name(), train = train.len(), val = val.len(), "fit data ready");
            self.train = Some(train);
            self.val = Some(val);
        }
        if matches!(stage, None | Some(Stage::Test)) {
            let test = self.build_test()?;
            self.ood = if self.ood_detection {
                Some(transformed((self.ood_dataset)(&self.request(Split::Test))?, &self.test_tf()))
            } else {
                None
            };
            tracing::info!(
                dataset = %self.name(),
                test = test.len(),
                ood = self.ood.as_ref().map_or(0, |d| d.len()),
                "test data ready"
            );
            self.test = Some(test);
        }
        Ok(())
    }

    fn train_dataloader(&self) -> Result<DataLoader> {
        let train = self.train.clone().ok_or_else(|| not_set_up("train"))?;
        let n = self.args.num_dataloaders;
        if n > 1 {
            let aggregated: SharedDataset = Arc::new(AggregatedDataset::new(train, n)?);
            DataLoader::new(aggregated, self.args.batch_size * n, true)
        } else {
            DataLoader::new(train, self.args.batch_size, true)
        }
    }

    fn val_dataloader(&self) -> Result<DataLoader> {
        DataLoader::new(self.val.clone().ok_or_else(|| not_set_up("validation"))?, self.args.batch_size, false)
    }

    fn test_dataloader(&self) -> Result<Vec<DataLoader>> {
        let mut loaders =
            vec![DataLoader::new(self.test.clone().ok_or_else(|| not_set_up("test"))?, self.args.batch_size, false)?];
        if self.ood_detection {
            let ood = self.ood.clone().ok_or_else(|| not_set_up("OOD"))?;
            loaders.push(DataLoader::new(ood, self.args.batch_size, false)?);
        }
        Ok(loaders)
    }

    fn num_classes(&self) -> usize {
        self.version.num_classes()
    }

    fn num_channels(&self) -> usize {
        3
    }

    fn training_task(&self) -> &str {
        "classification"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DummyClassificationDataset;

    fn dummy() -> DatasetBuilder {
        dataset_builder(|req| {
            Ok(Arc::new(DummyClassificationDataset::new(req.num_classes, 3).num_images(6)) as SharedDataset)
        })
    }

    #[test]
    fn cutout_sits_after_crop_and_flip() {
        let dm = CifarDataModule::cifar100(CifarArgs { cutout: Some(8), ..CifarArgs::default() }).unwrap();
        assert_eq!(dm.transform_train.names()[2], "Cutout");
        assert_eq!(dm.num_classes(), 100);
    }

    #[test]
    fn test_alt_h_only_for_cifar10() {
        let args = CifarArgs { test_alt: Some("h".into()), ..CifarArgs::default() };
        assert!(CifarDataModule::cifar100(args.clone()).is_err());
        assert!(CifarDataModule::cifar10(args).is_ok());
    }

    #[test]
    fn validation_split_is_carved_from_train() {
        let mut dm = CifarDataModule::cifar10(CifarArgs { val_split: 0.5, batch_size: 2, ..CifarArgs::default() })
            .unwrap();
        dm.dataset = dummy();
        dm.setup(Some(Stage::Fit)).unwrap();
        assert_eq!(dm.train_dataloader().unwrap().dataset.len(), 3);
        assert_eq!(dm.val_dataloader().unwrap().dataset.len(), 3);
        assert!(dm.test_dataloader().is_err());
    }
}
