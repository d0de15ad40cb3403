use std::sync::Arc;

use uncertainty_nn::datamodules::{CifarArgs, CifarDataModule, DataModule, Stage, UciArgs, UciDataModule};
use uncertainty_nn::datasets::{dataset_builder, DatasetBuilder, DummyClassificationDataset, DummyRegressionDataset, SharedDataset};
use uncertainty_nn::Error;

fn dummy() -> DatasetBuilder {
    dataset_builder(|req| {
        Ok(Arc::new(DummyClassificationDataset::new(req.num_classes, 3).image_size(32).num_images(4)) as SharedDataset)
    })
}

#[test]
fn cifar100_scenario() {
    let args = CifarArgs { cutout: Some(8), ..CifarArgs::default() };
    let mut dm = CifarDataModule::cifar100(args.clone()).unwrap();
    assert_eq!(dm.transform_train.names()[2], "Cutout");
    assert_eq!(dm.num_classes(), 100);

    dm.dataset = dummy();
    dm.ood_dataset = dummy();
    dm.prepare_data().unwrap();
    dm.setup(None).unwrap();
    dm.setup(Some(Stage::Test)).unwrap();
    dm.train_dataloader().unwrap();
    dm.val_dataloader().unwrap();
    assert_eq!(dm.test_dataloader().unwrap().len(), 1);

    dm.ood_detection = true;
    dm.setup_named(Some("test")).unwrap();
    assert_eq!(dm.test_dataloader().unwrap().len(), 2);

    // the corrupted test set cannot be used for fitting
    let alt = CifarArgs { test_alt: Some("c".into()), cutout: Some(0), ..args.clone() };
    let mut dm = CifarDataModule::cifar100(alt).unwrap();
    dm.dataset = dummy();
    assert!(matches!(dm.setup(None), Err(Error::InvalidArgument(_))));

    let aggregated = CifarArgs { num_dataloaders: 2, val_split: 0.25, ..args.clone() };
    let mut dm = CifarDataModule::cifar100(aggregated).unwrap();
    dm.dataset = dummy();
    dm.ood_dataset = dummy();
    dm.setup(None).unwrap();
    dm.setup(Some(Stage::Test)).unwrap();
    let loader = dm.train_dataloader().unwrap();
    assert_eq!(loader.batch_size, 2 * 128);
    let batch = loader.iter().next().unwrap().unwrap();
    assert_eq!(batch.inputs.shape, vec![3, 6, 32, 32]);
    assert!(matches!(dm.setup_named(Some("other")), Err(Error::InvalidArgument(_))));

    let clash = CifarArgs { cutout: Some(8), randaugment: true, ..args.clone() };
    assert!(CifarDataModule::cifar100(clash).is_err());
    let ra = CifarArgs { cutout: None, randaugment: true, ..args.clone() };
    assert!(CifarDataModule::cifar100(ra).is_ok());
    let policy = CifarArgs { cutout: None, auto_augment: Some("rand-m9-n2-mstd0.5".into()), ..args };
    assert!(CifarDataModule::cifar100(policy).is_ok());
}

#[test]
fn cifar100_has_no_human_labels() {
    let args = CifarArgs { test_alt: Some("h".into()), ..CifarArgs::default() };
    assert!(CifarDataModule::cifar100(args.clone()).is_err());
    assert!(CifarDataModule::cifar10(args).is_ok());
}

#[test]
fn uci_regression_module() {
    let mut dm = UciDataModule::new(UciArgs { batch_size: 4, ..UciArgs::default() }, vec![5]).unwrap();
    dm.dataset = dataset_builder(|_| Ok(Arc::new(DummyRegressionDataset::new(5, 1, 20)) as SharedDataset));
    dm.setup(Some(Stage::Fit)).unwrap();
    assert_eq!(dm.training_task(), "regression");
    let batch = dm.train_dataloader().unwrap().iter().next().unwrap().unwrap();
    assert_eq!(batch.inputs.shape, vec![4, 5]);
}
