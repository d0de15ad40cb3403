use uncertainty_nn::datasets::{Cifar, Cifar10H, CifarVersion, ImageNetVariant, Split, UciRegression};
use uncertainty_nn::Error;

#[test]
fn missing_cifar10h_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Cifar10H::new(dir.path()), Err(Error::DatasetNotFound { .. })));
}

#[test]
fn missing_imagenet_a_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    for variant in [ImageNetVariant::A, ImageNetVariant::O, ImageNetVariant::R] {
        assert!(matches!(variant.load(dir.path(), 224), Err(Error::DatasetNotFound { .. })));
    }
}

#[test]
fn missing_cifar_and_unknown_uci_names() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Cifar::new(dir.path(), CifarVersion::Cifar100, Split::Train), Err(Error::DatasetNotFound { .. })));
    assert!(matches!(UciRegression::new(dir.path(), "mnist"), Err(Error::InvalidArgument(_))));
    assert!(matches!(UciRegression::new(dir.path(), "yacht"), Err(Error::DatasetNotFound { .. })));
}
