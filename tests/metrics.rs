use std::f64::consts::LN_2;

use uncertainty_nn::datasets::Targets;
use uncertainty_nn::loss::Reduction;
use uncertainty_nn::metrics::{Auroc, CalibrationError, CalibrationNorm, Entropy, Metric};
use uncertainty_nn::Tensor;

fn uniform() -> Tensor {
    Tensor::new(&[1, 2], vec![0.5, 0.5]).unwrap()
}

fn certain() -> Tensor {
    Tensor::new(&[1, 2], vec![0.0, 1.0]).unwrap()
}

#[test]
fn entropy_of_certain_and_uniform_predictions() {
    let mut metric = Entropy::new(Reduction::Sum);
    metric.update(&certain(), None).unwrap();
    assert_eq!(metric.compute().unwrap().item().unwrap(), 0.0);

    metric.reset();
    metric.update(&uniform(), None).unwrap();
    assert!((metric.compute().unwrap().item().unwrap() - LN_2).abs() < 1e-12);
}

#[test]
fn entropy_reductions_over_several_batches() {
    let mut sum = Entropy::with_reduction_name("sum").unwrap();
    let mut mean = Entropy::with_reduction_name("mean").unwrap();
    let mut none = Entropy::with_reduction_name("none").unwrap();
    for metric in [&mut sum, &mut mean, &mut none] {
        metric.update(&uniform(), None).unwrap();
        metric.update(&certain(), None).unwrap();
    }
    assert!((sum.compute().unwrap().item().unwrap() - LN_2).abs() < 1e-12);
    assert!((mean.compute().unwrap().item().unwrap() - LN_2 / 2.0).abs() < 1e-12);
    assert_eq!(none.compute().unwrap().numel(), 2);
    assert!(Entropy::with_reduction_name("geometric_mean").is_err());
}

#[test]
fn calibration_of_a_perfect_classifier_is_zero() {
    let mut ece = CalibrationError::new(15, CalibrationNorm::L1).unwrap();
    let probs = Tensor::new(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    ece.update(&probs, Some(&Targets::Classes(vec![0, 1]))).unwrap();
    assert!(ece.compute().unwrap().item().unwrap().abs() < 1e-12);
}

#[test]
fn auroc_of_separable_scores() {
    let mut auroc = Auroc::new();
    let scores = Tensor::new(&[4], vec![0.1, 0.2, 0.8, 0.9]).unwrap();
    auroc.update(&scores, Some(&Targets::Classes(vec![0, 0, 1, 1]))).unwrap();
    assert_eq!(auroc.compute().unwrap().item().unwrap(), 1.0);
}
