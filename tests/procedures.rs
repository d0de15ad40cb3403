use uncertainty_nn::models::{Mlp, MlpSpec};
use uncertainty_nn::optim::{LrScheduler, OptimizerConfig};
use uncertainty_nn::procedures::{get_procedure, registry, Procedure};
use uncertainty_nn::Error;

fn model() -> Mlp {
    Mlp::new(MlpSpec::new("probe", 3, 2, vec![4])).unwrap()
}

#[test]
fn every_registered_recipe_builds_an_optimizer() {
    let model = model();
    for (arch, dataset, procedure) in registry() {
        let resolved = procedure.apply(&model).unwrap_or_else(|e| panic!("{arch}/{dataset}: {e}"));
        assert!(resolved.build_optimizer().is_ok());
    }
}

#[test]
fn lookups_follow_architecture_and_dataset() {
    let model = model();
    let wrn = get_procedure("wideresnet28x10", "cifar100", "standard", None).unwrap().apply(&model).unwrap();
    assert_eq!(wrn.name, "cifar10_wideresnet");
    assert!(matches!(wrn.optimizer, OptimizerConfig::Sgd { .. }));
    assert!(matches!(wrn.scheduler, LrScheduler::MultiStep { .. }));

    let a3 = get_procedure("resnet50", "imagenet", "standard", Some("A3")).unwrap();
    assert_eq!(a3.name, "imagenet_resnet50_a3");
    assert!(matches!(a3.apply(&model).unwrap().optimizer, OptimizerConfig::Lamb { .. }));
}

#[test]
fn unknown_pairs_are_not_implemented() {
    assert!(matches!(get_procedure("resnet34", "cifar10", "standard", None), Err(Error::NotImplemented(_))));
    assert!(matches!(get_procedure("vgg16", "svhn", "standard", None), Err(Error::NotImplemented(_))));
    assert!(matches!(get_procedure("resnet50", "imagenet", "standard", Some("B2")), Err(Error::NotImplemented(_))));
    assert!(Procedure::by_name("regression").is_ok());
}
