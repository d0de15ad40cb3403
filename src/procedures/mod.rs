//! Registry of optimization procedures (optimizer plus learning-rate schedule)
//! keyed by architecture and dataset.

pub mod recipes;

pub use recipes::*;

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::layers::Module;
use crate::optim::{LrScheduler, Optimizer, OptimizerConfig};

/// The optimizer and schedule a model is trained with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationProcedure {
    pub name: &'static str,
    pub optimizer: OptimizerConfig,
    pub scheduler: LrScheduler,
}

impl OptimizationProcedure {
    pub fn build_optimizer(&self) -> Result<Box<dyn Optimizer>> {
        self.optimizer.build()
    }
}

type Recipe = fn(&dyn Module, Option<usize>) -> Result<OptimizationProcedure>;

/// A registered recipe, applied to a model to obtain its procedure.
#[derive(Clone, Copy)]
pub struct Procedure {
    pub name: &'static str,
    recipe: Recipe,
}

impl Procedure {
    pub fn apply(&self, model: &dyn Module) -> Result<OptimizationProcedure> {
        (self.recipe)(model, None)
    }

    /// Only the ImageNet A3 recipe reads the effective batch size.
    pub fn apply_with_batch_size(&self, model: &dyn Module, effective_batch_size: usize) -> Result<OptimizationProcedure> {
        (self.recipe)(model, Some(effective_batch_size))
    }

    /// Finds a registered recipe by its own name, e.g. `"cifar10_resnet18"`.
    pub fn by_name(name: &str) -> Result<Procedure> {
        registry()
            .into_iter()
            .map(|(_, _, p)| p)
            .find(|p| p.name == name)
            .ok_or_else(|| Error::NotImplemented(format!("no optimization procedure named {name}")))
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure").field("name", &self.name).finish()
    }
}

macro_rules! fixed {
    ($name:literal, $f:path) => {
        Procedure { name: $name, recipe: |model, _| $f(model) }
    };
}

pub const MODEL_KINDS: [&str; 7] = ["standard", "vanilla", "packed", "batched", "masked", "mimo", "mc-dropout"];

/// Every registered `(arch, dataset, recipe)` triple, for listing.
pub fn registry() -> Vec<(&'static str, &'static str, Procedure)> {
    vec![
        ("resnet18", "cifar10", fixed!("cifar10_resnet18", optim_cifar10_resnet18)),
        ("resnet18", "cifar100", fixed!("cifar100_resnet18", optim_cifar100_resnet18)),
        ("resnet50", "cifar10", fixed!("cifar10_resnet50", optim_cifar10_resnet50)),
        ("resnet50", "cifar100", fixed!("cifar100_resnet50", optim_cifar100_resnet50)),
        ("resnet50", "imagenet", fixed!("imagenet_resnet50", optim_imagenet_resnet50)),
        ("resnet50", "imagenet-a3", Procedure { name: "imagenet_resnet50_a3", recipe: optim_imagenet_resnet50_a3 }),
        ("wideresnet28x10", "cifar10", fixed!("cifar10_wideresnet", optim_cifar10_wideresnet)),
        ("wideresnet28x10", "cifar100", fixed!("cifar10_wideresnet", optim_cifar10_wideresnet)),
        ("vgg16", "cifar10", fixed!("cifar10_vgg16", optim_cifar10_vgg16)),
        ("vgg16", "cifar100", fixed!("cifar100_vgg16", optim_cifar100_vgg16)),
        ("mlp", "regression", fixed!("regression", optim_regression)),
    ]
}

/// Looks up the procedure of `arch` on `dataset`. `imagenet_recipe` selects
/// an alternative ImageNet recipe (`A3`).
pub fn get_procedure(arch: &str, dataset: &str, model_kind: &str, imagenet_recipe: Option<&str>) -> Result<Procedure> {
    if !MODEL_KINDS.contains(&model_kind) {
        return Err(Error::invalid(format!("unknown model kind {model_kind}")));
    }
    let key = match (dataset, imagenet_recipe) {
        ("imagenet", Some(recipe)) if recipe.eq_ignore_ascii_case("a3") => "imagenet-a3".to_string(),
        ("imagenet", Some(recipe)) => {
            return Err(Error::NotImplemented(format!("ImageNet recipe {recipe}")));
        }
        (d, _) => d.to_string(),
    };
    if !registry().iter().any(|(a, _, _)| *a == arch) {
        return Err(Error::NotImplemented(format!("no optimization procedure for architecture {arch}")));
    }
    let procedure = registry()
        .into_iter()
        .find(|(a, d, _)| *a == arch && *d == key)
        .map(|(_, _, p)| p)
        .ok_or_else(|| Error::NotImplemented(format!("no optimization procedure for {arch} on {dataset}")))?;
    tracing::info!(arch, dataset, model_kind, procedure = procedure.name, "selected optimization procedure");
    Ok(procedure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mlp::{Mlp, MlpSpec};

    fn tiny() -> Mlp {
        Mlp::new(MlpSpec::new("tiny", 2, 1, vec![])).unwrap()
    }

    #[test]
    fn known_pairs_resolve() {
        let model = tiny();
        for (arch, dataset, kind) in [
            ("resnet18", "cifar10", "standard"),
            ("resnet50", "cifar10", "packed"),
            ("wideresnet28x10", "cifar10", "batched"),
            ("vgg16", "cifar10", "standard"),
            ("resnet18", "cifar100", "masked"),
            ("resnet50", "cifar100", "standard"),
            ("wideresnet28x10", "cifar100", "standard"),
            ("vgg16", "cifar100", "standard"),
            ("resnet50", "imagenet", "standard"),
        ] {
            let p = get_procedure(arch, dataset, kind, None).unwrap();
            assert!(p.apply(&model).unwrap().build_optimizer().is_ok());
        }
    }

    #[test]
    fn resnet18_cifar10_recipe() {
        let p = get_procedure("resnet18", "cifar10", "standard", None).unwrap().apply(&tiny()).unwrap();
        assert_eq!(p.optimizer, OptimizerConfig::Sgd { lr: 0.05, momentum: 0.9, weight_decay: 5e-4, nesterov: true });
        assert_eq!(p.scheduler, LrScheduler::MultiStep { milestones: vec![25, 50], gamma: 0.1 });
    }

    #[test]
    fn a3_scales_with_batch_size() {
        let p = get_procedure("resnet50", "imagenet", "standard", Some("A3")).unwrap();
        let model = tiny();
        assert!((p.apply_with_batch_size(&model, 64).unwrap().optimizer.lr() - 8e-3 * 64.0 / 2048.0).abs() < 1e-15);
        assert!((p.apply(&model).unwrap().optimizer.lr() - 8e-3).abs() < 1e-15);
    }

    #[test]
    fn unknown_lookups_are_not_implemented() {
        for (arch, dataset) in
            [("unknown", "cifar100"), ("resnet18", "unknown"), ("resnet50", "unknown"), ("wideresnet28x10", "unknown")]
        {
            assert!(matches!(get_procedure(arch, dataset, "standard", None), Err(Error::NotImplemented(_))));
        }
        assert!(get_procedure("resnet18", "cifar10", "quantum", None).is_err());
    }

    #[test]
    fn recipes_resolve_by_name() {
        assert_eq!(Procedure::by_name("cifar100_vgg16").unwrap().name, "cifar100_vgg16");
        assert!(matches!(Procedure::by_name("nope"), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn regression_uses_adam() {
        let p = optim_regression(&tiny()).unwrap();
        assert_eq!(p.optimizer, OptimizerConfig::adam(5e-3, 0.0));
        assert_eq!(p.scheduler, LrScheduler::Constant);
    }
}
