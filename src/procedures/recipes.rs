//! Optimizer and schedule recipes of the reference benchmarks.

use crate::error::Result;
use crate::layers::Module;
use crate::optim::{LrScheduler, OptimizerConfig};
use crate::procedures::OptimizationProcedure;

fn nesterov_sgd(lr: f64, weight_decay: f64) -> OptimizerConfig {
    OptimizerConfig::Sgd { lr, momentum: 0.9, weight_decay, nesterov: true }
}

fn recipe(
    name: &'static str,
    model: &dyn Module,
    optimizer: OptimizerConfig,
    scheduler: LrScheduler,
) -> OptimizationProcedure {
    tracing::debug!(procedure = name, params = model.num_parameters(), lr = optimizer.lr(), "optimization procedure");
    OptimizationProcedure { name, optimizer, scheduler }
}

pub fn optim_cifar10_resnet18(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar10_resnet18",
        model,
        nesterov_sgd(0.05, 5e-4),
        LrScheduler::multi_step(vec![25, 50], 0.1)?,
    ))
}

pub fn optim_cifar10_resnet50(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar10_resnet50",
        model,
        nesterov_sgd(0.1, 5e-4),
        LrScheduler::multi_step(vec![60, 120, 160], 0.2)?,
    ))
}

pub fn optim_cifar10_wideresnet(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar10_wideresnet",
        model,
        nesterov_sgd(0.1, 5e-4),
        LrScheduler::multi_step(vec![60, 120, 160], 0.2)?,
    ))
}

pub fn optim_cifar10_vgg16(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar10_vgg16",
        model,
        OptimizerConfig::adam(0.005, 1e-6),
        LrScheduler::multi_step(vec![25, 50], 0.5)?,
    ))
}

pub fn optim_cifar100_resnet18(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar100_resnet18",
        model,
        nesterov_sgd(0.1, 5e-4),
        LrScheduler::multi_step(vec![25, 50], 0.2)?,
    ))
}

pub fn optim_cifar100_resnet50(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar100_resnet50",
        model,
        nesterov_sgd(0.1, 5e-4),
        LrScheduler::multi_step(vec![60, 120, 160], 0.2)?,
    ))
}

pub fn optim_cifar100_vgg16(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "cifar100_vgg16",
        model,
        OptimizerConfig::adam(0.005, 1e-4),
        LrScheduler::multi_step(vec![25, 50], 0.5)?,
    ))
}

pub fn optim_imagenet_resnet50(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe(
        "imagenet_resnet50",
        model,
        OptimizerConfig::Sgd { lr: 0.1, momentum: 0.9, weight_decay: 1e-4, nesterov: false },
        LrScheduler::multi_step(vec![30, 60, 80], 0.1)?,
    ))
}

/// ResNet strikes back, A3: LAMB over 100 epochs with a 5-epoch warm-up. The
/// rate scales linearly with the effective batch size (2048 by default).
pub fn optim_imagenet_resnet50_a3(
    model: &dyn Module,
    effective_batch_size: Option<usize>,
) -> Result<OptimizationProcedure> {
    let ebs = effective_batch_size.unwrap_or_else(|| {
        tracing::info!("setting the effective batch size to 2048 for the A3 recipe");
        2048
    });
    Ok(recipe(
        "imagenet_resnet50_a3",
        model,
        OptimizerConfig::lamb(8e-3 * ebs as f64 / 2048.0, 0.02),
        LrScheduler::cosine_warmup(5, 100)?,
    ))
}

pub fn optim_regression(model: &dyn Module) -> Result<OptimizationProcedure> {
    Ok(recipe("regression", model, OptimizerConfig::adam(5e-3, 0.0), LrScheduler::Constant))
}
