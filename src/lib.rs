//! Uncertainty-aware deep learning: ensembling layers (packed, masked,
//! batched, MIMO, MC-dropout), Bayesian layers, evidential and variational
//! losses, uncertainty metrics, and the datamodules, procedures and routines
//! that tie them together.

pub mod activation;
pub mod baselines;
pub mod cli;
pub mod datamodules;
pub mod datasets;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod metrics;
pub mod models;
pub mod optim;
pub mod procedures;
pub mod routines;
pub mod train;
pub mod transforms;

// Convenience re-exports
pub use activation::ActivationFunction;
pub use error::{Error, Result};
pub use layers::Module;
pub use math::tensor::Tensor;
pub use models::{Mlp, MlpSpec, UncertaintyModel};
pub use procedures::get_procedure;
pub use train::{train_loop, EpochStats, TrainConfig};
