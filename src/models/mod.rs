//! Model zoo. Every architecture builds its layers through [`Variant`], so the
//! same definition yields the standard network or one of its ensembles.

pub mod checkpoint;
pub mod lenet;
pub mod mlp;
pub mod resnet;
pub mod variant;
pub mod vgg;
pub mod wideresnet;

pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
pub use lenet::{bayesian_lenet, lenet, LeNet};
pub use mlp::{Mlp, MlpSpec, ModelMetadata, Prediction};
pub use resnet::{resnet18, resnet34, resnet50, resnet101, resnet152, ResNet, ResNetArch, ResNetConfig};
pub use variant::{Position, Style, Variant};
pub use vgg::{vgg11, vgg13, vgg16, vgg19, Vgg, VggConfig};
pub use wideresnet::{
    batched_wideresnet28x10, masked_wideresnet28x10, mimo_wideresnet28x10, packed_wideresnet28x10,
    wideresnet28x10, WideResNet, WideResNetConfig,
};

use crate::layers::Module;

/// A network that may carry several ensemble members.
///
/// Ensemble outputs are estimator-major: `[(M * B), classes]`.
pub trait UncertaintyModel: Module {
    fn variant(&self) -> Variant;

    fn num_estimators(&self) -> usize {
        self.variant().num_estimators()
    }

    /// Layer tree with parameter counts.
    fn summary(&self) -> String;
}
