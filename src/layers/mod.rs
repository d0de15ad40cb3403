pub mod basic;
pub mod batched;
pub mod bayesian;
pub mod conv;
pub mod dense;
pub mod linear;
pub mod masked;
pub mod module;
pub mod norm;
pub mod packed;
pub mod pool;
pub mod sequential;

pub use basic::{Dropout, Flatten, Identity, ReLU};
pub use batched::{BatchConv2d, BatchLinear};
pub use bayesian::{BayesConfig, BayesConv2d, BayesLinear};
pub use conv::{Conv2d, ConvSpec};
pub use dense::DenseLayer;
pub use linear::Linear;
pub use masked::{MaskedConv2d, MaskedLinear};
pub use module::{summary, Module, WeightInit};
pub use norm::BatchNorm2d;
pub use packed::{PackedConfig, PackedConv2d, PackedLinear};
pub use pool::{AdaptiveAvgPool2d, MaxPool2d};
pub use sequential::Sequential;
