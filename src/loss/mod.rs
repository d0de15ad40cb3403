pub mod bce;
pub mod criterion;
pub mod cross_entropy;
pub mod dec;
pub mod elbo;
pub mod gaussian_nll;
pub mod loss_type;
pub mod mse;
pub mod nig;
pub mod reduction;

pub use bce::BceWithLogitsLoss;
pub use criterion::Criterion;
pub use cross_entropy::CrossEntropyLoss;
pub use dec::{DecLoss, DecLossType};
pub use elbo::ElboLoss;
pub use gaussian_nll::GaussianNllLoss;
pub use loss_type::LossType;
pub use mse::MseLoss;
pub use nig::{NigGradients, NigLoss};
pub use reduction::Reduction;
