pub mod rng;
pub mod special;
pub mod tensor;

pub use rng::{seed_everything, with_rng};
pub use tensor::Tensor;
