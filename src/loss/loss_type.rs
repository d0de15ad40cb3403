use serde::{Serialize, Deserialize};

/// Selects which objective the MLP training loop optimises.
///
/// - `Mse`: mean-squared error; point-estimate regression head.
/// - `CrossEntropy`: categorical cross-entropy on logits.
/// - `BinaryCrossEntropy`: binary cross-entropy on logits.
/// - `GaussianNll`: Gaussian NLL; needs a head with `dist_estimation = 2`.
/// - `Nig`: evidential regression; needs `dist_estimation = 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Mse,
    CrossEntropy,
    BinaryCrossEntropy,
    GaussianNll,
    Nig,
}

impl LossType {
    /// Distribution parameters the head must predict per output.
    pub fn dist_estimation(&self) -> usize {
        match self {
            LossType::GaussianNll => 2,
            LossType::Nig => 4,
            _ => 1,
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, LossType::CrossEntropy | LossType::BinaryCrossEntropy)
    }
}
