use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// How per-sample values are folded into the returned tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
    None,
}

impl Reduction {
    /// Scalar tensor for `Mean` / `Sum`, `[N]` tensor for `None`.
    pub fn reduce(&self, values: Vec<f64>) -> Tensor {
        match self {
            Reduction::Mean => {
                let n = values.len().max(1) as f64;
                Tensor::scalar(values.iter().sum::<f64>() / n)
            }
            Reduction::Sum => Tensor::scalar(values.iter().sum()),
            Reduction::None => Tensor { shape: vec![values.len()], data: values },
        }
    }

    /// Factor applied to every per-sample gradient.
    pub fn gradient_scale(&self, n: usize) -> f64 {
        match self {
            Reduction::Mean => 1.0 / n.max(1) as f64,
            Reduction::Sum | Reduction::None => 1.0,
        }
    }
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Reduction> {
        match s {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            "none" => Ok(Reduction::None),
            other => Err(Error::invalid(format!(
                "{other} is not a valid value for reduction, expected mean, sum or none"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_only() {
        assert_eq!("sum".parse::<Reduction>().unwrap(), Reduction::Sum);
        assert!("median".parse::<Reduction>().is_err());
    }

    #[test]
    fn none_keeps_every_value() {
        let t = Reduction::None.reduce(vec![1.0, 2.0]);
        assert_eq!(t.shape, vec![2]);
        assert_eq!(Reduction::Mean.reduce(vec![1.0, 2.0]).item().unwrap(), 1.5);
    }
}
