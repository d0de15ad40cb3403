use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::loss::criterion::Criterion;
use crate::loss::loss_type::LossType;
use crate::loss::reduction::Reduction;
use crate::loss::{BceWithLogitsLoss, CrossEntropyLoss, GaussianNllLoss, MseLoss, NigLoss};
use crate::math::special::sigmoid;
use crate::math::tensor::Tensor;
use crate::models::mlp::{Mlp, Prediction};

/// Loss of an MLP head and its gradient with respect to the raw head output.
pub struct Objective {
    loss_type: LossType,
    nig: NigLoss,
}

impl Objective {
    pub fn new(loss_type: LossType, nig_reg_weight: f64) -> Result<Objective> {
        Ok(Objective { loss_type, nig: NigLoss::new(nig_reg_weight, Reduction::Mean)? })
    }

    pub fn check(&self, mlp: &Mlp) -> Result<()> {
        if mlp.spec.dist_estimation != self.loss_type.dist_estimation() {
            return Err(Error::invalid(format!(
                "{:?} needs dist_estimation = {}, the MLP has {}",
                self.loss_type,
                self.loss_type.dist_estimation(),
                mlp.spec.dist_estimation
            )));
        }
        Ok(())
    }

    /// Mean loss of the batch and `∂loss/∂raw`.
    pub fn loss_and_delta(&self, mlp: &Mlp, raw: &Tensor, targets: &Targets) -> Result<(f64, Tensor)> {
        match self.loss_type {
            LossType::Mse => criterion_pair(&MseLoss::new(Reduction::Mean), raw, targets),
            LossType::CrossEntropy => criterion_pair(&CrossEntropyLoss::new(Reduction::Mean), raw, targets),
            LossType::BinaryCrossEntropy => criterion_pair(&BceWithLogitsLoss::new(Reduction::Mean), raw, targets),
            LossType::GaussianNll => {
                let (mean, variance) = match mlp.split_output(raw)? {
                    Prediction::Gaussian { mean, variance } => (mean, variance),
                    _ => return Err(Error::invalid("Gaussian NLL needs a Gaussian head")),
                };
                let y = targets.values()?;
                let loss = GaussianNllLoss::new(Reduction::Mean);
                let value = loss.forward(&mean, &variance, y)?.item()?;
                let (d_mean, d_var) = loss.derivative(&mean, &variance, y)?;
                Ok((value, assemble(raw, &[(&d_mean, false), (&d_var, true)])))
            }
            LossType::Nig => {
                let (gamma, nu, alpha, beta) = match mlp.split_output(raw)? {
                    Prediction::NormalInverseGamma { gamma, nu, alpha, beta } => (gamma, nu, alpha, beta),
                    _ => return Err(Error::invalid("NIG loss needs a normal-inverse-gamma head")),
                };
                let y = targets.values()?;
                let value = self.nig.forward(&gamma, &nu, &alpha, &beta, y)?.item()?;
                let g = self.nig.derivative(&gamma, &nu, &alpha, &beta, y)?;
                Ok((value, assemble(raw, &[(&g.gamma, false), (&g.nu, true), (&g.alpha, true), (&g.beta, true)])))
            }
        }
    }
}

fn criterion_pair(criterion: &dyn Criterion, raw: &Tensor, targets: &Targets) -> Result<(f64, Tensor)> {
    Ok((criterion.forward(raw, targets)?.item()?, criterion.derivative(raw, targets)?))
}

/// Writes per-parameter gradients back into the parameter-major raw layout,
/// chaining through softplus where the head applies it.
fn assemble(raw: &Tensor, parts: &[(&Tensor, bool)]) -> Tensor {
    let k = parts.len();
    let n = raw.sample_len() / k;
    let mut delta = Tensor::zeros(&raw.shape);
    for b in 0..raw.batch() {
        for (j, (grad, through_softplus)) in parts.iter().enumerate() {
            for o in 0..n {
                let at = b * n * k + j * n + o;
                let g = grad.data[b * n + o];
                delta.data[at] = if *through_softplus { g * sigmoid(raw.data[at]) } else { g };
            }
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mlp::MlpSpec;

    /// Finite-difference check of the chained gradient for every head kind.
    #[test]
    fn raw_gradients_match_finite_differences() {
        for (loss_type, k) in [(LossType::Mse, 1), (LossType::GaussianNll, 2), (LossType::Nig, 4)] {
            let mlp = Mlp::new(MlpSpec::new("m", 2, 1, vec![]).dist_estimation(k)).unwrap();
            let objective = Objective::new(loss_type, 0.1).unwrap();
            let raw = Tensor::new(&[1, k], vec![0.3, -0.4, 0.5, 0.2][..k].to_vec()).unwrap();
            let targets = Targets::Values(Tensor::new(&[1, 1], vec![0.9]).unwrap());
            let (_, delta) = objective.loss_and_delta(&mlp, &raw, &targets).unwrap();
            for i in 0..k {
                let h = 1e-6;
                let mut up = raw.clone();
                up.data[i] += h;
                let mut down = raw.clone();
                down.data[i] -= h;
                let f = |t: &Tensor| objective.loss_and_delta(&mlp, t, &targets).unwrap().0;
                let numeric = (f(&up) - f(&down)) / (2.0 * h);
                assert!((numeric - delta.data[i]).abs() < 1e-5, "{loss_type:?}[{i}]: {numeric} vs {}", delta.data[i]);
            }
        }
    }

    #[test]
    fn head_width_must_match_loss() {
        let mlp = Mlp::new(MlpSpec::new("m", 2, 1, vec![])).unwrap();
        assert!(Objective::new(LossType::Nig, 0.1).unwrap().check(&mlp).is_err());
        assert!(Objective::new(LossType::Mse, 0.1).unwrap().check(&mlp).is_ok());
    }
}
