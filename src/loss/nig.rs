//! Deep evidential regression loss over normal-inverse-gamma parameters.

use std::f64::consts::PI;

use crate::error::{Error, Result};
use crate::loss::reduction::Reduction;
use crate::math::special::{digamma, ln_gamma};
use crate::math::tensor::Tensor;

/// Gradients of the NIG loss with respect to each head parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct NigGradients {
    pub gamma: Tensor,
    pub nu: Tensor,
    pub alpha: Tensor,
    pub beta: Tensor,
}

#[derive(Debug, Clone, Copy)]
pub struct NigLoss {
    pub reg_weight: f64,
    pub reduction: Reduction,
}

impl NigLoss {
    pub fn new(reg_weight: f64, reduction: Reduction) -> Result<NigLoss> {
        if !(reg_weight >= 0.0) {
            return Err(Error::invalid(format!(
                "The regularization weight should be non-negative, but got {reg_weight}."
            )));
        }
        Ok(NigLoss { reg_weight, reduction })
    }

    /// Same as [`NigLoss::new`] with the reduction given by name.
    pub fn with_reduction_name(reg_weight: f64, reduction: &str) -> Result<NigLoss> {
        NigLoss::new(reg_weight, reduction.parse()?)
    }

    fn check(gamma: &Tensor, nu: &Tensor, alpha: &Tensor, beta: &Tensor, targets: &Tensor) -> Result<()> {
        for t in [nu, alpha, beta, targets] {
            t.expect_shape(&gamma.shape)?;
        }
        Ok(())
    }

    /// Student-t negative log-likelihood plus `reg_weight · |y - γ| · (2ν + α)`.
    pub fn forward(&self, gamma: &Tensor, nu: &Tensor, alpha: &Tensor, beta: &Tensor, targets: &Tensor) -> Result<Tensor> {
        NigLoss::check(gamma, nu, alpha, beta, targets)?;
        let values = (0..gamma.numel())
            .map(|i| {
                let (g, v, a, b, y) = (gamma.data[i], nu.data[i], alpha.data[i], beta.data[i], targets.data[i]);
                let omega = 2.0 * b * (1.0 + v);
                let nll = 0.5 * (PI / v).ln() - a * omega.ln()
                    + (a + 0.5) * (v * (y - g).powi(2) + omega).ln()
                    + ln_gamma(a)
                    - ln_gamma(a + 0.5);
                nll + self.reg_weight * (y - g).abs() * (2.0 * v + a)
            })
            .collect();
        Ok(self.reduction.reduce(values))
    }

    /// Analytic gradients of [`NigLoss::forward`].
    pub fn derivative(
        &self,
        gamma: &Tensor,
        nu: &Tensor,
        alpha: &Tensor,
        beta: &Tensor,
        targets: &Tensor,
    ) -> Result<NigGradients> {
        NigLoss::check(gamma, nu, alpha, beta, targets)?;
        let scale = self.reduction.gradient_scale(gamma.numel());
        let mut grads = NigGradients {
            gamma: Tensor::zeros(&gamma.shape),
            nu: Tensor::zeros(&gamma.shape),
            alpha: Tensor::zeros(&gamma.shape),
            beta: Tensor::zeros(&gamma.shape),
        };
        for i in 0..gamma.numel() {
            let (g, v, a, b, y) = (gamma.data[i], nu.data[i], alpha.data[i], beta.data[i], targets.data[i]);
            let err = y - g;
            let omega = 2.0 * b * (1.0 + v);
            let denom = v * err * err + omega;
            let lambda = self.reg_weight;
            let sign = if err > 0.0 { 1.0 } else if err < 0.0 { -1.0 } else { 0.0 };

            grads.gamma.data[i] = scale * (-(a + 0.5) * 2.0 * v * err / denom - lambda * (2.0 * v + a) * sign);
            grads.nu.data[i] = scale
                * (-0.5 / v - a / (1.0 + v) + (a + 0.5) * (err * err + 2.0 * b) / denom + 2.0 * lambda * err.abs());
            grads.alpha.data[i] =
                scale * (-omega.ln() + denom.ln() + digamma(a) - digamma(a + 0.5) + lambda * err.abs());
            grads.beta.data[i] = scale * (-a / b + (a + 0.5) * 2.0 * (1.0 + v) / denom);
        }
        Ok(grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(v: f64) -> Tensor {
        Tensor::new(&[1, 1], vec![v]).unwrap()
    }

    #[test]
    fn gradients_match_finite_differences() {
        let loss = NigLoss::new(0.1, Reduction::Mean).unwrap();
        let p = [0.3, 1.7, 2.2, 0.8];
        let y = column(1.1);
        let eval = |q: [f64; 4]| {
            loss.forward(&column(q[0]), &column(q[1]), &column(q[2]), &column(q[3]), &y)
                .unwrap()
                .item()
                .unwrap()
        };
        let g = loss
            .derivative(&column(p[0]), &column(p[1]), &column(p[2]), &column(p[3]), &y)
            .unwrap();
        let analytic = [g.gamma.data[0], g.nu.data[0], g.alpha.data[0], g.beta.data[0]];
        let h = 1e-6;
        for k in 0..4 {
            let mut plus = p;
            plus[k] += h;
            let mut minus = p;
            minus[k] -= h;
            let numeric = (eval(plus) - eval(minus)) / (2.0 * h);
            assert!((numeric - analytic[k]).abs() < 1e-5, "parameter {k}: {numeric} vs {}", analytic[k]);
        }
    }
}
