//! Special functions used by the evidential and Bayesian losses.

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function (Lanczos approximation, x > 0).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1-x) = π / sin(πx)
        return (PI / (PI * x).sin()).abs().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS_COEFFS[0];
    let t = x + LANCZOS_G + 0.5;
    for (i, c) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Digamma ψ(x): recurrence up to x > 8, then the asymptotic expansion.
pub fn digamma(mut x: f64) -> f64 {
    let mut s = 0.0;
    while x < 8.0 {
        s -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    s + x.ln() - 0.5 * inv - inv2 * (1.0 / 12.0) + inv2 * inv2 * (1.0 / 120.0)
        - inv2 * inv2 * inv2 * (1.0 / 252.0)
}

/// log(1 + e^x), stable for large |x|.
pub fn softplus(x: f64) -> f64 {
    if x > 20.0 {
        x
    } else if x < -20.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// d/dx softplus(x) = sigmoid(x)
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Log-density of N(mu, sigma²) at x.
pub fn gaussian_log_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * (2.0 * PI).ln() - sigma.ln() - 0.5 * z * z
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn ln_gamma_matches_known_values() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-10));
        assert!(close(ln_gamma(2.0), 0.0, 1e-10));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-10));
        assert!(close(ln_gamma(1.5), (PI.sqrt() / 2.0).ln(), 1e-10));
        assert!(close(ln_gamma(5.0), 24.0_f64.ln(), 1e-9));
    }

    #[test]
    fn digamma_matches_known_values() {
        // ψ(1) = -γ
        assert!(close(digamma(1.0), -0.577_215_664_901_532_9, 1e-8));
        // ψ(x + 1) = ψ(x) + 1/x
        assert!(close(digamma(3.5), digamma(2.5) + 1.0 / 2.5, 1e-10));
    }

    #[test]
    fn softplus_is_stable() {
        assert!(close(softplus(0.0), 2.0_f64.ln(), 1e-12));
        assert_eq!(softplus(100.0), 100.0);
        assert!(softplus(-100.0) > 0.0);
    }

    #[test]
    fn log_sum_exp_of_equal_values() {
        assert!(close(log_sum_exp(&[0.0, 0.0]), 2.0_f64.ln(), 1e-12));
    }
}
