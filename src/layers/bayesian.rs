//! Bayes-by-backprop layers: Gaussian weight posteriors with a scale-mixture prior.

use crate::error::{Error, Result};
use crate::layers::conv::{conv2d_forward, ConvSpec};
use crate::layers::linear::linear_forward;
use crate::layers::module::Module;
use crate::math::special::{gaussian_log_pdf, softplus};
use crate::math::tensor::Tensor;

/// Prior and posterior-initialisation hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BayesConfig {
    pub prior_sigma_1: f64,
    pub prior_sigma_2: f64,
    pub prior_pi: f64,
    pub mu_init: f64,
    pub sigma_init: f64,
}

impl Default for BayesConfig {
    fn default() -> Self {
        BayesConfig {
            prior_sigma_1: 0.1,
            prior_sigma_2: 0.4,
            prior_pi: 1.0,
            mu_init: 0.0,
            sigma_init: -7.0,
        }
    }
}

impl BayesConfig {
    fn validate(&self) -> Result<()> {
        if !(self.prior_sigma_1 > 0.0 && self.prior_sigma_2 > 0.0) {
            return Err(Error::invalid("prior standard deviations must be positive"));
        }
        if !(0.0..=1.0).contains(&self.prior_pi) {
            return Err(Error::invalid(format!("prior_pi must lie in [0, 1], got {}", self.prior_pi)));
        }
        Ok(())
    }

    fn log_prior(&self, w: &Tensor) -> f64 {
        w.data
            .iter()
            .map(|&v| {
                if self.prior_pi >= 1.0 {
                    gaussian_log_pdf(v, 0.0, self.prior_sigma_1)
                } else {
                    let p1 = gaussian_log_pdf(v, 0.0, self.prior_sigma_1).exp();
                    let p2 = gaussian_log_pdf(v, 0.0, self.prior_sigma_2).exp();
                    (self.prior_pi * p1 + (1.0 - self.prior_pi) * p2).ln()
                }
            })
            .sum()
    }
}

/// Reparameterised Gaussian `w = mu + softplus(rho) * eps`.
#[derive(Debug, Clone)]
pub struct TrainableDistribution {
    pub mu: Tensor,
    pub rho: Tensor,
}

impl TrainableDistribution {
    fn new(mu: Tensor, config: &BayesConfig) -> TrainableDistribution {
        let rho = Tensor::randn(&mu.shape, config.sigma_init, 0.1);
        TrainableDistribution { mu, rho }
    }

    pub fn sigma(&self) -> Tensor {
        self.rho.map(softplus)
    }

    /// Draws a weight sample and returns it with its log-density under the posterior.
    pub fn sample(&self) -> (Tensor, f64) {
        let eps = Tensor::randn(&self.mu.shape, 0.0, 1.0);
        let sigma = self.sigma();
        let mut w = self.mu.clone();
        let mut log_q = 0.0;
        for i in 0..w.data.len() {
            w.data[i] += sigma.data[i] * eps.data[i];
            log_q += gaussian_log_pdf(w.data[i], self.mu.data[i], sigma.data[i]);
        }
        (w, log_q)
    }
}

/// Bookkeeping shared by every Bayesian layer.
#[derive(Debug, Clone)]
struct BayesState {
    config: BayesConfig,
    weight: TrainableDistribution,
    bias: Option<TrainableDistribution>,
    frozen: bool,
    lvposterior: f64,
    lprior: f64,
}

impl BayesState {
    fn new(weight_mu: Tensor, bias_mu: Option<Tensor>, config: BayesConfig) -> BayesState {
        BayesState {
            weight: TrainableDistribution::new(weight_mu, &config),
            bias: bias_mu.map(|b| TrainableDistribution::new(b, &config)),
            config,
            frozen: false,
            lvposterior: 0.0,
            lprior: 0.0,
        }
    }

    /// Posterior means when frozen, fresh samples otherwise.
    fn draw(&mut self) -> (Tensor, Option<Tensor>) {
        if self.frozen {
            return (self.weight.mu.clone(), self.bias.as_ref().map(|b| b.mu.clone()));
        }
        let (w, mut log_q) = self.weight.sample();
        let mut log_p = self.config.log_prior(&w);
        let b = self.bias.as_ref().map(|dist| {
            let (b, lq) = dist.sample();
            log_q += lq;
            log_p += self.config.log_prior(&b);
            b
        });
        self.lvposterior = log_q;
        self.lprior = log_p;
        (w, b)
    }

    fn kl(&self) -> f64 {
        self.lvposterior - self.lprior
    }

    fn tensors(&self) -> Vec<&Tensor> {
        let mut v = vec![&self.weight.mu, &self.weight.rho];
        if let Some(b) = &self.bias {
            v.push(&b.mu);
            v.push(&b.rho);
        }
        v
    }

    fn tensors_mut(&mut self) -> Vec<&mut Tensor> {
        let mut v = vec![&mut self.weight.mu, &mut self.weight.rho];
        if let Some(b) = self.bias.as_mut() {
            v.push(&mut b.mu);
            v.push(&mut b.rho);
        }
        v
    }
}

pub struct BayesLinear {
    pub in_features: usize,
    pub out_features: usize,
    state: BayesState,
}

impl BayesLinear {
    pub fn new(in_features: usize, out_features: usize) -> Result<BayesLinear> {
        BayesLinear::with_config(in_features, out_features, true, BayesConfig::default())
    }

    pub fn with_config(in_features: usize, out_features: usize, bias: bool, config: BayesConfig) -> Result<BayesLinear> {
        config.validate()?;
        if in_features == 0 || out_features == 0 {
            return Err(Error::invalid("linear layer needs non-zero features"));
        }
        let bound = 1.0 / (in_features as f64).sqrt();
        let mu = Tensor::rand(&[out_features, in_features], -bound, bound);
        let bias_mu = bias.then(|| Tensor::full(&[out_features], config.mu_init));
        Ok(BayesLinear { in_features, out_features, state: BayesState::new(mu, bias_mu, config) })
    }

    pub fn weight_distribution(&self) -> &TrainableDistribution {
        &self.state.weight
    }
}

impl Module for BayesLinear {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let (w, b) = self.state.draw();
        linear_forward(x, &w, b.as_ref())
    }

    fn name(&self) -> String {
        format!("BayesLinear({}, {})", self.in_features, self.out_features)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.state.tensors()
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.state.tensors()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        self.state.tensors_mut()
    }

    fn kl_divergence(&self) -> f64 {
        self.state.kl()
    }

    fn freeze(&mut self, frozen: bool) {
        self.state.frozen = frozen;
    }
}

pub struct BayesConv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub spec: ConvSpec,
    state: BayesState,
}

impl BayesConv2d {
    pub fn new(in_channels: usize, out_channels: usize, spec: ConvSpec, config: BayesConfig) -> Result<BayesConv2d> {
        config.validate()?;
        if spec.groups == 0 || in_channels % spec.groups != 0 || out_channels % spec.groups != 0 {
            return Err(Error::invalid(format!(
                "channels ({in_channels} -> {out_channels}) must be divisible by groups ({})",
                spec.groups
            )));
        }
        let k = spec.kernel_size;
        let bound = 1.0 / ((in_channels / spec.groups * k * k).max(1) as f64).sqrt();
        let mu = Tensor::rand(&[out_channels, in_channels / spec.groups, k, k], -bound, bound);
        let bias_mu = spec.bias.then(|| Tensor::full(&[out_channels], config.mu_init));
        Ok(BayesConv2d { in_channels, out_channels, spec, state: BayesState::new(mu, bias_mu, config) })
    }
}

impl Module for BayesConv2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let (w, b) = self.state.draw();
        conv2d_forward(x, &w, b.as_ref(), &self.spec)
    }

    fn name(&self) -> String {
        format!("BayesConv2d({}, {}, kernel_size={})", self.in_channels, self.out_channels, self.spec.kernel_size)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.state.tensors()
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.state.tensors()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        self.state.tensors_mut()
    }

    fn kl_divergence(&self) -> f64 {
        self.state.kl()
    }

    fn freeze(&mut self, frozen: bool) {
        self.state.frozen = frozen;
    }
}
